//! `<img>` based render paths: a Base64 data URL assigned directly, or a
//! Blob object URL.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use web_sys::{Event, HtmlImageElement};

use crate::domain::{
    errors::{BenchError, BenchResult},
    frame::{Frame, FramePayload},
    logging::{LogComponent, get_logger},
    render::{BackendEvent, BackendNotifier, Dimensions, RenderBackend, RenderReport},
};
use crate::event_utils::{EventListenerHandle, EventOptions, listen_with_options};
use crate::infrastructure::object_url::ObjectUrlManager;

/// Listeners of one pending image load. Dropping it detaches both.
pub struct PendingLoad {
    _load: EventListenerHandle,
    _error: EventListenerHandle,
}

type Settled = Box<dyn FnOnce(Result<Dimensions, String>)>;

/// Point `img` at `src` and call `on_settled` once, on `load` or `error`.
pub fn load_image(
    img: &HtmlImageElement,
    src: &str,
    on_settled: impl FnOnce(Result<Dimensions, String>) + 'static,
) -> PendingLoad {
    let settled: Rc<RefCell<Option<Settled>>> = Rc::new(RefCell::new(Some(Box::new(on_settled))));

    let load = {
        let settled = settled.clone();
        let element = img.clone();
        listen_with_options(img.as_ref(), "load", &EventOptions::once(), move |_: Event| {
            if let Some(callback) = settled.borrow_mut().take() {
                callback(Ok(Dimensions { width: element.natural_width(), height: element.natural_height() }));
            }
        })
    };
    let error = {
        let settled = settled.clone();
        let src = src.chars().take(64).collect::<String>();
        listen_with_options(img.as_ref(), "error", &EventOptions::once(), move |_: Event| {
            if let Some(callback) = settled.borrow_mut().take() {
                callback(Err(format!("Failed to load image from {src}")));
            }
        })
    };

    img.set_src(src);
    PendingLoad { _load: load, _error: error }
}

/// How the `<img>` source is produced from a frame.
pub enum ImageSource {
    /// `data:<mime>;base64,<payload>`
    DataUrl,
    ObjectUrl(ObjectUrlManager),
}

pub struct ImageElementRenderer {
    name: &'static str,
    img: HtmlImageElement,
    source: ImageSource,
    mime_type: String,
    notify: Option<BackendNotifier>,
    pending: Option<PendingLoad>,
    busy: Rc<Cell<bool>>,
    disposed: bool,
}

impl ImageElementRenderer {
    pub fn new(name: &'static str, img: HtmlImageElement, source: ImageSource, mime_type: impl Into<String>) -> Self {
        Self {
            name,
            img,
            source,
            mime_type: mime_type.into(),
            notify: None,
            pending: None,
            busy: Rc::new(Cell::new(false)),
            disposed: false,
        }
    }

    fn source_for(&mut self, payload: &FramePayload) -> BenchResult<String> {
        match &mut self.source {
            ImageSource::DataUrl => {
                let data = match payload {
                    FramePayload::Base64(text) => text.to_string(),
                    FramePayload::Binary(buffer) => STANDARD.encode(buffer.bytes()),
                };
                Ok(format!("data:{};base64,{}", self.mime_type, data))
            }
            ImageSource::ObjectUrl(urls) => urls
                .resolve(Some(payload), &self.mime_type)?
                .ok_or_else(|| BenchError::Decode("Empty payload".to_string())),
        }
    }
}

impl RenderBackend for ImageElementRenderer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self, notify: BackendNotifier) -> BenchResult<()> {
        notify(BackendEvent::Ready);
        self.notify = Some(notify);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.disposed && self.notify.is_some()
    }

    fn is_busy(&self) -> bool {
        self.busy.get()
    }

    fn dispatch(&mut self, frame: &Frame) -> BenchResult<()> {
        let Some(notify) = self.notify.clone() else {
            return Err(BenchError::NotReady);
        };
        if self.disposed {
            return Err(BenchError::NotReady);
        }

        let src = self.source_for(frame.payload())?;

        // Re-assigning the same source fires no load event; it is already shown.
        if self.img.src() == src && self.img.complete() {
            notify(BackendEvent::Finished(Ok(RenderReport {
                dimensions: Some(Dimensions { width: self.img.natural_width(), height: self.img.natural_height() }),
                ..RenderReport::default()
            })));
            return Ok(());
        }

        self.busy.set(true);
        let busy = self.busy.clone();
        self.pending = Some(load_image(&self.img, &src, move |result| {
            busy.set(false);
            let outcome = result
                .map(|dimensions| RenderReport { dimensions: Some(dimensions), ..RenderReport::default() })
                .map_err(BenchError::Decode);
            notify(BackendEvent::Finished(outcome));
        }));
        Ok(())
    }

    fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.pending = None;
        self.notify = None;
        self.busy.set(false);
        if let ImageSource::ObjectUrl(urls) = &mut self.source {
            urls.release_all();
        }
        get_logger().debug(LogComponent::Infrastructure("ImageElement"), &format!("{} torn down", self.name));
    }
}

impl Drop for ImageElementRenderer {
    fn drop(&mut self) {
        self.teardown();
    }
}
