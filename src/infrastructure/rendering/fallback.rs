//! Main-thread canvas renderer used when off-main-thread rendering is
//! unavailable. Same decode → draw → sample pipeline as the worker, minus the
//! message passing and the deadline.

use std::cell::Cell;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

use super::analysis::{average_brightness, sample_rows};
use super::image_element::{PendingLoad, load_image};
use crate::domain::{
    clock::Clock,
    errors::{BenchError, BenchResult},
    frame::Frame,
    logging::{LogComponent, get_logger},
    render::{BackendEvent, BackendNotifier, BrightnessReport, Dimensions, RenderBackend, RenderReport, RenderTiming},
};
use crate::infrastructure::object_url::ObjectUrlManager;

const COMPONENT: LogComponent = LogComponent::Infrastructure("FallbackRenderer");

pub struct FallbackRenderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    decoder: HtmlImageElement,
    urls: ObjectUrlManager,
    clock: Rc<dyn Clock>,
    mime_type: String,
    sample_bytes: usize,
    notify: Option<BackendNotifier>,
    pending: Option<PendingLoad>,
    busy: Rc<Cell<bool>>,
    disposed: Rc<Cell<bool>>,
}

impl FallbackRenderer {
    pub fn new(
        canvas: HtmlCanvasElement,
        urls: ObjectUrlManager,
        clock: Rc<dyn Clock>,
        mime_type: impl Into<String>,
        sample_bytes: usize,
    ) -> BenchResult<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|e| BenchError::Surface(format!("getContext failed: {e:?}")))?
            .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
            .ok_or_else(|| BenchError::Surface("Failed to get 2D context".to_string()))?;
        let decoder =
            HtmlImageElement::new().map_err(|e| BenchError::Surface(format!("Failed to create image: {e:?}")))?;

        Ok(Self {
            canvas,
            context,
            decoder,
            urls,
            clock,
            mime_type: mime_type.into(),
            sample_bytes,
            notify: None,
            pending: None,
            busy: Rc::new(Cell::new(false)),
            disposed: Rc::new(Cell::new(false)),
        })
    }
}

impl RenderBackend for FallbackRenderer {
    fn name(&self) -> &'static str {
        "fallback-canvas"
    }

    fn initialize(&mut self, notify: BackendNotifier) -> BenchResult<()> {
        notify(BackendEvent::Ready);
        self.notify = Some(notify);
        get_logger().info(COMPONENT, "🔄 Rendering on the main thread");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.disposed.get() && self.notify.is_some()
    }

    fn is_busy(&self) -> bool {
        self.busy.get()
    }

    fn dispatch(&mut self, frame: &Frame) -> BenchResult<()> {
        let Some(notify) = self.notify.clone() else {
            return Err(BenchError::NotReady);
        };

        let start = self.clock.now_ms();
        // One URL per frame: the previous one is revoked here.
        self.urls.invalidate();
        let url = self.urls.get_or_create(frame.payload(), &self.mime_type)?;
        let blob_time = self.clock.now_ms();

        self.busy.set(true);
        let busy = self.busy.clone();
        let disposed = self.disposed.clone();
        let canvas = self.canvas.clone();
        let context = self.context.clone();
        let decoder = self.decoder.clone();
        let clock = self.clock.clone();
        let sample_bytes = self.sample_bytes;

        self.pending = Some(load_image(&self.decoder, &url, move |result| {
            busy.set(false);
            if disposed.get() {
                return;
            }
            let outcome = result.map_err(BenchError::Decode).and_then(|dims| {
                let load_time = clock.now_ms();
                canvas.set_width(dims.width);
                canvas.set_height(dims.height);
                context.clear_rect(0.0, 0.0, dims.width as f64, dims.height as f64);
                context
                    .draw_image_with_html_image_element(&decoder, 0.0, 0.0)
                    .map_err(|e| BenchError::Surface(format!("drawImage failed: {e:?}")))?;

                let brightness = sample(&context, dims, sample_bytes, clock.as_ref());
                let end = clock.now_ms();
                Ok(RenderReport {
                    timing: Some(RenderTiming {
                        blob_creation: blob_time - start,
                        image_load: load_time - blob_time,
                        rendering: end - load_time,
                        total: end - start,
                    }),
                    dimensions: Some(dims),
                    brightness,
                })
            });
            notify(BackendEvent::Finished(outcome));
        }));
        Ok(())
    }

    fn teardown(&mut self) {
        if self.disposed.replace(true) {
            return;
        }
        self.pending = None;
        self.notify = None;
        self.busy.set(false);
        self.urls.release_all();
    }
}

impl Drop for FallbackRenderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn sample(
    context: &CanvasRenderingContext2d,
    dims: Dimensions,
    sample_bytes: usize,
    clock: &dyn Clock,
) -> Option<BrightnessReport> {
    let started = clock.now_ms();
    let rows = sample_rows(sample_bytes, dims);
    if rows == 0 {
        return None;
    }
    match context.get_image_data(0.0, 0.0, dims.width as f64, rows as f64) {
        Ok(image) => {
            let (avg_brightness, pixels_analyzed) = average_brightness(&image.data(), sample_bytes);
            Some(BrightnessReport { avg_brightness, processing_time: clock.now_ms() - started, pixels_analyzed })
        }
        Err(e) => {
            get_logger().warn(COMPONENT, &format!("Pixel sampling failed: {e:?}"));
            None
        }
    }
}
