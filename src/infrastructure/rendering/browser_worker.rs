//! `web_sys::Worker` behind the [`WorkerPort`] seam.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Array;
use wasm_bindgen::JsValue;
use web_sys::{ErrorEvent, HtmlCanvasElement, MessageEvent, Worker, WorkerOptions, WorkerType};

use super::protocol::{WorkerCommand, WorkerResponse};
use super::worker_channel::{PortEvent, PortFactory, PortHandler, WorkerPort};
use crate::domain::errors::{BenchError, BenchResult};
use crate::event_utils::{EventListenerHandle, listen};

pub struct BrowserWorkerPort {
    worker: Worker,
    canvas: Option<HtmlCanvasElement>,
    handler: Rc<RefCell<Option<PortHandler>>>,
    _listeners: Vec<EventListenerHandle>,
    terminated: bool,
}

impl BrowserWorkerPort {
    /// Spawn the module worker at `script_url` for `canvas`.
    pub fn spawn(script_url: &str, canvas: HtmlCanvasElement) -> BenchResult<Self> {
        let options = WorkerOptions::new();
        options.set_type(WorkerType::Module);
        let worker = Worker::new_with_options(script_url, &options)
            .map_err(|e| BenchError::Capability(format!("Failed to create worker {script_url}: {e:?}")))?;

        let handler: Rc<RefCell<Option<PortHandler>>> = Rc::new(RefCell::new(None));

        let on_message = {
            let handler = handler.clone();
            listen(worker.as_ref(), "message", move |event: MessageEvent| {
                let parsed = match WorkerResponse::from_js(&event.data()) {
                    Ok(response) => PortEvent::Response(response),
                    Err(e) => PortEvent::Malformed(e.to_string()),
                };
                deliver(&handler, parsed);
            })
        };
        let on_error = {
            let handler = handler.clone();
            listen(worker.as_ref(), "error", move |event: ErrorEvent| {
                deliver(&handler, PortEvent::Crashed(event.message()));
            })
        };

        Ok(Self { worker, canvas: Some(canvas), handler, _listeners: vec![on_message, on_error], terminated: false })
    }

    pub fn factory(script_url: String, canvas: HtmlCanvasElement) -> PortFactory {
        Box::new(move || Self::spawn(&script_url, canvas).map(|port| Box::new(port) as Box<dyn WorkerPort>))
    }
}

/// Run the handler outside its cell so it may post back through the port.
fn deliver(handler: &Rc<RefCell<Option<PortHandler>>>, event: PortEvent) {
    let taken = handler.borrow_mut().take();
    if let Some(mut callback) = taken {
        callback(event);
        let mut slot = handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}

impl WorkerPort for BrowserWorkerPort {
    fn set_handler(&mut self, handler: PortHandler) {
        *self.handler.borrow_mut() = Some(handler);
    }

    fn transfer_surface(&mut self, width: u32, height: u32) -> BenchResult<()> {
        let canvas = self
            .canvas
            .take()
            .ok_or_else(|| BenchError::Surface("Surface was already transferred".to_string()))?;

        if canvas.parent_node().is_none() {
            return Err(BenchError::Surface("Canvas is not mounted in the document".to_string()));
        }
        canvas.set_width(width);
        canvas.set_height(height);

        let offscreen = canvas
            .transfer_control_to_offscreen()
            .map_err(|e| BenchError::Surface(format!("Canvas control transfer failed: {e:?}")))?;
        let surface = JsValue::from(offscreen);

        let message = WorkerCommand::InitCanvas { width, height }.to_js(Some(&surface))?;
        self.worker
            .post_message_with_transfer(&message, &Array::of1(&surface))
            .map_err(|e| BenchError::Surface(format!("Failed to post INIT_CANVAS: {e:?}")))
    }

    fn post(&mut self, command: WorkerCommand) -> BenchResult<()> {
        if self.terminated {
            return Err(BenchError::NotReady);
        }
        let message = command.to_js(None)?;
        self.worker
            .post_message(&message)
            .map_err(|e| BenchError::Protocol(format!("Failed to post {}: {e:?}", command.kind())))
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.handler.borrow_mut().take();
            self.worker.terminate();
        }
    }
}

impl Drop for BrowserWorkerPort {
    fn drop(&mut self) {
        self.terminate();
    }
}
