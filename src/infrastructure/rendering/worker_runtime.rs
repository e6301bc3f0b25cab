//! Worker-side half of the render protocol.
//!
//! Runs inside the dedicated worker spawned by `render-worker.js`: owns the
//! transferred surface, decodes each payload into an `ImageBitmap`, draws it,
//! samples the pixels and reports timings back to the page.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    DedicatedWorkerGlobalScope, ImageBitmap, MessageEvent, OffscreenCanvas, OffscreenCanvasRenderingContext2d,
};

use super::analysis::{average_brightness, sample_rows};
use super::protocol::{WorkerCommand, WorkerResponse};
use crate::domain::{
    clock::Clock,
    errors::{BenchError, BenchResult},
    frame::FramePayload,
    logging::{LogComponent, get_logger},
    render::{BrightnessReport, Dimensions, RenderTiming},
};
use crate::event_utils::{EventListenerHandle, listen};
use crate::infrastructure::object_url::bytes_to_blob;
use crate::infrastructure::services::PerformanceClock;

const COMPONENT: LogComponent = LogComponent::Worker("Runtime");

struct Surface {
    canvas: OffscreenCanvas,
    context: OffscreenCanvasRenderingContext2d,
}

pub struct WorkerRuntime {
    scope: DedicatedWorkerGlobalScope,
    surface: RefCell<Option<Surface>>,
    clock: PerformanceClock,
    sample_bytes: usize,
}

thread_local! {
    static RUNTIME: RefCell<Option<(Rc<WorkerRuntime>, EventListenerHandle)>> = const { RefCell::new(None) };
}

/// Install the message handler on the current worker global and announce
/// readiness. Calling it twice is a no-op.
pub fn install(sample_bytes: usize) -> BenchResult<()> {
    if RUNTIME.with(|cell| cell.borrow().is_some()) {
        return Ok(());
    }

    let scope = js_sys::global()
        .dyn_into::<DedicatedWorkerGlobalScope>()
        .map_err(|_| BenchError::Capability("Not running inside a dedicated worker".to_string()))?;

    let runtime = Rc::new(WorkerRuntime {
        scope: scope.clone(),
        surface: RefCell::new(None),
        clock: PerformanceClock::new(),
        sample_bytes,
    });

    let listener = {
        let runtime = runtime.clone();
        listen(scope.as_ref(), "message", move |event: MessageEvent| runtime.on_message(&event.data()))
    };
    RUNTIME.with(|cell| *cell.borrow_mut() = Some((runtime.clone(), listener)));

    runtime.post(&WorkerResponse::WorkerReady);
    get_logger().info(COMPONENT, "Worker initialized and ready");
    Ok(())
}

impl WorkerRuntime {
    fn post(&self, response: &WorkerResponse) {
        let result = response
            .to_json()
            .and_then(|json| {
                self.scope
                    .post_message(&JsValue::from_str(&json))
                    .map_err(|e| BenchError::Protocol(format!("{e:?}")))
            });
        if let Err(e) = result {
            get_logger().error(COMPONENT, &format!("Failed to post response: {e}"));
        }
    }

    fn on_message(self: &Rc<Self>, data: &JsValue) {
        let (command, surface) = match WorkerCommand::from_js(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                get_logger().warn(COMPONENT, &format!("Unknown message: {e}"));
                return;
            }
        };

        match command {
            WorkerCommand::InitCanvas { width, height } => {
                let response = match self.init_canvas(surface, width, height) {
                    Ok(()) => WorkerResponse::CanvasReady { success: true, error: None },
                    Err(e) => {
                        get_logger().error(COMPONENT, &format!("Canvas init failed: {e}"));
                        WorkerResponse::CanvasReady { success: false, error: Some(e.to_string()) }
                    }
                };
                self.post(&response);
            }
            WorkerCommand::RenderImage { request_id, payload, mime_type } => {
                let runtime = self.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    if let Err(e) = runtime.render(request_id, &payload, &mime_type).await {
                        get_logger().error(COMPONENT, &format!("Render #{request_id} failed: {e}"));
                        runtime.post(&WorkerResponse::RenderError { request_id: Some(request_id), error: e.to_string() });
                    }
                });
            }
            WorkerCommand::Cleanup => {
                if self.surface.borrow_mut().take().is_some() {
                    get_logger().info(COMPONENT, "Cleanup completed");
                }
                self.post(&WorkerResponse::CleanupComplete);
            }
        }
    }

    fn init_canvas(&self, surface: Option<JsValue>, width: u32, height: u32) -> BenchResult<()> {
        let canvas = surface
            .and_then(|s| s.dyn_into::<OffscreenCanvas>().ok())
            .ok_or_else(|| BenchError::Surface("INIT_CANVAS did not carry an OffscreenCanvas".to_string()))?;
        let context = canvas
            .get_context("2d")
            .map_err(|e| BenchError::Surface(format!("getContext failed: {e:?}")))?
            .and_then(|ctx| ctx.dyn_into::<OffscreenCanvasRenderingContext2d>().ok())
            .ok_or_else(|| BenchError::Surface("2D context unavailable on OffscreenCanvas".to_string()))?;

        canvas.set_width(width);
        canvas.set_height(height);
        get_logger().info(COMPONENT, &format!("Canvas initialized: {width}x{height}"));
        *self.surface.borrow_mut() = Some(Surface { canvas, context });
        Ok(())
    }

    async fn render(&self, request_id: u64, payload: &FramePayload, mime_type: &str) -> BenchResult<()> {
        if self.surface.borrow().is_none() {
            return Err(BenchError::Surface("Canvas not initialized".to_string()));
        }

        let start = self.clock.now_ms();
        let bytes = payload.to_bytes()?;
        let blob = bytes_to_blob(&bytes, mime_type)?;
        let blob_time = self.clock.now_ms();

        let promise = self
            .scope
            .create_image_bitmap_with_blob(&blob)
            .map_err(|e| BenchError::Decode(format!("createImageBitmap rejected the blob: {e:?}")))?;
        let bitmap = JsFuture::from(promise)
            .await
            .map_err(|e| BenchError::Decode(format!("Image load failed: {e:?}")))?
            .dyn_into::<ImageBitmap>()
            .map_err(|_| BenchError::Decode("createImageBitmap did not yield an ImageBitmap".to_string()))?;
        let load_time = self.clock.now_ms();

        // Cleanup may have run while the bitmap was decoding.
        let dimensions = {
            let surface = self.surface.borrow();
            let Some(surface) = surface.as_ref() else {
                bitmap.close();
                return Err(BenchError::Surface("Canvas released during render".to_string()));
            };
            let drawn = draw(surface, &bitmap);
            bitmap.close();
            drawn?
        };

        let brightness = self.sample(dimensions);
        if let Some(result) = brightness {
            self.post(&WorkerResponse::ProcessingComplete { request_id, result });
        }

        let end = self.clock.now_ms();
        let timing = RenderTiming {
            blob_creation: blob_time - start,
            image_load: load_time - blob_time,
            rendering: end - load_time,
            total: end - start,
        };
        get_logger().debug(COMPONENT, &format!("Render #{request_id} total {:.2}ms", timing.total));
        self.post(&WorkerResponse::RenderComplete { request_id, timing, dimensions });
        Ok(())
    }

    /// Brightness over the first `sample_bytes` of the drawn image. Only the
    /// rows that hold the sample are read back.
    fn sample(&self, dimensions: Dimensions) -> Option<BrightnessReport> {
        let started = self.clock.now_ms();
        let surface = self.surface.borrow();
        let surface = surface.as_ref()?;
        let rows = sample_rows(self.sample_bytes, dimensions);
        if rows == 0 {
            return None;
        }
        match surface.context.get_image_data(0.0, 0.0, dimensions.width as f64, rows as f64) {
            Ok(image) => {
                let (avg_brightness, pixels_analyzed) = average_brightness(&image.data(), self.sample_bytes);
                Some(BrightnessReport {
                    avg_brightness,
                    processing_time: self.clock.now_ms() - started,
                    pixels_analyzed,
                })
            }
            Err(e) => {
                get_logger().warn(COMPONENT, &format!("Image processing failed: {e:?}"));
                None
            }
        }
    }
}

fn draw(surface: &Surface, bitmap: &ImageBitmap) -> BenchResult<Dimensions> {
    let (width, height) = (bitmap.width(), bitmap.height());
    surface.canvas.set_width(width);
    surface.canvas.set_height(height);
    surface.context.clear_rect(0.0, 0.0, width as f64, height as f64);
    surface
        .context
        .draw_image_with_image_bitmap(bitmap, 0.0, 0.0)
        .map_err(|e| BenchError::Surface(format!("drawImage failed: {e:?}")))?;
    Ok(Dimensions { width, height })
}
