//! Turns a mounted element into the render backend of a strategy.

use std::rc::Rc;

use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlCanvasElement, HtmlImageElement};

use crate::application::{BackendFactory, BenchConfig, RenderPath, Strategy};
use crate::domain::{
    clock::Clock,
    errors::{BenchError, BenchResult},
    logging::{LogComponent, get_logger},
    render::RenderBackend,
};
use crate::infrastructure::{
    object_url::ObjectUrlManager,
    rendering::{
        BrowserWorkerPort, FallbackRenderer, ImageElementRenderer, ImageSource, RenderCapabilities,
        RenderWorkerChannel,
    },
    scheduler::GlooScheduler,
};

/// Primary backend for `strategy` on `element`, plus the fallback that takes
/// over when the primary cannot run here.
pub fn build_backend(
    strategy: Strategy,
    element: Element,
    config: &BenchConfig,
    clock: Rc<dyn Clock>,
) -> BenchResult<(Box<dyn RenderBackend>, Option<BackendFactory>)> {
    match strategy.render_path() {
        RenderPath::DataUrl => {
            let img = image_element(element)?;
            let backend = ImageElementRenderer::new("img-data-url", img, ImageSource::DataUrl, config.mime_type.clone());
            Ok((Box::new(backend), None))
        }
        RenderPath::ObjectUrl => {
            let img = image_element(element)?;
            let backend = ImageElementRenderer::new(
                "img-object-url",
                img,
                ImageSource::ObjectUrl(ObjectUrlManager::browser()),
                config.mime_type.clone(),
            );
            Ok((Box::new(backend), None))
        }
        RenderPath::Offscreen => {
            let canvas = canvas_element(element)?;
            let capabilities = RenderCapabilities::detect();
            let channel = RenderWorkerChannel::new(
                config.channel(),
                capabilities,
                BrowserWorkerPort::factory(config.worker_script.clone(), canvas.clone()),
                Rc::new(GlooScheduler),
                clock.clone(),
            );
            let fallback = fallback_factory(canvas, config, clock);
            Ok((Box::new(channel), Some(fallback)))
        }
    }
}

fn fallback_factory(canvas: HtmlCanvasElement, config: &BenchConfig, clock: Rc<dyn Clock>) -> BackendFactory {
    let mime_type = config.mime_type.clone();
    let sample_bytes = config.brightness_sample_bytes;
    let (width, height) = (config.surface_width, config.surface_height);
    Box::new(move || {
        // A canvas that handed its control to a worker cannot draw again.
        let surface = fresh_canvas(&canvas, width, height)?;
        let renderer = FallbackRenderer::new(surface, ObjectUrlManager::browser(), clock, mime_type, sample_bytes)?;
        Ok(Box::new(renderer) as Box<dyn RenderBackend>)
    })
}

/// Put a new canvas where `old` is, carrying over its id, class and style.
fn fresh_canvas(old: &HtmlCanvasElement, width: u32, height: u32) -> BenchResult<HtmlCanvasElement> {
    let document = old
        .owner_document()
        .or_else(|| web_sys::window().and_then(|w| w.document()))
        .ok_or_else(|| BenchError::Surface("No document to create a canvas in".to_string()))?;
    let canvas = document
        .create_element("canvas")
        .map_err(|e| BenchError::Surface(format!("Failed to create canvas: {e:?}")))
        .and_then(canvas_element)?;

    for attribute in ["id", "class", "style"] {
        if let Some(value) = old.get_attribute(attribute) {
            canvas
                .set_attribute(attribute, &value)
                .map_err(|e| BenchError::Surface(format!("Failed to copy `{attribute}` to the fallback canvas: {e:?}")))?;
        }
    }
    canvas.set_width(width);
    canvas.set_height(height);

    if old.parent_node().is_some() {
        old.replace_with_with_node_1(&canvas)
            .map_err(|e| BenchError::Surface(format!("Failed to swap in fallback canvas: {e:?}")))?;
    }
    get_logger().debug(LogComponent::Presentation("Backends"), "Fresh canvas mounted for the fallback renderer");
    Ok(canvas)
}

fn image_element(element: Element) -> BenchResult<HtmlImageElement> {
    element
        .dyn_into::<HtmlImageElement>()
        .map_err(|_| BenchError::Surface("Strategy panel expected an <img> element".to_string()))
}

fn canvas_element(element: Element) -> BenchResult<HtmlCanvasElement> {
    element
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| BenchError::Surface("Strategy panel expected a <canvas> element".to_string()))
}
