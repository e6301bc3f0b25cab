use wasm_bindgen::prelude::*;

use crate::domain::logging::{LogComponent, get_logger};

pub mod app;
pub mod application;
pub mod domain;
pub mod event_utils;
pub mod global_state;
pub mod infrastructure;
pub mod macros;
pub mod presentation;
pub mod testing;
pub mod time_utils;

/// Runs once per instantiation, on the page and inside the render worker.
/// Only the page gets the Leptos console bridge; the worker sets up its own
/// logger in `startRenderWorker`.
#[wasm_bindgen(start)]
pub fn initialize() {
    console_error_panic_hook::set_once();

    if web_sys::window().is_none() {
        return;
    }

    let console_logger = infrastructure::services::ConsoleLogger::new_development();
    domain::logging::init_logger(Box::new(app::LeptosLogger::new(console_logger)));
    domain::logging::init_time_provider(Box::new(infrastructure::services::BrowserTimeProvider::new()));

    get_logger().info(LogComponent::Presentation("Initialize"), "🚀 Frame benchmark module initialized");
}
