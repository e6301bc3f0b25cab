use wasm_bindgen::prelude::*;

use crate::application::BenchConfig;
use crate::domain::logging::{LogComponent, get_logger, init_logger, init_time_provider};
use crate::infrastructure::rendering::{DEFAULT_SAMPLE_BYTES, worker_runtime};
use crate::infrastructure::services::{BrowserTimeProvider, ConsoleLogger};

/// Entry point of the render worker, called by `render-worker.js` once the
/// module is initialized inside the worker.
#[wasm_bindgen(js_name = startRenderWorker)]
pub fn start_render_worker(sample_bytes: Option<u32>) -> Result<(), JsValue> {
    init_logger(Box::new(ConsoleLogger::new_development()));
    init_time_provider(Box::new(BrowserTimeProvider::new()));

    let sample_bytes = sample_bytes.map(|b| b as usize).unwrap_or(DEFAULT_SAMPLE_BYTES);
    worker_runtime::install(sample_bytes)?;
    Ok(())
}

/// Mount the benchmark page into `<body>`, with `config_json` layered over
/// the built-in defaults.
#[wasm_bindgen(js_name = mountBenchmark)]
pub fn mount_benchmark(config_json: Option<String>) -> Result<(), JsValue> {
    let config = match config_json {
        Some(json) => BenchConfig::from_json(&json)?,
        None => BenchConfig::default(),
    };
    get_logger().info(
        LogComponent::Presentation("WasmApi"),
        &format!("🚀 Mounting benchmark with {} strategies enabled", config.enabled.len()),
    );
    crate::app::mount(config);
    Ok(())
}
