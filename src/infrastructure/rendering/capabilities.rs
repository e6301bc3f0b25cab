use wasm_bindgen::JsValue;

/// What the host offers for off-main-thread rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderCapabilities {
    /// `HTMLCanvasElement.prototype.transferControlToOffscreen` exists.
    pub offscreen_transfer: bool,
    /// `Worker` is constructible.
    pub workers: bool,
}

impl RenderCapabilities {
    pub const FULL: Self = Self { offscreen_transfer: true, workers: true };
    pub const NONE: Self = Self { offscreen_transfer: false, workers: false };

    /// Probe the current global. Outside a browser everything is reported
    /// missing.
    pub fn detect() -> Self {
        if !cfg!(target_arch = "wasm32") {
            return Self::NONE;
        }

        let global = js_sys::global();
        let workers = has(&global, "Worker");
        let offscreen_transfer = js_sys::Reflect::get(&global, &"HTMLCanvasElement".into())
            .and_then(|ctor| js_sys::Reflect::get(&ctor, &"prototype".into()))
            .map(|proto| has(&proto, "transferControlToOffscreen"))
            .unwrap_or(false)
            && has(&global, "OffscreenCanvas");

        Self { offscreen_transfer, workers }
    }

    pub fn supports_offscreen_worker(&self) -> bool {
        self.offscreen_transfer && self.workers
    }

    /// Human readable reason when off-main-thread rendering is unavailable.
    pub fn missing(&self) -> Option<&'static str> {
        match (self.offscreen_transfer, self.workers) {
            (true, true) => None,
            (false, true) => Some("OffscreenCanvas transfer is not supported in this browser"),
            (true, false) => Some("Web Workers are not supported in this browser"),
            (false, false) => Some("Neither OffscreenCanvas nor Web Workers are available"),
        }
    }
}

fn has(target: &JsValue, key: &str) -> bool {
    js_sys::Reflect::has(target, &key.into()).unwrap_or(false)
}
