//! What a render path reports back, and the seam every render path sits behind.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::errors::{BenchError, BenchResult};
use super::frame::Frame;

/// Per-stage breakdown of one render, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTiming {
    pub blob_creation: f64,
    pub image_load: f64,
    pub rendering: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Result of the pixel sampling pass that follows a draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrightnessReport {
    pub avg_brightness: f64,
    pub processing_time: f64,
    pub pixels_analyzed: u32,
}

/// Everything a completed render knows about itself. Image element paths
/// only know that the image loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub timing: Option<RenderTiming>,
    pub dimensions: Option<Dimensions>,
    pub brightness: Option<BrightnessReport>,
}

pub type RenderOutcome = Result<RenderReport, BenchError>;

/// Asynchronous signals from a backend to whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The backend finished initializing and accepts frames.
    Ready,
    /// The in-flight render finished, successfully or not.
    Finished(RenderOutcome),
    /// The backend became unusable for good.
    Lost(BenchError),
}

pub type BackendNotifier = Rc<dyn Fn(BackendEvent)>;

/// One way of getting a frame onto the screen.
///
/// `dispatch` starts a render and returns immediately; the outcome is
/// delivered through the notifier passed to `initialize`, possibly before
/// `dispatch` returns. At most one render is in flight per backend.
pub trait RenderBackend {
    fn name(&self) -> &'static str;

    /// Wire the notifier and acquire resources. Returns an error of kind
    /// `Capability` when this backend cannot run in the current environment.
    fn initialize(&mut self, notify: BackendNotifier) -> BenchResult<()>;

    fn is_ready(&self) -> bool;

    fn is_busy(&self) -> bool;

    fn dispatch(&mut self, frame: &Frame) -> BenchResult<()>;

    /// Release everything. Must be callable in any state, more than once.
    fn teardown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_uses_camel_case_keys() {
        let timing: RenderTiming = serde_json::from_str(
            r#"{"blobCreation":1.5,"imageLoad":2.0,"rendering":0.5,"total":4.0}"#,
        )
        .unwrap();
        assert_eq!(timing.image_load, 2.0);
        let json = serde_json::to_string(&BrightnessReport { avg_brightness: 1.0, processing_time: 0.2, pixels_analyzed: 10 })
            .unwrap();
        assert!(json.contains("\"pixelsAnalyzed\":10"));
    }
}
