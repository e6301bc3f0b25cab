//! Pure frame-pipeline types and policies. Nothing in here touches the DOM.

pub mod admission;
pub mod clock;
pub mod errors;
pub mod frame;
pub mod logging;
pub mod metrics;
pub mod render;
pub mod store;

pub use admission::{Admission, AdmissionControl, AdmissionStats};
pub use clock::{Clock, ManualClock};
pub use errors::{BenchError, BenchResult, ErrorKind};
pub use frame::{BinaryBuffer, Encoding, Frame, FrameMetadata, FramePayload, PayloadKey};
pub use metrics::{
    FrameMetrics, LatencyTracker, MetricsSnapshot, RingBuffer, SampleStats, SizeTracker,
    TrackerConfig,
};
pub use store::{FrameSlot, Subscription};
pub use render::{
    BackendEvent, BackendNotifier, BrightnessReport, Dimensions, RenderBackend, RenderOutcome,
    RenderReport, RenderTiming,
};
