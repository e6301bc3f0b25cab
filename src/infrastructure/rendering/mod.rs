//! Render paths: `<img>` elements, the off-main-thread worker channel and its
//! main-thread fallback.

pub mod analysis;
pub mod browser_worker;
pub mod capabilities;
pub mod fallback;
pub mod image_element;
pub mod protocol;
pub mod worker_channel;
pub mod worker_runtime;

pub use analysis::{DEFAULT_SAMPLE_BYTES, average_brightness};
pub use browser_worker::BrowserWorkerPort;
pub use capabilities::RenderCapabilities;
pub use fallback::FallbackRenderer;
pub use image_element::{ImageElementRenderer, ImageSource};
pub use protocol::{WorkerCommand, WorkerResponse};
pub use worker_channel::{
    ChannelConfig, ChannelState, ChannelStats, PortEvent, PortFactory, PortHandler, RenderWorkerChannel, WorkerPort,
};
