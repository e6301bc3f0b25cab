//! Browser-facing adapters: sockets, blob URLs, timers, workers and canvases.

pub mod object_url;
pub mod rendering;
pub mod scheduler;
pub mod services;
pub mod websocket;

pub use object_url::{BlobUrlFactory, BrowserBlobUrls, ObjectUrlManager};
pub use scheduler::{GlooScheduler, ManualScheduler, Scheduler, TimerHandle};
pub use services::{BrowserTimeProvider, ConsoleLogger, PerformanceClock};
