pub mod config;
pub mod renderer;
pub mod session;
pub mod strategy;

pub use config::BenchConfig;
pub use renderer::{BackendFactory, RendererSnapshot, RendererStateMachine, SnapshotListener};
pub use session::{
    BenchmarkSession, Deferrer, SessionOp, SharedSession, SourceDiagnostics, TeardownStep, apply_or_defer,
};
pub use strategy::{RenderPath, Strategy, needs_encoding};
