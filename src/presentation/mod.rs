pub mod backends;
pub mod wasm_api;

pub use backends::build_backend;
pub use wasm_api::{mount_benchmark, start_render_worker};
