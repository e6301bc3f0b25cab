use derive_more::Display;

/// Every failure a strategy instance can run into.
///
/// Errors stay local to the strategy that produced them; nothing here is
/// ever propagated into the shared frame source or another renderer.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum BenchError {
    /// Socket could not be opened, errored, or closed underneath us.
    #[display(fmt = "Transport Error: {}", _0)]
    Transport(String),
    /// Malformed Base64, corrupt image bytes, unparseable envelope.
    #[display(fmt = "Decode Error: {}", _0)]
    Decode(String),
    /// Off-main-thread rendering is not available in this environment.
    #[display(fmt = "Capability Error: {}", _0)]
    Capability(String),
    #[display(fmt = "Render timed out after {} ms", after_ms)]
    Timeout { after_ms: u32 },
    /// A render request arrived while another one was still in flight.
    #[display(fmt = "Renderer busy: a frame is already being processed")]
    Busy,
    #[display(fmt = "Renderer not ready")]
    NotReady,
    /// A worker message did not match the command/response protocol.
    #[display(fmt = "Protocol Error: {}", _0)]
    Protocol(String),
    /// Rendering surface missing, detached, or already transferred.
    #[display(fmt = "Surface Error: {}", _0)]
    Surface(String),
    #[display(fmt = "Config Error: {}", _0)]
    Config(String),
}

/// Coarse classification used for recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    Transport,
    Decode,
    Capability,
    Timeout,
    Rejected,
    Internal,
}

impl ErrorKind {
    /// Permanent errors switch a strategy to its fallback for good;
    /// everything else lets the next frame retry.
    pub fn is_permanent(self) -> bool {
        matches!(self, ErrorKind::Capability)
    }
}

impl BenchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::Transport(_) => ErrorKind::Transport,
            BenchError::Decode(_) => ErrorKind::Decode,
            // A surface that cannot be transferred is as final as a missing API.
            BenchError::Capability(_) | BenchError::Surface(_) => ErrorKind::Capability,
            BenchError::Timeout { .. } => ErrorKind::Timeout,
            BenchError::Busy | BenchError::NotReady => ErrorKind::Rejected,
            BenchError::Protocol(_) | BenchError::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind().is_permanent()
    }
}

impl std::error::Error for BenchError {}

impl From<BenchError> for wasm_bindgen::JsValue {
    fn from(error: BenchError) -> Self {
        wasm_bindgen::JsValue::from_str(&error.to_string())
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
