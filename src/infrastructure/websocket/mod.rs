//! Frame streams over WebSocket: envelope decoding, admission and the reader
//! loop that feeds a latest-frame slot.

pub mod client_handle;
pub mod dto;
pub mod frame_source;

pub use client_handle::SourceHandle;
pub use dto::{Base64FrameMessage, IncomingMessage, decode_base64_envelope, decode_binary_frame, decode_message};
pub use frame_source::{
    ConnectionState, FrameIngest, FrameSource, GlooConnector, IngestOutcome, SocketConnector, SocketLink,
};
