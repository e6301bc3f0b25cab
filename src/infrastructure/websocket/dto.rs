use serde::Deserialize;

use crate::domain::errors::{BenchError, BenchResult};
use crate::domain::frame::{Encoding, Frame, FrameMetadata, FramePayload};

/// JSON envelope of the Base64 stream.
///
/// Only `image` is required; everything else is carried along when present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64FrameMessage {
    pub image: String,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub metadata: FrameMetadata,
}

/// Transport-neutral view of one socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<gloo_net::websocket::Message> for IncomingMessage {
    fn from(message: gloo_net::websocket::Message) -> Self {
        match message {
            gloo_net::websocket::Message::Text(text) => IncomingMessage::Text(text),
            gloo_net::websocket::Message::Bytes(bytes) => IncomingMessage::Bytes(bytes),
        }
    }
}

/// Turn one message of a stream with the given encoding into a frame.
pub fn decode_message(
    encoding: Encoding,
    message: IncomingMessage,
    received_at_ms: f64,
) -> BenchResult<Frame> {
    match (encoding, message) {
        (Encoding::Base64, IncomingMessage::Text(text)) => decode_base64_envelope(&text, received_at_ms),
        (Encoding::Binary, IncomingMessage::Bytes(bytes)) => decode_binary_frame(bytes, received_at_ms),
        (Encoding::Base64, IncomingMessage::Bytes(bytes)) => {
            Err(BenchError::Decode(format!("Unexpected {} byte binary message on Base64 stream", bytes.len())))
        }
        (Encoding::Binary, IncomingMessage::Text(text)) => {
            Err(BenchError::Decode(format!("Unexpected {} char text message on binary stream", text.len())))
        }
    }
}

pub fn decode_base64_envelope(data: &str, received_at_ms: f64) -> BenchResult<Frame> {
    let message: Base64FrameMessage = serde_json::from_str(data)
        .map_err(|e| BenchError::Decode(format!("Failed to parse Base64 message: {e}")))?;

    if message.image.is_empty() {
        return Err(BenchError::Decode("Base64 message carries an empty image".to_string()));
    }

    let timestamp = message.timestamp.filter(|t| t.is_finite() && *t >= 0.0).map(|t| t as u64);
    Ok(Frame::new(FramePayload::base64(message.image), received_at_ms)
        .with_source_timestamp(timestamp)
        .with_metadata(message.metadata))
}

/// Binary frames have no envelope: the whole message is the JPEG.
pub fn decode_binary_frame(bytes: Vec<u8>, received_at_ms: f64) -> BenchResult<Frame> {
    if bytes.is_empty() {
        return Err(BenchError::Decode("Empty binary frame".to_string()));
    }
    Ok(Frame::new(FramePayload::binary(bytes), received_at_ms))
}
