use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::borrow::Cow;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use strum::{Display, EnumString, IntoStaticStr};

use super::errors::{BenchError, BenchResult};

static NEXT_FRAME_SEQ: AtomicU64 = AtomicU64::new(1);
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Wire encoding of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Encoding {
    Base64,
    Binary,
}

/// Raw JPEG bytes received as one binary message.
///
/// Buffers are not content-addressed: two buffers with the same bytes are
/// still two distinct payloads. Each one gets a process-unique id at
/// construction which stands in for object identity.
#[derive(Debug, Clone)]
pub struct BinaryBuffer {
    id: u64,
    bytes: Rc<[u8]>,
}

impl BinaryBuffer {
    pub fn new(bytes: impl Into<Rc<[u8]>>) -> Self {
        Self { id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed), bytes: bytes.into() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for BinaryBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BinaryBuffer {}

/// Encoded image data carried by a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Base64(Rc<str>),
    Binary(BinaryBuffer),
}

/// Cache identity of a payload.
///
/// Base64 strings are keyed by content (the string is a natural content
/// hash for repeated frames); binary buffers by their identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PayloadKey {
    Text(Rc<str>),
    Buffer(u64),
}

impl FramePayload {
    pub fn base64(data: impl Into<Rc<str>>) -> Self {
        FramePayload::Base64(data.into())
    }

    pub fn binary(bytes: impl Into<Rc<[u8]>>) -> Self {
        FramePayload::Binary(BinaryBuffer::new(bytes))
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            FramePayload::Base64(_) => Encoding::Base64,
            FramePayload::Binary(_) => Encoding::Binary,
        }
    }

    pub fn key(&self) -> PayloadKey {
        match self {
            FramePayload::Base64(text) => PayloadKey::Text(text.clone()),
            FramePayload::Binary(buffer) => PayloadKey::Buffer(buffer.id()),
        }
    }

    /// Length as it travelled over the wire (characters for Base64).
    pub fn wire_len(&self) -> usize {
        match self {
            FramePayload::Base64(text) => text.len(),
            FramePayload::Binary(buffer) => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wire_len() == 0
    }

    pub fn size_kb(&self) -> f64 {
        self.wire_len() as f64 / 1024.0
    }

    /// Raw image bytes. Base64 is decoded here; binary buffers are borrowed
    /// as they are.
    pub fn to_bytes(&self) -> BenchResult<Cow<'_, [u8]>> {
        match self {
            FramePayload::Base64(text) => STANDARD
                .decode(text.trim().as_bytes())
                .map(Cow::Owned)
                .map_err(|e| BenchError::Decode(format!("Invalid Base64 payload: {e}"))),
            FramePayload::Binary(buffer) => Ok(Cow::Borrowed(buffer.bytes())),
        }
    }
}

/// Optional fields of the JSON envelope that accompany a Base64 image.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameMetadata {
    pub camera_id: Option<i64>,
    pub agent_ip: Option<String>,
    pub current_time: Option<f64>,
    pub total_seconds: Option<f64>,
    pub is_rtsp: Option<bool>,
    pub origin_width: Option<u32>,
    pub origin_height: Option<u32>,
    pub resized_width: Option<u32>,
    pub resized_height: Option<u32>,
}

/// One unit of streamed image data plus its receipt time.
///
/// Immutable once built; consumers hold clones, which share the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    seq: u64,
    payload: FramePayload,
    received_at_ms: f64,
    source_timestamp: Option<u64>,
    metadata: Option<FrameMetadata>,
}

impl Frame {
    pub fn new(payload: FramePayload, received_at_ms: f64) -> Self {
        Self {
            seq: NEXT_FRAME_SEQ.fetch_add(1, Ordering::Relaxed),
            payload,
            received_at_ms,
            source_timestamp: None,
            metadata: None,
        }
    }

    pub fn with_source_timestamp(mut self, timestamp: Option<u64>) -> Self {
        self.source_timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Strictly increasing construction order across the process.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    pub fn encoding(&self) -> Encoding {
        self.payload.encoding()
    }

    pub fn received_at_ms(&self) -> f64 {
        self.received_at_ms
    }

    /// Producer-side unix timestamp in ms, when the envelope carried one.
    pub fn source_timestamp(&self) -> Option<u64> {
        self.source_timestamp
    }

    pub fn metadata(&self) -> Option<&FrameMetadata> {
        self.metadata.as_ref()
    }

    pub fn size_kb(&self) -> f64 {
        self.payload.size_kb()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_buffers_have_distinct_keys() {
        let a = FramePayload::binary(vec![1u8, 2, 3]);
        let b = FramePayload::binary(vec![1u8, 2, 3]);
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), a.clone().key());
    }

    #[test]
    fn identical_base64_strings_share_a_key() {
        let a = FramePayload::base64("AAAA");
        let b = FramePayload::base64(String::from("AAAA"));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn size_is_reported_in_kilobytes() {
        let frame = Frame::new(FramePayload::base64("A".repeat(51_200)), 0.0);
        assert_eq!(frame.size_kb(), 50.0);
        assert_eq!(frame.encoding(), Encoding::Base64);
    }

    #[test]
    fn base64_payload_decodes_to_bytes() {
        let payload = FramePayload::base64("/9j/4A==");
        assert_eq!(payload.to_bytes().unwrap().as_ref(), &[0xFF, 0xD8, 0xFF, 0xE0]);
        assert!(FramePayload::base64("not base64!").to_bytes().is_err());
    }

    #[test]
    fn sequence_numbers_increase() {
        let first = Frame::new(FramePayload::base64("a"), 0.0);
        let second = Frame::new(FramePayload::base64("a"), 0.0);
        assert!(second.seq() > first.seq());
    }
}
