//! Typed messages between the page and the render worker.
//!
//! Commands travel as plain JS objects so the surface and binary payloads
//! can be transferred; responses travel as JSON strings. Both are
//! discriminated by a `type` field and validated on receipt.

use js_sys::{ArrayBuffer, Object, Reflect, Uint8Array};
use serde::{Deserialize, Serialize};
use wasm_bindgen::{JsCast, JsValue};

use crate::domain::{
    errors::{BenchError, BenchResult},
    frame::FramePayload,
    render::{BrightnessReport, Dimensions, RenderTiming},
};

pub const INIT_CANVAS: &str = "INIT_CANVAS";
pub const RENDER_IMAGE: &str = "RENDER_IMAGE";
pub const CLEANUP: &str = "CLEANUP";

/// Page → worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    /// The surface itself is attached by the port that transfers it.
    InitCanvas { width: u32, height: u32 },
    RenderImage { request_id: u64, payload: FramePayload, mime_type: String },
    Cleanup,
}

impl WorkerCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerCommand::InitCanvas { .. } => INIT_CANVAS,
            WorkerCommand::RenderImage { .. } => RENDER_IMAGE,
            WorkerCommand::Cleanup => CLEANUP,
        }
    }

    /// Build the JS message. `surface` is only read for `InitCanvas`.
    pub fn to_js(&self, surface: Option<&JsValue>) -> BenchResult<JsValue> {
        let message = Object::new();
        set(&message, "type", &self.kind().into())?;
        match self {
            WorkerCommand::InitCanvas { width, height } => {
                let surface = surface
                    .ok_or_else(|| BenchError::Surface("INIT_CANVAS without a surface".to_string()))?;
                set(&message, "surface", surface)?;
                set(&message, "width", &(*width).into())?;
                set(&message, "height", &(*height).into())?;
            }
            WorkerCommand::RenderImage { request_id, payload, mime_type } => {
                set(&message, "requestId", &(*request_id as f64).into())?;
                set(&message, "payload", &payload_to_js(payload))?;
                set(&message, "mimeType", &mime_type.as_str().into())?;
            }
            WorkerCommand::Cleanup => {}
        }
        Ok(message.into())
    }

    /// Parse a JS message on the worker side. Returns the surface for
    /// `InitCanvas`.
    pub fn from_js(message: &JsValue) -> BenchResult<(WorkerCommand, Option<JsValue>)> {
        let kind = get(message, "type")?
            .as_string()
            .ok_or_else(|| BenchError::Protocol("Command without a type".to_string()))?;

        match kind.as_str() {
            INIT_CANVAS => {
                let surface = get(message, "surface")?;
                if surface.is_undefined() || surface.is_null() {
                    return Err(BenchError::Surface("INIT_CANVAS without a surface".to_string()));
                }
                let width = get_u32(message, "width")?;
                let height = get_u32(message, "height")?;
                Ok((WorkerCommand::InitCanvas { width, height }, Some(surface)))
            }
            RENDER_IMAGE => {
                let request_id = get(message, "requestId")?
                    .as_f64()
                    .ok_or_else(|| BenchError::Protocol("RENDER_IMAGE without requestId".to_string()))?
                    as u64;
                let payload = payload_from_js(&get(message, "payload")?)?;
                let mime_type = get(message, "mimeType")?.as_string().unwrap_or_else(|| "image/jpeg".to_string());
                Ok((WorkerCommand::RenderImage { request_id, payload, mime_type }, None))
            }
            CLEANUP => Ok((WorkerCommand::Cleanup, None)),
            other => Err(BenchError::Protocol(format!("Unknown command type: {other}"))),
        }
    }
}

/// Worker → page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerResponse {
    /// Sent unsolicited once the worker script is running.
    WorkerReady,
    CanvasReady {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RenderComplete {
        #[serde(rename = "requestId")]
        request_id: u64,
        timing: RenderTiming,
        dimensions: Dimensions,
    },
    RenderError {
        #[serde(rename = "requestId", default)]
        request_id: Option<u64>,
        error: String,
    },
    ProcessingComplete {
        #[serde(rename = "requestId")]
        request_id: u64,
        result: BrightnessReport,
    },
    CleanupComplete,
}

impl WorkerResponse {
    pub fn to_json(&self) -> BenchResult<String> {
        serde_json::to_string(self).map_err(|e| BenchError::Protocol(format!("Failed to encode response: {e}")))
    }

    pub fn from_json(data: &str) -> BenchResult<Self> {
        serde_json::from_str(data).map_err(|e| BenchError::Protocol(format!("Malformed worker response: {e}")))
    }

    pub fn from_js(data: &JsValue) -> BenchResult<Self> {
        match data.as_string() {
            Some(text) => Self::from_json(&text),
            None => Err(BenchError::Protocol("Worker response is not a string".to_string())),
        }
    }

    /// Request this response belongs to, when it belongs to one.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            WorkerResponse::RenderComplete { request_id, .. }
            | WorkerResponse::ProcessingComplete { request_id, .. } => Some(*request_id),
            WorkerResponse::RenderError { request_id, .. } => *request_id,
            _ => None,
        }
    }
}

fn payload_to_js(payload: &FramePayload) -> JsValue {
    match payload {
        FramePayload::Base64(text) => JsValue::from_str(text),
        FramePayload::Binary(buffer) => Uint8Array::from(buffer.bytes()).buffer().into(),
    }
}

fn payload_from_js(value: &JsValue) -> BenchResult<FramePayload> {
    if let Some(text) = value.as_string() {
        return Ok(FramePayload::base64(text));
    }
    match value.dyn_ref::<ArrayBuffer>() {
        Some(buffer) => Ok(FramePayload::binary(Uint8Array::new(buffer).to_vec())),
        None => Err(BenchError::Protocol("Unsupported image data type".to_string())),
    }
}

fn set(target: &Object, key: &str, value: &JsValue) -> BenchResult<()> {
    Reflect::set(target, &key.into(), value)
        .map(|_| ())
        .map_err(|e| BenchError::Protocol(format!("Failed to set {key}: {e:?}")))
}

fn get(source: &JsValue, key: &str) -> BenchResult<JsValue> {
    Reflect::get(source, &key.into()).map_err(|e| BenchError::Protocol(format!("Failed to read {key}: {e:?}")))
}

fn get_u32(source: &JsValue, key: &str) -> BenchResult<u32> {
    get(source, key)?
        .as_f64()
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u32)
        .ok_or_else(|| BenchError::Protocol(format!("Missing or invalid {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_complete_round_trips_through_json() {
        let json = r#"{"type":"RENDER_COMPLETE","requestId":7,
            "timing":{"blobCreation":1.0,"imageLoad":2.0,"rendering":3.0,"total":6.0},
            "dimensions":{"width":640,"height":480}}"#;
        let response = WorkerResponse::from_json(json).unwrap();
        assert_eq!(response.request_id(), Some(7));
        let WorkerResponse::RenderComplete { timing, dimensions, .. } = &response else {
            panic!("wrong variant: {response:?}");
        };
        assert_eq!(timing.total, 6.0);
        assert_eq!(dimensions.width, 640);
    }

    #[test]
    fn unit_responses_only_carry_the_tag() {
        assert_eq!(WorkerResponse::WorkerReady.to_json().unwrap(), r#"{"type":"WORKER_READY"}"#);
        assert_eq!(
            WorkerResponse::from_json(r#"{"type":"CANVAS_READY","success":true}"#).unwrap(),
            WorkerResponse::CanvasReady { success: true, error: None }
        );
    }

    #[test]
    fn unknown_or_untyped_messages_are_protocol_errors() {
        for bad in [r#"{"type":"EXPLODE"}"#, r#"{"success":true}"#, "[]", "nope"] {
            assert!(matches!(WorkerResponse::from_json(bad), Err(BenchError::Protocol(_))), "{bad}");
        }
    }

    #[test]
    fn render_error_without_request_id_is_accepted() {
        let response = WorkerResponse::from_json(r#"{"type":"RENDER_ERROR","error":"Canvas not initialized"}"#).unwrap();
        assert_eq!(response.request_id(), None);
    }

    #[test]
    fn command_kinds() {
        assert_eq!(WorkerCommand::Cleanup.kind(), "CLEANUP");
        assert_eq!(WorkerCommand::InitCanvas { width: 200, height: 150 }.kind(), "INIT_CANVAS");
    }
}
