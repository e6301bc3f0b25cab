use serde::{Deserialize, Serialize};

use super::strategy::Strategy;
use crate::domain::{
    admission::DEFAULT_ADMISSION_INTERVAL_MS,
    errors::{BenchError, BenchResult},
    frame::Encoding,
    metrics::{DEFAULT_HISTORY_CAPACITY, DEFAULT_SAMPLE_INTERVAL_MS, TrackerConfig},
};
use crate::infrastructure::rendering::{ChannelConfig, DEFAULT_SAMPLE_BYTES};

/// Runtime settings of one benchmark page.
///
/// Endpoints default to the values baked in at build time through
/// `FRAME_BENCH_WS_URL_BASE64` / `FRAME_BENCH_WS_URL_BINARY`; an absent
/// endpoint leaves that source disconnected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub base64_endpoint: Option<String>,
    pub binary_endpoint: Option<String>,
    pub admission_interval_ms: f64,
    pub sample_interval_ms: f64,
    pub history_capacity: usize,
    pub render_timeout_ms: u32,
    pub settle_delay_ms: u32,
    pub surface_width: u32,
    pub surface_height: u32,
    pub brightness_sample_bytes: usize,
    pub mime_type: String,
    pub worker_script: String,
    pub enabled: Vec<Strategy>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            base64_endpoint: option_env!("FRAME_BENCH_WS_URL_BASE64").map(str::to_string),
            binary_endpoint: option_env!("FRAME_BENCH_WS_URL_BINARY").map(str::to_string),
            admission_interval_ms: DEFAULT_ADMISSION_INTERVAL_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            render_timeout_ms: 5_000,
            settle_delay_ms: 50,
            surface_width: 200,
            surface_height: 150,
            brightness_sample_bytes: DEFAULT_SAMPLE_BYTES,
            mime_type: "image/jpeg".to_string(),
            worker_script: "./render-worker.js".to_string(),
            enabled: Strategy::default_enabled(),
        }
    }
}

impl BenchConfig {
    /// Parse and validate a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> BenchResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BenchError::Config(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.history_capacity == 0 {
            return Err(BenchError::Config("history_capacity must be positive".to_string()));
        }
        if self.render_timeout_ms == 0 {
            return Err(BenchError::Config("render_timeout_ms must be positive".to_string()));
        }
        if self.surface_width == 0 || self.surface_height == 0 {
            return Err(BenchError::Config(format!(
                "surface must have a non-zero size, got {}x{}",
                self.surface_width, self.surface_height
            )));
        }
        if self.mime_type.trim().is_empty() {
            return Err(BenchError::Config("mime_type must not be empty".to_string()));
        }
        if !(self.admission_interval_ms >= 0.0 && self.sample_interval_ms >= 0.0) {
            return Err(BenchError::Config("intervals must be non-negative".to_string()));
        }
        Ok(())
    }

    pub fn endpoint(&self, encoding: Encoding) -> Option<&str> {
        let endpoint = match encoding {
            Encoding::Base64 => self.base64_endpoint.as_deref(),
            Encoding::Binary => self.binary_endpoint.as_deref(),
        };
        endpoint.filter(|url| !url.trim().is_empty())
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            capacity: self.history_capacity,
            min_sample_interval_ms: (self.sample_interval_ms > 0.0).then_some(self.sample_interval_ms),
        }
    }

    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            width: self.surface_width,
            height: self.surface_height,
            settle_delay_ms: self.settle_delay_ms,
            timeout_ms: self.render_timeout_ms,
            mime_type: self.mime_type.clone(),
        }
    }
}
