//! Rolling-window instrumentation for render latency and payload size.
//!
//! The trackers know nothing about what they measure; every render path
//! feeds the same types.

use std::collections::VecDeque;
use std::rc::Rc;

use super::clock::Clock;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_SAMPLE_INTERVAL_MS: f64 = 50.0;

/// Bounded FIFO of samples; the oldest entry is evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, samples: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Oldest-first copy, the shape display widgets consume.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn stats(&self) -> SampleStats {
        SampleStats::from_samples(&self.to_vec())
    }
}

/// Rate limit applied before a sample is recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub capacity: usize,
    /// `None` records every sample.
    pub min_sample_interval_ms: Option<f64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_HISTORY_CAPACITY, min_sample_interval_ms: None }
    }
}

impl TrackerConfig {
    pub fn rate_limited() -> Self {
        Self { min_sample_interval_ms: Some(DEFAULT_SAMPLE_INTERVAL_MS), ..Self::default() }
    }
}

struct Debounce {
    min_interval_ms: Option<f64>,
    last_recorded_at: Option<f64>,
}

impl Debounce {
    fn new(min_interval_ms: Option<f64>) -> Self {
        Self { min_interval_ms, last_recorded_at: None }
    }

    fn allows(&self, now_ms: f64) -> bool {
        match (self.min_interval_ms, self.last_recorded_at) {
            (Some(min), Some(last)) => now_ms - last >= min,
            _ => true,
        }
    }

    fn mark(&mut self, now_ms: f64) {
        self.last_recorded_at = Some(now_ms);
    }
}

/// Measures `start()` → `end()` elapsed time in milliseconds.
pub struct LatencyTracker {
    clock: Rc<dyn Clock>,
    started_at: Option<f64>,
    debounce: Debounce,
    samples: RingBuffer,
}

impl LatencyTracker {
    pub fn new(clock: Rc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            clock,
            started_at: None,
            debounce: Debounce::new(config.min_sample_interval_ms),
            samples: RingBuffer::new(config.capacity),
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(self.clock.now_ms());
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Record the time elapsed since the last `start()`.
    ///
    /// Returns the recorded sample, or `None` when nothing was started or
    /// the previous sample is younger than the configured interval.
    pub fn end(&mut self) -> Option<f64> {
        let started_at = self.started_at?;
        let now = self.clock.now_ms();
        if !self.debounce.allows(now) {
            return None;
        }
        let elapsed = (now - started_at).max(0.0);
        self.samples.push(elapsed);
        self.debounce.mark(now);
        Some(elapsed)
    }

    pub fn samples(&self) -> &RingBuffer {
        &self.samples
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.debounce.last_recorded_at = None;
        self.samples.clear();
    }
}

/// Payload size history in KB, skipping unchanged consecutive sizes.
pub struct SizeTracker {
    clock: Rc<dyn Clock>,
    previous: Option<f64>,
    debounce: Debounce,
    samples: RingBuffer,
}

impl SizeTracker {
    pub fn new(clock: Rc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            clock,
            previous: None,
            debounce: Debounce::new(config.min_sample_interval_ms),
            samples: RingBuffer::new(config.capacity),
        }
    }

    /// Returns `true` when the value was appended.
    pub fn add_size(&mut self, size_kb: f64) -> bool {
        if self.previous == Some(size_kb) {
            return false;
        }
        let now = self.clock.now_ms();
        if !self.debounce.allows(now) {
            return false;
        }
        self.samples.push(size_kb);
        self.previous = Some(size_kb);
        self.debounce.mark(now);
        true
    }

    pub fn samples(&self) -> &RingBuffer {
        &self.samples
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.debounce.last_recorded_at = None;
        self.samples.clear();
    }
}

/// Latency and size trackers of one strategy, sharing one config.
pub struct FrameMetrics {
    pub latency: LatencyTracker,
    pub size: SizeTracker,
}

impl FrameMetrics {
    pub fn new(clock: Rc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            latency: LatencyTracker::new(clock.clone(), config),
            size: SizeTracker::new(clock, config),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            latencies: self.latency.samples().to_vec(),
            sizes: self.size.samples().to_vec(),
        }
    }
}

/// Arrays handed to display widgets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Recent latency samples in ms, oldest first.
    pub latencies: Vec<f64>,
    /// Recent payload sizes in KB, oldest first.
    pub sizes: Vec<f64>,
}

impl MetricsSnapshot {
    pub fn latency_stats(&self) -> SampleStats {
        SampleStats::from_samples(&self.latencies)
    }

    pub fn size_stats(&self) -> SampleStats {
        SampleStats::from_samples(&self.sizes)
    }
}

/// Aggregate view of a sample window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleStats {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

impl SampleStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let Some(&last) = samples.last() else {
            return Self::default();
        };
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { count: samples.len(), average: calculate_average(samples), min, max, last }
    }
}

/// Mean rounded to two decimals; `0.0` for an empty window.
pub fn calculate_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (mean * 100.0).round() / 100.0
}

pub fn format_latency(ms: f64) -> String {
    format!("{ms:.2}ms")
}

pub fn format_size(kb: f64) -> String {
    format!("{kb:.2}KB")
}
