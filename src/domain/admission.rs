/// Minimum spacing between two admitted frames.
pub const DEFAULT_ADMISSION_INTERVAL_MS: f64 = 100.0;

/// Outcome of offering a frame to [`AdmissionControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Arrived less than the minimum interval after the last admitted frame.
    Throttled,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Processed / dropped counters kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    pub processed: u64,
    pub dropped: u64,
}

impl AdmissionStats {
    pub fn received(&self) -> u64 {
        self.processed + self.dropped
    }

    /// Percentage of received frames that were dropped.
    pub fn drop_rate(&self) -> f64 {
        match self.received() {
            0 => 0.0,
            total => self.dropped as f64 * 100.0 / total as f64,
        }
    }
}

/// Rate limiter sitting between the socket and the latest-frame slot.
///
/// The first frame of a burst passes; anything arriving less than
/// `min_interval_ms` after the last *admitted* frame is dropped, so a steady
/// fast stream comes out at roughly `1000 / min_interval_ms` frames per second.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    min_interval_ms: f64,
    last_admitted_at: Option<f64>,
    stats: AdmissionStats,
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_INTERVAL_MS)
    }
}

impl AdmissionControl {
    pub fn new(min_interval_ms: f64) -> Self {
        Self { min_interval_ms, last_admitted_at: None, stats: AdmissionStats::default() }
    }

    pub fn min_interval_ms(&self) -> f64 {
        self.min_interval_ms
    }

    /// Decide whether a frame arriving at `now_ms` is kept.
    pub fn offer(&mut self, now_ms: f64) -> Admission {
        let admitted = match self.last_admitted_at {
            Some(last) => now_ms - last >= self.min_interval_ms,
            None => true,
        };

        if admitted {
            self.last_admitted_at = Some(now_ms);
            self.stats.processed += 1;
            Admission::Admitted
        } else {
            self.stats.dropped += 1;
            Admission::Throttled
        }
    }

    /// Count a message that never reached admission (unparseable).
    pub fn record_rejected(&mut self) {
        self.stats.dropped += 1;
    }

    pub fn stats(&self) -> AdmissionStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.last_admitted_at = None;
        self.stats = AdmissionStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_admits_only_first_frame() {
        let mut control = AdmissionControl::default();
        let decisions: Vec<_> = [0.0, 20.0, 40.0, 99.0].iter().map(|t| control.offer(*t)).collect();
        assert_eq!(
            decisions,
            vec![Admission::Admitted, Admission::Throttled, Admission::Throttled, Admission::Throttled]
        );
        assert_eq!(control.stats(), AdmissionStats { processed: 1, dropped: 3 });
    }

    #[test]
    fn exactly_min_interval_is_admitted() {
        let mut control = AdmissionControl::default();
        assert!(control.offer(0.0).is_admitted());
        assert!(control.offer(100.0).is_admitted());
        assert!(control.offer(250.0).is_admitted());
    }

    #[test]
    fn steady_fast_stream_is_thinned_not_starved() {
        let mut control = AdmissionControl::default();
        let admitted = (0..30).filter(|i| control.offer(*i as f64 * 40.0).is_admitted()).count();
        // 1.2 s of 25 fps input at a 100 ms floor
        assert_eq!(admitted, 10);
    }

    #[test]
    fn drop_rate_counts_rejected_messages() {
        let mut control = AdmissionControl::default();
        control.offer(0.0);
        control.record_rejected();
        assert_eq!(control.stats().drop_rate(), 50.0);
    }
}
