//! Per-session latency measurements and their summary.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use hdrhistogram::Histogram;
use tracing::info;

use crate::error::ConsumerResult;

/// Timing of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Local address of the connection.
    pub local_addr: SocketAddr,
    /// From connect to the first block.
    pub wait: Duration,
    /// From the first block until the last one was consumed.
    pub service: Duration,
}

impl fmt::Display for SessionTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} waited {:.6}s, served in {:.6}s",
            self.local_addr,
            self.wait.as_secs_f64(),
            self.service.as_secs_f64()
        )
    }
}

/// Latency percentiles in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50: u64,
    /// 90th percentile.
    pub p90: u64,
    /// 99th percentile.
    pub p99: u64,
    /// Largest sample.
    pub max: u64,
}

impl LatencyPercentiles {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        Self {
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
            max: hist.max(),
        }
    }
}

/// Everything measured during a run.
#[derive(Debug)]
pub struct ConsumerSummary {
    /// Sessions in the order they finished.
    pub sessions: Vec<SessionTiming>,
    /// Storage left at the end.
    pub free_bytes: u64,
    wait: Histogram<u64>,
    service: Histogram<u64>,
}

impl ConsumerSummary {
    /// Creates an empty summary.
    ///
    /// # Errors
    /// Returns an error if the histograms cannot be created.
    pub fn new() -> ConsumerResult<Self> {
        Ok(Self {
            sessions: Vec::new(),
            free_bytes: 0,
            wait: Histogram::new(3)?,
            service: Histogram::new(3)?,
        })
    }

    /// Records a finished session.
    pub fn record(&mut self, timing: SessionTiming) {
        self.wait.saturating_record(micros(timing.wait));
        self.service.saturating_record(micros(timing.service));
        self.sessions.push(timing);
    }

    /// Returns wait-time percentiles.
    #[must_use]
    pub fn wait_percentiles(&self) -> LatencyPercentiles {
        LatencyPercentiles::from_histogram(&self.wait)
    }

    /// Returns service-time percentiles.
    #[must_use]
    pub fn service_percentiles(&self) -> LatencyPercentiles {
        LatencyPercentiles::from_histogram(&self.service)
    }

    /// Writes the final report to the log.
    pub fn emit(&self) {
        info!(
            sessions = self.sessions.len(),
            free_bytes = self.free_bytes,
            "Consumer finished"
        );
        for timing in &self.sessions {
            info!(
                local_addr = %timing.local_addr,
                wait_secs = timing.wait.as_secs_f64(),
                service_secs = timing.service.as_secs_f64(),
                "Session report"
            );
        }
        if self.sessions.is_empty() {
            return;
        }

        let wait = self.wait_percentiles();
        let service = self.service_percentiles();
        info!(
            p50_us = wait.p50,
            p90_us = wait.p90,
            p99_us = wait.p99,
            max_us = wait.max,
            "Wait latency"
        );
        info!(
            p50_us = service.p50,
            p90_us = service.p90,
            p99_us = service.p99,
            max_us = service.max,
            "Service latency"
        );
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(wait_ms: u64, service_ms: u64) -> SessionTiming {
        SessionTiming {
            local_addr: SocketAddr::from(([127, 0, 0, 1], 40000)),
            wait: Duration::from_millis(wait_ms),
            service: Duration::from_millis(service_ms),
        }
    }

    #[test]
    fn test_percentiles() {
        let mut summary = ConsumerSummary::new().unwrap();
        for ms in 1..=100 {
            summary.record(timing(ms, 2 * ms));
        }

        let wait = summary.wait_percentiles();
        assert_eq!(summary.sessions.len(), 100);
        // Three significant figures.
        assert!(wait.p50.abs_diff(50_000) <= 50);
        assert!(wait.p99.abs_diff(99_000) <= 99);
        assert!(wait.max.abs_diff(100_000) <= 100);

        let service = summary.service_percentiles();
        assert!(service.p90.abs_diff(180_000) <= 180);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ConsumerSummary::new().unwrap();
        assert_eq!(summary.wait_percentiles(), LatencyPercentiles::default());
        summary.emit();
    }

    #[test]
    fn test_display() {
        let text = timing(1500, 250).to_string();
        assert_eq!(text, "127.0.0.1:40000 waited 1.500000s, served in 0.250000s");
    }
}
