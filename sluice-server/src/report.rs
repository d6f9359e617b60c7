//! Periodic channel reports.

use tracing::info;

/// What the event loop exposes to the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelView {
    /// Bytes currently buffered.
    pub occupied_bytes: usize,
    /// Channel capacity in bytes.
    pub capacity_bytes: usize,
    /// Sessions being served.
    pub active_clients: usize,
    /// Clients waiting in the admission ring.
    pub pending_clients: usize,
    /// Timer periods covered by this report.
    pub expirations: u64,
}

/// One report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Bytes currently buffered.
    pub occupied_bytes: usize,
    /// Channel capacity in bytes.
    pub capacity_bytes: usize,
    /// Sessions being served.
    pub active_clients: usize,
    /// Clients waiting in the admission ring.
    pub pending_clients: usize,
    /// Change in occupancy since the previous report.
    pub flow_bytes: i64,
    /// Timer periods covered by this report.
    pub expirations: u64,
}

impl Report {
    /// Returns channel fill as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fill_percent(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }
        self.occupied_bytes as f64 * 100.0 / self.capacity_bytes as f64
    }

    /// Returns every client holding a connection, served or waiting.
    #[must_use]
    pub const fn connected_clients(&self) -> usize {
        self.active_clients + self.pending_clients
    }

    /// Writes the report to the log.
    pub fn emit(&self) {
        info!(
            occupied_bytes = self.occupied_bytes,
            capacity_bytes = self.capacity_bytes,
            fill_percent = (self.fill_percent() * 100.0).round() / 100.0,
            active_clients = self.active_clients,
            pending_clients = self.pending_clients,
            connected_clients = self.connected_clients(),
            flow_bytes = self.flow_bytes,
            expirations = self.expirations,
            "Channel report"
        );
    }
}

/// Turns channel views into reports, remembering the last occupancy.
#[derive(Debug, Default)]
pub struct Reporter {
    last_occupied: usize,
    reports: u64,
}

impl Reporter {
    /// Creates a reporter with zero baseline occupancy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_occupied: 0,
            reports: 0,
        }
    }

    /// Builds the next report from `view`.
    pub fn observe(&mut self, view: ChannelView) -> Report {
        let flow_bytes = signed(view.occupied_bytes) - signed(self.last_occupied);
        self.last_occupied = view.occupied_bytes;
        self.reports += 1;

        Report {
            occupied_bytes: view.occupied_bytes,
            capacity_bytes: view.capacity_bytes,
            active_clients: view.active_clients,
            pending_clients: view.pending_clients,
            flow_bytes,
            expirations: view.expirations,
        }
    }

    /// Returns how many reports have been built.
    #[must_use]
    pub const fn reports(&self) -> u64 {
        self.reports
    }
}

fn signed(bytes: usize) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_with_no_clients() {
        let mut reporter = Reporter::new();
        let report = reporter.observe(ChannelView {
            occupied_bytes: 16384,
            capacity_bytes: 65536,
            expirations: 1,
            ..ChannelView::default()
        });

        assert_eq!(report.connected_clients(), 0);
        assert_eq!(report.flow_bytes, 16384);
        assert!((report.fill_percent() - 25.0).abs() < f64::EPSILON);
        report.emit();
    }

    #[test]
    fn test_flow_is_signed_delta() {
        let mut reporter = Reporter::new();
        let view = |occupied_bytes| ChannelView {
            occupied_bytes,
            capacity_bytes: 65536,
            active_clients: 3,
            pending_clients: 2,
            expirations: 1,
        };

        assert_eq!(reporter.observe(view(40000)).flow_bytes, 40000);
        let drained = reporter.observe(view(10000));
        assert_eq!(drained.flow_bytes, -30000);
        assert_eq!(drained.connected_clients(), 5);
        assert_eq!(reporter.observe(view(10000)).flow_bytes, 0);
        assert_eq!(reporter.reports(), 3);
    }

    #[test]
    fn test_zero_capacity_fill() {
        let report = Reporter::new().observe(ChannelView::default());
        assert!(report.fill_percent().abs() < f64::EPSILON);
    }
}
