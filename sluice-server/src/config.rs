//! Distributor configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use sluice_core::Geometry;

/// What to do with a new connection when the admission ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Close the new connection and keep serving everyone else.
    #[default]
    Reject,
    /// Stop the distributor with `ServerError::AdmissionRingFull`.
    Exit,
}

/// Configuration for a distributor.
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Generator rate multiplier.
    pub frequency: f64,
    /// Block, unit and channel sizes.
    pub geometry: Geometry,
    /// Time between channel reports.
    pub report_interval: Duration,
    /// Longest a single readiness poll may wait.
    pub poll_timeout: Duration,
    /// Behaviour when the admission ring is full.
    pub overflow_policy: OverflowPolicy,
}

impl DistributorConfig {
    /// Creates a configuration with default sizes and timings.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, frequency: f64) -> Self {
        Self {
            listen_addr,
            frequency,
            geometry: Geometry::new(),
            report_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(10),
            overflow_policy: OverflowPolicy::default(),
        }
    }

    /// Creates a configuration for tests: ephemeral loopback port, 1ms polls.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1),
            ..Self::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0), 1.0)
        }
    }

    /// Sets the geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Sets the report interval.
    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Sets the poll timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the overflow policy.
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Returns the time the generator sleeps between chunks.
    ///
    /// # Errors
    /// Returns an error if the frequency does not yield a finite interval.
    pub fn chunk_interval(&self) -> Result<Duration, ConfigError> {
        let rate = f64::from(self.geometry.producer_base_rate) * self.frequency;
        Duration::try_from_secs_f64(f64::from(self.geometry.chunk_bytes) / rate).map_err(|e| {
            ConfigError::InvalidFrequency {
                message: format!("frequency {} gives no usable interval: {e}", self.frequency),
            }
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(ConfigError::InvalidFrequency {
                message: format!("frequency must be a positive number, got {}", self.frequency),
            });
        }

        self.geometry.validate().map_err(ConfigError::InvalidGeometry)?;

        if self.report_interval.is_zero() {
            return Err(ConfigError::InvalidTiming {
                message: "report_interval must be positive".to_string(),
            });
        }

        // A zero wait would never hand control back to the I/O driver.
        if self.poll_timeout < Duration::from_millis(1) {
            return Err(ConfigError::InvalidTiming {
                message: "poll_timeout must be at least 1ms".to_string(),
            });
        }

        if self.poll_timeout > self.report_interval {
            return Err(ConfigError::InvalidTiming {
                message: "poll_timeout must be <= report_interval".to_string(),
            });
        }

        self.chunk_interval()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid generator frequency.
    InvalidFrequency {
        /// Error description.
        message: String,
    },
    /// Invalid timing configuration.
    InvalidTiming {
        /// Error description.
        message: String,
    },
    /// Inconsistent sizes.
    InvalidGeometry(sluice_core::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFrequency { message } => write!(f, "invalid frequency: {message}"),
            Self::InvalidTiming { message } => write!(f, "invalid timing: {message}"),
            Self::InvalidGeometry(err) => write!(f, "invalid geometry: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}
