//! Consumer configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use sluice_core::Geometry;

/// Configuration for a consumer run.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Producer address.
    pub server_addr: SocketAddr,
    /// Consumption rate multiplier.
    pub consumption: f64,
    /// Storage degradation multiplier.
    pub degradation: f64,
    /// Storage size in storage units.
    pub capacity: u32,
    /// Block and unit sizes, shared with the producer.
    pub geometry: Geometry,
}

impl ConsumerConfig {
    /// Creates a configuration with the default geometry.
    #[must_use]
    pub fn new(server_addr: SocketAddr, consumption: f64, degradation: f64, capacity: u32) -> Self {
        Self {
            server_addr,
            consumption,
            degradation,
            capacity,
            geometry: Geometry::new(),
        }
    }

    /// Creates a configuration for tests: fast consumption, no degradation,
    /// room for two units.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            1000.0,
            0.0,
            1,
        )
    }

    /// Sets the producer address.
    #[must_use]
    pub const fn with_server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = addr;
        self
    }

    /// Sets the consumption rate multiplier.
    #[must_use]
    pub const fn with_consumption(mut self, consumption: f64) -> Self {
        self.consumption = consumption;
        self
    }

    /// Sets the degradation multiplier.
    #[must_use]
    pub const fn with_degradation(mut self, degradation: f64) -> Self {
        self.degradation = degradation;
        self
    }

    /// Sets the storage size in storage units.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the geometry.
    #[must_use]
    pub const fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Returns the initial free storage in bytes.
    #[must_use]
    pub fn storage_bytes(&self) -> u64 {
        u64::from(self.capacity) * u64::from(self.geometry.storage_unit_bytes)
    }

    /// Returns the pause after each block: `block / (base_rate * consumption)`.
    ///
    /// # Errors
    /// Returns an error if the consumption rate gives no usable pause.
    pub fn block_pause(&self) -> Result<Duration, ConfigError> {
        let rate = f64::from(self.geometry.consumer_base_rate) * self.consumption;
        Duration::try_from_secs_f64(f64::from(self.geometry.block_bytes) / rate).map_err(|e| {
            ConfigError::InvalidRate {
                message: format!("consumption {} gives no usable pause: {e}", self.consumption),
            }
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.consumption.is_finite() || self.consumption <= 0.0 {
            return Err(ConfigError::InvalidRate {
                message: format!("consumption must be positive, got {}", self.consumption),
            });
        }
        if !self.degradation.is_finite() || self.degradation < 0.0 {
            return Err(ConfigError::InvalidRate {
                message: format!("degradation must be non-negative, got {}", self.degradation),
            });
        }
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        self.geometry.validate().map_err(ConfigError::InvalidGeometry)?;
        self.block_pause()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid consumption or degradation rate.
    InvalidRate {
        /// Error description.
        message: String,
    },
    /// Storage capacity of zero.
    InvalidCapacity,
    /// Inconsistent sizes.
    InvalidGeometry(sluice_core::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRate { message } => write!(f, "invalid rate: {message}"),
            Self::InvalidCapacity => write!(f, "capacity must be at least 1"),
            Self::InvalidGeometry(err) => write!(f, "invalid geometry: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}
