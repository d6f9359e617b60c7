//! Block geometry and system bounds.
//!
//! Every queue and buffer has an explicit maximum size. Producer and consumer
//! must agree on the block and unit sizes because the wire carries raw blocks
//! with no framing.

/// Sizes and rates shared by the producer and the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    // Wire limits.
    /// Size of one block sent to a client, in bytes.
    pub block_bytes: u32,
    /// Number of blocks in one service unit (a client's whole allocation).
    pub unit_blocks: u32,

    // Producer limits.
    /// Size of one chunk written by the generator, in bytes.
    pub chunk_bytes: u32,
    /// Maximum number of bytes the channel can hold.
    pub channel_capacity_bytes: u32,
    /// Maximum number of clients waiting for admission.
    pub max_clients: u32,
    /// Generator base rate in bytes per second, scaled by the frequency flag.
    pub producer_base_rate: u32,

    // Consumer limits.
    /// Consumer base drain rate in bytes per second.
    pub consumer_base_rate: u32,
    /// Consumer storage recovery rate in bytes per second.
    pub degradation_rate: u32,
    /// Consumer storage granted per capacity unit, in bytes.
    pub storage_unit_bytes: u32,
}

impl Geometry {
    /// Creates the geometry of the reference system.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // 4 blocks of 3328 bytes = 13312 bytes per unit.
            block_bytes: 3328,
            unit_blocks: 4,

            // 640-byte chunks into a 64KiB channel (default pipe capacity).
            chunk_bytes: 640,
            channel_capacity_bytes: 64 * 1024,
            max_clients: 1000,
            producer_base_rate: 2662,

            consumer_base_rate: 4435,
            degradation_rate: 819,
            storage_unit_bytes: 30720,
        }
    }

    /// Sets the channel capacity.
    #[must_use]
    pub const fn with_channel_capacity(mut self, bytes: u32) -> Self {
        self.channel_capacity_bytes = bytes;
        self
    }

    /// Sets the maximum number of waiting clients.
    #[must_use]
    pub const fn with_max_clients(mut self, max_clients: u32) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Returns the size of one service unit in bytes.
    #[must_use]
    pub const fn unit_bytes(&self) -> u64 {
        self.block_bytes as u64 * self.unit_blocks as u64
    }

    /// Validates that all sizes are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any size is zero or the channel cannot hold one unit.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "block_bytes",
                reason: "must be positive",
            });
        }

        if self.unit_blocks == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "unit_blocks",
                reason: "must be positive",
            });
        }

        if self.chunk_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "chunk_bytes",
                reason: "must be positive",
            });
        }

        if self.chunk_bytes > self.channel_capacity_bytes {
            return Err(crate::Error::InvalidArgument {
                name: "chunk_bytes",
                reason: "must be <= channel_capacity_bytes",
            });
        }

        // Admission needs occupancy strictly above one unit.
        if u64::from(self.channel_capacity_bytes) <= self.unit_bytes() {
            return Err(crate::Error::LimitExceeded {
                limit: "unit_bytes",
                max: u64::from(self.channel_capacity_bytes).saturating_sub(1),
                actual: self.unit_bytes(),
            });
        }

        if self.max_clients == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_clients",
                reason: "must be positive",
            });
        }

        if self.producer_base_rate == 0 || self.consumer_base_rate == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "base_rate",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry_is_valid() {
        let geometry = Geometry::new();
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.unit_bytes(), 13312);
    }

    #[test]
    fn test_channel_must_exceed_one_unit() {
        let geometry = Geometry::new().with_channel_capacity(13312);
        assert!(matches!(
            geometry.validate(),
            Err(crate::Error::LimitExceeded { .. })
        ));

        let geometry = Geometry::new().with_channel_capacity(30720);
        assert!(geometry.validate().is_ok());
    }

    #[test]
    fn test_zero_block_rejected() {
        let mut geometry = Geometry::new();
        geometry.block_bytes = 0;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_chunk_larger_than_channel_rejected() {
        let mut geometry = Geometry::new().with_channel_capacity(20_000);
        geometry.chunk_bytes = 30_000;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_zero_max_clients_rejected() {
        let geometry = Geometry::new().with_max_clients(0);
        assert!(geometry.validate().is_err());
    }
}
