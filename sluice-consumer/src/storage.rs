//! Local storage accounting.
//!
//! Storage starts at `capacity * storage_unit` bytes. Each received block
//! takes up a block's worth of room; after each session the storage recovers
//! room in proportion to how long the client waited and was served. The
//! consumer keeps asking for units while more than one unit of room is free.

use crate::config::ConsumerConfig;
use crate::timing::SessionTiming;

/// Free-space accounting for received data.
#[derive(Debug, Clone)]
pub struct Storage {
    free_bytes: u64,
    block_bytes: u64,
    unit_bytes: u64,
    /// Bytes recovered per whole second of waiting or service.
    recovery_per_sec: f64,
}

impl Storage {
    /// Creates storage sized by `config`.
    #[must_use]
    pub fn new(config: &ConsumerConfig) -> Self {
        Self {
            free_bytes: config.storage_bytes(),
            block_bytes: u64::from(config.geometry.block_bytes),
            unit_bytes: config.geometry.unit_bytes(),
            recovery_per_sec: f64::from(config.geometry.degradation_rate) * config.degradation,
        }
    }

    /// Returns the free room in bytes.
    #[must_use]
    pub const fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Returns true while there is room for more than one unit.
    #[must_use]
    pub const fn wants_unit(&self) -> bool {
        self.free_bytes > self.unit_bytes
    }

    /// Accounts for one received block.
    pub fn consume_block(&mut self) {
        self.free_bytes = self.free_bytes.saturating_sub(self.block_bytes);
    }

    /// Recovers room after a session. Service and wait time each count in
    /// whole seconds and each term is truncated separately.
    ///
    /// Returns the bytes recovered.
    pub fn degrade(&mut self, timing: &SessionTiming) -> u64 {
        let recovered =
            self.recovered(timing.service.as_secs()) + self.recovered(timing.wait.as_secs());
        self.free_bytes = self.free_bytes.saturating_add(recovered);
        recovered
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn recovered(&self, whole_secs: u64) -> u64 {
        (whole_secs as f64 * self.recovery_per_sec) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn timing(wait: Duration, service: Duration) -> SessionTiming {
        SessionTiming {
            local_addr: SocketAddr::from(([127, 0, 0, 1], 40000)),
            wait,
            service,
        }
    }

    #[test]
    fn test_one_storage_unit_fits_two_units() {
        let mut storage = Storage::new(&ConsumerConfig::for_testing());
        let mut sessions = 0;
        while storage.wants_unit() {
            for _ in 0..4 {
                storage.consume_block();
            }
            sessions += 1;
        }
        assert_eq!(sessions, 2);
        assert_eq!(storage.free_bytes(), 30720 - 2 * 13312);
    }

    #[test]
    fn test_degradation_counts_whole_seconds() {
        let config = ConsumerConfig::for_testing().with_degradation(0.5);
        let mut storage = Storage::new(&config);
        let before = storage.free_bytes();

        // 2.9s service -> 2s, 1.999s wait -> 1s; 819 * 0.5 = 409.5 per second.
        let recovered = storage.degrade(&timing(
            Duration::from_millis(1999),
            Duration::from_millis(2900),
        ));
        assert_eq!(recovered, 819 + 409);
        assert_eq!(storage.free_bytes(), before + 1228);
    }

    #[test]
    fn test_no_degradation_for_short_sessions() {
        let config = ConsumerConfig::for_testing().with_degradation(3.0);
        let mut storage = Storage::new(&config);
        let recovered = storage.degrade(&timing(
            Duration::from_millis(900),
            Duration::from_millis(999),
        ));
        assert_eq!(recovered, 0);
    }
}
