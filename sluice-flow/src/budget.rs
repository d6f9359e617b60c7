//! Block budget for admission control.
//!
//! The budget counts blocks that have been promised to active clients but not
//! yet drawn from the channel. It turns the channel's occupancy into a yes/no
//! answer: can one more unit be promised without overcommitting the data that
//! is actually buffered?
//!
//! Drawing a block from the channel lowers occupancy and the promise by the
//! same amount, so once a unit is admitted the promise stays covered by
//! buffered data for the rest of that client's life.

use sluice_core::Geometry;

use crate::error::{FlowError, FlowResult};

/// Tracks blocks promised to active clients.
#[derive(Debug, Clone)]
pub struct BlockBudget {
    /// Blocks promised and not yet drawn from the channel.
    promised_blocks: u64,

    /// Size of one block in bytes.
    block_bytes: u64,

    /// Blocks in one unit.
    unit_blocks: u64,

    /// Total units promised since creation.
    total_reserved_units: u64,

    /// Total blocks released since creation.
    total_released_blocks: u64,
}

impl BlockBudget {
    /// Creates an empty budget for the given geometry.
    #[must_use]
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            promised_blocks: 0,
            block_bytes: u64::from(geometry.block_bytes),
            unit_blocks: u64::from(geometry.unit_blocks),
            total_reserved_units: 0,
            total_released_blocks: 0,
        }
    }

    /// Returns the number of blocks currently promised.
    #[must_use]
    pub const fn promised_blocks(&self) -> u64 {
        self.promised_blocks
    }

    /// Returns the number of bytes currently promised.
    #[must_use]
    pub const fn promised_bytes(&self) -> u64 {
        self.promised_blocks * self.block_bytes
    }

    /// Returns the number of blocks in one unit.
    #[must_use]
    pub const fn unit_blocks(&self) -> u64 {
        self.unit_blocks
    }

    /// Returns the occupancy that must be exceeded before another unit is
    /// promised: everything already promised plus one more unit as margin.
    #[must_use]
    pub const fn required_bytes(&self) -> u64 {
        self.promised_bytes() + self.unit_blocks * self.block_bytes
    }

    /// Returns true if one more unit may be promised at this occupancy.
    ///
    /// Must be re-evaluated after every reservation since each one raises the
    /// bar for the next.
    #[must_use]
    pub const fn admits(&self, occupied_bytes: u64) -> bool {
        occupied_bytes > self.required_bytes()
    }

    /// Promises one unit if the admission test passes.
    ///
    /// # Arguments
    ///
    /// * `occupied_bytes` - Bytes currently buffered in the channel.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InsufficientCapacity` if the channel does not hold
    /// enough data.
    pub fn try_reserve(&mut self, occupied_bytes: u64) -> FlowResult<()> {
        if !self.admits(occupied_bytes) {
            return Err(FlowError::InsufficientCapacity {
                occupied_bytes,
                required_bytes: self.required_bytes(),
            });
        }

        self.promised_blocks += self.unit_blocks;
        self.total_reserved_units += 1;
        Ok(())
    }

    /// Releases promised blocks, either because they were drawn from the
    /// channel or because their client went away.
    ///
    /// # Returns
    ///
    /// The number of blocks actually released.
    pub fn release(&mut self, blocks: u64) -> u64 {
        debug_assert!(
            blocks <= self.promised_blocks,
            "releasing {blocks} blocks with only {} promised",
            self.promised_blocks
        );
        let released = blocks.min(self.promised_blocks);
        self.promised_blocks -= released;
        self.total_released_blocks += released;
        released
    }

    /// Returns the total number of units promised since creation.
    #[must_use]
    pub const fn total_reserved_units(&self) -> u64 {
        self.total_reserved_units
    }

    /// Returns the total number of blocks released since creation.
    #[must_use]
    pub const fn total_released_blocks(&self) -> u64 {
        self.total_released_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn reference_budget() -> BlockBudget {
        BlockBudget::new(&Geometry::new().with_channel_capacity(30720))
    }

    #[test]
    fn test_new_budget_is_empty() {
        let budget = reference_budget();
        assert_eq!(budget.promised_blocks(), 0);
        assert_eq!(budget.required_bytes(), 13312);
    }

    #[test]
    fn test_single_client_admitted_at_20000_bytes() {
        let mut budget = reference_budget();

        budget.try_reserve(20_000).unwrap();
        assert_eq!(budget.promised_blocks(), 4);
        assert_eq!(budget.promised_bytes(), 13312);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut budget = reference_budget();

        let result = budget.try_reserve(13312);
        assert!(matches!(
            result,
            Err(FlowError::InsufficientCapacity {
                occupied_bytes: 13312,
                required_bytes: 13312,
            })
        ));

        budget.try_reserve(13313).unwrap();
    }

    #[test]
    fn test_each_reservation_raises_the_bar() {
        let mut budget = reference_budget();

        budget.try_reserve(30_000).unwrap();
        assert_eq!(budget.required_bytes(), 26624);
        assert!(budget.admits(30_000));

        budget.try_reserve(30_000).unwrap();
        assert_eq!(budget.required_bytes(), 39936);
        assert!(!budget.admits(30_720));
    }

    #[test]
    fn test_release_remaining_after_early_disconnect() {
        let mut budget = reference_budget();
        budget.try_reserve(20_000).unwrap();

        // One block drawn, then the client hangs up with three outstanding.
        budget.release(1);
        assert_eq!(budget.promised_blocks(), 3);
        assert_eq!(budget.release(3), 3);
        assert_eq!(budget.promised_blocks(), 0);
        assert_eq!(budget.total_released_blocks(), 4);
    }

    #[test]
    fn test_release_frees_capacity_for_next_client() {
        let mut budget = reference_budget();
        budget.try_reserve(20_000).unwrap();
        budget.release(1);

        // 16672 bytes left after one block, 3 still promised: 9984 + 13312 = 23296.
        assert!(!budget.admits(16_672));
        budget.release(3);
        assert!(budget.admits(16_672));
    }

    #[test]
    fn test_promise_stays_covered_by_occupancy() {
        // Random admissions, draws, disconnects and refills; after every step
        // the promise must be covered by buffered data.
        let geometry = Geometry::new().with_channel_capacity(30720);
        let capacity = u64::from(geometry.channel_capacity_bytes);
        let block = u64::from(geometry.block_bytes);
        let mut rng = StdRng::seed_from_u64(0x5eed);

        let mut budget = BlockBudget::new(&geometry);
        let mut occupied: u64 = 0;
        let mut clients: Vec<u64> = Vec::new();

        for _ in 0..10_000 {
            match rng.gen_range(0..4) {
                0 => {
                    if budget.try_reserve(occupied).is_ok() {
                        clients.push(budget.unit_blocks());
                    }
                }
                1 if !clients.is_empty() => {
                    let i = rng.gen_range(0..clients.len());
                    if clients[i] > 0 && occupied >= block {
                        clients[i] -= 1;
                        occupied -= block;
                        budget.release(1);
                    }
                    if clients[i] == 0 {
                        clients.swap_remove(i);
                    }
                }
                2 if !clients.is_empty() => {
                    let i = rng.gen_range(0..clients.len());
                    let remaining = clients.swap_remove(i);
                    budget.release(remaining);
                }
                _ => {
                    occupied = (occupied + rng.gen_range(0..4096)).min(capacity);
                }
            }

            let outstanding: u64 = clients.iter().sum();
            assert_eq!(budget.promised_blocks(), outstanding);
            assert!(outstanding * block <= capacity);
            assert!(budget.promised_bytes() <= occupied);
        }
    }
}
