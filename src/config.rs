use crate::{
    block::BLOCK_HEADER_SIZE,
    error::{Error, Result},
    freelist::Strategy,
    utils::{is_aligned, ALIGNMENT},
};

/// Default capacity of each of the three regions, in bytes.
pub const HEAP_SIZE: usize = 128 * 8;

/// Minor collections an object has to survive before it is moved to the old
/// region.
pub const PROMOTION_THRESHOLD: u32 = 3;

/// Sizing and policy of a [`crate::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Capacity of every region, headers included.
    pub region_size: usize,
    /// Survived minor collections that trigger promotion.
    pub promotion_threshold: u32,
    /// Placement policy the heap starts with.
    pub strategy: Strategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region_size: HEAP_SIZE,
            promotion_threshold: PROMOTION_THRESHOLD,
            strategy: Strategy::default(),
        }
    }
}

impl Config {
    pub fn with_region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }

    pub fn with_promotion_threshold(mut self, promotion_threshold: u32) -> Self {
        self.promotion_threshold = promotion_threshold;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Number of indirection table slots: one per 8 bytes of region.
    pub fn table_capacity(&self) -> usize {
        self.region_size / ALIGNMENT
    }

    pub fn validate(&self) -> Result<()> {
        if !is_aligned(self.region_size) {
            return Err(Error::InvalidConfig("region size must be a multiple of 8"));
        }
        if self.region_size < 2 * BLOCK_HEADER_SIZE {
            return Err(Error::InvalidConfig("region size must hold at least two block headers"));
        }
        // Payload sizes are stored in 32 bits.
        if u32::try_from(self.region_size).is_err() {
            return Err(Error::InvalidConfig("region size does not fit a block header"));
        }
        if self.promotion_threshold == 0 {
            return Err(Error::InvalidConfig("promotion threshold must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_constants() {
        let config = Config::default();

        assert_eq!(1024, config.region_size);
        assert_eq!(3, config.promotion_threshold);
        assert_eq!(Strategy::FirstFit, config.strategy);
        assert_eq!(128, config.table_capacity());
        config.validate().unwrap();
    }

    #[test]
    fn bad_configs_are_rejected() {
        let config = Config::default();

        assert!(config.with_region_size(1020).validate().is_err());
        assert!(config.with_region_size(40).validate().is_err());
        assert!(config.with_region_size(1 << 33).validate().is_err());
        assert!(config.with_promotion_threshold(0).validate().is_err());
        assert!(config.with_region_size(48).with_strategy(Strategy::BestFit).validate().is_ok());
    }
}
