#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Smallest cache budget accepted, in bytes.
pub const MIN_CACHE_SIZE: u64 = 128 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Cache {
    /// Total byte budget of the configuration cache.
    pub size: u64,

    /// Share of `size` (percent) reserved for the string pool.
    pub strpool_percent: u8,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            size: 32 * 1024 * 1024,
            strpool_percent: 15,
        }
    }
}

impl Cache {
    pub fn clamp(self) -> Self {
        Self {
            size: self.size.max(MIN_CACHE_SIZE),
            strpool_percent: self.strpool_percent.clamp(1, 90),
        }
    }

    /// Budget of the record arena in bytes.
    pub fn records_size(&self) -> u64 {
        self.size - self.strpool_size()
    }

    /// Budget of the string pool arena in bytes.
    pub fn strpool_size(&self) -> u64 {
        self.size / 100 * u64::from(self.strpool_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn budgets_add_up(size in 0u64..(1 << 40), percent in 0u8..=255) {
            let cache = Cache { size, strpool_percent: percent }.clamp();
            prop_assert!(cache.size >= MIN_CACHE_SIZE);
            prop_assert!((1..=90).contains(&cache.strpool_percent));
            prop_assert_eq!(cache.records_size() + cache.strpool_size(), cache.size);
        }
    }
}
