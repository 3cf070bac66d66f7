//! Seeded random source for reproducible generation.

use serde::{Deserialize, Serialize};

/// A random-number source pinned to a device and seed.
///
/// Two generations with the same generator and parameters produce the same frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generator {
    pub device: String,
    pub seed: u64,
}

impl Generator {
    pub fn manual_seed(device: impl Into<String>, seed: u64) -> Self {
        Self {
            device: device.into(),
            seed,
        }
    }

    /// Build a generator only when a seed was supplied.
    pub fn for_seed(device: &str, seed: Option<u64>) -> Option<Self> {
        seed.map(|seed| Self::manual_seed(device, seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_seed() {
        assert_eq!(Generator::for_seed("cuda", None), None);
        assert_eq!(
            Generator::for_seed("cuda", Some(7)),
            Some(Generator::manual_seed("cuda", 7))
        );
    }
}
