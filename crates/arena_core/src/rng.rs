//! Seeded random numbers for combat rolls.
//!
//! The generator state is part of the battle state so that a restored
//! snapshot replays the same rolls.

use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// Deterministic generator (SplitMix64). Never seeded from the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleRng {
    state: u64,
}

impl BattleRng {
    /// Create a generator from a battle seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Next raw value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Roll with success probability `chance` (clamped to `[0, 1]`).
    pub fn roll(&mut self, chance: Fixed) -> bool {
        if chance <= Fixed::ZERO {
            return false;
        }
        if chance >= Fixed::ONE {
            return true;
        }
        // Compare 32 random bits against the fractional bits of `chance`.
        let threshold = u64::try_from(chance.frac().to_bits()).unwrap_or(0);
        (self.next_u64() >> 32) < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = BattleRng::new(42);
        let mut b = BattleRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_roll_extremes() {
        let mut rng = BattleRng::new(7);
        for _ in 0..50 {
            assert!(!rng.roll(Fixed::ZERO));
            assert!(rng.roll(Fixed::ONE));
        }
    }

    #[test]
    fn test_roll_frequency_roughly_matches_chance() {
        let mut rng = BattleRng::new(1234);
        let hits = (0..10_000).filter(|_| rng.roll(Fixed::from_num(0.25))).count();
        assert!((2_200..2_800).contains(&hits), "got {hits} hits");
    }
}
