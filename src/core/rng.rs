//! Deterministic Random Number Generator
//!
//! Xorshift128+ seeded through SplitMix64. All gameplay randomness in the hub
//! (spawn counts, spawn positions, idle wander velocities) and in the headless
//! peer runs through this type, so a fixed seed reproduces a whole session.

use serde::{Serialize, Deserialize};

use super::vec2::{Bounds, Vec2};

/// Width of the off-screen spawn band along each edge.
pub const SPAWN_BAND: f32 = 128.0;

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use horde::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift must never run from an all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u64>())
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max] (both inclusive).
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u32;
        min + self.next_int(range) as i32
    }

    /// Generate a random f32 in [0, 1).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        // 24 mantissa bits keep the result strictly below 1.0
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Generate a random f32 in [min, max].
    #[inline]
    pub fn next_f32_range(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        min + self.next_f32() * (max - min)
    }

    /// Generate a random boolean that is true with the given probability.
    #[inline]
    pub fn next_bool(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }

    /// Pick a point in one of the off-screen spawn bands.
    ///
    /// Each axis independently lands in the low band `[0, 128]` or the high
    /// band `[extent - 128, extent]`, so new hostiles never appear on top of
    /// an avatar standing near the middle of the arena.
    pub fn spawn_position(&mut self, bounds: Bounds) -> Vec2 {
        let x = self.band(bounds.width);
        let y = self.band(bounds.height);
        Vec2::new(x, y)
    }

    fn band(&mut self, extent: f32) -> f32 {
        if self.next_bool(0.5) {
            self.next_f32_range(0.0, SPAWN_BAND)
        } else {
            self.next_f32_range(extent - SPAWN_BAND, extent)
        }
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_int_range_inclusive() {
        let mut rng = DeterministicRng::new(5678);
        let mut seen_min = false;
        let mut seen_max = false;

        for _ in 0..1000 {
            let val = rng.next_int_range(1, 3);
            assert!((1..=3).contains(&val));
            seen_min |= val == 1;
            seen_max |= val == 3;
        }
        assert!(seen_min && seen_max);

        // Degenerate ranges collapse to min
        assert_eq!(rng.next_int_range(5, 5), 5);
        assert_eq!(rng.next_int_range(7, 2), 7);
    }

    #[test]
    fn test_next_f32_unit_interval() {
        let mut rng = DeterministicRng::new(9999);
        for _ in 0..1000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_spawn_position_in_bands() {
        let mut rng = DeterministicRng::new(7777);
        let bounds = Bounds::new(1280.0, 720.0);

        for _ in 0..500 {
            let pos = rng.spawn_position(bounds);
            let x_ok = (0.0..=128.0).contains(&pos.x) || (1152.0..=1280.0).contains(&pos.x);
            let y_ok = (0.0..=128.0).contains(&pos.y) || (592.0..=720.0).contains(&pos.y);
            assert!(x_ok, "x out of band: {}", pos.x);
            assert!(y_ok, "y out of band: {}", pos.y);
        }
    }

    #[test]
    fn test_choose() {
        let mut rng = DeterministicRng::new(3);
        let empty: [i32; 0] = [];
        assert!(rng.choose(&empty).is_none());

        let options = [-200.0f32, 0.0, 200.0];
        for _ in 0..100 {
            let v = *rng.choose(&options).unwrap();
            assert!(options.contains(&v));
        }
    }
}
