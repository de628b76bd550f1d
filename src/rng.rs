//! Internal random number generator based on PCG32.
//!
//! A minimal, high-quality PRNG that avoids a `rand` dependency. It feeds the
//! synchronization handshake nonces and the Gaussian jitter of the artificial
//! send-latency fault injection.
//!
//! # PCG32 Algorithm
//!
//! PCG (Permuted Congruential Generator) is a family of simple, fast,
//! statistically good random number generators. PCG32 has 64 bits of state,
//! produces 32-bit output and has a period of 2^64.
//!
//! Reference: <https://www.pcg-random.org/>

/// Default increment for single-stream PCG32, from the PCG paper.
const PCG_DEFAULT_INCREMENT: u64 = 1442695040888963407;

/// Multiplier constant for the LCG step with 64-bit state.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

/// PCG32 random number generator.
///
/// A minimal implementation of the PCG-XSH-RR variant with 64-bit state.
/// Suitable for protocol nonces and jitter, NOT cryptographically secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Creates a new PCG32 generator with the given state and stream.
    ///
    /// The stream (increment) selects one of multiple independent sequences;
    /// it is forced odd as the algorithm requires.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        // Standard PCG seeding: start from zero state, step, add the seed,
        // step again.
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Creates a new generator seeded from a 64-bit value.
    ///
    /// Different seeds produce different (statistically independent)
    /// sequences; the same seed always produces the same sequence.
    #[must_use]
    pub const fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_INCREMENT)
    }

    /// Creates a new generator with a seed derived from wall-clock time and
    /// thread identity. Sufficient entropy for protocol nonces, nothing more.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::seed_from_u64(timing_entropy_seed())
    }

    /// Generates the next 32-bit random value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output permutation (xor-shift, random rotate).
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generates the next 64-bit random value by combining two 32-bit values.
    #[inline]
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }

    /// Generates a uniform `f64` in `[0, 1)` with 53 bits of precision.
    #[inline]
    #[must_use]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draws a sample from a normal distribution with the given mean and
    /// standard deviation, using the Box-Muller transform.
    #[must_use]
    pub fn next_gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        // u1 must be strictly positive for the logarithm.
        let mut u1 = self.next_f64();
        if u1 <= f64::EPSILON {
            u1 = f64::EPSILON;
        }
        let u2 = self.next_f64();
        let mag = (-2.0 * u1.ln()).sqrt();
        mean + std_dev * mag * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Generates a seed from timing and thread identity.
///
/// NOT cryptographically secure, but unpredictable enough that two peers
/// starting at the same instant still draw distinct handshake nonces.
fn timing_entropy_seed() -> u64 {
    use std::hash::{Hash, Hasher};

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);

    let thread_hash = {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        hasher.finish()
    };

    nanos
        .wrapping_mul(thread_hash | 1)
        .wrapping_add(0x9e3779b97f4a7c15)
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(42);
        let mut b = Pcg32::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(1);
        let mut b = Pcg32::seed_from_u64(2);
        let seq_a: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let seq_b: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn next_f64_in_unit_interval() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn gaussian_roughly_centered() {
        let mut rng = Pcg32::seed_from_u64(99);
        let samples = 10_000;
        let sum: f64 = (0..samples).map(|_| rng.next_gaussian(50.0, 10.0)).sum();
        let mean = sum / f64::from(samples);
        assert!((mean - 50.0).abs() < 1.0, "mean was {mean}");
    }

    #[test]
    fn entropy_seeds_are_usable() {
        let mut rng = Pcg32::from_entropy();
        // Mostly a smoke test; the sequence must advance.
        let first = rng.next_u32();
        let second = rng.next_u32();
        assert!(first != second || rng.next_u32() != second);
    }
}
