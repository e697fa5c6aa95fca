//! Seeded random source
//!
//! Every probabilistic decision in a run draws from one [`RandomSource`], so a
//! fixed seed reproduces the same fleet and the same trace.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Deterministic pseudo-random number generator
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
    seed: u64,
}

impl RandomSource {
    /// Create a source from a seed
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), seed }
    }

    /// Reset to the start of the sequence for `seed`
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// The seed last applied
    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in `[0, 1)`
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Sample a normal distribution
    ///
    /// A negative or non-finite `sigma` degenerates to `mu`.
    pub fn normal(&mut self, mu: f64, sigma: f64) -> f64 {
        match Normal::new(mu, sigma) {
            Ok(dist) if sigma.is_finite() => dist.sample(&mut self.rng),
            _ => mu,
        }
    }

    /// `uniform()` squared, biased toward 0
    pub fn skewed(&mut self) -> f64 {
        let u = self.uniform();
        u * u
    }

    /// `1 - skewed()`, biased toward 1
    pub fn skewed_high(&mut self) -> f64 {
        1.0 - self.skewed()
    }

    /// Uniform in `[low, high)`; `low` when the range is empty
    pub fn range(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.rng.gen_range(low..high)
        } else {
            low
        }
    }

    /// Pick one element, `None` for an empty slice
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// A random byte
    pub fn byte(&mut self) -> u8 {
        self.rng.gen::<u8>()
    }

    /// `true` with probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        self.uniform() < p
    }
}
