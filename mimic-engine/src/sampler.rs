//! Seeded selection primitives.
//!
//! One [`WeightedSampler`] is created per request and advanced monotonically
//! as traits resolve, so a `(catalog, request)` pair always replays the same
//! draws in the same order.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::catalog::Weighted;

#[derive(Debug, Clone)]
pub struct WeightedSampler {
    rng: StdRng,
    draws: u64,
}

impl WeightedSampler {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// Number of primitive draws taken so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }

    /// Cumulative-weight pick over `items` in their given order.
    ///
    /// All-zero weights degrade to a uniform pick. Returns `None` only for an
    /// empty slice.
    pub fn pick<'a, T: Weighted>(&mut self, items: &[&'a T]) -> Option<&'a T> {
        let last = *items.last()?;
        let total: f64 = items.iter().map(|item| item.weight()).sum();
        if total <= 0.0 {
            return Some(items[self.index(items.len())]);
        }

        let u = self.next_f64() * total;
        let mut cumulative = 0.0;
        for item in items {
            cumulative += item.weight();
            if cumulative > u {
                return Some(*item);
            }
        }
        Some(last)
    }

    /// Inclusive on both ends; callers guarantee `min <= max`.
    pub fn uniform_int(&mut self, min: i64, max: i64) -> i64 {
        self.draws += 1;
        self.rng.gen_range(min..=max)
    }

    pub fn index(&mut self, len: usize) -> usize {
        self.draws += 1;
        self.rng.gen_range(0..len)
    }

    /// Box–Muller transform on two uniforms.
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Fisher–Yates in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        self.draws += 1;
        items.shuffle(&mut self.rng);
    }

    /// Up to `amount` distinct elements, in draw order.
    pub fn subset<T: Clone>(&mut self, items: &[T], amount: usize) -> Vec<T> {
        self.draws += 1;
        items
            .choose_multiple(&mut self.rng, amount.min(items.len()))
            .cloned()
            .collect()
    }
}
