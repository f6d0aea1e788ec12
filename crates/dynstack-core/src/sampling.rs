//! Seeded samplers for the stochastic yard timings.
//!
//! Every run draws from one [`StdRng`] seeded with `Settings::seed`, so a
//! given settings value replays the same arrivals, due times and crane
//! timings as long as the same schedules are applied at the same times.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random source for durations and factors.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler from a run seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw from a normal distribution, clamped at zero.
    pub fn normal(&mut self, mean: Duration, std: Duration) -> Duration {
        let z = self.standard_normal();
        let secs = std.as_secs_f64().mul_add(z, mean.as_secs_f64());
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(mean)
    }

    /// Draw uniformly from `[min, max)`. Returns `min` for an empty range.
    pub fn uniform(&mut self, min: Duration, max: Duration) -> Duration {
        if min >= max {
            return min;
        }
        let secs = self.rng.random_range(min.as_secs_f64()..max.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(min)
    }

    /// Draw a factor uniformly from `[low, high)`. Returns `low` for an
    /// empty range.
    pub fn uniform_f64(&mut self, low: f64, high: f64) -> f64 {
        if low < high {
            self.rng.random_range(low..high)
        } else {
            low
        }
    }

    /// Box-Muller transform over two uniform draws.
    fn standard_normal(&mut self) -> f64 {
        // 1 - U keeps the argument of ln in (0, 1].
        let u1 = 1.0 - self.rng.random::<f64>();
        let u2 = self.rng.random::<f64>();
        (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }
}
