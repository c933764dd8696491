//! Layer assignment for new nodes.

use crate::config;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Samples a node's top layer from a capped geometric distribution.
///
/// `sample() = floor(-ln(u) * ml)` for a uniform `u` in (0, 1), clamped to
/// [`config::MAX_LAYER`]. Deterministic for a given seed; owned by the index
/// and only consulted under the exclusive lock during insert.
#[derive(Debug)]
pub struct LevelSampler {
    rng: SmallRng,
    ml: f64,
}

impl LevelSampler {
    pub fn new(seed: u64, ml: f64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            ml,
        }
    }

    pub fn sample(&mut self) -> usize {
        let u: f64 = self.rng.gen();
        // u == 0.0 maps to +inf, which the saturating cast then clamps.
        let level = (-u.ln() * self.ml) as usize;
        level.min(config::MAX_LAYER)
    }
}
