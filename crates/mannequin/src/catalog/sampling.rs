//! Shape parameter sampling for catalog generation.

use std::f32::consts::TAU;

use mannequin_mesh::{Betas, NUM_BETAS};
use serde::{Deserialize, Serialize};

/// Adds normally distributed noise to one shape component on a subset of catalog entries.
///
/// Entry `i` is affected if `i % every == offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryVariation {
    pub component: usize,
    pub every: usize,
    pub offset: usize,
    pub std_dev: f32,
}

impl SecondaryVariation {
    fn applies_to(&self, index: usize) -> bool {
        self.every > 0 && index % self.every == self.offset
    }
}

/// Describes how the shape parameters of a catalog are chosen.
///
/// The primary component (overall size) is spread evenly over `primary_range`, from thin to
/// heavy builds. Secondary components get sparse random variation to diversify the catalog
/// without sampling every combination. All randomness comes from `seed`, so a schedule always
/// produces the same catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSchedule {
    pub primary_range: (f32, f32),
    pub seed: u64,
    pub variations: Vec<SecondaryVariation>,
}

impl Default for SamplingSchedule {
    /// Height variation on every 3rd entry, torso length on every 4th, upper/lower body
    /// proportion on every 5th.
    fn default() -> Self {
        let variation = |component, every, offset, std_dev| SecondaryVariation {
            component,
            every,
            offset,
            std_dev,
        };
        Self {
            primary_range: (-2.5, 2.5),
            seed: 7,
            variations: vec![
                variation(1, 3, 1, 0.5),
                variation(2, 4, 2, 0.3),
                variation(3, 5, 3, 0.3),
            ],
        }
    }
}

impl SamplingSchedule {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Samples `count` shape parameter vectors.
    pub fn sample(&self, count: usize) -> Vec<Betas> {
        let mut rng = fastrand::Rng::with_seed(self.seed);
        let (start, end) = self.primary_range;
        let step = if count > 1 {
            (end - start) / (count - 1) as f32
        } else {
            0.0
        };

        (0..count)
            .map(|i| {
                let mut betas = [0.0; NUM_BETAS];
                betas[0] = if i + 1 == count && count > 1 {
                    end
                } else {
                    start + step * i as f32
                };
                for var in &self.variations {
                    if !var.applies_to(i) {
                        continue;
                    }
                    match betas.get_mut(var.component) {
                        Some(beta) => *beta = normal(&mut rng) * var.std_dev,
                        None => log::warn!(
                            "ignoring variation of shape component {} (only {NUM_BETAS} exist)",
                            var.component
                        ),
                    }
                }
                betas
            })
            .collect()
    }
}

/// Draws a standard normal sample using the Box-Muller transform.
fn normal(rng: &mut fastrand::Rng) -> f32 {
    // `1 - f32()` is in (0, 1], so the logarithm stays finite.
    let u1 = 1.0 - rng.f32();
    let u2 = rng.f32();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}
