use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::{LearnerError, Result};

use super::tensor_desc::TensorDesc;

// NOTE: The most optimal value depends on each machine. This will serve as a general value for now
pub const PARALLEL_THRESHOLD: usize = 10_000;
const PARALLEL_CHUNK: usize = 4_096;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    He,                 // Good for ReLU activation, std = sqrt(2 / fan_in)
    HeFanOut,           // std = sqrt(2 / fan_out)
    XavierNormal,       // std = sqrt(2 / (fan_in + fan_out))
    LeCun,              // Good for SELU activation
    UniformRandom {     // Simple uniform random in range
        min: f32,
        max: f32,
    },
    Constant(f32),
}

impl Default for WeightInit {
    fn default() -> Self {
        WeightInit::He
    }
}

impl WeightInit {
    // Box-Muller transform to generate normal distribution
    fn normal_sample<R: Rng>(rng: &mut R, mean: f32, std_dev: f32) -> f32 {
        // Lower bound keeps ln() finite
        let uniform = Uniform::new(f32::MIN_POSITIVE, 1.0);

        let u1 = uniform.sample(rng);
        let u2 = uniform.sample(rng);

        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }

    /// Rejects ranges the uniform sampler cannot draw from.
    pub fn validate(&self) -> Result<()> {
        match self {
            WeightInit::UniformRandom { min, max } if !(min.is_finite() && max.is_finite() && min < max) => {
                Err(LearnerError::InvalidConfig(format!(
                    "UniformRandom needs finite bounds with min < max, got [{}, {})",
                    min, max
                )))
            }
            WeightInit::Constant(value) if !value.is_finite() => Err(LearnerError::InvalidConfig(
                format!("Constant init must be finite, got {}", value)
            )),
            _ => Ok(()),
        }
    }

    fn std_dev(&self, desc: &TensorDesc) -> Option<f32> {
        let (fan_in, fan_out) = desc.fans();

        match self {
            WeightInit::He => Some((2.0 / fan_in.max(1) as f32).sqrt()),
            WeightInit::HeFanOut => Some((2.0 / fan_out.max(1) as f32).sqrt()),
            WeightInit::XavierNormal => Some((2.0 / (fan_in + fan_out).max(1) as f32).sqrt()),
            WeightInit::LeCun => Some((1.0 / fan_in.max(1) as f32).sqrt()),
            WeightInit::UniformRandom { .. } | WeightInit::Constant(_) => None,
        }
    }

    fn fill<R: Rng>(&self, std_dev: Option<f32>, out: &mut [f32], rng: &mut R) {
        match (self, std_dev) {
            (WeightInit::UniformRandom { min, max }, _) => {
                let dist = Uniform::new(*min, *max);
                out.iter_mut().for_each(|v| *v = dist.sample(rng));
            },
            (WeightInit::Constant(value), _) => out.fill(*value),
            (_, Some(std_dev)) => {
                out.iter_mut().for_each(|v| *v = Self::normal_sample(rng, 0.0, std_dev));
            },
            (_, None) => out.fill(0.0),
        }
    }

    pub fn init(&self, desc: &TensorDesc, rng: &mut StdRng) -> Result<Vec<f32>> {
        self.validate()?;

        let total_elements = desc.num_elements();
        let std_dev = self.std_dev(desc);
        let mut data = vec![0.0f32; total_elements];

        if total_elements < PARALLEL_THRESHOLD {
            self.fill(std_dev, &mut data, rng);
        } else {
            self.par_fill(std_dev, &mut data, rng.gen());
        }

        Ok(data)
    }

    // Each chunk gets its own generator seeded from `base_seed`, so results only
    // depend on the caller's rng and never on thread scheduling
    fn par_fill(&self, std_dev: Option<f32>, data: &mut [f32], base_seed: u64) {
        data.par_chunks_mut(PARALLEL_CHUNK)
            .enumerate()
            .for_each(|(chunk_idx, chunk)| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(chunk_idx as u64));
                self.fill(std_dev, chunk, &mut rng);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_std(data: &[f32]) -> f32 {
        let mean = data.iter().sum::<f32>() / data.len() as f32;
        let variance = data.iter()
            .map(|&x| (x - mean).powi(2))
            .sum::<f32>() / data.len() as f32;
        variance.sqrt()
    }

    #[test]
    fn he_scales_with_fan_in() {
        let desc = TensorDesc::new_matrix(64, 200);
        let mut rng = StdRng::seed_from_u64(7);
        let data = WeightInit::He.init(&desc, &mut rng).unwrap();

        assert_eq!(data.len(), 64 * 200);
        let expected = (2.0f32 / 200.0).sqrt();
        assert!((sample_std(&data) - expected).abs() < expected * 0.1);
    }

    #[test]
    fn parallel_fill_is_deterministic_for_a_seed() {
        let desc = TensorDesc::new_tensor4d(64, 32, 3, 3);
        assert!(desc.num_elements() >= PARALLEL_THRESHOLD);

        let a = WeightInit::He.init(&desc, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = WeightInit::He.init(&desc, &mut StdRng::seed_from_u64(42)).unwrap();
        let c = WeightInit::He.init(&desc, &mut StdRng::seed_from_u64(43)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn constant_and_uniform_ignore_fans() {
        let desc = TensorDesc::new_vector(16);
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(WeightInit::Constant(0.5).init(&desc, &mut rng).unwrap(), vec![0.5; 16]);

        let data = WeightInit::UniformRandom { min: -0.1, max: 0.1 }.init(&desc, &mut rng).unwrap();
        assert!(data.iter().all(|&v| (-0.1..0.1).contains(&v)));
    }

    #[test]
    fn strategy_loads_from_json() {
        let init: WeightInit = serde_json::from_str(r#"{"UniformRandom":{"min":-1.0,"max":1.0}}"#).unwrap();
        assert_eq!(init, WeightInit::UniformRandom { min: -1.0, max: 1.0 });
        assert_eq!(serde_json::to_string(&WeightInit::He).unwrap(), "\"He\"");
    }

    #[test]
    fn degenerate_uniform_range_is_an_error() {
        let desc = TensorDesc::new_vector(4);
        let mut rng = StdRng::seed_from_u64(0);

        for init in [
            WeightInit::UniformRandom { min: 0.5, max: 0.5 },
            WeightInit::UniformRandom { min: 1.0, max: -1.0 },
            WeightInit::UniformRandom { min: f32::NAN, max: 1.0 },
            WeightInit::Constant(f32::INFINITY),
        ] {
            assert!(matches!(init.init(&desc, &mut rng), Err(LearnerError::InvalidConfig(_))));
        }
    }
}
