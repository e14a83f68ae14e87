use candle_core::{DType, Device};

use crate::{error::{LearnerError, Result}, model::weight_init::WeightInit};

#[derive(Clone, Debug)]
pub struct LearnerConfig {
    pub weight_init: WeightInit,
    pub bn_momentum: f64,
    pub bn_eps: f64,
    // None seeds from OS entropy
    pub seed: Option<u64>,
    pub device: Device,
    pub dtype: DType,
}

impl LearnerConfig {
    pub fn build(self) -> Result<Self> {
        check_batch_norm(self.bn_momentum, self.bn_eps)?;
        self.weight_init.validate()?;

        if !self.dtype.is_float() {
            return Err(LearnerError::InvalidConfig(
                format!("Parameters must use a float dtype, got {:?}", self.dtype)
            ));
        }

        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            weight_init: WeightInit::He,
            bn_momentum: 0.1,
            bn_eps: 1e-5,
            seed: None,
            device: Device::Cpu,
            dtype: DType::F32,
        }
    }
}

fn check_batch_norm(momentum: f64, eps: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&momentum) {
        return Err(LearnerError::InvalidConfig(
            format!("bn_momentum must be within [0, 1], got {}", momentum)
        ));
    }
    if eps <= 0.0 || !eps.is_finite() {
        return Err(LearnerError::InvalidConfig(
            format!("bn_eps must be a positive finite value, got {}", eps)
        ));
    }
    Ok(())
}
