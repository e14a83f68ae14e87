use std::collections::HashMap;

use candle_core::{backprop::GradStore, Tensor, TensorId};

use crate::error::Result;

/// Accumulated gradients keyed by tensor identity.
///
/// The runtime hands gradients back as a [`GradStore`] from `backward()` instead
/// of attaching them to tensors, so buffers live here. Any tensor can own a
/// buffer, including entries of caller-built adapted parameter lists.
#[derive(Debug, Default)]
pub struct GradientBuffers {
    buffers: HashMap<TensorId, Tensor>,
}

impl GradientBuffers {
    pub fn new() -> Self {
        Self { buffers: HashMap::new() }
    }

    /// Adds each parameter's gradient from `grads` into its buffer, creating the
    /// buffer on first use. Returns how many buffers were touched.
    pub fn accumulate(&mut self, params: &[Tensor], grads: &GradStore) -> Result<usize> {
        let mut touched = 0;

        for param in params {
            let Some(grad) = grads.get(param) else {
                continue;
            };
            let grad = grad.detach();

            let summed = match self.buffers.remove(&param.id()) {
                Some(existing) => (existing + grad)?,
                None => grad,
            };
            self.buffers.insert(param.id(), summed);
            touched += 1;
        }

        Ok(touched)
    }

    pub fn get(&self, param: &Tensor) -> Option<&Tensor> {
        self.buffers.get(&param.id())
    }

    /// Zeroes existing buffers for `params`. Parameters without a buffer are skipped.
    pub fn zero(&mut self, params: &[Tensor]) -> Result<usize> {
        let mut zeroed = 0;

        for param in params {
            if let Some(buffer) = self.buffers.get_mut(&param.id()) {
                *buffer = buffer.zeros_like()?;
                zeroed += 1;
            }
        }

        Ok(zeroed)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Var};

    use super::*;

    #[test]
    fn accumulates_across_backward_passes_then_zeroes() {
        let dev = Device::Cpu;
        let w = Var::new(&[1.0f32, 2.0], &dev).unwrap();
        let untouched = Var::new(&[5.0f32], &dev).unwrap();
        let params = vec![w.as_tensor().clone(), untouched.as_tensor().clone()];
        let mut buffers = GradientBuffers::new();

        for _ in 0..2 {
            let loss = w.as_tensor().sqr().unwrap().sum_all().unwrap();
            let grads = loss.backward().unwrap();
            assert_eq!(buffers.accumulate(&params, &grads).unwrap(), 1);
        }

        // d/dw sum(w^2) = 2w, accumulated twice
        let grad = buffers.get(w.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(grad, vec![4.0, 8.0]);
        assert!(buffers.get(untouched.as_tensor()).is_none());

        assert_eq!(buffers.zero(&params).unwrap(), 1);
        let grad = buffers.get(w.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(grad, vec![0.0, 0.0]);
        assert!(buffers.get(untouched.as_tensor()).is_none());
        assert_eq!(buffers.len(), 1);

        buffers.clear();
        assert!(buffers.is_empty());
        assert!(buffers.get(w.as_tensor()).is_none());
    }
}
