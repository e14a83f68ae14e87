use candle_core::Tensor;

use crate::error::Result;

pub fn relu(x: &Tensor) -> Result<Tensor> {
    Ok(x.relu()?)
}

// relu(x) - slope * relu(-x), valid for any slope
pub fn leaky_relu(x: &Tensor, negative_slope: f64) -> Result<Tensor> {
    let positive = x.relu()?;
    let negative = x.neg()?.relu()?;
    Ok((positive - (negative * negative_slope)?)?)
}

pub fn tanh(x: &Tensor) -> Result<Tensor> {
    Ok(x.tanh()?)
}

// Fused op, its gradient stays finite when saturated
pub fn sigmoid(x: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::sigmoid(x)?)
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Var};

    use super::*;

    fn values(t: &Tensor) -> Vec<f32> {
        t.to_vec1::<f32>().unwrap()
    }

    #[test]
    fn leaky_relu_scales_negatives_only() {
        let x = Tensor::new(&[-1.0f32, 0.0, 2.0], &Device::Cpu).unwrap();
        let out = values(&leaky_relu(&x, 0.1).unwrap());

        assert!((out[0] + 0.1).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 2.0);
    }

    #[test]
    fn sigmoid_is_centred_at_half() {
        let x = Tensor::new(&[0.0f32, 100.0, -100.0], &Device::Cpu).unwrap();
        let out = values(&sigmoid(&x).unwrap());

        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!(out[2].abs() < 1e-6);
    }

    #[test]
    fn relu_and_tanh_are_pointwise() {
        let x = Tensor::new(&[-2.0f32, 0.5], &Device::Cpu).unwrap();

        assert_eq!(values(&relu(&x).unwrap()), vec![0.0, 0.5]);
        let t = values(&tanh(&x).unwrap());
        assert!((t[1] - 0.5f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn saturated_sigmoid_has_finite_gradients() {
        let x = Var::new(&[-100.0f32, 0.0, 100.0], &Device::Cpu).unwrap();
        let grads = sigmoid(x.as_tensor()).unwrap().sum_all().unwrap().backward().unwrap();
        let dx = values(grads.get(x.as_tensor()).unwrap());

        assert!(dx.iter().all(|v| v.is_finite()));
        assert!(dx[0].abs() < 1e-6);
        assert!((dx[1] - 0.25).abs() < 1e-6);
        assert!(dx[2].abs() < 1e-6);
    }

    #[test]
    fn leaky_relu_gradient_uses_slope() {
        let x = Var::new(&[-2.0f32, 3.0], &Device::Cpu).unwrap();
        let grads = leaky_relu(x.as_tensor(), 0.2).unwrap().sum_all().unwrap().backward().unwrap();
        let dx = values(grads.get(x.as_tensor()).unwrap());

        assert!((dx[0] - 0.2).abs() < 1e-6);
        assert!((dx[1] - 1.0).abs() < 1e-6);
    }
}
