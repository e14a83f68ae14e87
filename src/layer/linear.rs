use candle_core::Tensor;

use crate::error::Result;

/// `x · weightᵀ + bias` with weight `(out, in)` and bias `(out,)`.
pub fn linear(x: &Tensor, weight: &Tensor, bias: &Tensor) -> Result<Tensor> {
    let w_t = weight.t()?;
    let out = match x.rank() {
        2 => x.matmul(&w_t)?,
        _ => x.broadcast_matmul(&w_t)?,
    };
    Ok(out.broadcast_add(bias)?)
}
