use candle_core::Tensor;

use crate::{error::Result, model::layer_shape::ConvShape};

/// Convolution with an explicitly supplied kernel `(out, in, kh, kw)` and bias `(out,)`.
/// Only stride and padding are read from the layer spec.
pub fn conv2d(x: &Tensor, weight: &Tensor, bias: &Tensor, shape: &ConvShape) -> Result<Tensor> {
    let out = x.conv2d(weight, shape.padding, shape.stride, 1, 1)?;
    add_channel_bias(&out, bias)
}

/// Transposed convolution with kernel `(in, out, kh, kw)` and bias `(out,)`.
pub fn conv_transpose2d(x: &Tensor, weight: &Tensor, bias: &Tensor, shape: &ConvShape) -> Result<Tensor> {
    let out = x.conv_transpose2d(weight, shape.padding, 0, shape.stride, 1)?;
    add_channel_bias(&out, bias)
}

fn add_channel_bias(out: &Tensor, bias: &Tensor) -> Result<Tensor> {
    let channels = bias.dims1()?;
    Ok(out.broadcast_add(&bias.reshape((1, channels, 1, 1))?)?)
}
