//! Batch normalisation over the channel axis (dimension 1).
//!
//! Statistics reduce over every other dimension, so the same routine serves
//! `(N, C)`, `(N, C, L)` and `(N, C, H, W)` inputs. Running statistics are held
//! in [`Var`] storage purely so they can be overwritten in place; they are always
//! read detached and never become part of the autograd graph.

use candle_core::{Tensor, Var};

use crate::error::{LearnerError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchNormOptions {
    pub momentum: f64,
    pub eps: f64,
    pub training: bool,
}

pub fn batch_norm(
    x: &Tensor,
    weight: &Tensor,
    bias: &Tensor,
    running_mean: &Var,
    running_var: &Var,
    options: BatchNormOptions,
) -> Result<Tensor> {
    let channels = x.dim(1)?;
    let mut stat_shape = vec![1usize; x.rank()];
    stat_shape[1] = channels;

    let (mean, var) = if options.training {
        let per_channel = x.elem_count() / channels.max(1);
        if per_channel < 2 {
            return Err(LearnerError::InvalidInput {
                kind: "bn",
                reason: format!(
                    "expected more than 1 value per channel when training, got input {:?}",
                    x.dims()
                ),
            });
        }

        let (mean, var, count) = batch_statistics(x)?;
        update_running_stats(running_mean, running_var, &mean, &var, count, options.momentum)?;
        (mean, var)
    } else {
        (running_mean.as_tensor().detach(), running_var.as_tensor().detach())
    };

    let inv_std = (var + options.eps)?.sqrt()?.recip()?;
    let normalized = x
        .broadcast_sub(&mean.reshape(stat_shape.clone())?)?
        .broadcast_mul(&inv_std.reshape(stat_shape.clone())?)?;

    Ok(normalized
        .broadcast_mul(&weight.reshape(stat_shape.clone())?)?
        .broadcast_add(&bias.reshape(stat_shape)?)?)
}

// Per-channel mean and biased variance, plus the number of values each was taken over
fn batch_statistics(x: &Tensor) -> Result<(Tensor, Tensor, usize)> {
    let per_channel = x.transpose(0, 1)?.contiguous()?.flatten_from(1)?;
    let count = per_channel.dim(1)?;

    let mean = per_channel.mean_keepdim(1)?;
    let var = per_channel.broadcast_sub(&mean)?.sqr()?.mean_keepdim(1)?;

    Ok((mean.flatten_all()?, var.flatten_all()?, count))
}

fn update_running_stats(
    running_mean: &Var,
    running_var: &Var,
    mean: &Tensor,
    var: &Tensor,
    count: usize,
    momentum: f64,
) -> Result<()> {
    // Running variance tracks the unbiased estimate, count is at least 2 here
    let correction = count as f64 / (count - 1) as f64;
    let unbiased = (var.detach() * correction)?;

    let new_mean = ((running_mean.as_tensor().detach() * (1.0 - momentum))?
        + (mean.detach() * momentum)?)?;
    let new_var = ((running_var.as_tensor().detach() * (1.0 - momentum))?
        + (unbiased * momentum)?)?;

    running_mean.set(&new_mean)?;
    running_var.set(&new_var)?;
    Ok(())
}
