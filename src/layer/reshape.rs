use candle_core::Tensor;

use crate::error::Result;

/// Collapses every dimension after the batch dimension.
pub fn flatten(x: &Tensor) -> Result<Tensor> {
    Ok(x.flatten_from(1)?)
}

/// Reshapes the non-batch dimensions to `dims`. A single `-1` is inferred from
/// the per-sample element count; anything that does not fit is left for the
/// tensor runtime to reject.
pub fn reshape(x: &Tensor, dims: &[isize]) -> Result<Tensor> {
    let batch = x.dim(0)?;
    let per_sample = x.elem_count().checked_div(batch).unwrap_or(0);
    let known: usize = dims.iter()
        .filter(|&&d| d > 0)
        .map(|&d| d as usize)
        .product();

    let mut target = Vec::with_capacity(dims.len() + 1);
    target.push(batch);
    target.extend(dims.iter().map(|&d| {
        if d < 0 {
            per_sample / known.max(1)
        } else {
            d as usize
        }
    }));

    Ok(x.reshape(target)?)
}
