use candle_core::Tensor;

use crate::{
    error::{LearnerError, Result},
    model::layer_shape::PoolShape,
};

#[derive(Clone, Copy)]
enum Pool {
    Max,
    Avg,
}

pub fn max_pool2d(x: &Tensor, shape: &PoolShape) -> Result<Tensor> {
    // Padded cells must never win the max
    let x = pad_spatial(x, shape.padding, f64::NEG_INFINITY)?;
    pool(&x, shape, Pool::Max)
}

// Zero padding is counted in the average
pub fn avg_pool2d(x: &Tensor, shape: &PoolShape) -> Result<Tensor> {
    let x = pad_spatial(x, shape.padding, 0.0)?;
    pool(&x, shape, Pool::Avg)
}

pub fn upsample_nearest(x: &Tensor, scale: usize) -> Result<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    Ok(x.upsample_nearest2d(h * scale, w * scale)?)
}

fn pool(x: &Tensor, shape: &PoolShape, kind: Pool) -> Result<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    if shape.kernel == 0 || shape.stride == 0 || shape.kernel > h || shape.kernel > w {
        return Err(LearnerError::InvalidInput {
            kind: match kind {
                Pool::Max => "max_pool2d",
                Pool::Avg => "avg_pool2d",
            },
            reason: format!(
                "kernel {} with stride {} does not fit a {}x{} padded input",
                shape.kernel, shape.stride, h, w
            ),
        });
    }

    // The runtime's pooling kernels only have a backward pass for disjoint windows
    if shape.kernel == shape.stride {
        return Ok(match kind {
            Pool::Max => x.max_pool2d_with_stride(shape.kernel, shape.stride)?,
            Pool::Avg => x.avg_pool2d_with_stride(shape.kernel, shape.stride)?,
        });
    }

    let windows = strided_windows(x, shape.kernel, shape.stride)?;
    Ok(match kind {
        Pool::Max => windows.max(4)?,
        Pool::Avg => windows.mean(4)?,
    })
}

// Every kernel offset gathered into a trailing axis: (N, C, out_h, out_w, k*k)
fn strided_windows(x: &Tensor, kernel: usize, stride: usize) -> Result<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let out_h = (h - kernel) / stride + 1;
    let out_w = (w - kernel) / stride + 1;

    let mut windows = Vec::with_capacity(kernel * kernel);
    for di in 0..kernel {
        let rows = Tensor::arange_step(di as u32, (di + out_h * stride) as u32, stride as u32, x.device())?;
        let picked_rows = x.index_select(&rows, 2)?;

        for dj in 0..kernel {
            let cols = Tensor::arange_step(dj as u32, (dj + out_w * stride) as u32, stride as u32, x.device())?;
            windows.push(picked_rows.index_select(&cols, 3)?);
        }
    }

    Ok(Tensor::stack(&windows, 4)?)
}

fn pad_spatial(x: &Tensor, padding: usize, value: f64) -> Result<Tensor> {
    if padding == 0 {
        return Ok(x.clone());
    }

    let mut padded = x.clone();
    for dim in [2, 3] {
        let mut dims = padded.dims().to_vec();
        dims[dim] = padding;
        let pad = Tensor::full(value, dims, padded.device())?.to_dtype(padded.dtype())?;
        padded = Tensor::cat(&[&pad, &padded, &pad], dim)?;
    }
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device, Var};

    use super::*;

    fn grid() -> Tensor {
        Tensor::new(&[[[[1.0f32, 2.0], [3.0, 4.0]]]], &Device::Cpu).unwrap()
    }

    #[test]
    fn padded_max_pool_ignores_padding() {
        let shape = PoolShape { kernel: 2, stride: 2, padding: 1 };
        let out = max_pool2d(&grid(), &shape).unwrap();

        assert_eq!(out.dims(), &[1, 1, 2, 2]);
        assert_eq!(
            out.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn padded_avg_pool_counts_zeros() {
        let x = Tensor::ones((1, 1, 2, 2), DType::F32, &Device::Cpu).unwrap();
        let shape = PoolShape { kernel: 2, stride: 2, padding: 1 };
        let out = avg_pool2d(&x, &shape).unwrap();

        assert_eq!(out.flatten_all().unwrap().to_vec1::<f32>().unwrap(), vec![0.25; 4]);
    }

    #[test]
    fn unpadded_max_pool_halves_spatial_dims() {
        let x = Tensor::arange(0f32, 16.0, &Device::Cpu).unwrap().reshape((1, 1, 4, 4)).unwrap();
        let out = max_pool2d(&x, &PoolShape::new(2)).unwrap();

        assert_eq!(
            out.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![5.0, 7.0, 13.0, 15.0]
        );
    }

    #[test]
    fn nearest_upsample_repeats_pixels() {
        let x = Tensor::new(&[[[[1.0f32, 2.0]]]], &Device::Cpu).unwrap();
        let out = upsample_nearest(&x, 2).unwrap();

        assert_eq!(out.dims(), &[1, 1, 2, 4]);
        assert_eq!(
            out.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]
        );
    }

    #[test]
    fn overlapping_max_pool_matches_windows() {
        let x = Tensor::arange(0f32, 16.0, &Device::Cpu).unwrap().reshape((1, 1, 4, 4)).unwrap();
        let shape = PoolShape { kernel: 3, stride: 1, padding: 0 };
        let out = max_pool2d(&x, &shape).unwrap();

        assert_eq!(out.dims(), &[1, 1, 2, 2]);
        assert_eq!(
            out.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![10.0, 11.0, 14.0, 15.0]
        );
    }

    #[test]
    fn overlapping_avg_pool_with_padding() {
        let x = Tensor::ones((1, 1, 3, 3), DType::F32, &Device::Cpu).unwrap();
        let shape = PoolShape { kernel: 3, stride: 2, padding: 1 };
        let out = avg_pool2d(&x, &shape).unwrap();

        // each corner window covers four real cells out of nine
        assert_eq!(out.dims(), &[1, 1, 2, 2]);
        let out = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(out.iter().all(|v| (v - 4.0 / 9.0).abs() < 1e-6));
    }

    #[test]
    fn overlapping_pools_backpropagate() {
        let x = Var::from_tensor(
            &Tensor::arange(0f32, 25.0, &Device::Cpu).unwrap().reshape((1, 1, 5, 5)).unwrap()
        ).unwrap();
        let shape = PoolShape { kernel: 3, stride: 2, padding: 1 };

        let max = max_pool2d(x.as_tensor(), &shape).unwrap().sum_all().unwrap();
        let grads = max.backward().unwrap();
        let dx = grads.get(x.as_tensor()).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        // 3x3 outputs, each routes its gradient to a single maximum
        assert_eq!(dx.iter().sum::<f32>(), 9.0);
        assert_eq!(dx[24], 1.0);

        let avg = avg_pool2d(x.as_tensor(), &PoolShape { kernel: 3, stride: 1, padding: 1 })
            .unwrap()
            .sum_all()
            .unwrap();
        let grads = avg.backward().unwrap();
        let dx = grads.get(x.as_tensor()).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        // the centre cell sits in all nine windows
        assert!((dx[12] - 1.0).abs() < 1e-6);
        assert!(dx.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn window_larger_than_input_is_rejected() {
        let shape = PoolShape { kernel: 3, stride: 1, padding: 0 };
        assert!(matches!(
            max_pool2d(&grid(), &shape),
            Err(LearnerError::InvalidInput { kind: "max_pool2d", .. })
        ));
    }
}
