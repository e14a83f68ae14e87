#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TensorDesc {
    // Biases, bn scale/shift and running statistics
    Vector { length: usize },

    // Linear layer weights, (out_features, in_features)
    Matrix { rows: usize, cols: usize },

    // Convolution kernels. For conv2d this is (out, in, kh, kw), for convt2d (in, out, kh, kw)
    Tensor4D {
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
    },
}

impl TensorDesc {
    pub fn new_vector(length: usize) -> Self {
        Self::Vector { length }
    }

    pub fn new_matrix(rows: usize, cols: usize) -> Self {
        Self::Matrix { rows, cols }
    }

    pub fn new_tensor4d(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self::Tensor4D { batch, channels, height, width }
    }

    pub fn num_elements(&self) -> usize {
        match &self {
            Self::Vector { length } => *length,
            Self::Matrix { rows, cols } => rows * cols,
            Self::Tensor4D { batch, channels, height, width } =>
                batch * channels * height * width,
        }
    }

    /// (fan_in, fan_out) the way the runtime computes them: dimension 1 feeds
    /// fan_in and dimension 0 feeds fan_out, both scaled by the receptive field.
    pub fn fans(&self) -> (usize, usize) {
        match &self {
            Self::Vector { length } => (1, *length),
            Self::Matrix { rows, cols } => (*cols, *rows),
            Self::Tensor4D { batch, channels, height, width } => {
                let receptive_field = height * width;
                (channels * receptive_field, batch * receptive_field)
            }
        }
    }

    pub fn to_dims(&self) -> Vec<usize> {
        match &self {
            Self::Vector { length } => vec![*length],
            Self::Matrix { rows, cols } => vec![*rows, *cols],
            Self::Tensor4D { batch, channels, height, width } =>
                vec![*batch, *channels, *height, *width],
        }
    }
}
