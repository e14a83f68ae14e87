use std::fmt;

use serde_json::Value;

use crate::error::{LearnerError, Result};

use super::{layer_shape::{ConvShape, PoolShape}, tensor_desc::TensorDesc};

/// One entry of an architecture descriptor.
///
/// Parameter-bearing kinds (`Conv2D`, `ConvTranspose2D`, `Linear`, `BatchNorm`)
/// each own two consecutive slots of the flat parameter list. `BatchNorm` also
/// owns two consecutive slots of the running statistics list. Every other kind
/// owns nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerSpec {
    Conv2D(ConvShape),
    ConvTranspose2D(ConvShape),
    Linear {
        in_features: usize,
        out_features: usize,
    },
    BatchNorm {
        num_features: usize,
    },
    ReLU,
    LeakyReLU(f64),
    Tanh,
    Sigmoid,
    Upsample(usize),
    MaxPool2D(PoolShape),
    AvgPool2D(PoolShape),
    Flatten,
    // Non-batch target dims, at most one of them may be -1
    Reshape(Vec<isize>),
    Dropout,
}

impl LayerSpec {
    pub fn conv2d(in_channels: usize, out_channels: usize) -> Self {
        LayerSpec::Conv2D(ConvShape::new(in_channels, out_channels))
    }

    pub fn conv2d_with(
        in_channels: usize,
        out_channels: usize,
        kernel_h: usize,
        kernel_w: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        LayerSpec::Conv2D(ConvShape {
            in_channels,
            out_channels,
            kernel_h,
            kernel_w,
            stride,
            padding,
        })
    }

    pub fn conv_transpose2d_with(
        in_channels: usize,
        out_channels: usize,
        kernel_h: usize,
        kernel_w: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        LayerSpec::ConvTranspose2D(ConvShape {
            in_channels,
            out_channels,
            kernel_h,
            kernel_w,
            stride,
            padding,
        })
    }

    pub fn linear(in_features: usize, out_features: usize) -> Self {
        LayerSpec::Linear { in_features, out_features }
    }

    pub fn batch_norm(num_features: usize) -> Self {
        LayerSpec::BatchNorm { num_features }
    }

    pub fn leaky_relu(negative_slope: f64) -> Self {
        LayerSpec::LeakyReLU(negative_slope)
    }

    pub fn max_pool2d(kernel: usize, stride: usize, padding: usize) -> Self {
        LayerSpec::MaxPool2D(PoolShape { kernel, stride, padding })
    }

    pub fn avg_pool2d(kernel: usize, stride: usize, padding: usize) -> Self {
        LayerSpec::AvgPool2D(PoolShape { kernel, stride, padding })
    }

    pub fn reshape(dims: Vec<isize>) -> Self {
        LayerSpec::Reshape(dims)
    }

    /// The tag this kind uses in string-tagged descriptors.
    pub fn name(&self) -> &'static str {
        match self {
            LayerSpec::Conv2D(_) => "conv2d",
            LayerSpec::ConvTranspose2D(_) => "convt2d",
            LayerSpec::Linear { .. } => "linear",
            LayerSpec::BatchNorm { .. } => "bn",
            LayerSpec::ReLU => "relu",
            LayerSpec::LeakyReLU(_) => "leakyrelu",
            LayerSpec::Tanh => "tanh",
            LayerSpec::Sigmoid => "sigmoid",
            LayerSpec::Upsample(_) => "upsample",
            LayerSpec::MaxPool2D(_) => "max_pool2d",
            LayerSpec::AvgPool2D(_) => "avg_pool2d",
            LayerSpec::Flatten => "flatten",
            LayerSpec::Reshape(_) => "reshape",
            LayerSpec::Dropout => "dropout",
        }
    }

    pub fn requires_parameters(&self) -> bool {
        self.parameter_shapes().is_some()
    }

    pub fn has_running_stats(&self) -> bool {
        matches!(self, LayerSpec::BatchNorm { .. })
    }

    /// Shapes of the (weight, bias) pair this layer contributes to the parameter list.
    pub fn parameter_shapes(&self) -> Option<(TensorDesc, TensorDesc)> {
        match self {
            LayerSpec::Conv2D(shape) => Some((
                TensorDesc::new_tensor4d(
                    shape.out_channels,
                    shape.in_channels,
                    shape.kernel_h,
                    shape.kernel_w,
                ),
                TensorDesc::new_vector(shape.out_channels),
            )),
            LayerSpec::ConvTranspose2D(shape) => Some((
                TensorDesc::new_tensor4d(
                    shape.in_channels,
                    shape.out_channels,
                    shape.kernel_h,
                    shape.kernel_w,
                ),
                TensorDesc::new_vector(shape.out_channels),
            )),
            LayerSpec::Linear { in_features, out_features } => Some((
                TensorDesc::new_matrix(*out_features, *in_features),
                TensorDesc::new_vector(*out_features),
            )),
            LayerSpec::BatchNorm { num_features } => Some((
                TensorDesc::new_vector(*num_features),
                TensorDesc::new_vector(*num_features),
            )),
            LayerSpec::ReLU
            | LayerSpec::LeakyReLU(_)
            | LayerSpec::Tanh
            | LayerSpec::Sigmoid
            | LayerSpec::Upsample(_)
            | LayerSpec::MaxPool2D(_)
            | LayerSpec::AvgPool2D(_)
            | LayerSpec::Flatten
            | LayerSpec::Reshape(_)
            | LayerSpec::Dropout => None,
        }
    }

    /// Number of scalars in this layer's weight and bias.
    pub fn parameter_count(&self) -> usize {
        self.parameter_shapes()
            .map(|(w, b)| w.num_elements() + b.num_elements())
            .unwrap_or(0)
    }

    /// Parses one `(name, params)` entry of a string-tagged descriptor.
    ///
    /// Booleans are accepted wherever a number is (the `inplace` flags of
    /// `relu` and `leakyrelu` arrive that way) and trailing values a kind does
    /// not use are ignored.
    pub fn from_tagged(index: usize, name: &str, params: &[Value]) -> Result<Self> {
        let p = TaggedParams { index, kind: name, params };

        let spec = match name {
            "conv2d" => LayerSpec::Conv2D(ConvShape {
                out_channels: p.usize_at(0)?,
                in_channels: p.usize_at(1)?,
                kernel_h: p.usize_at(2)?,
                kernel_w: p.usize_at(3)?,
                stride: p.usize_at(4)?,
                padding: p.usize_at(5)?,
            }),
            "convt2d" => LayerSpec::ConvTranspose2D(ConvShape {
                in_channels: p.usize_at(0)?,
                out_channels: p.usize_at(1)?,
                kernel_h: p.usize_at(2)?,
                kernel_w: p.usize_at(3)?,
                stride: p.usize_at(4)?,
                padding: p.usize_at(5)?,
            }),
            "linear" => LayerSpec::Linear {
                out_features: p.usize_at(0)?,
                in_features: p.usize_at(1)?,
            },
            "bn" => LayerSpec::BatchNorm { num_features: p.usize_at(0)? },
            "relu" => LayerSpec::ReLU,
            "leakyrelu" => LayerSpec::LeakyReLU(p.f64_at(0)?),
            "tanh" => LayerSpec::Tanh,
            "sigmoid" => LayerSpec::Sigmoid,
            "upsample" => LayerSpec::Upsample(p.usize_at(0)?),
            "max_pool2d" => LayerSpec::MaxPool2D(p.pool_shape()?),
            "avg_pool2d" => LayerSpec::AvgPool2D(p.pool_shape()?),
            "flatten" => LayerSpec::Flatten,
            "reshape" => LayerSpec::Reshape(p.dims()?),
            "dropout" => LayerSpec::Dropout,
            _ => {
                return Err(LearnerError::UnsupportedLayerKind {
                    index,
                    kind: name.to_string(),
                })
            }
        };

        Ok(spec)
    }

    /// Inverse of [`LayerSpec::from_tagged`].
    pub fn tagged_params(&self) -> Vec<Value> {
        match self {
            LayerSpec::Conv2D(s) => vec![
                s.out_channels.into(), s.in_channels.into(), s.kernel_h.into(),
                s.kernel_w.into(), s.stride.into(), s.padding.into(),
            ],
            LayerSpec::ConvTranspose2D(s) => vec![
                s.in_channels.into(), s.out_channels.into(), s.kernel_h.into(),
                s.kernel_w.into(), s.stride.into(), s.padding.into(),
            ],
            LayerSpec::Linear { in_features, out_features } => {
                vec![(*out_features).into(), (*in_features).into()]
            }
            LayerSpec::BatchNorm { num_features } => vec![(*num_features).into()],
            LayerSpec::LeakyReLU(slope) => vec![(*slope).into()],
            LayerSpec::Upsample(scale) => vec![(*scale).into()],
            LayerSpec::MaxPool2D(s) | LayerSpec::AvgPool2D(s) => {
                vec![s.kernel.into(), s.stride.into(), s.padding.into()]
            }
            LayerSpec::Reshape(dims) => dims.iter().map(|&d| (d as i64).into()).collect(),
            LayerSpec::ReLU
            | LayerSpec::Tanh
            | LayerSpec::Sigmoid
            | LayerSpec::Flatten
            | LayerSpec::Dropout => Vec::new(),
        }
    }
}

impl fmt::Display for LayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSpec::Conv2D(s) => write!(
                f,
                "conv2d:(ch_in:{}, ch_out:{}, k:{}x{}, stride:{}, padding:{})",
                s.in_channels, s.out_channels, s.kernel_h, s.kernel_w, s.stride, s.padding
            ),
            LayerSpec::ConvTranspose2D(s) => write!(
                f,
                "convTranspose2d:(ch_in:{}, ch_out:{}, k:{}x{}, stride:{}, padding:{})",
                s.in_channels, s.out_channels, s.kernel_h, s.kernel_w, s.stride, s.padding
            ),
            LayerSpec::Linear { in_features, out_features } => {
                write!(f, "linear:(in:{}, out:{})", in_features, out_features)
            }
            LayerSpec::LeakyReLU(slope) => write!(f, "leakyrelu:(slope:{:.6})", slope),
            LayerSpec::MaxPool2D(s) => write!(
                f,
                "max_pool2d:(k:{}, stride:{}, padding:{})",
                s.kernel, s.stride, s.padding
            ),
            LayerSpec::AvgPool2D(s) => write!(
                f,
                "avg_pool2d:(k:{}, stride:{}, padding:{})",
                s.kernel, s.stride, s.padding
            ),
            other => {
                let items = other.tagged_params()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>();
                let tuple = match items.len() {
                    0 => "()".to_string(),
                    1 => format!("({},)", items[0]),
                    _ => format!("({})", items.join(", ")),
                };
                write!(f, "{}:{}", other.name(), tuple)
            }
        }
    }
}

struct TaggedParams<'a> {
    index: usize,
    kind: &'a str,
    params: &'a [Value],
}

impl TaggedParams<'_> {
    fn malformed(&self, reason: String) -> LearnerError {
        LearnerError::MalformedParams {
            index: self.index,
            kind: self.kind.to_string(),
            reason,
        }
    }

    fn f64_at(&self, position: usize) -> Result<f64> {
        let value = self.params.get(position).ok_or_else(|| {
            self.malformed(format!(
                "expected a value at position {}, got {} values",
                position,
                self.params.len()
            ))
        })?;

        match value {
            Value::Number(n) => n.as_f64()
                .ok_or_else(|| self.malformed(format!("{} is not representable as f64", n))),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(self.malformed(format!(
                "position {} must be numeric, got {}",
                position, other
            ))),
        }
    }

    fn isize_at(&self, position: usize) -> Result<isize> {
        let value = self.f64_at(position)?;
        if value.fract() != 0.0 {
            return Err(self.malformed(format!(
                "position {} must be an integer, got {}",
                position, value
            )));
        }
        Ok(value as isize)
    }

    fn usize_at(&self, position: usize) -> Result<usize> {
        let value = self.isize_at(position)?;
        usize::try_from(value).map_err(|_| {
            self.malformed(format!(
                "position {} must be non-negative, got {}",
                position, value
            ))
        })
    }

    fn pool_shape(&self) -> Result<PoolShape> {
        Ok(PoolShape {
            kernel: self.usize_at(0)?,
            stride: self.usize_at(1)?,
            padding: self.usize_at(2)?,
        })
    }

    fn dims(&self) -> Result<Vec<isize>> {
        let dims = (0..self.params.len())
            .map(|i| self.isize_at(i))
            .collect::<Result<Vec<_>>>()?;

        if dims.iter().filter(|&&d| d == -1).count() > 1 {
            return Err(self.malformed("only one dimension can be inferred".to_string()));
        }
        if let Some(bad) = dims.iter().find(|&&d| d < -1 || d == 0) {
            return Err(self.malformed(format!("invalid dimension {}", bad)));
        }
        Ok(dims)
    }
}
