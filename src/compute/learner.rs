use std::fmt;

use candle_core::{backprop::GradStore, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::{
    error::{LearnerError, Result},
    layer::{
        activations, conv2d,
        linear::linear,
        norm::{batch_norm, BatchNormOptions},
        reshape, spatial,
    },
    model::{
        architecture::ArchitectureDescriptor, layer_type::LayerSpec, tensor_desc::TensorDesc,
        weight_init::WeightInit,
    },
};

use super::{config::LearnerConfig, gradients::GradientBuffers};

/// A layer engine whose parameters are an explicit, flat list.
///
/// The engine owns a default parameter list and the batch-norm running
/// statistics, but [`Learner::forward`] accepts any caller-supplied list laid
/// out the same way. Inner-loop adaptation can therefore evaluate adapted
/// tensors (`w - lr * g`) while gradients still flow back to the owned [`Var`]s.
pub struct Learner {
    descriptor: ArchitectureDescriptor,
    config: LearnerConfig,
    vars: Vec<Var>,
    vars_bn: Vec<Var>,
    grads: GradientBuffers,
    rng: StdRng,
}

impl Learner {
    pub fn new(descriptor: ArchitectureDescriptor) -> Result<Self> {
        Self::new_with(descriptor, LearnerConfig::default())
    }

    pub fn new_with(descriptor: ArchitectureDescriptor, config: LearnerConfig) -> Result<Self> {
        let config = config.build()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vars = Vec::with_capacity(descriptor.parameter_list_len());
        let mut vars_bn = Vec::with_capacity(descriptor.running_stats_len());

        for layer in &descriptor.layers {
            match layer {
                LayerSpec::Conv2D(_) | LayerSpec::ConvTranspose2D(_) | LayerSpec::Linear { .. } => {
                    if let Some((weight, bias)) = layer.parameter_shapes() {
                        vars.push(init_var(&config.weight_init, &weight, &config, &mut rng)?);
                        vars.push(Var::zeros(bias.to_dims(), config.dtype, &config.device)?);
                    }
                }
                LayerSpec::BatchNorm { num_features } => {
                    let c = *num_features;
                    vars.push(Var::ones(c, config.dtype, &config.device)?);
                    vars.push(Var::zeros(c, config.dtype, &config.device)?);

                    vars_bn.push(Var::zeros(c, config.dtype, &config.device)?);
                    vars_bn.push(Var::ones(c, config.dtype, &config.device)?);
                }
                LayerSpec::ReLU
                | LayerSpec::LeakyReLU(_)
                | LayerSpec::Tanh
                | LayerSpec::Sigmoid
                | LayerSpec::Upsample(_)
                | LayerSpec::MaxPool2D(_)
                | LayerSpec::AvgPool2D(_)
                | LayerSpec::Flatten
                | LayerSpec::Reshape(_)
                | LayerSpec::Dropout => {}
            }
        }

        let learner = Self {
            descriptor,
            config,
            vars,
            vars_bn,
            grads: GradientBuffers::new(),
            rng,
        };

        debug!(
            layers = learner.descriptor.len(),
            parameters = learner.vars.len(),
            running_stats = learner.vars_bn.len(),
            scalars = learner.num_parameter_elements(),
            "Learner constructed"
        );

        Ok(learner)
    }

    /// Builds an engine from a JSON array of `[name, [params...]]` pairs.
    pub fn from_json(json: &str, config: LearnerConfig) -> Result<Self> {
        Self::new_with(ArchitectureDescriptor::from_json(json)?, config)
    }

    /// Runs the architecture on `x`.
    ///
    /// `vars` defaults to the engine's own parameters. A supplied list is only
    /// read. With `bn_training` set, batch norm normalises with batch statistics
    /// and updates the engine's running statistics in place.
    pub fn forward(&self, x: &Tensor, vars: Option<&[Tensor]>, bn_training: bool) -> Result<Tensor> {
        let owned;
        let vars = match vars {
            Some(vars) => vars,
            None => {
                owned = self.parameter_tensors();
                &owned
            }
        };

        // Checked before any layer runs so a bad list never touches running stats
        let expected = self.vars.len();
        if vars.len() != expected {
            return Err(LearnerError::ParameterCountMismatch { expected, actual: vars.len() });
        }

        let options = BatchNormOptions {
            momentum: self.config.bn_momentum,
            eps: self.config.bn_eps,
            training: bn_training,
        };

        let mut idx = 0;
        let mut bn_idx = 0;
        let mut x = x.clone();

        for (i, layer) in self.descriptor.layers.iter().enumerate() {
            trace!(index = i, layer = %layer, input = ?x.dims(), "forward");

            x = match layer {
                LayerSpec::Conv2D(shape) => {
                    let (w, b) = take_pair(vars, &mut idx)?;
                    conv2d::conv2d(&x, w, b, shape)?
                }
                LayerSpec::ConvTranspose2D(shape) => {
                    let (w, b) = take_pair(vars, &mut idx)?;
                    conv2d::conv_transpose2d(&x, w, b, shape)?
                }
                LayerSpec::Linear { .. } => {
                    let (w, b) = take_pair(vars, &mut idx)?;
                    linear(&x, w, b)?
                }
                LayerSpec::BatchNorm { .. } => {
                    let (w, b) = take_pair(vars, &mut idx)?;
                    let (running_mean, running_var) = take_stats(&self.vars_bn, &mut bn_idx)?;
                    batch_norm(&x, w, b, running_mean, running_var, options)?
                }
                LayerSpec::ReLU => activations::relu(&x)?,
                LayerSpec::LeakyReLU(slope) => activations::leaky_relu(&x, *slope)?,
                LayerSpec::Tanh => activations::tanh(&x)?,
                LayerSpec::Sigmoid => activations::sigmoid(&x)?,
                LayerSpec::Upsample(scale) => spatial::upsample_nearest(&x, *scale)?,
                LayerSpec::MaxPool2D(shape) => spatial::max_pool2d(&x, shape)?,
                LayerSpec::AvgPool2D(shape) => spatial::avg_pool2d(&x, shape)?,
                LayerSpec::Flatten => reshape::flatten(&x)?,
                LayerSpec::Reshape(dims) => reshape::reshape(&x, dims)?,
                LayerSpec::Dropout => x,
            };
        }

        if idx != vars.len() {
            return Err(LearnerError::ParameterCountMismatch { expected: idx, actual: vars.len() });
        }
        if bn_idx != self.vars_bn.len() {
            return Err(LearnerError::ParameterCountMismatch {
                expected: bn_idx,
                actual: self.vars_bn.len(),
            });
        }

        Ok(x)
    }

    pub fn parameters(&self) -> &[Var] {
        &self.vars
    }

    /// The owned parameters as tensors. Each entry shares identity with its
    /// [`Var`], so gradients computed through them land on the owned storage.
    pub fn parameter_tensors(&self) -> Vec<Tensor> {
        self.vars.iter().map(|var| var.as_tensor().clone()).collect()
    }

    pub fn running_stats(&self) -> &[Var] {
        &self.vars_bn
    }

    pub fn descriptor(&self) -> &ArchitectureDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn num_parameters(&self) -> usize {
        self.vars.len()
    }

    pub fn num_parameter_elements(&self) -> usize {
        self.vars.iter().map(|var| var.elem_count()).sum()
    }

    pub fn expected_shapes(&self) -> Vec<TensorDesc> {
        self.descriptor.parameter_shapes()
    }

    /// Folds gradients from a backward pass into the engine's buffers for
    /// `vars`, or for the owned parameters when `None`.
    pub fn accumulate_grads(&mut self, grads: &GradStore, vars: Option<&[Tensor]>) -> Result<usize> {
        match vars {
            Some(vars) => self.grads.accumulate(vars, grads),
            None => {
                let owned = self.parameter_tensors();
                self.grads.accumulate(&owned, grads)
            }
        }
    }

    pub fn grad(&self, param: &Tensor) -> Option<&Tensor> {
        self.grads.get(param)
    }

    /// Zeroes accumulated gradients. Entries that never received a gradient
    /// are left without a buffer.
    pub fn zero_grad(&mut self, vars: Option<&[Tensor]>) -> Result<()> {
        let zeroed = match vars {
            Some(vars) => self.grads.zero(vars)?,
            None => {
                let owned = self.parameter_tensors();
                self.grads.zero(&owned)?
            }
        };

        debug!(zeroed, "Gradients reset");
        Ok(())
    }

    /// Redraws conv/linear weights with `init`, zeroes their biases and resets
    /// batch-norm scale and shift. Running statistics are not touched.
    pub fn reinitialize(&mut self, init: &WeightInit) -> Result<()> {
        // Validated up front so a bad strategy leaves every parameter as it was
        init.validate()?;

        let mut idx = 0;

        for layer in &self.descriptor.layers {
            let Some((weight, _)) = layer.parameter_shapes() else {
                continue;
            };
            let (w, b) = (&self.vars[idx], &self.vars[idx + 1]);

            match layer {
                LayerSpec::BatchNorm { .. } => {
                    w.set(&w.as_tensor().ones_like()?)?;
                }
                _ => {
                    let fresh = init_tensor(init, &weight, &self.config, &mut self.rng)?;
                    w.set(&fresh)?;
                }
            }
            b.set(&b.as_tensor().zeros_like()?)?;
            idx += 2;
        }

        debug!(?init, parameters = idx, "Parameters reinitialized");
        Ok(())
    }

    pub fn reset_running_stats(&self) -> Result<()> {
        for pair in self.vars_bn.chunks_exact(2) {
            pair[0].set(&pair[0].as_tensor().zeros_like()?)?;
            pair[1].set(&pair[1].as_tensor().ones_like()?)?;
        }
        Ok(())
    }

    /// Table of layers with their parameter shapes and counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let mut idx = 0;

        out.push_str(&format!("{:<4} {:<56} {:<24} {:<12}\n", "ID", "Layer", "Parameter Shapes", "Parameters"));
        out.push_str(&format!("{:-<98}\n", ""));

        for (i, layer) in self.descriptor.layers.iter().enumerate() {
            let shapes = match layer.parameter_shapes() {
                Some((w, b)) => {
                    idx += 2;
                    [w, b].iter()
                        .map(|desc| desc.to_dims()
                            .iter()
                            .map(|d| d.to_string())
                            .collect::<Vec<_>>()
                            .join("×"))
                        .collect::<Vec<_>>()
                        .join(", ")
                }
                None => "-".to_string(),
            };

            out.push_str(&format!("{:<4} {:<56} {:<24} {:<12}\n", i, layer.to_string(), shapes, layer.parameter_count()));
        }

        out.push_str(&format!("{:-<98}\n", ""));
        out.push_str(&format!("Parameter tensors: {}\n", idx));
        out.push_str(&format!("Running statistics: {}\n", self.vars_bn.len()));
        out.push_str(&format!("Total Parameters: {}\n", self.num_parameter_elements()));
        out
    }
}

impl fmt::Display for Learner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

impl fmt::Debug for Learner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Learner")
            .field("layers", &self.descriptor.len())
            .field("parameters", &self.vars.len())
            .field("running_stats", &self.vars_bn.len())
            .finish()
    }
}

fn take_pair<'a>(vars: &'a [Tensor], idx: &mut usize) -> Result<(&'a Tensor, &'a Tensor)> {
    match (vars.get(*idx), vars.get(*idx + 1)) {
        (Some(w), Some(b)) => {
            *idx += 2;
            Ok((w, b))
        }
        _ => Err(LearnerError::ParameterCountMismatch { expected: *idx + 2, actual: vars.len() }),
    }
}

fn take_stats<'a>(stats: &'a [Var], idx: &mut usize) -> Result<(&'a Var, &'a Var)> {
    match (stats.get(*idx), stats.get(*idx + 1)) {
        (Some(mean), Some(var)) => {
            *idx += 2;
            Ok((mean, var))
        }
        _ => Err(LearnerError::ParameterCountMismatch { expected: *idx + 2, actual: stats.len() }),
    }
}

fn init_tensor(init: &WeightInit, desc: &TensorDesc, config: &LearnerConfig, rng: &mut StdRng) -> Result<Tensor> {
    let data = init.init(desc, rng)?;
    Ok(Tensor::from_vec(data, desc.to_dims(), &config.device)?.to_dtype(config.dtype)?)
}

fn init_var(init: &WeightInit, desc: &TensorDesc, config: &LearnerConfig, rng: &mut StdRng) -> Result<Var> {
    Ok(Var::from_tensor(&init_tensor(init, desc, config, rng)?)?)
}
