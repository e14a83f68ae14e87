//! A functional layer engine for meta-learning.
//!
//! An architecture is an ordered list of [`LayerSpec`]s. The [`Learner`] turns
//! it into a flat parameter list and evaluates it with either its own
//! parameters or any caller-supplied list of the same layout.

pub mod compute;
pub mod error;
pub mod layer;
pub mod model;

pub use compute::{config::LearnerConfig, gradients::GradientBuffers, learner::Learner};
pub use error::{LearnerError, Result};
pub use model::{
    architecture::ArchitectureDescriptor,
    layer_shape::{ConvShape, PoolShape},
    layer_type::LayerSpec,
    tensor_desc::TensorDesc,
    weight_init::WeightInit,
};
