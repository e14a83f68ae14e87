pub mod config;
pub mod gradients;
pub mod learner;
