//! Functional layer operations. Every op takes its weights as arguments rather
//! than owning them, which is what lets the learner swap parameter lists per call.

pub mod activations;
pub mod conv2d;
pub mod linear;
pub mod norm;
pub mod reshape;
pub mod spatial;
