//! Shared utilities: random number generation and activation functions.

pub mod activations;
pub mod rng;

pub use activations::{argmax, relu, relu_derivative};
pub use rng::SimpleRng;
