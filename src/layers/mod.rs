//! Layer abstractions for the training pipeline.
//!
//! This module provides the Layer trait and the convolutional layer
//! implementation. The network composes layers through the trait only.

mod r#trait;
pub mod conv2d;

pub use conv2d::{conv_output_len, Conv2DLayer, GeometryError, WeightUpdate};
pub use r#trait::Layer;
