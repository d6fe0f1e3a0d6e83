//! Network architecture defined via JSON configuration files.
//!
//! An architecture file lists the layer stack in order, so topology
//! experiments do not require code changes. Only convolutional layers
//! exist today; the structure leaves room for other layer types behind the
//! same trait.

use crate::config::TrainingConfig;
use crate::layers::{Conv2DLayer, Layer};
use crate::loss::SquaredError;
use crate::network::Network;
use crate::utils::SimpleRng;
use serde::Deserialize;
use std::error::Error;
use std::fs;
use tracing::debug;

/// Configuration for a single layer.
///
/// `layer_type` selects the implementation; the remaining fields are that
/// type's parameters. Conv2D requires `in_channels`, `out_channels`,
/// `kernel_size`, and `input_len`; `padding` defaults to 0 and `stride`
/// to 1.
///
/// # Example
///
/// ```json
/// {
///   "layer_type": "conv2d",
///   "in_channels": 1,
///   "out_channels": 8,
///   "kernel_size": 5,
///   "input_len": 28
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    /// Type of layer; only "conv2d" is implemented.
    pub layer_type: String,

    /// Number of input channels.
    pub in_channels: Option<usize>,
    /// Number of output channels (filters).
    pub out_channels: Option<usize>,
    /// Edge length of the square kernel.
    pub kernel_size: Option<usize>,
    /// Zero-padding on every side (default 0).
    pub padding: Option<usize>,
    /// Stride (default 1).
    pub stride: Option<usize>,
    /// Edge length of the square input volume.
    pub input_len: Option<usize>,
}

/// Ordered layer stack for the whole network.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file.
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn validate_architecture(config: &ArchitectureConfig) -> Result<(), Box<dyn Error>> {
    if config.layers.is_empty() {
        return Err(invalid("architecture must declare at least one layer".to_string()));
    }

    for (index, layer) in config.layers.iter().enumerate() {
        if layer.layer_type != "conv2d" {
            return Err(invalid(format!(
                "layer {index}: unknown layer_type '{}'. Must be: conv2d",
                layer.layer_type
            )));
        }
        for (field, value) in [
            ("in_channels", layer.in_channels),
            ("out_channels", layer.out_channels),
            ("kernel_size", layer.kernel_size),
            ("input_len", layer.input_len),
        ] {
            if value.is_none() {
                return Err(invalid(format!("layer {index}: missing field '{field}'")));
            }
        }
    }

    Ok(())
}

/// Build a trainable network from an architecture and run configuration.
///
/// Layer geometry errors and chain mismatches between adjacent layers
/// surface here, before any sample is touched.
pub fn build_network(
    architecture: &ArchitectureConfig,
    config: &TrainingConfig,
    rng: &mut SimpleRng,
) -> Result<Network, Box<dyn Error>> {
    let weight_update = config.weight_update_rule()?;

    let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(architecture.layers.len());
    for (index, layer) in architecture.layers.iter().enumerate() {
        // validate_architecture checked presence; defaults fill the rest.
        let conv = Conv2DLayer::new(
            layer.in_channels.unwrap_or(0),
            layer.out_channels.unwrap_or(0),
            layer.kernel_size.unwrap_or(0),
            layer.padding.unwrap_or(0),
            layer.stride.unwrap_or(1),
            layer.input_len.unwrap_or(0),
            weight_update,
            rng,
        )?;
        debug!(
            index,
            input_size = conv.input_size(),
            output_size = conv.output_size(),
            "built conv2d layer"
        );
        layers.push(Box::new(conv));
    }

    let network = Network::new(layers, Box::new(SquaredError), config.learning_rate)?;
    Ok(network)
}

fn invalid(message: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}
