//! Ordered composition of layers and the per-sample training loop.
//!
//! Training is pure online stochastic gradient descent: each sample is fully
//! forward-propagated, its output error derived from the label by the loss
//! policy, backward-propagated in reverse layer order, and every layer's
//! parameters adapted, before the next sample begins.

use crate::layers::Layer;
use crate::loss::Loss;
use std::io::{self, Write};
use thiserror::Error;

/// Wiring or per-call defects in the layer pipeline.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network must contain at least one layer")]
    Empty,

    #[error("learning rate must be a positive finite number, got {0}")]
    InvalidLearningRate(f32),

    #[error("layer {index} expects {expected} inputs but the previous layer produces {actual}")]
    BrokenChain {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("input holds {actual} values but the first layer expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("label {label} is outside the {classes}-class output")]
    LabelOutOfRange { label: usize, classes: usize },
}

/// A feed-forward pipeline of layers trained one sample at a time.
///
/// Holds the layers behind the `Layer` trait, a loss policy, and the
/// learning rate shared by every adaptation step. Scratch buffers for the
/// backward pass are allocated once here and reused across samples.
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    loss: Box<dyn Loss>,
    learning_rate: f32,
    dz_scratch: Vec<f32>,
    prediction_scratch: Vec<f32>,
}

// The trait-object fields (`Box<dyn Layer>`, `Box<dyn Loss>`) are not `Debug`,
// so a derive is impossible; this hand-written impl reports the shape only, to
// satisfy the `Debug` bound that `Result::unwrap_err` places on the Ok type.
impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("num_layers", &self.layers.len())
            .field("learning_rate", &self.learning_rate)
            .finish()
    }
}

impl Network {
    /// Compose `layers` into a pipeline.
    ///
    /// Fails eagerly when the pipeline is empty, the learning rate is not
    /// positive, or adjacent layers do not chain (the output size of each
    /// layer must equal the input size of the next). A broken chain is a
    /// wiring defect and is never recovered at run time.
    pub fn new(
        layers: Vec<Box<dyn Layer>>,
        loss: Box<dyn Loss>,
        learning_rate: f32,
    ) -> Result<Self, NetworkError> {
        if layers.is_empty() {
            return Err(NetworkError::Empty);
        }
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(NetworkError::InvalidLearningRate(learning_rate));
        }
        for index in 1..layers.len() {
            let expected = layers[index].input_size();
            let actual = layers[index - 1].output_size();
            if expected != actual {
                return Err(NetworkError::BrokenChain {
                    index,
                    expected,
                    actual,
                });
            }
        }

        let max_output = layers.iter().map(|l| l.output_size()).max().unwrap_or(0);
        let classes = layers[layers.len() - 1].output_size();

        Ok(Self {
            layers,
            loss,
            learning_rate,
            dz_scratch: vec![0.0f32; max_output],
            prediction_scratch: vec![0.0f32; classes],
        })
    }

    /// Input length expected by the first layer.
    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    /// Output length produced by the last layer.
    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Total trainable parameters across all layers.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// Train on one sample and return the prediction vector.
    ///
    /// Runs the full per-sample sequence: forward through every layer,
    /// output delta from the loss policy, backward through every layer in
    /// reverse, then one parameter update on each layer. The caller selects
    /// the predicted class as the argmax of the returned vector.
    pub fn train(&mut self, input: &[f32], label: usize) -> Result<&[f32], NetworkError> {
        self.check_input(input)?;
        let classes = self.output_size();
        if label >= classes {
            return Err(NetworkError::LabelOutOfRange { label, classes });
        }

        self.forward_pass(input);

        let last_index = self.layers.len() - 1;
        let last = &mut self.layers[last_index];
        self.prediction_scratch.copy_from_slice(last.output());
        self.loss
            .output_delta(&self.prediction_scratch, label, last.delta_mut());

        self.backward_pass();

        let learning_rate = self.learning_rate;
        for layer in &mut self.layers {
            layer.update_parameters(learning_rate);
        }

        Ok(self.layers[last_index].output())
    }

    /// Forward pass only, for evaluation.
    pub fn predict(&mut self, input: &[f32]) -> Result<&[f32], NetworkError> {
        self.check_input(input)?;
        self.forward_pass(input);
        Ok(self.layers[self.layers.len() - 1].output())
    }

    /// Dump every layer's trainable parameters in pipeline order.
    pub fn write_parameters(&self, sink: &mut dyn Write) -> io::Result<()> {
        for layer in &self.layers {
            layer.write_parameters(sink)?;
        }
        sink.flush()
    }

    fn check_input(&self, input: &[f32]) -> Result<(), NetworkError> {
        let expected = self.input_size();
        if input.len() != expected {
            return Err(NetworkError::ShapeMismatch {
                expected,
                actual: input.len(),
            });
        }
        Ok(())
    }

    fn forward_pass(&mut self, input: &[f32]) {
        self.layers[0].forward(input);
        for i in 1..self.layers.len() {
            let (head, tail) = self.layers.split_at_mut(i);
            tail[0].forward(head[i - 1].output());
        }
    }

    // Walks adjacent pairs back to front. For each pair the previous
    // layer's activation derivative is evaluated at its own pre-activation,
    // then the current layer fills the previous layer's delta. The first
    // layer has no predecessor, so the walk stops at index 1.
    fn backward_pass(&mut self) {
        for i in (1..self.layers.len()).rev() {
            let (head, tail) = self.layers.split_at_mut(i);
            let prev = &mut head[i - 1];
            let current = &mut tail[0];
            let dz = &mut self.dz_scratch[..prev.output_size()];
            prev.activation_derivative(dz);
            current.backward(dz, prev.delta_mut());
        }
    }
}
