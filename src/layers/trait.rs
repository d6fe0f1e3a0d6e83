//! Layer trait definition for the feed-forward training pipeline.
//!
//! The trait gives the network a uniform interface for forward propagation,
//! backward error propagation, and parameter updates, dispatched dynamically
//! over `Box<dyn Layer>`.

use std::io::{self, Write};

/// A unit in a feed-forward pipeline.
///
/// Every layer owns its pre-activation (`z`), activation (`a`), and error
/// (`delta`) buffers. They are sized at construction and overwritten in
/// place on every pass, so a layer instance must not be shared between
/// concurrent training streams.
///
/// The backward driver walks the pipeline in reverse. For each adjacent
/// pair it evaluates the previous layer's activation derivative at that
/// layer's own pre-activation, then asks the current layer to fill the
/// previous layer's `delta`:
///
/// ```ignore
/// prev.activation_derivative(&mut dz);
/// current.backward(&dz, prev.delta_mut());
/// ```
pub trait Layer {
    /// Forward propagation.
    ///
    /// Consumes an activation buffer of length `input_size()` and returns
    /// the layer's activation buffer of length `output_size()`. The input is
    /// only read; all mutation is confined to the layer's own buffers.
    ///
    /// # Panics
    ///
    /// Panics if `input.len() != input_size()`, which indicates a wiring
    /// defect between layers.
    fn forward(&mut self, input: &[f32]) -> &[f32];

    /// Backward propagation to the previous layer.
    ///
    /// Reads the layer's own `delta` (already populated by the network
    /// driver) and its parameters, writes the error signal for the previous
    /// layer into `prev_delta`, and multiplies it element-wise by `prev_dz`,
    /// the previous layer's activation derivative at its pre-activation.
    /// Both slices have length `input_size()`.
    fn backward(&mut self, prev_dz: &[f32], prev_delta: &mut [f32]);

    /// Apply one gradient-descent step to the trainable parameters using
    /// the layer's current `delta`.
    fn update_parameters(&mut self, learning_rate: f32);

    /// Serialize the trainable parameters as nested whitespace-delimited
    /// text for external inspection. No reload path exists.
    fn write_parameters(&self, sink: &mut dyn Write) -> io::Result<()>;

    /// The activation buffer produced by the last `forward` call.
    fn output(&self) -> &[f32];

    /// The layer's error buffer, written by the next layer's `backward`
    /// call (or by the loss policy for the output layer).
    fn delta_mut(&mut self) -> &mut [f32];

    /// Evaluate the activation derivative at the layer's own pre-activation
    /// buffer into `out`, which has length `output_size()`.
    fn activation_derivative(&self, out: &mut [f32]);

    /// Expected input length per sample.
    fn input_size(&self) -> usize;

    /// Produced output length per sample.
    fn output_size(&self) -> usize;

    /// Number of trainable parameters.
    fn parameter_count(&self) -> usize;
}
