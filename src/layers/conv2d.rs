//! 2D convolutional layer with hand-written forward and backward passes.
//!
//! The forward pass correlates a bank of square filters against a
//! multi-channel square input and applies ReLU. The backward pass propagates
//! the error signal to the previous layer by full convolution: the delta
//! slice is zero-padded, the filter slice is flipped 180 degrees, and the
//! two are correlated. All buffers are flat `f32` slices in row-major,
//! depth-major order (`idx = d * len * len + row * len + col`).

use crate::layers::Layer;
use crate::utils::{relu, relu_derivative, SimpleRng};
use std::io::{self, Write};
use thiserror::Error;

/// Filters start as uniform noise in `[-FILTER_INIT_LIMIT, +FILTER_INIT_LIMIT]`.
const FILTER_INIT_LIMIT: f32 = 0.01;

/// Rejected layer geometry, raised at construction and never recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("channel counts, kernel size, stride, and input length must all be non-zero")]
    ZeroDimension,

    #[error("kernel size {kernel_size} exceeds the padded input length {padded_len}")]
    KernelTooLarge {
        kernel_size: usize,
        padded_len: usize,
    },

    #[error(
        "input length {input_len} with kernel {kernel_size}, padding {padding}, \
         stride {stride} does not produce a whole output length"
    )]
    NonIntegralOutput {
        input_len: usize,
        kernel_size: usize,
        padding: usize,
        stride: usize,
    },

    #[error("stride {0} is unsupported; delta propagation requires unit stride")]
    UnsupportedStride(usize),
}

/// Rule applied to the filter bank after backpropagation.
///
/// The two variants exist because they disagree on what a weight step is:
/// `DeltaBroadcast` moves every weight of a filter by the summed output
/// delta alone, while `InputGradient` correlates the cached forward input
/// with the delta, weight by weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightUpdate {
    /// `w[i][j][m][n] -= lr * sum_k delta[i][k]`, independent of the input
    /// and of the kernel offset.
    DeltaBroadcast,
    /// `w[i][j][m][n] -= lr * sum_p input[j][p + (m,n)] * delta[i][p]`,
    /// the convolution gradient over the cached forward input.
    #[default]
    InputGradient,
}

/// Output edge length of a square convolution, if the parameters divide
/// exactly: `(input_len + 2*padding - kernel_size) / stride + 1`.
///
/// Returns `None` when the kernel does not fit the padded input or the
/// stride does not divide the span exactly.
pub fn conv_output_len(
    input_len: usize,
    kernel_size: usize,
    padding: usize,
    stride: usize,
) -> Option<usize> {
    if input_len == 0 || kernel_size == 0 || stride == 0 {
        return None;
    }
    let padded_len = input_len + 2 * padding;
    if kernel_size > padded_len {
        return None;
    }
    let span = padded_len - kernel_size;
    if span % stride != 0 {
        return None;
    }
    Some(span / stride + 1)
}

/// Convolutional layer over a `in_channels x input_len x input_len` volume,
/// producing `out_channels x output_len x output_len`.
///
/// Owns its filter bank and all per-sample buffers. Buffers are sized once
/// at construction and reused in place across samples; weight adaptation
/// changes filter values, never shapes.
#[derive(Debug)]
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: usize,
    stride: usize,
    input_len: usize,
    output_len: usize,
    weight_update: WeightUpdate,
    /// Flat bank: `[out_channels * in_channels * kernel_size * kernel_size]`.
    filters: Vec<f32>,
    /// Copy of the last forward input, read by the `InputGradient` update.
    input_cache: Vec<f32>,
    /// Pre-activation.
    z: Vec<f32>,
    /// Activation (post-ReLU).
    a: Vec<f32>,
    /// Error signal at this layer's output.
    delta: Vec<f32>,
    // Full-convolution scratch, preallocated so backward never allocates.
    padded_delta: Vec<f32>,
    flipped_filter: Vec<f32>,
    conv_result: Vec<f32>,
}

impl Conv2DLayer {
    /// Create a layer and initialize its filters with small symmetric
    /// uniform noise from `rng`.
    ///
    /// Geometry is validated eagerly: the output edge length must come out
    /// whole and positive, and delta propagation is only defined for unit
    /// stride. An invalid combination is a configuration defect and fails
    /// here rather than at first use.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
        stride: usize,
        input_len: usize,
        weight_update: WeightUpdate,
        rng: &mut SimpleRng,
    ) -> Result<Self, GeometryError> {
        if in_channels == 0 || out_channels == 0 || kernel_size == 0 || stride == 0 || input_len == 0
        {
            return Err(GeometryError::ZeroDimension);
        }
        let padded_len = input_len + 2 * padding;
        if kernel_size > padded_len {
            return Err(GeometryError::KernelTooLarge {
                kernel_size,
                padded_len,
            });
        }
        let output_len = conv_output_len(input_len, kernel_size, padding, stride).ok_or(
            GeometryError::NonIntegralOutput {
                input_len,
                kernel_size,
                padding,
                stride,
            },
        )?;
        if stride != 1 {
            return Err(GeometryError::UnsupportedStride(stride));
        }

        let weight_count = out_channels * in_channels * kernel_size * kernel_size;
        let mut filters = vec![0.0f32; weight_count];
        for value in &mut filters {
            *value = rng.gen_range_f32(-FILTER_INIT_LIMIT, FILTER_INIT_LIMIT);
        }

        let input_size = in_channels * input_len * input_len;
        let output_size = out_channels * output_len * output_len;
        let conv_len = output_len + kernel_size - 1;
        let padded_len_2d = output_len + 2 * (kernel_size - 1);

        Ok(Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_len,
            output_len,
            weight_update,
            filters,
            input_cache: vec![0.0f32; input_size],
            z: vec![0.0f32; output_size],
            a: vec![0.0f32; output_size],
            delta: vec![0.0f32; output_size],
            padded_delta: vec![0.0f32; padded_len_2d * padded_len_2d],
            flipped_filter: vec![0.0f32; kernel_size * kernel_size],
            conv_result: vec![0.0f32; conv_len * conv_len],
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Output edge length, fixed at construction.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    pub fn weight_update(&self) -> WeightUpdate {
        self.weight_update
    }

    /// The flat filter bank, `[out_channels * in_channels * k * k]`.
    pub fn filters(&self) -> &[f32] {
        &self.filters
    }

    /// Overwrite the filter bank. The length must match the bank exactly;
    /// shapes never change after construction.
    pub fn set_filters(&mut self, values: &[f32]) {
        assert_eq!(
            values.len(),
            self.filters.len(),
            "filter bank length mismatch"
        );
        self.filters.copy_from_slice(values);
    }
}

impl Layer for Conv2DLayer {
    fn forward(&mut self, input: &[f32]) -> &[f32] {
        assert_eq!(
            input.len(),
            self.input_size(),
            "input length does not match layer input size"
        );
        self.input_cache.copy_from_slice(input);

        let k = self.kernel_size;
        let il = self.input_len;
        let ol = self.output_len;
        let in_spatial = il * il;
        let out_spatial = ol * ol;

        for oc in 0..self.out_channels {
            let out_base = oc * out_spatial;
            for oy in 0..ol {
                for ox in 0..ol {
                    let mut val = 0.0f32;
                    for ic in 0..self.in_channels {
                        let w_base = (oc * self.in_channels + ic) * k * k;
                        let in_base = ic * in_spatial;
                        for ky in 0..k {
                            for kx in 0..k {
                                let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                                let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                                if iy >= 0 && iy < il as isize && ix >= 0 && ix < il as isize {
                                    val += self.input_cache
                                        [in_base + iy as usize * il + ix as usize]
                                        * self.filters[w_base + ky * k + kx];
                                }
                            }
                        }
                    }
                    self.z[out_base + oy * ol + ox] = val;
                }
            }
        }

        relu(&self.z, &mut self.a);
        &self.a
    }

    fn backward(&mut self, prev_dz: &[f32], prev_delta: &mut [f32]) {
        assert_eq!(
            prev_dz.len(),
            self.input_size(),
            "dz length does not match layer input size"
        );
        assert_eq!(
            prev_delta.len(),
            self.input_size(),
            "delta length does not match layer input size"
        );
        prev_delta.fill(0.0);

        let k = self.kernel_size;
        let il = self.input_len;
        let ol = self.output_len;
        let p = self.padding;
        let in_spatial = il * il;
        let out_spatial = ol * ol;
        let conv_len = ol + k - 1;

        for oc in 0..self.out_channels {
            let delta_slice = &self.delta[oc * out_spatial..(oc + 1) * out_spatial];
            for ic in 0..self.in_channels {
                let f_base = (oc * self.in_channels + ic) * k * k;
                full_convolve(
                    delta_slice,
                    &self.filters[f_base..f_base + k * k],
                    ol,
                    k,
                    &mut self.padded_delta,
                    &mut self.flipped_filter,
                    &mut self.conv_result,
                );
                // The result covers the padded input; crop `padding` cells
                // from each side before accumulating.
                for y in 0..il {
                    for x in 0..il {
                        prev_delta[ic * in_spatial + y * il + x] +=
                            self.conv_result[(y + p) * conv_len + (x + p)];
                    }
                }
            }
        }

        for (d, &g) in prev_delta.iter_mut().zip(prev_dz.iter()) {
            *d *= g;
        }
    }

    fn update_parameters(&mut self, learning_rate: f32) {
        let k = self.kernel_size;
        let il = self.input_len;
        let ol = self.output_len;
        let in_spatial = il * il;
        let out_spatial = ol * ol;

        match self.weight_update {
            WeightUpdate::DeltaBroadcast => {
                for oc in 0..self.out_channels {
                    let delta_sum: f32 = self.delta[oc * out_spatial..(oc + 1) * out_spatial]
                        .iter()
                        .sum();
                    let step = learning_rate * delta_sum;
                    let f_base = oc * self.in_channels * k * k;
                    let f_len = self.in_channels * k * k;
                    for w in &mut self.filters[f_base..f_base + f_len] {
                        *w -= step;
                    }
                }
            }
            WeightUpdate::InputGradient => {
                for oc in 0..self.out_channels {
                    for ic in 0..self.in_channels {
                        let w_base = (oc * self.in_channels + ic) * k * k;
                        let in_base = ic * in_spatial;
                        for ky in 0..k {
                            for kx in 0..k {
                                let mut grad = 0.0f32;
                                for oy in 0..ol {
                                    for ox in 0..ol {
                                        let iy = (oy * self.stride + ky) as isize
                                            - self.padding as isize;
                                        let ix = (ox * self.stride + kx) as isize
                                            - self.padding as isize;
                                        if iy >= 0
                                            && iy < il as isize
                                            && ix >= 0
                                            && ix < il as isize
                                        {
                                            grad += self.input_cache
                                                [in_base + iy as usize * il + ix as usize]
                                                * self.delta[oc * out_spatial + oy * ol + ox];
                                        }
                                    }
                                }
                                self.filters[w_base + ky * k + kx] -= learning_rate * grad;
                            }
                        }
                    }
                }
            }
        }
    }

    fn write_parameters(&self, sink: &mut dyn Write) -> io::Result<()> {
        let k = self.kernel_size;
        for oc in 0..self.out_channels {
            for ic in 0..self.in_channels {
                let f_base = (oc * self.in_channels + ic) * k * k;
                for ky in 0..k {
                    for kx in 0..k {
                        write!(sink, "{}   ", self.filters[f_base + ky * k + kx])?;
                    }
                    writeln!(sink)?;
                }
                writeln!(sink)?;
            }
            writeln!(sink)?;
        }
        Ok(())
    }

    fn output(&self) -> &[f32] {
        &self.a
    }

    fn delta_mut(&mut self) -> &mut [f32] {
        &mut self.delta
    }

    fn activation_derivative(&self, out: &mut [f32]) {
        relu_derivative(&self.z, out);
    }

    fn input_size(&self) -> usize {
        self.in_channels * self.input_len * self.input_len
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_len * self.output_len
    }

    fn parameter_count(&self) -> usize {
        self.filters.len()
    }
}

/// Full convolution of one delta slice with one flipped filter slice.
///
/// The delta (`output_len x output_len`) is zero-padded by `kernel_size - 1`
/// on every side, the filter is flipped 180 degrees, and the padded delta is
/// correlated with the flipped filter. The result covers every overlap
/// position: `(output_len + kernel_size - 1)` on each edge.
fn full_convolve(
    delta: &[f32],
    filter: &[f32],
    output_len: usize,
    kernel_size: usize,
    padded: &mut [f32],
    flipped: &mut [f32],
    result: &mut [f32],
) {
    let k = kernel_size;
    let pad = k - 1;
    let padded_len = output_len + 2 * pad;
    let result_len = output_len + k - 1;

    padded.fill(0.0);
    for row in 0..output_len {
        let src = row * output_len;
        let dst = (row + pad) * padded_len + pad;
        padded[dst..dst + output_len].copy_from_slice(&delta[src..src + output_len]);
    }

    for m in 0..k {
        for n in 0..k {
            flipped[m * k + n] = filter[(k - 1 - m) * k + (k - 1 - n)];
        }
    }

    for i in 0..result_len {
        for j in 0..result_len {
            let mut val = 0.0f32;
            for m in 0..k {
                for n in 0..k {
                    val += padded[(i + m) * padded_len + j + n] * flipped[m * k + n];
                }
            }
            result[i * result_len + j] = val;
        }
    }
}
