//! Forward-pass correctness: hand-computed correlation sums, ReLU range,
//! and output geometry.

use approx::assert_relative_eq;
use convnet::layers::{conv_output_len, Conv2DLayer, Layer, WeightUpdate};
use convnet::utils::SimpleRng;

fn conv(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: usize,
    input_len: usize,
) -> Conv2DLayer {
    let mut rng = SimpleRng::new(1);
    Conv2DLayer::new(
        in_channels,
        out_channels,
        kernel_size,
        padding,
        1,
        input_len,
        WeightUpdate::InputGradient,
        &mut rng,
    )
    .expect("valid geometry")
}

#[test]
fn hand_computed_correlation_on_4x4_input() {
    let mut layer = conv(1, 1, 3, 0, 4);
    assert_eq!(layer.output_len(), 2);

    layer.set_filters(&[1.0; 9]);
    let input: Vec<f32> = (1..=16).map(|v| v as f32).collect();
    let output = layer.forward(&input);

    // Each cell is the sum of the 3x3 window anchored at it.
    assert_relative_eq!(output[0], 54.0);
    assert_relative_eq!(output[1], 63.0);
    assert_relative_eq!(output[2], 90.0);
    assert_relative_eq!(output[3], 99.0);
}

#[test]
fn single_tap_filter_selects_window_cell() {
    let mut layer = conv(1, 1, 3, 0, 4);
    let mut filter = [0.0f32; 9];
    filter[4] = 1.0; // center tap (1,1)
    layer.set_filters(&filter);

    let input: Vec<f32> = (1..=16).map(|v| v as f32).collect();
    let output = layer.forward(&input).to_vec();

    assert_eq!(output, vec![6.0, 7.0, 10.0, 11.0]);
}

#[test]
fn channels_accumulate_into_one_output() {
    let mut layer = conv(2, 1, 1, 0, 2);
    layer.set_filters(&[2.0, 3.0]);

    let input = [1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0];
    let output = layer.forward(&input).to_vec();

    assert_eq!(output, vec![32.0, 64.0, 96.0, 128.0]);
}

#[test]
fn padding_is_applied_by_index_arithmetic() {
    // 2x2 input, 3x3 kernel, padding 1 keeps the output at 2x2; every
    // window covers all four input cells plus zeros.
    let mut layer = conv(1, 1, 3, 1, 2);
    assert_eq!(layer.output_len(), 2);
    layer.set_filters(&[1.0; 9]);

    let output = layer.forward(&[1.0, 2.0, 3.0, 4.0]).to_vec();
    assert_eq!(output, vec![10.0, 10.0, 10.0, 10.0]);
}

#[test]
fn relu_clamps_negative_preactivations() {
    let mut layer = conv(1, 2, 3, 0, 4);
    layer.set_filters(&[1.0; 18]);

    let input = [-1.0f32; 16];
    let output = layer.forward(&input);

    // Every window sums to -9, so every activation clamps to zero.
    assert!(output.iter().all(|&v| v == 0.0));
}

#[test]
fn output_is_never_negative() {
    let mut rng = SimpleRng::new(99);
    let mut layer = Conv2DLayer::new(
        2,
        4,
        3,
        1,
        1,
        6,
        WeightUpdate::InputGradient,
        &mut rng,
    )
    .unwrap();

    let input: Vec<f32> = (0..layer.input_size())
        .map(|i| ((i * 37) % 19) as f32 / 9.0 - 1.0)
        .collect();
    let output = layer.forward(&input);

    assert!(output.iter().all(|&v| v >= 0.0));
}

#[test]
fn forward_is_repeatable() {
    let mut layer = conv(1, 2, 3, 0, 5);
    let input: Vec<f32> = (0..25).map(|v| v as f32 / 25.0).collect();

    let first = layer.forward(&input).to_vec();
    let second = layer.forward(&input).to_vec();

    assert_eq!(first, second);
}

#[test]
fn output_len_matches_closed_form() {
    for (il, k, p, s) in [(28usize, 5usize, 0usize, 1usize), (28, 3, 1, 1), (9, 3, 2, 2)] {
        let expected = (il + 2 * p - k) / s + 1;
        assert_eq!(conv_output_len(il, k, p, s), Some(expected));
    }
}

#[test]
#[should_panic(expected = "input length does not match")]
fn forward_rejects_miswired_input() {
    let mut layer = conv(1, 1, 3, 0, 4);
    layer.forward(&[0.0; 15]);
}
