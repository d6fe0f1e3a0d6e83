//! Weight adaptation under both update rules.

use approx::assert_relative_eq;
use convnet::layers::{Conv2DLayer, Layer, WeightUpdate};
use convnet::utils::SimpleRng;

fn conv(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    input_len: usize,
    update: WeightUpdate,
) -> Conv2DLayer {
    let mut rng = SimpleRng::new(3);
    Conv2DLayer::new(
        in_channels,
        out_channels,
        kernel_size,
        0,
        1,
        input_len,
        update,
        &mut rng,
    )
    .expect("valid geometry")
}

#[test]
fn broadcast_moves_every_weight_by_summed_delta() {
    let mut layer = conv(1, 1, 2, 3, WeightUpdate::DeltaBroadcast);
    layer.set_filters(&[0.5; 4]);
    layer.delta_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);

    layer.update_parameters(0.1);

    // Every weight steps by -0.1 * (1+2+3+4), regardless of position.
    for &w in layer.filters() {
        assert_relative_eq!(w, -0.5);
    }
}

#[test]
fn broadcast_uses_each_filters_own_delta() {
    let mut layer = conv(1, 2, 1, 2, WeightUpdate::DeltaBroadcast);
    layer.set_filters(&[1.0, 1.0]);
    layer
        .delta_mut()
        .copy_from_slice(&[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);

    layer.update_parameters(0.1);

    assert_relative_eq!(layer.filters()[0], 0.6);
    assert_relative_eq!(layer.filters()[1], 0.2);
}

#[test]
fn broadcast_ignores_the_forward_input() {
    let mut with_input = conv(1, 1, 2, 3, WeightUpdate::DeltaBroadcast);
    with_input.set_filters(&[0.0; 4]);
    with_input.forward(&[5.0; 9]);
    with_input.delta_mut().copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
    with_input.update_parameters(0.1);

    let mut without_input = conv(1, 1, 2, 3, WeightUpdate::DeltaBroadcast);
    without_input.set_filters(&[0.0; 4]);
    without_input
        .delta_mut()
        .copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
    without_input.update_parameters(0.1);

    assert_eq!(with_input.filters(), without_input.filters());
}

#[test]
fn gradient_correlates_cached_input_with_delta() {
    let mut layer = conv(1, 1, 2, 3, WeightUpdate::InputGradient);
    layer.set_filters(&[0.0; 4]);

    let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
    layer.forward(&input);

    // Only the (0,0) output position carries error, so the gradient for
    // each weight is the input cell under that window.
    layer.delta_mut().copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
    layer.update_parameters(0.1);

    let filters = layer.filters();
    assert_relative_eq!(filters[0], -0.1);
    assert_relative_eq!(filters[1], -0.2);
    assert_relative_eq!(filters[2], -0.4);
    assert_relative_eq!(filters[3], -0.5);
}

#[test]
fn gradient_sums_over_all_output_positions() {
    let mut layer = conv(1, 1, 2, 3, WeightUpdate::InputGradient);
    layer.set_filters(&[0.0; 4]);

    let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
    layer.forward(&input);

    layer.delta_mut().copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
    layer.update_parameters(0.1);

    // grad[m][n] = sum over the four windows of the cell at offset (m,n)
    let filters = layer.filters();
    assert_relative_eq!(filters[0], -1.2);
    assert_relative_eq!(filters[1], -1.6);
    assert_relative_eq!(filters[2], -2.4);
    assert_relative_eq!(filters[3], -2.8);
}

#[test]
fn zero_delta_leaves_weights_untouched() {
    for update in [WeightUpdate::DeltaBroadcast, WeightUpdate::InputGradient] {
        let mut layer = conv(1, 2, 2, 3, update);
        let before = layer.filters().to_vec();
        layer.forward(&[0.5; 9]);
        layer.update_parameters(0.1);
        assert_eq!(layer.filters(), before.as_slice(), "{update:?}");
    }
}

#[test]
fn update_never_changes_filter_bank_shape() {
    let mut layer = conv(2, 3, 3, 5, WeightUpdate::InputGradient);
    let count = layer.filters().len();
    layer.forward(&[0.1; 50]);
    layer.delta_mut().fill(0.5);
    layer.update_parameters(0.01);
    assert_eq!(layer.filters().len(), count);
}
