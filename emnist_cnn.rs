// emnist_cnn.rs
// Online training of a convolutional classifier on EMNIST-style binary
// sample files (big-endian fixed header, one byte per pixel/label).
//
// Usage:
//   emnist_cnn [--verbose] [config.json] [architecture.json]
//
// Every sample is trained individually (online SGD): forward pass, output
// error from the label, backward pass, weight update. Progress is logged
// periodically; the trained filters are dumped as text at the end.

use std::env;
use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use convnet::architecture::{build_network, load_architecture};
use convnet::config::load_config;
use convnet::dataset::load_sample_set;
use convnet::loss::{Loss, SquaredError};
use convnet::utils::{argmax, SimpleRng};

const DEFAULT_CONFIG: &str = "config/emnist_cnn.json";
const DEFAULT_ARCHITECTURE: &str = "config/architectures/emnist_conv.json";
const DEFAULT_LOG_EVERY: usize = 1000;

fn main() -> Result<(), Box<dyn Error>> {
    let mut verbose = false;
    let mut positional = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--verbose" {
            verbose = true;
        } else {
            positional.push(arg);
        }
    }

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = positional
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);
    let architecture_path = positional
        .get(1)
        .map(String::as_str)
        .unwrap_or(DEFAULT_ARCHITECTURE);

    let config = load_config(config_path)?;
    let architecture = load_architecture(architecture_path)?;

    let mut rng = SimpleRng::new(config.seed.unwrap_or(0));
    if config.seed.is_none() {
        rng.reseed_from_time();
    }

    let samples = load_sample_set(
        Path::new(&config.train_images),
        Path::new(&config.train_labels),
        config.sample_limit,
    )?;
    let mut network = build_network(&architecture, &config, &mut rng)?;

    if samples.sample_size() != network.input_size() {
        return Err(format!(
            "sample size {}x{} does not match the first layer's input size {}",
            samples.rows(),
            samples.cols(),
            network.input_size()
        )
        .into());
    }

    let epochs = config.epochs.unwrap_or(1);
    let log_every = config.log_every.unwrap_or(DEFAULT_LOG_EVERY);
    info!(
        samples = samples.len(),
        parameters = network.parameter_count(),
        learning_rate = config.learning_rate,
        epochs,
        "starting training"
    );

    let loss = SquaredError;
    for epoch in 0..epochs {
        let start = Instant::now();
        let mut correct = 0usize;
        let mut loss_sum = 0.0f32;
        let mut window_correct = 0usize;
        let mut window_loss = 0.0f32;

        for index in 0..samples.len() {
            let label = samples.label(index) as usize;
            let prediction = network.train(samples.image(index), label)?;
            let answer = argmax(prediction);
            let sample_loss = loss.value(prediction, label);
            debug!(index, label, answer, sample_loss, "trained sample");

            if answer == label {
                correct += 1;
                window_correct += 1;
            }
            loss_sum += sample_loss;
            window_loss += sample_loss;

            if (index + 1) % log_every == 0 {
                info!(
                    epoch,
                    index = index + 1,
                    accuracy = 100.0 * window_correct as f32 / log_every as f32,
                    avg_loss = window_loss / log_every as f32,
                    "progress"
                );
                window_correct = 0;
                window_loss = 0.0;
            }
        }

        let secs = start.elapsed().as_secs_f32();
        info!(
            epoch,
            accuracy = 100.0 * correct as f32 / samples.len() as f32,
            avg_loss = loss_sum / samples.len() as f32,
            secs,
            "epoch complete"
        );
    }

    if let Some(dump_path) = &config.parameter_dump {
        if let Some(parent) = Path::new(dump_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(dump_path)?;
        let mut writer = BufWriter::new(file);
        network.write_parameters(&mut writer)?;
        info!(path = %dump_path, "wrote trained filters");
    }

    Ok(())
}
