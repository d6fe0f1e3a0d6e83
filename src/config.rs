//! Training configuration loaded from JSON files.
//!
//! Keeps run parameters (learning rate, seed, data paths, weight-update
//! rule) out of the code so experiments do not require recompilation.

use crate::layers::WeightUpdate;
use serde::Deserialize;
use std::error::Error;
use std::fs;

/// Run parameters for the training driver.
///
/// # Example
///
/// ```json
/// {
///   "learning_rate": 0.001,
///   "seed": 42,
///   "sample_limit": 10000,
///   "weight_update": "input_gradient",
///   "train_images": "data/letters_digits_train",
///   "train_labels": "data/letters_digits_train_label",
///   "parameter_dump": "out/filters.txt"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Step size for every gradient-descent update.
    pub learning_rate: f32,

    /// RNG seed for filter initialization; omitted means seed from time.
    pub seed: Option<u64>,

    /// Cap on the number of samples loaded from the data files.
    pub sample_limit: Option<usize>,

    /// Weight-update rule: "input_gradient" (default) or "delta_broadcast".
    pub weight_update: Option<String>,

    /// Path of the image file.
    pub train_images: String,

    /// Path of the label file.
    pub train_labels: String,

    /// Where to write the trained filters; omitted means no dump.
    pub parameter_dump: Option<String>,

    /// Log a progress line every this many samples (default 1000).
    pub log_every: Option<usize>,

    /// Full passes over the sample set (default 1).
    pub epochs: Option<usize>,
}

impl TrainingConfig {
    /// Resolve the configured weight-update rule.
    pub fn weight_update_rule(&self) -> Result<WeightUpdate, Box<dyn Error>> {
        match self.weight_update.as_deref() {
            None | Some("input_gradient") => Ok(WeightUpdate::InputGradient),
            Some("delta_broadcast") => Ok(WeightUpdate::DeltaBroadcast),
            Some(other) => Err(invalid(format!(
                "Invalid weight_update '{other}'. Must be one of: input_gradient, delta_broadcast"
            ))),
        }
    }
}

/// Loads a training configuration from a JSON file.
///
/// # Returns
///
/// `Ok(TrainingConfig)` on success, or an error if the file cannot be read
/// or the JSON is invalid.
pub fn load_config(path: &str) -> Result<TrainingConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &TrainingConfig) -> Result<(), Box<dyn Error>> {
    if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
        return Err(invalid("learning_rate must be positive".to_string()));
    }

    if config.sample_limit == Some(0) {
        return Err(invalid("sample_limit must be non-zero".to_string()));
    }

    if config.log_every == Some(0) {
        return Err(invalid("log_every must be non-zero".to_string()));
    }

    if config.epochs == Some(0) {
        return Err(invalid("epochs must be non-zero".to_string()));
    }

    // Surface a bad rule name at load time, not mid-run.
    config.weight_update_rule()?;

    Ok(())
}

fn invalid(message: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}
