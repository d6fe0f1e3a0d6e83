//! Decoder for the fixed-header binary image/label sample files.
//!
//! The image file carries a big-endian header (magic, sample count, rows,
//! cols) followed by one unsigned byte per pixel, row-major. The label file
//! carries a magic and a count, then one byte per label. The two files are
//! paired by index; the loaded count is the smaller of the two, optionally
//! capped by the caller. Pixels are normalized into a signed fractional
//! range before training ever sees them.

use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Fatal decode failures. Loading is all-or-nothing: a truncated or missing
/// file aborts the run, it is never skipped or retried.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is too short for its header")]
    HeaderTooShort { path: String },

    #[error("{path} declares {expected} bytes of pixel data but holds {actual}")]
    TruncatedImages {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path} declares {expected} labels but holds {actual}")]
    TruncatedLabels {
        path: String,
        expected: usize,
        actual: usize,
    },
}

/// Labeled samples, fully materialized before training starts.
///
/// Pixels are stored as one flat normalized `f32` buffer; labels are a
/// parallel byte vector. Samples are borrowed by index, never copied.
#[derive(Debug)]
pub struct SampleSet {
    images: Vec<f32>,
    labels: Vec<u8>,
    rows: usize,
    cols: usize,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Normalized pixel count per sample.
    pub fn sample_size(&self) -> usize {
        self.rows * self.cols
    }

    /// The normalized pixels of sample `index`.
    pub fn image(&self, index: usize) -> &[f32] {
        let size = self.sample_size();
        &self.images[index * size..(index + 1) * size]
    }

    pub fn label(&self, index: usize) -> u8 {
        self.labels[index]
    }
}

/// Map a raw pixel byte onto `[-1.0, ~0.992]`: `byte / 128 - 1`.
pub fn normalize_byte(byte: u8) -> f32 {
    byte as f32 / 128.0 - 1.0
}

/// Load paired image and label files.
///
/// The number of samples is `min(image_count, label_count)`, further capped
/// by `limit` when given. Magic numbers are read and logged but not
/// validated.
pub fn load_sample_set(
    image_path: &Path,
    label_path: &Path,
    limit: Option<usize>,
) -> Result<SampleSet, DataError> {
    let image_data = read_file(image_path)?;
    let label_data = read_file(label_path)?;

    let mut offset = 0usize;
    let image_magic = read_be_u32(&image_data, &mut offset, image_path)?;
    let image_count = read_be_u32(&image_data, &mut offset, image_path)? as usize;
    let rows = read_be_u32(&image_data, &mut offset, image_path)? as usize;
    let cols = read_be_u32(&image_data, &mut offset, image_path)? as usize;
    let image_payload = offset;

    let mut offset = 0usize;
    let label_magic = read_be_u32(&label_data, &mut offset, label_path)?;
    let label_count = read_be_u32(&label_data, &mut offset, label_path)? as usize;
    let label_payload = offset;

    debug!(image_magic, label_magic, "sample file headers");

    let mut count = image_count.min(label_count);
    if let Some(limit) = limit {
        count = count.min(limit);
    }

    let sample_size = rows * cols;
    let pixel_bytes = count * sample_size;
    if image_data.len() < image_payload + pixel_bytes {
        return Err(DataError::TruncatedImages {
            path: display(image_path),
            expected: pixel_bytes,
            actual: image_data.len() - image_payload,
        });
    }
    if label_data.len() < label_payload + count {
        return Err(DataError::TruncatedLabels {
            path: display(label_path),
            expected: count,
            actual: label_data.len() - label_payload,
        });
    }

    let mut images = vec![0.0f32; pixel_bytes];
    for (value, &byte) in images
        .iter_mut()
        .zip(image_data[image_payload..image_payload + pixel_bytes].iter())
    {
        *value = normalize_byte(byte);
    }
    let labels = label_data[label_payload..label_payload + count].to_vec();

    info!(
        samples = count,
        rows, cols, "loaded sample set"
    );

    Ok(SampleSet {
        images,
        labels,
        rows,
        cols,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, DataError> {
    fs::read(path).map_err(|source| DataError::Io {
        path: display(path),
        source,
    })
}

// Big-endian u32 at `offset`, advancing it.
fn read_be_u32(data: &[u8], offset: &mut usize, path: &Path) -> Result<u32, DataError> {
    if data.len() < *offset + 4 {
        return Err(DataError::HeaderTooShort {
            path: display(path),
        });
    }
    let value = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]);
    *offset += 4;
    Ok(value)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
