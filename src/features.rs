//! Read-only spectrogram feature store
//!
//! The ingestion pipeline precomputes one tensor stack per recording:
//! `<features_dir>/<recording_stem>.npy`, an f32 array of shape
//! `[segments, 3, height, width]` with one slice per 5-second segment,
//! ordered by start offset.
//!
//! A recording present in the store without its feature artifact is an
//! ingestion bug, so lookups fail fast with a distinguishable error instead
//! of skipping the recording.

use crate::{Error, Result};
use ndarray::Array4;
use std::path::{Path, PathBuf};

/// Handle on the feature artifact directory
#[derive(Debug, Clone)]
pub struct FeatureStore {
    dir: PathBuf,
}

impl FeatureStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Path of the feature stack for a recording filename
    pub fn stack_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{}.npy", stem(filename)))
    }

    /// Load the full feature stack for a recording.
    /// Missing artifact is fatal (`Error::MissingFeatures`).
    pub fn load_stack(&self, filename: &str) -> Result<Array4<f32>> {
        let path = self.stack_path(filename);
        if !path.exists() {
            return Err(Error::MissingFeatures {
                recording: filename.to_string(),
                path,
            });
        }
        let stack: Array4<f32> = ndarray_npy::read_npy(&path).map_err(|e| {
            Error::Features(format!("cannot read {}: {}", path.display(), e))
        })?;
        if stack.shape()[1] != 3 {
            return Err(Error::Features(format!(
                "{}: expected 3 channels, found {}",
                path.display(),
                stack.shape()[1]
            )));
        }
        Ok(stack)
    }

    /// Number of segment slices in a recording's stack
    pub fn segment_count(&self, filename: &str) -> Result<usize> {
        Ok(self.load_stack(filename)?.shape()[0])
    }
}

/// Filename without its final extension ("XC12345_COR.ogg" → "XC12345_COR")
fn stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}
