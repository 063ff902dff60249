use std::fs;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};

/// Ceiling for the number of cepstral coefficients computed per frame.
pub const DEFAULT_MFCC_LIMIT: usize = 50;

const AUDIO_DIR_NAME: &str = "audio_samples";
const CATALOG_FILE_NAME: &str = "data.csv";
const TEMP_RECORDING_NAME: &str = "audio_temp.wav";

/// Filesystem layout and tuning knobs for one word dataset.
///
/// The dataset root holds the catalog CSV and an `audio_samples`
/// subdirectory with every recorded WAV referenced by it. Paths outside
/// the audio directory are never resolved.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub dataset_root: PathBuf,
    pub mfcc_limit: usize,
}

impl DatasetConfig {
    pub fn new(dataset_root: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            mfcc_limit: DEFAULT_MFCC_LIMIT,
        }
    }

    pub fn with_mfcc_limit(mut self, limit: usize) -> Self {
        self.mfcc_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.mfcc_limit > 0, "mfcc limit must be positive");
        Ok(())
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.dataset_root.join(AUDIO_DIR_NAME)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dataset_root.join(CATALOG_FILE_NAME)
    }

    /// Scratch location for an in-flight recording before it is renamed
    /// into the dataset by the training flow.
    pub fn temp_recording_path(&self) -> PathBuf {
        self.audio_dir().join(TEMP_RECORDING_NAME)
    }

    /// Create the dataset directories if they do not exist yet.
    pub fn ensure_layout(&self) -> Result<()> {
        let audio_dir = self.audio_dir();
        fs::create_dir_all(&audio_dir)
            .with_context(|| format!("failed to create audio directory {:?}", audio_dir))?;
        Ok(())
    }

    /// Resolve a catalog-relative audio filename inside the audio dir.
    pub fn audio_file_path(&self, file_name: &str) -> PathBuf {
        self.audio_dir().join(file_name)
    }
}
