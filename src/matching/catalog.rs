use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::DatasetConfig;
use crate::matching::{MatchError, Result, WordSample};

/// The persisted catalog: an append-only CSV with the exact header
/// `correct_text,audio_file`, one row per recorded sample. Rows are
/// never updated or deleted; the same label may appear many times.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    samples: Vec<WordSample>,
}

impl Catalog {
    /// Read every valid row from the catalog file.
    ///
    /// A missing file is an empty catalog (it is created on the first
    /// training append). Malformed records, including a partially
    /// written trailing line from a concurrent append, are treated as
    /// absent rather than as errors.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|err| catalog_io(path, err))?;

        let mut samples = Vec::new();
        for record in reader.deserialize::<WordSample>() {
            match record {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed catalog row");
                }
            }
        }
        Ok(Self { samples })
    }

    /// Append one row, creating the file with its header when absent.
    pub fn append(path: &Path, sample: &WordSample) -> Result<()> {
        let needs_header = match std::fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| catalog_io(path, err))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(sample)
            .map_err(|err| catalog_io(path, err))?;
        writer.flush().map_err(|err| catalog_io(path, err))?;
        Ok(())
    }

    pub fn samples(&self) -> &[WordSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Resolve the first recorded audio file for `word`.
    ///
    /// Returns `None` when no row matches or when the row's file has
    /// gone missing from the audio directory; an unknown word is a
    /// steady-state condition, not an error.
    pub fn audio_path_for_word(&self, config: &DatasetConfig, word: &str) -> Option<PathBuf> {
        self.samples
            .iter()
            .find(|sample| sample.correct_text == word)
            .map(|sample| config.audio_file_path(&sample.audio_file))
            .filter(|path| path.is_file())
    }
}

fn catalog_io(path: &Path, err: impl std::fmt::Display) -> MatchError {
    MatchError::CatalogIo {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
