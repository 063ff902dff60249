//! The matching core: MFCC feature extraction, catalog-backed dataset
//! construction, standard-deviation distance ranking, and the training
//! recorder that grows the dataset.

pub mod catalog;
pub mod dataset;
pub mod distance;
pub mod features;
pub mod recorder;
pub mod session;

use std::path::PathBuf;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::Catalog;
pub use dataset::{
    build_dataset_features, build_dataset_features_cached, DatasetFeatures, FeatureCache,
};
pub use distance::{distance, rank_against_dataset};
pub use features::{extract, extract_from_audio};
pub use recorder::record_sample;
pub use session::{
    CaptureSource, LiveCaptureSource, MatchSession, RecordedWord, RecordingHandle,
    TrainingOutcome, Transcriber, Translate,
};

/// Convenient alias for results returned by the matching core.
pub type Result<T> = std::result::Result<T, MatchError>;

/// MFCC feature matrix: coefficients along the first axis, analysis
/// frames along the second. Frame count varies with recording length.
pub type FeatureMatrix = Array2<f32>;

/// Typed failures surfaced at the library boundary. Matching errors are
/// never converted into fabricated distances or silent empty results.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Audio file missing, unreadable, or not a decodable container.
    #[error("failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Feature matrices differ in shape; the element-wise difference is
    /// undefined, so the distance is refused rather than guessed.
    #[error("feature matrix shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// The coefficient ceiling must be a positive integer.
    #[error("coefficient limit must be positive")]
    InvalidCoefficientLimit,

    /// Catalog file unreadable or unwritable.
    #[error("catalog I/O failure at {path:?}: {reason}")]
    CatalogIo { path: PathBuf, reason: String },

    /// The training recording could not be placed under its generated
    /// dataset filename.
    #[error("could not place recording for {label:?}: {reason}")]
    RenameConflict { label: String, reason: String },

    /// Only one recording session may be active at a time.
    #[error("a recording session is already in progress")]
    RecordingInProgress,

    /// Microphone capture failed.
    #[error("audio capture failed: {0}")]
    Capture(String),

    /// The speech-to-text collaborator reported an error.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// The translation collaborator reported an error.
    #[error("translation failed: {0}")]
    Translation(String),
}

/// One row of the catalog: a word label and the WAV file recorded for it,
/// relative to the dataset's audio directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSample {
    pub correct_text: String,
    pub audio_file: String,
}

/// A ranked candidate: lower distance means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: String,
    pub distance: f32,
}
