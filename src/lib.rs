//! Word-level audio matching: MFCC feature extraction, dataset ranking,
//! and training-catalog maintenance for recorded word samples.

pub mod audio;
pub mod config;
pub mod matching;
pub mod types;
