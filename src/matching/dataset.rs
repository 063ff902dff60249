use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::config::DatasetConfig;
use crate::matching::{features, Catalog, FeatureMatrix, Result};

/// Labeled feature matrices in catalog order.
///
/// Kept as a flat sequence rather than a map so that ranking ties break
/// by first-seen dataset order; per-label grouping preserves the same
/// order. Labels whose rows all pointed at missing files do not appear.
#[derive(Debug, Clone, Default)]
pub struct DatasetFeatures {
    entries: Vec<(String, FeatureMatrix)>,
}

impl DatasetFeatures {
    pub fn push(&mut self, label: impl Into<String>, features: FeatureMatrix) {
        self.entries.push((label.into(), features));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FeatureMatrix)> {
        self.entries
            .iter()
            .map(|(label, features)| (label.as_str(), features))
    }

    /// Unique labels in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (label, _) in &self.entries {
            if !seen.contains(&label.as_str()) {
                seen.push(label.as_str());
            }
        }
        seen
    }

    /// Every feature matrix recorded for `label`, in catalog order.
    pub fn features_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a FeatureMatrix> {
        self.entries
            .iter()
            .filter(move |(entry_label, _)| entry_label == label)
            .map(|(_, features)| features)
    }

    /// A copy of this dataset with every sample for `label` removed,
    /// e.g. to keep a word from matching its own recordings.
    pub fn without_label(&self, label: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(entry_label, _)| entry_label != label)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scan every catalog row and extract features for each sample whose
/// audio file still exists.
///
/// Missing files are skipped silently (the catalog may reference stale
/// recordings); extraction failures are logged and skipped so one corrupt
/// sample cannot poison the scan. Every call recomputes from disk; pass a
/// [`FeatureCache`] through [`build_dataset_features_cached`] to avoid
/// that.
pub fn build_dataset_features(config: &DatasetConfig, catalog: &Catalog) -> DatasetFeatures {
    scan(config, catalog, None)
}

/// Like [`build_dataset_features`], reusing cached matrices for files
/// whose modification time is unchanged.
pub fn build_dataset_features_cached(
    config: &DatasetConfig,
    catalog: &Catalog,
    cache: &mut FeatureCache,
) -> DatasetFeatures {
    scan(config, catalog, Some(cache))
}

fn scan(
    config: &DatasetConfig,
    catalog: &Catalog,
    mut cache: Option<&mut FeatureCache>,
) -> DatasetFeatures {
    let mut dataset = DatasetFeatures::default();
    for sample in catalog.samples() {
        let path = config.audio_file_path(&sample.audio_file);
        if !path.is_file() {
            debug!(
                label = %sample.correct_text,
                file = %sample.audio_file,
                "skipping catalog row with missing audio file"
            );
            continue;
        }
        let extracted = match cache.as_deref_mut() {
            Some(cache) => cache.features_for(&path, config.mfcc_limit),
            None => features::extract(&path, config.mfcc_limit),
        };
        match extracted {
            Ok(features) => dataset.push(sample.correct_text.clone(), features),
            Err(err) => {
                warn!(
                    label = %sample.correct_text,
                    file = %sample.audio_file,
                    error = %err,
                    "skipping undecodable dataset sample"
                );
            }
        }
    }
    dataset
}

/// Optional feature cache keyed by path and modification time.
///
/// Purely a performance layer over the fresh-recomputation contract: a
/// changed file invalidates its entry, so cached and uncached scans
/// produce identical datasets.
#[derive(Debug, Default)]
pub struct FeatureCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    modified: SystemTime,
    limit: usize,
    features: FeatureMatrix,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn features_for(&mut self, path: &Path, coefficient_limit: usize) -> Result<FeatureMatrix> {
        let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            // No usable timestamp; extract without caching.
            Err(_) => return features::extract(path, coefficient_limit),
        };
        if let Some(entry) = self.entries.get(path) {
            if entry.modified == modified && entry.limit == coefficient_limit {
                return Ok(entry.features.clone());
            }
        }
        let features = features::extract(path, coefficient_limit)?;
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                modified,
                limit: coefficient_limit,
                features: features.clone(),
            },
        );
        Ok(features)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
