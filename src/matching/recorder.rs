use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::matching::{Catalog, MatchError, Result, WordSample};

const MAX_SUFFIX: u32 = 9_999;

/// Move a finished temp recording into the dataset under a generated
/// filename and append the matching catalog row.
///
/// The filename is the sanitized label plus the lowest unused numeric
/// suffix, so repeated training of one word yields `label_1.wav`,
/// `label_2.wav`, and so on. Catalog and filesystem stay consistent: a
/// failed rename appends nothing, and a failed append rolls the rename
/// back.
pub fn record_sample(
    config: &DatasetConfig,
    temp_audio_path: &Path,
    label: &str,
) -> Result<WordSample> {
    let safe_label = sanitize_label(label);
    if safe_label.is_empty() {
        return Err(MatchError::RenameConflict {
            label: label.to_string(),
            reason: "label contains no filesystem-safe characters".to_string(),
        });
    }

    let file_name = next_free_file_name(config, &safe_label)?;
    let destination = config.audio_file_path(&file_name);
    fs::rename(temp_audio_path, &destination).map_err(|err| MatchError::RenameConflict {
        label: label.to_string(),
        reason: format!(
            "rename {:?} -> {:?} failed: {}",
            temp_audio_path, destination, err
        ),
    })?;

    let sample = WordSample {
        correct_text: label.to_string(),
        audio_file: file_name,
    };
    if let Err(err) = Catalog::append(&config.catalog_path(), &sample) {
        // Undo the rename so no dataset file exists without a row.
        if let Err(undo) = fs::rename(&destination, temp_audio_path) {
            warn!(
                destination = %destination.display(),
                error = %undo,
                "failed to roll back dataset rename after catalog append error"
            );
        }
        return Err(err);
    }

    info!(
        label = %sample.correct_text,
        file = %sample.audio_file,
        "training sample recorded"
    );
    Ok(sample)
}

/// Keep alphanumerics, spaces, and underscores; strip trailing
/// whitespace.
fn sanitize_label(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect();
    kept.trim_end().to_string()
}

fn next_free_file_name(config: &DatasetConfig, safe_label: &str) -> Result<String> {
    for suffix in 1..=MAX_SUFFIX {
        let candidate = format!("{}_{}.wav", safe_label, suffix);
        if !config.audio_file_path(&candidate).exists() {
            return Ok(candidate);
        }
    }
    Err(MatchError::RenameConflict {
        label: safe_label.to_string(),
        reason: format!("all {} filename suffixes are taken", MAX_SUFFIX),
    })
}

#[cfg(test)]
mod tests {
    use super::sanitize_label;

    #[test]
    fn keeps_alphanumerics_spaces_and_underscores() {
        assert_eq!(sanitize_label("hello_world 2"), "hello_world 2");
        assert_eq!(sanitize_label("na/ive?!"), "naive");
    }

    #[test]
    fn strips_trailing_whitespace_only() {
        assert_eq!(sanitize_label("  word  "), "  word");
    }

    #[test]
    fn punctuation_only_label_sanitizes_to_empty() {
        assert_eq!(sanitize_label("?!./"), "");
    }
}
