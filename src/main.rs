use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wordmatch::audio::capture::{self, CaptureConfig};
use wordmatch::audio::encoder;
use wordmatch::config::{DatasetConfig, DEFAULT_MFCC_LIMIT};
use wordmatch::matching::{
    build_dataset_features, rank_against_dataset, record_sample, Catalog, FeatureMatrix,
};

/// Wordmatch - rank spoken-word recordings against a trained dataset
///
/// Maintains a catalog of labeled word recordings and matches new audio
/// against it by MFCC standard-deviation distance.
#[derive(Parser, Debug)]
#[command(name = "wordmatch")]
#[command(version = "0.1.0")]
#[command(about = "Word-level audio matching against a recorded dataset", long_about = None)]
struct Cli {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct DatasetArgs {
    /// Dataset root directory (catalog CSV plus audio_samples/)
    #[arg(long, default_value = "dataset")]
    dataset_dir: PathBuf,

    /// Ceiling for the number of MFCC coefficients per frame
    #[arg(long, default_value_t = DEFAULT_MFCC_LIMIT)]
    mfcc_limit: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank every dataset sample by distance to a query recording.
    Rank {
        /// Query audio file
        #[arg(value_name = "QUERY")]
        query: PathBuf,
    },
    /// Print only the best (lowest-distance) match for a query.
    Best {
        #[arg(value_name = "QUERY")]
        query: PathBuf,
    },
    /// Move a recording into the dataset and append a catalog row.
    Train {
        /// Recording to move into the dataset
        #[arg(value_name = "RECORDING")]
        recording: PathBuf,

        /// The word this recording speaks
        #[arg(long)]
        label: String,
    },
    /// Record from the microphone, then optionally train with a label.
    Record {
        /// Listen window in seconds
        #[arg(long, default_value_t = capture::DEFAULT_LISTEN_SECONDS)]
        seconds: u64,

        /// Input device name (default input device when omitted)
        #[arg(long)]
        device: Option<String>,

        /// Append the recording to the dataset under this label
        #[arg(long)]
        label: Option<String>,
    },
    /// Show the recorded audio file backing a word, if any.
    Lookup {
        #[arg(value_name = "WORD")]
        word: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = DatasetConfig::new(cli.dataset.dataset_dir.clone())
        .with_mfcc_limit(cli.dataset.mfcc_limit);
    config.validate().context("invalid dataset options")?;

    match cli.command {
        Command::Rank { query } => handle_rank(&config, &query, false),
        Command::Best { query } => handle_rank(&config, &query, true),
        Command::Train { recording, label } => handle_train(&config, &recording, &label),
        Command::Record {
            seconds,
            device,
            label,
        } => handle_record(&config, seconds, device, label.as_deref()),
        Command::Lookup { word } => handle_lookup(&config, &word),
    }
}

fn handle_rank(config: &DatasetConfig, query: &PathBuf, best_only: bool) -> Result<()> {
    let ranked = rank_query(config, query)?;
    if ranked.is_empty() {
        println!("Dataset has no usable samples; record some with `wordmatch record`.");
        return Ok(());
    }
    if best_only {
        let best = &ranked[0];
        println!("{} (stddev: {:.4})", best.label, best.distance);
    } else {
        for result in &ranked {
            println!("{} (stddev: {:.4})", result.label, result.distance);
        }
    }
    Ok(())
}

fn rank_query(
    config: &DatasetConfig,
    query: &PathBuf,
) -> Result<Vec<wordmatch::matching::MatchResult>> {
    let features: FeatureMatrix = wordmatch::matching::extract(query, config.mfcc_limit)
        .with_context(|| format!("failed to extract features from {:?}", query))?;
    let catalog = Catalog::load(&config.catalog_path()).context("failed to load catalog")?;
    let dataset = build_dataset_features(config, &catalog);
    let ranked = rank_against_dataset(&features, &dataset)
        .context("failed to rank query against dataset")?;
    Ok(ranked)
}

fn handle_train(config: &DatasetConfig, recording: &PathBuf, label: &str) -> Result<()> {
    config.ensure_layout()?;
    let sample = record_sample(config, recording, label)
        .with_context(|| format!("failed to train label {:?}", label))?;
    println!(
        "Training data saved: {} -> {}",
        sample.correct_text, sample.audio_file
    );
    Ok(())
}

fn handle_record(
    config: &DatasetConfig,
    seconds: u64,
    device: Option<String>,
    label: Option<&str>,
) -> Result<()> {
    config.ensure_layout()?;
    let mut capture_config = CaptureConfig::new(Duration::from_secs(seconds));
    capture_config.device_name = device;

    println!("Listening for {} seconds...", seconds);
    let audio = capture::record_audio(&capture_config).context("microphone capture failed")?;
    let temp_wav = config.temp_recording_path();
    encoder::encode_audio(&audio, &temp_wav)
        .with_context(|| format!("failed to write recording to {:?}", temp_wav))?;
    println!(
        "Recorded {:.2}s of audio to {:?}",
        audio.duration_seconds(),
        temp_wav
    );

    if let Some(label) = label {
        let sample = record_sample(config, &temp_wav, label)
            .with_context(|| format!("failed to train label {:?}", label))?;
        println!(
            "Training data saved: {} -> {}",
            sample.correct_text, sample.audio_file
        );
    }
    Ok(())
}

fn handle_lookup(config: &DatasetConfig, word: &str) -> Result<()> {
    let catalog = Catalog::load(&config.catalog_path()).context("failed to load catalog")?;
    match catalog.audio_path_for_word(config, word) {
        Some(path) => println!("{}", path.display()),
        None => println!("No recorded audio for '{}'", word),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn parses_rank_with_dataset_override() {
        let cli = Cli::try_parse_from([
            "wordmatch",
            "--dataset-dir",
            "words",
            "--mfcc-limit",
            "13",
            "rank",
            "query.wav",
        ])
        .unwrap();
        assert_eq!(cli.dataset.mfcc_limit, 13);
        assert!(matches!(cli.command, Command::Rank { .. }));
    }

    #[test]
    fn train_requires_a_label() {
        let result = Cli::try_parse_from(["wordmatch", "train", "clip.wav"]);
        assert!(result.is_err());
    }

    #[test]
    fn record_defaults_to_three_second_listen() {
        let cli = Cli::try_parse_from(["wordmatch", "record"]).unwrap();
        match cli.command {
            Command::Record { seconds, .. } => assert_eq!(seconds, 3),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
