use std::path::{Path, PathBuf};

use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::Array2;

use crate::audio::{decoder, resample};
use crate::matching::{FeatureMatrix, MatchError, Result};
use crate::types::AudioData;

pub(crate) const ANALYSIS_SAMPLE_RATE: u32 = 16_000;
pub(crate) const WINDOW_MS: usize = 25;
pub(crate) const HOP_MS: usize = 10;
pub(crate) const MEL_BANDS: usize = 80;
const MIN_FREQ: f64 = 20.0;

/// Extract an MFCC feature matrix from an audio file.
///
/// Deterministic: the same file and coefficient limit always produce a
/// bit-identical matrix. The first axis holds at most `coefficient_limit`
/// cepstral coefficients; the second axis length follows recording
/// duration.
pub fn extract(path: &Path, coefficient_limit: usize) -> Result<FeatureMatrix> {
    let audio = decoder::decode_audio(path).map_err(|err| MatchError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    extract_from_audio(&audio, coefficient_limit)
}

/// Extract MFCC features from an in-memory mono waveform, e.g. one that
/// just came off the microphone.
pub fn extract_from_audio(audio: &AudioData, coefficient_limit: usize) -> Result<FeatureMatrix> {
    if coefficient_limit == 0 {
        return Err(MatchError::InvalidCoefficientLimit);
    }
    let mono = ensure_analysis_rate(audio)?;
    Ok(compute_mfcc(&mono, coefficient_limit))
}

fn ensure_analysis_rate(audio: &AudioData) -> Result<Vec<f32>> {
    if audio.sample_rate == ANALYSIS_SAMPLE_RATE {
        return Ok(audio.samples.clone());
    }
    // A waveform that cannot be brought to the analysis rate is
    // unprocessable input, the same failure class as a bad file.
    resample::linear_resample(&audio.samples, audio.sample_rate, ANALYSIS_SAMPLE_RATE).map_err(
        |err| MatchError::Decode {
            path: PathBuf::from("<in-memory audio>"),
            reason: format!(
                "failed to resample from {} Hz to {} Hz: {}",
                audio.sample_rate, ANALYSIS_SAMPLE_RATE, err
            ),
        },
    )
}

fn compute_mfcc(samples: &[f32], coefficient_limit: usize) -> FeatureMatrix {
    let audio_f64: Vec<f64> = samples.iter().map(|&s| s as f64).collect();

    let fft_size = ((ANALYSIS_SAMPLE_RATE as usize * WINDOW_MS) / 1000).max(1);
    let hop_size = ((ANALYSIS_SAMPLE_RATE as usize * HOP_MS) / 1000).max(1);

    let stft = spectrum::rstft(&audio_f64, fft_size, hop_size, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let power = analysis::make_power_spectrogram(&magnitude);

    let freqs = spectrum::rfftfreq(fft_size, ANALYSIS_SAMPLE_RATE);
    let filterbank = MelFilterbank::new(
        MIN_FREQ,
        (ANALYSIS_SAMPLE_RATE as f64) / 2.0,
        MEL_BANDS,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);

    let coefficients = coefficient_limit.min(MEL_BANDS);
    let mfcc_frames = analysis::mel::mfcc_spectrogram(&mel, coefficients, None);
    matrix_from_frames(&mfcc_frames)
}

/// Transpose per-frame coefficient rows into a (coefficients x frames)
/// matrix.
fn matrix_from_frames(frames: &[Vec<f64>]) -> FeatureMatrix {
    if frames.is_empty() {
        return Array2::zeros((0, 0));
    }
    let frame_count = frames.len();
    let coefficient_count = frames[0].len();
    let mut matrix = Array2::zeros((coefficient_count, frame_count));
    for (t, frame) in frames.iter().enumerate() {
        for (c, value) in frame.iter().enumerate() {
            matrix[[c, t]] = *value as f32;
        }
    }
    matrix
}
