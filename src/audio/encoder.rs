use crate::types::AudioData;
use anyhow::{Context, Result};
use std::path::Path;

/// Encode AudioData as 16-bit PCM WAV, the interchange format for
/// dataset recordings.
pub fn encode_audio<P: AsRef<Path>>(audio: &AudioData, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = wav_spec(audio.sample_rate);

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV file: {}", path.display()))?;
    for &sample in &audio.samples {
        writer
            .write_sample(to_i16(sample))
            .context("failed to write audio sample")?;
    }
    writer.finalize().context("failed to finalize WAV file")?;
    Ok(())
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::to_i16;

    #[test]
    fn clamps_out_of_range_samples() {
        assert_eq!(to_i16(2.0), 32_767);
        assert_eq!(to_i16(-2.0), -32_767);
        assert_eq!(to_i16(0.0), 0);
    }
}
