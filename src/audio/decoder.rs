use crate::types::AudioData;
use anyhow::{ensure, Context, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

/// Decode an audio file to raw PCM samples (mono, f32).
///
/// Accepts any container/codec symphonia can probe. Stereo and
/// multi-channel sources are mixed down by averaging.
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path = path.as_ref();

    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("failed to probe audio format: {}", path.display()))?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no audio tracks found in file")?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("sample rate not specified in audio file")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder")?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(err).context("failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder
            .decode(&packet)
            .context("failed to decode audio packet")?;
        samples.extend(mixdown_buffer(&decoded));
    }

    ensure!(
        !samples.is_empty(),
        "audio file contains no decodable samples: {}",
        path.display()
    );

    Ok(AudioData {
        samples,
        sample_rate,
    })
}

/// Convert any decoded buffer format to mono f32 samples in [-1.0, 1.0].
fn mixdown_buffer(buffer: &AudioBufferRef) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => mixdown(buf, |s| s),
        AudioBufferRef::F64(buf) => mixdown(buf, |s| s as f32),
        AudioBufferRef::S8(buf) => mixdown(buf, |s| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => mixdown(buf, |s| s as f32 / 32_768.0),
        AudioBufferRef::S24(buf) => mixdown(buf, |s| s.inner() as f32 / 8_388_608.0),
        AudioBufferRef::S32(buf) => mixdown(buf, |s| s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => mixdown(buf, |s| s as f32 / 128.0 - 1.0),
        AudioBufferRef::U16(buf) => mixdown(buf, |s| s as f32 / 32_768.0 - 1.0),
        AudioBufferRef::U24(buf) => mixdown(buf, |s| s.inner() as f32 / 8_388_608.0 - 1.0),
        AudioBufferRef::U32(buf) => mixdown(buf, |s| s as f32 / 2_147_483_648.0 - 1.0),
    }
}

fn mixdown<S, F>(buf: &AudioBuffer<S>, convert: F) -> Vec<f32>
where
    S: Sample + Copy,
    F: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    if channels <= 1 {
        return buf.chan(0).iter().map(|&s| convert(s)).collect();
    }
    let mut mono = Vec::with_capacity(frames);
    for i in 0..frames {
        let mut sum = 0.0;
        for ch in 0..channels {
            sum += convert(buf.chan(ch)[i]);
        }
        mono.push(sum / channels as f32);
    }
    mono
}
