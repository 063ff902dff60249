use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};

use crate::audio::resample;
use crate::types::AudioData;

/// Sample rate for dataset recordings (matches the catalog's WAV format).
pub const RECORDING_SAMPLE_RATE: u32 = 44_100;

/// Default listen window for one word recording.
pub const DEFAULT_LISTEN_SECONDS: u64 = 3;

const CHANNEL_CAPACITY: usize = 32;
const RECV_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub device_name: Option<String>,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl CaptureConfig {
    pub fn new(duration: Duration) -> Self {
        Self {
            device_name: None,
            sample_rate: RECORDING_SAMPLE_RATE,
            duration,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_LISTEN_SECONDS))
    }
}

/// Record from the microphone for the configured duration, blocking
/// until done. Callers run this on a worker thread so the surrounding
/// application stays responsive.
pub fn record_audio(config: &CaptureConfig) -> Result<AudioData> {
    let device = select_device(config)?;
    let supported = device
        .default_input_config()
        .context("failed to query default input config")?;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: BufferSize::Default,
    };
    let device_rate = stream_config.sample_rate.0;

    let (sender, receiver) = mpsc::sync_channel::<Vec<f32>>(CHANNEL_CAPACITY);
    let finished = Arc::new(AtomicBool::new(false));
    let stream = build_input_stream(
        &device,
        &stream_config,
        supported.sample_format(),
        Arc::new(sender),
        finished.clone(),
    )?;

    let frames_needed = frames_for_duration(config.duration, device_rate);
    let raw = collect_samples(stream, receiver, finished, frames_needed)?;

    let samples = if device_rate == config.sample_rate {
        raw
    } else {
        resample::linear_resample(&raw, device_rate, config.sample_rate)?
    };
    Ok(AudioData {
        samples,
        sample_rate: config.sample_rate,
    })
}

fn select_device(config: &CaptureConfig) -> Result<Device> {
    let host = cpal::default_host();
    if let Some(name) = config.device_name.as_deref() {
        for device in host
            .input_devices()
            .context("listing input devices failed")?
        {
            if device.name().map(|n| n == name).unwrap_or(false) {
                return Ok(device);
            }
        }
        return Err(anyhow!("input device '{}' not found", name));
    }
    host.default_input_device()
        .context("no default input device available")
}

fn build_input_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    sender: Arc<SyncSender<Vec<f32>>>,
    finished: Arc<AtomicBool>,
) -> Result<Stream> {
    let err_fn = |err| tracing::error!(error = %err, "audio input stream error");
    let channels = config.channels as usize;
    match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            {
                let sender = sender.clone();
                let finished = finished.clone();
                move |data: &[f32], _| emit_mono(data, channels, &sender, &finished)
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            {
                let sender = sender.clone();
                let finished = finished.clone();
                move |data: &[i16], _| {
                    let converted: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    emit_mono(&converted, channels, &sender, &finished)
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            {
                let sender = sender.clone();
                let finished = finished.clone();
                move |data: &[u16], _| {
                    let converted: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                        .collect();
                    emit_mono(&converted, channels, &sender, &finished)
                }
            },
            err_fn,
            None,
        ),
        other => return Err(anyhow!("unsupported input sample format {:?}", other)),
    }
    .map_err(|err| anyhow!(err))
    .context("failed to build input stream")
}

fn emit_mono(
    data: &[f32],
    channels: usize,
    sender: &Arc<SyncSender<Vec<f32>>>,
    finished: &Arc<AtomicBool>,
) {
    if finished.load(Ordering::Relaxed) || channels == 0 {
        return;
    }
    let mono: Vec<f32> = data
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    let _ = sender.try_send(mono);
}

fn collect_samples(
    stream: Stream,
    receiver: Receiver<Vec<f32>>,
    finished: Arc<AtomicBool>,
    frames_needed: usize,
) -> Result<Vec<f32>> {
    stream.play().context("failed to start capture stream")?;
    let mut collected = Vec::with_capacity(frames_needed);
    while collected.len() < frames_needed {
        match receiver.recv_timeout(RECV_POLL) {
            Ok(chunk) => {
                let remaining = frames_needed - collected.len();
                collected.extend(chunk.into_iter().take(remaining));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    finished.store(true, Ordering::SeqCst);
    stream.pause().ok();
    Ok(collected)
}

fn frames_for_duration(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).ceil() as usize
}
