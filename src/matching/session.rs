use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::audio::capture::{self, CaptureConfig};
use crate::audio::encoder;
use crate::config::DatasetConfig;
use crate::matching::{
    build_dataset_features_cached, features, rank_against_dataset, recorder, Catalog, FeatureCache,
    MatchError, MatchResult, Result, WordSample,
};
use crate::types::AudioData;

/// Speech-to-text collaborator. Failures are surfaced to the caller and
/// never touch catalog state.
pub trait Transcriber: Send + 'static {
    fn transcribe(&self, audio: &AudioData) -> anyhow::Result<String>;
}

/// Translation collaborator, entirely outside the matching core.
pub trait Translate {
    fn translate(&self, text: &str, target_language: &str) -> anyhow::Result<String>;
}

/// Source of recorded audio, so tests can drive the session without a
/// microphone.
pub trait CaptureSource: Send + 'static {
    fn record(&mut self, config: &CaptureConfig) -> anyhow::Result<AudioData>;
}

/// Microphone-backed capture source.
#[derive(Debug, Default)]
pub struct LiveCaptureSource;

impl CaptureSource for LiveCaptureSource {
    fn record(&mut self, config: &CaptureConfig) -> anyhow::Result<AudioData> {
        capture::record_audio(config)
    }
}

/// One finished voice recording: the transcript plus the temp WAV the
/// training flow may rename into the dataset.
#[derive(Debug, Clone)]
pub struct RecordedWord {
    pub transcript: String,
    pub temp_wav: PathBuf,
}

/// Completion message from the training writer worker.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub label: String,
    pub result: Result<WordSample>,
}

struct TrainingJob {
    temp_path: PathBuf,
    label: String,
}

/// Explicit session state for the word-matching workflow.
///
/// Replaces the ambient globals of a chat-window integration: the
/// training flag, the last translated text, and the single-recording
/// guard all live here, and catalog appends are serialized through one
/// writer thread.
pub struct MatchSession {
    config: DatasetConfig,
    capture_config: CaptureConfig,
    training_enabled: bool,
    last_translated_text: String,
    recording: Arc<AtomicBool>,
    cache: FeatureCache,
    trainer_tx: Option<Sender<TrainingJob>>,
    trainer_rx: Receiver<TrainingOutcome>,
    trainer_join: Option<JoinHandle<()>>,
}

impl MatchSession {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        if config.mfcc_limit == 0 {
            return Err(MatchError::InvalidCoefficientLimit);
        }
        config
            .ensure_layout()
            .map_err(|err| MatchError::CatalogIo {
                path: config.audio_dir(),
                reason: err.to_string(),
            })?;

        let (job_tx, job_rx) = channel::<TrainingJob>();
        let (outcome_tx, outcome_rx) = channel::<TrainingOutcome>();
        let worker_config = config.clone();
        let join = thread::Builder::new()
            .name("training-writer".to_string())
            .spawn(move || run_training_worker(worker_config, job_rx, outcome_tx))
            .map_err(|err| MatchError::CatalogIo {
                path: config.catalog_path(),
                reason: format!("failed to spawn training worker: {}", err),
            })?;
        info!(dataset = %config.dataset_root.display(), "match session started");

        Ok(Self {
            config,
            capture_config: CaptureConfig::default(),
            training_enabled: false,
            last_translated_text: String::new(),
            recording: Arc::new(AtomicBool::new(false)),
            cache: FeatureCache::new(),
            trainer_tx: Some(job_tx),
            trainer_rx: outcome_rx,
            trainer_join: Some(join),
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn set_capture_config(&mut self, capture_config: CaptureConfig) {
        self.capture_config = capture_config;
    }

    pub fn training_enabled(&self) -> bool {
        self.training_enabled
    }

    pub fn set_training_enabled(&mut self, enabled: bool) {
        self.training_enabled = enabled;
    }

    pub fn last_translated_text(&self) -> &str {
        &self.last_translated_text
    }

    pub fn set_last_translated_text(&mut self, text: impl Into<String>) {
        self.last_translated_text = text.into();
    }

    /// Rank a query recording against every sample in the dataset.
    pub fn rank_query(&mut self, query_wav: &Path) -> Result<Vec<MatchResult>> {
        let query = features::extract(query_wav, self.config.mfcc_limit)?;
        let catalog = Catalog::load(&self.config.catalog_path())?;
        let dataset = build_dataset_features_cached(&self.config, &catalog, &mut self.cache);
        rank_against_dataset(&query, &dataset)
    }

    /// The lowest-distance dataset match for a query recording, if the
    /// dataset has any usable samples.
    pub fn best_match(&mut self, query_wav: &Path) -> Result<Option<MatchResult>> {
        let mut ranked = self.rank_query(query_wav)?;
        if ranked.is_empty() {
            return Ok(None);
        }
        Ok(Some(ranked.remove(0)))
    }

    /// Replace `selected` in the last translated text with the closest
    /// other word in the dataset.
    ///
    /// The selected word's own samples are excluded from the ranking;
    /// its recording is already a dataset row, and ranking it against
    /// itself would always win with a self-distance of zero. Returns the
    /// updated text, or `None` when the selected word has no usable
    /// recording or no other word is recorded; both are steady-state
    /// conditions.
    pub fn swap_word(&mut self, selected: &str) -> Result<Option<String>> {
        let catalog = Catalog::load(&self.config.catalog_path())?;
        let Some(selected_wav) = catalog.audio_path_for_word(&self.config, selected) else {
            return Ok(None);
        };
        let query = features::extract(&selected_wav, self.config.mfcc_limit)?;
        let dataset = build_dataset_features_cached(&self.config, &catalog, &mut self.cache);
        let candidates = dataset.without_label(selected);
        let mut ranked = rank_against_dataset(&query, &candidates)?;
        if ranked.is_empty() {
            return Ok(None);
        }
        let best = ranked.remove(0);
        let swapped = self.last_translated_text.replace(selected, &best.label);
        self.last_translated_text = swapped.clone();
        info!(from = selected, to = %best.label, distance = best.distance, "word swapped");
        Ok(Some(swapped))
    }

    /// Translate free text through the collaborator and remember the
    /// result as the swap target buffer.
    pub fn translate_message(
        &mut self,
        translator: &impl Translate,
        text: &str,
        target_language: &str,
    ) -> Result<String> {
        let translated = translator
            .translate(text, target_language)
            .map_err(|err| MatchError::Translation(err.to_string()))?;
        self.last_translated_text = translated.clone();
        Ok(translated)
    }

    /// Start a fire-and-forget voice recording on a worker thread.
    ///
    /// Rejected while another recording is active; the original UI
    /// toggled one button and never defended against overlap, so the
    /// guard is explicit here.
    pub fn start_recording<T: Transcriber>(&self, transcriber: T) -> Result<RecordingHandle> {
        self.start_recording_with(LiveCaptureSource, transcriber)
    }

    pub fn start_recording_with<C, T>(&self, source: C, transcriber: T) -> Result<RecordingHandle>
    where
        C: CaptureSource,
        T: Transcriber,
    {
        if self
            .recording
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MatchError::RecordingInProgress);
        }

        let flag = self.recording.clone();
        let config = self.config.clone();
        let capture_config = self.capture_config.clone();
        let (tx, rx) = channel();
        let join = thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || {
                let result = run_recording(source, transcriber, &config, &capture_config);
                if let Err(err) = &result {
                    error!(error = %err, "voice recording failed");
                }
                let _ = tx.send(result);
                flag.store(false, Ordering::SeqCst);
            })
            .map_err(|err| {
                self.recording.store(false, Ordering::SeqCst);
                MatchError::Capture(format!("failed to spawn capture thread: {}", err))
            })?;

        Ok(RecordingHandle {
            receiver: rx,
            join: Some(join),
        })
    }

    pub fn recording_in_progress(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Queue a catalog append for a finished recording. The single
    /// training-writer thread applies jobs in order.
    pub fn queue_training(&self, temp_path: PathBuf, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        let sender = self
            .trainer_tx
            .as_ref()
            .ok_or_else(|| worker_stopped(&self.config))?;
        sender
            .send(TrainingJob {
                temp_path,
                label,
            })
            .map_err(|_| worker_stopped(&self.config))
    }

    /// Collect completion messages from the training worker without
    /// blocking.
    pub fn poll_training(&self) -> Vec<TrainingOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.trainer_rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Remove WAV files from the audio directory that no catalog row
    /// references, i.e. leftovers from abandoned recordings. Returns the
    /// number of files removed.
    pub fn cleanup_stray_recordings(&self) -> Result<usize> {
        let catalog = Catalog::load(&self.config.catalog_path())?;
        let audio_dir = self.config.audio_dir();
        let entries = std::fs::read_dir(&audio_dir).map_err(|err| MatchError::CatalogIo {
            path: audio_dir.clone(),
            reason: err.to_string(),
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_wav = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false);
            if !is_wav {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let referenced = catalog
                .samples()
                .iter()
                .any(|sample| sample.audio_file == name);
            if referenced {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(file = %path.display(), error = %err, "failed to remove stray recording"),
            }
        }
        Ok(removed)
    }
}

impl Drop for MatchSession {
    fn drop(&mut self) {
        // Closing the job channel lets the worker drain and exit.
        drop(self.trainer_tx.take());
        if let Some(join) = self.trainer_join.take() {
            let _ = join.join();
        }
    }
}

/// Receives the result of one in-flight recording.
pub struct RecordingHandle {
    receiver: Receiver<Result<RecordedWord>>,
    join: Option<JoinHandle<()>>,
}

impl RecordingHandle {
    /// Block until the recording worker finishes.
    pub fn wait(mut self) -> Result<RecordedWord> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| MatchError::Capture("recording worker disconnected".to_string()))?;
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        result
    }

    /// Non-blocking check for a finished recording.
    pub fn try_finish(&self) -> Option<Result<RecordedWord>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn worker_stopped(config: &DatasetConfig) -> MatchError {
    MatchError::CatalogIo {
        path: config.catalog_path(),
        reason: "training worker is not running".to_string(),
    }
}

fn run_recording<C: CaptureSource, T: Transcriber>(
    mut source: C,
    transcriber: T,
    config: &DatasetConfig,
    capture_config: &CaptureConfig,
) -> Result<RecordedWord> {
    let audio = source
        .record(capture_config)
        .map_err(|err| MatchError::Capture(err.to_string()))?;
    let temp_wav = config.temp_recording_path();
    encoder::encode_audio(&audio, &temp_wav)
        .map_err(|err| MatchError::Capture(err.to_string()))?;
    let transcript = transcriber
        .transcribe(&audio)
        .map_err(|err| MatchError::Transcription(err.to_string()))?;
    info!(transcript = %transcript, "voice recording transcribed");
    Ok(RecordedWord {
        transcript,
        temp_wav,
    })
}

fn run_training_worker(
    config: DatasetConfig,
    jobs: Receiver<TrainingJob>,
    outcomes: Sender<TrainingOutcome>,
) {
    while let Ok(job) = jobs.recv() {
        let result = recorder::record_sample(&config, &job.temp_path, &job.label);
        if let Err(err) = &result {
            error!(label = %job.label, error = %err, "training append failed");
        }
        let _ = outcomes.send(TrainingOutcome {
            label: job.label,
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::SyncSender;
    use std::sync::mpsc::{sync_channel, Receiver as SyncReceiver};
    use std::time::Duration;

    struct EchoTranscriber;

    impl Transcriber for EchoTranscriber {
        fn transcribe(&self, _audio: &AudioData) -> anyhow::Result<String> {
            Ok("hello".to_string())
        }
    }

    struct FixedCapture;

    impl CaptureSource for FixedCapture {
        fn record(&mut self, config: &CaptureConfig) -> anyhow::Result<AudioData> {
            Ok(AudioData {
                samples: vec![0.1; 4_410],
                sample_rate: config.sample_rate,
            })
        }
    }

    /// Blocks inside `record` until released, so tests can hold the
    /// recording guard open deterministically.
    struct GatedCapture {
        gate: SyncReceiver<()>,
    }

    impl CaptureSource for GatedCapture {
        fn record(&mut self, config: &CaptureConfig) -> anyhow::Result<AudioData> {
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
            Ok(AudioData {
                samples: vec![0.0; 441],
                sample_rate: config.sample_rate,
            })
        }
    }

    fn gated_capture() -> (SyncSender<()>, GatedCapture) {
        let (tx, rx) = sync_channel(1);
        (tx, GatedCapture { gate: rx })
    }

    struct UpcaseTranslator;

    impl Translate for UpcaseTranslator {
        fn translate(&self, text: &str, _target_language: &str) -> anyhow::Result<String> {
            Ok(text.to_uppercase())
        }
    }

    fn session_in(dir: &std::path::Path) -> MatchSession {
        MatchSession::new(DatasetConfig::new(dir.join("dataset")).with_mfcc_limit(13)).unwrap()
    }

    fn write_tone(path: &Path, frequency: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..22_050 {
            let t = i as f32 / 44_100.0;
            let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.4;
            writer.write_sample((sample * 32_767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn train_tone(session: &MatchSession, label: &str, frequency: f32) {
        let file_name = format!("{}_1.wav", label);
        write_tone(&session.config().audio_file_path(&file_name), frequency);
        Catalog::append(
            &session.config().catalog_path(),
            &WordSample {
                correct_text: label.to_string(),
                audio_file: file_name,
            },
        )
        .unwrap();
    }

    #[test]
    fn recording_produces_temp_wav_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let handle = session
            .start_recording_with(FixedCapture, EchoTranscriber)
            .unwrap();
        let word = handle.wait().unwrap();
        assert_eq!(word.transcript, "hello");
        assert!(word.temp_wav.is_file());
        assert!(!session.recording_in_progress());
    }

    #[test]
    fn concurrent_recordings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let (release, capture) = gated_capture();
        let handle = session
            .start_recording_with(capture, EchoTranscriber)
            .unwrap();

        let second = session.start_recording_with(FixedCapture, EchoTranscriber);
        assert!(matches!(second, Err(MatchError::RecordingInProgress)));

        release.send(()).unwrap();
        handle.wait().unwrap();
        assert!(!session.recording_in_progress());

        // Guard released; a new recording may start.
        let third = session
            .start_recording_with(FixedCapture, EchoTranscriber)
            .unwrap();
        third.wait().unwrap();
    }

    #[test]
    fn training_worker_appends_catalog_rows() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let temp = session.config().temp_recording_path();
        std::fs::write(&temp, b"fake wav payload").unwrap();

        session.queue_training(temp, "apple").unwrap();
        let outcome = wait_for_outcomes(&session, 1).remove(0);
        assert_eq!(outcome.label, "apple");
        let sample = outcome.result.unwrap();
        assert_eq!(sample.audio_file, "apple_1.wav");
        assert!(session.config().audio_file_path("apple_1.wav").is_file());

        let catalog = Catalog::load(&session.config().catalog_path()).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn training_failure_is_reported_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        session
            .queue_training(dir.path().join("missing.wav"), "ghost")
            .unwrap();

        let outcome = wait_for_outcomes(&session, 1).remove(0);
        assert!(outcome.result.is_err());
        let catalog = Catalog::load(&session.config().catalog_path()).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn swap_word_picks_the_closest_other_word() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        train_tone(&session, "hello", 440.0);
        // Same tone as "hello", so it is the nearest other word.
        train_tone(&session, "world", 440.0);
        train_tone(&session, "far", 1_760.0);

        session.set_last_translated_text("hello there");
        let swapped = session.swap_word("hello").unwrap();
        assert_eq!(swapped.as_deref(), Some("world there"));
        assert_eq!(session.last_translated_text(), "world there");
    }

    #[test]
    fn swap_word_never_returns_the_selected_word() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        train_tone(&session, "hello", 440.0);
        train_tone(&session, "world", 1_760.0);

        session.set_last_translated_text("hello there");
        let swapped = session.swap_word("hello").unwrap();
        assert_eq!(swapped.as_deref(), Some("world there"));
    }

    #[test]
    fn swap_word_with_no_other_words_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        train_tone(&session, "hello", 440.0);

        session.set_last_translated_text("hello there");
        assert_eq!(session.swap_word("hello").unwrap(), None);
        assert_eq!(session.swap_word("unrecorded").unwrap(), None);
        assert_eq!(session.last_translated_text(), "hello there");
    }

    #[test]
    fn best_match_finds_the_trained_word() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        train_tone(&session, "near", 440.0);
        train_tone(&session, "far", 1_760.0);

        let query = dir.path().join("query.wav");
        write_tone(&query, 440.0);
        let best = session.best_match(&query).unwrap().unwrap();
        assert_eq!(best.label, "near");
    }

    #[test]
    fn best_match_on_empty_dataset_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        let query = dir.path().join("query.wav");
        write_tone(&query, 440.0);
        assert!(session.best_match(&query).unwrap().is_none());
    }

    #[test]
    fn translate_message_updates_the_swap_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        let translated = session
            .translate_message(&UpcaseTranslator, "hello there", "es")
            .unwrap();
        assert_eq!(translated, "HELLO THERE");
        assert_eq!(session.last_translated_text(), "HELLO THERE");
    }

    #[test]
    fn cleanup_removes_only_unreferenced_wavs() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let temp = session.config().temp_recording_path();
        std::fs::write(&temp, b"payload").unwrap();
        session.queue_training(temp, "kept").unwrap();
        wait_for_outcomes(&session, 1);

        std::fs::write(session.config().audio_file_path("stray.wav"), b"junk").unwrap();
        let removed = session.cleanup_stray_recordings().unwrap();
        assert_eq!(removed, 1);
        assert!(session.config().audio_file_path("kept_1.wav").is_file());
        assert!(!session.config().audio_file_path("stray.wav").exists());
    }

    fn wait_for_outcomes(session: &MatchSession, count: usize) -> Vec<TrainingOutcome> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut outcomes = Vec::new();
        while outcomes.len() < count && std::time::Instant::now() < deadline {
            outcomes.extend(session.poll_training());
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(outcomes.len(), count, "training worker never reported");
        outcomes
    }
}
