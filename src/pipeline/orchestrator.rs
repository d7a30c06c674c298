//! Recording lifecycle orchestrator.
//!
//! [`RecordingProcessor`] runs the two task kinds the dispatcher delivers:
//!
//! ```text
//! process(id)
//!   ├─ get recording            (missing → NotFound, reviewed → Skipped)
//!   ├─ transition(Processing)   (re-read under the repository lock)
//!   ├─ read blob → spawn_blocking(Assessor::assess_bytes)
//!   │     ├─ Err / panic        → status = Error, errors recorded
//!   │     ├─ gates fail         → status = Error, metrics + reasons recorded
//!   │     └─ gates pass         → status = Processed, metrics recorded
//!   ├─ commit(recording, result)  ← single write per attempt
//!   └─ Processed ∧ non-canonical → submit(convert_format(id))
//!
//! convert_format(id)
//!   ├─ get recording            (anything but Processed → Skipped)
//!   ├─ spawn_blocking(FormatNormalizer::normalize)
//!   ├─ copy the original to tmp/convert-…
//!   ├─ write audio/<id>.wav, update_format(id, old ref, new fields)
//!   ├─ ok   → delete_temp, delete the old blob if its ref changed
//!   └─ fail → restore the original from tmp/ (same ref), fields untouched
//! ```
//!
//! Nothing escapes: every path returns an outcome value and logs.  Writes are
//! idempotent, so a duplicate delivery re-derives the same state.

use std::sync::Arc;
use std::time::Instant;

use crate::audio::{FormatNormalizer, Normalized};
use crate::config::AppConfig;
use crate::quality::QualityRejection;
use crate::recording::{
    temp_ref, AudioFormat, BlobStorage, ProcessingResult, Recording, RecordingId,
    RecordingRepository, RepositoryError,
};

use super::assess::{Assessment, Assessor};
use super::dispatch::{Dispatcher, Task, TaskKind};
use super::state::RecordingStatus;

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Collaborators shared by the orchestrator and upload intake.
#[derive(Clone)]
pub struct Services {
    pub repository: Arc<dyn RecordingRepository>,
    pub storage: Arc<dyn BlobStorage>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Passed every gate.
    Processed { quality_score: f64 },
    /// Decoded but failed one or more gates.
    Rejected(QualityRejection),
    /// Could not be analysed, or a collaborator failed.
    Failed(String),
    /// Already decided by human review.
    Skipped(RecordingStatus),
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Converted { audio_ref: String },
    AlreadyCanonical,
    /// Only `Processed` recordings are converted.
    Skipped(RecordingStatus),
    Failed(String),
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Process(ProcessOutcome),
    Convert(ConversionOutcome),
}

// ---------------------------------------------------------------------------
// RecordingProcessor
// ---------------------------------------------------------------------------

pub struct RecordingProcessor {
    services: Services,
    assessor: Arc<Assessor>,
    normalizer: Arc<FormatNormalizer>,
}

impl RecordingProcessor {
    pub fn new(services: Services, config: &AppConfig) -> Self {
        Self {
            services,
            assessor: Arc::new(Assessor::from_config(config)),
            normalizer: Arc::new(FormatNormalizer::new(config.format.clone())),
        }
    }

    pub async fn run_task(&self, task: &Task) -> TaskOutcome {
        match task.kind {
            TaskKind::Process => TaskOutcome::Process(self.process(task.recording_id).await),
            TaskKind::ConvertFormat => {
                TaskOutcome::Convert(self.convert_format(task.recording_id).await)
            }
        }
    }

    // -----------------------------------------------------------------------
    // process
    // -----------------------------------------------------------------------

    /// Analyse, validate and score one recording.
    pub async fn process(&self, id: RecordingId) -> ProcessOutcome {
        let started = Instant::now();
        let repo = &self.services.repository;

        let status = match repo.get(id).await {
            Ok(r) => r.status(),
            Err(RepositoryError::NotFound(_)) => {
                log::warn!("orchestrator: recording {id} not found");
                return ProcessOutcome::NotFound;
            }
            Err(e) => {
                log::error!("orchestrator: cannot load {id}: {e}");
                return ProcessOutcome::Failed(e.to_string());
            }
        };
        if status.is_reviewed() {
            log::info!("orchestrator: {id} already {status}, not reprocessing");
            return ProcessOutcome::Skipped(status);
        }

        let mut recording = match repo.transition(id, RecordingStatus::Processing).await {
            Ok(r) => r,
            Err(RepositoryError::Conflict { source, .. }) if source.from.is_reviewed() => {
                log::info!("orchestrator: {id} reviewed meanwhile, not reprocessing");
                return ProcessOutcome::Skipped(source.from);
            }
            Err(e) => {
                log::error!("orchestrator: cannot mark {id} processing: {e}");
                return ProcessOutcome::Failed(e.to_string());
            }
        };
        log::info!("orchestrator: processing {id}");

        let mut result = match repo.get_or_create_processing_result(id).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("orchestrator: {id}: no processing result ({e}), starting fresh");
                ProcessingResult::empty(id)
            }
        };

        let assessment = match self.analyse(&recording).await {
            Ok(a) => a,
            Err(message) => {
                return self
                    .finish_failed(recording, result, message, started)
                    .await;
            }
        };

        let metrics = &assessment.extraction.metrics;
        result.fill(
            &assessment.extraction.features,
            metrics,
            &assessment.segmentation,
        );
        recording.apply_metrics(metrics, assessment.quality_score);

        let outcome = match assessment.rejection() {
            None => ProcessOutcome::Processed {
                quality_score: recording.quality.quality_score(),
            },
            Some(rejection) => {
                result.processing_errors = rejection.reasons();
                ProcessOutcome::Rejected(rejection)
            }
        };
        let next = match outcome {
            ProcessOutcome::Processed { .. } => RecordingStatus::Processed,
            _ => RecordingStatus::Error,
        };

        if let Err(e) = recording.set_status(next) {
            log::error!("orchestrator: {id}: {e}");
            return ProcessOutcome::Failed(e.to_string());
        }
        result.stamp(started.elapsed().as_secs_f64());

        if let Err(e) = repo.commit(&recording, &result).await {
            log::error!("orchestrator: cannot commit {id}: {e}");
            self.mark_error(id).await;
            return ProcessOutcome::Failed(e.to_string());
        }

        match &outcome {
            ProcessOutcome::Processed { quality_score } => {
                log::info!("orchestrator: {id} processed (score {quality_score:.3})");
                self.schedule_conversion(&recording);
            }
            ProcessOutcome::Rejected(rejection) => {
                log::info!("orchestrator: {id} rejected: {rejection}");
            }
            _ => {}
        }
        outcome
    }

    /// Read the blob and run the assessment on the blocking pool.
    async fn analyse(&self, recording: &Recording) -> Result<Assessment, String> {
        let bytes = self
            .services
            .storage
            .read(&recording.audio_ref)
            .await
            .map_err(|e| e.to_string())?;

        let assessor = Arc::clone(&self.assessor);
        let extension = recording.extension().map(str::to_owned);
        let joined =
            tokio::task::spawn_blocking(move || assessor.assess_bytes(&bytes, extension.as_deref()))
                .await;

        match joined {
            Ok(Ok(assessment)) => Ok(assessment),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("analysis task failed: {e}")),
        }
    }

    /// Persist an `Error` status with `message` and no analysis fields.
    async fn finish_failed(
        &self,
        mut recording: Recording,
        previous: ProcessingResult,
        message: String,
        started: Instant,
    ) -> ProcessOutcome {
        let id = recording.id;
        log::warn!("orchestrator: {id} failed: {message}");

        let mut result = ProcessingResult {
            processing_errors: vec![message.clone()],
            ..ProcessingResult::empty(previous.recording_id)
        };
        result.stamp(started.elapsed().as_secs_f64());

        if let Err(e) = recording.set_status(RecordingStatus::Error) {
            log::error!("orchestrator: {id}: {e}");
            return ProcessOutcome::Failed(message);
        }
        if let Err(e) = self.services.repository.commit(&recording, &result).await {
            log::error!("orchestrator: cannot commit failure of {id}: {e}");
            self.mark_error(id).await;
        }
        ProcessOutcome::Failed(message)
    }

    /// Last-resort status write after a failed commit: move the stored
    /// `Processing` marker to `Error`.
    async fn mark_error(&self, id: RecordingId) {
        if let Err(e) = self
            .services
            .repository
            .transition(id, RecordingStatus::Error)
            .await
        {
            log::error!("orchestrator: cannot mark {id} as error either: {e}");
        }
    }

    fn schedule_conversion(&self, recording: &Recording) {
        if !self
            .normalizer
            .needs_conversion(recording.sample_rate, recording.channels)
        {
            return;
        }
        match self
            .services
            .dispatcher
            .submit(Task::convert_format(recording.id))
        {
            Ok(handle) => log::info!(
                "orchestrator: {} is {} Hz/{} ch, conversion queued (task {})",
                recording.id,
                recording.sample_rate,
                recording.channels,
                handle.task_id
            ),
            Err(e) => log::warn!(
                "orchestrator: cannot queue conversion for {}: {e}",
                recording.id
            ),
        }
    }

    // -----------------------------------------------------------------------
    // convert_format
    // -----------------------------------------------------------------------

    /// Re-encode one recording to the canonical format.
    ///
    /// Failure is non-fatal: the original blob and format fields are kept.
    /// Only the blob reference and format fields are written; status and
    /// metrics changed while the conversion ran are left as they are.
    pub async fn convert_format(&self, id: RecordingId) -> ConversionOutcome {
        let repo = &self.services.repository;
        let storage = &self.services.storage;

        let recording = match repo.get(id).await {
            Ok(r) => r,
            Err(RepositoryError::NotFound(_)) => return ConversionOutcome::NotFound,
            Err(e) => {
                log::warn!("convert: cannot load {id}: {e}");
                return ConversionOutcome::Failed(e.to_string());
            }
        };
        if recording.status() != RecordingStatus::Processed {
            log::info!("convert: {id} is {}, not converting", recording.status());
            return ConversionOutcome::Skipped(recording.status());
        }

        let old_ref = recording.audio_ref.clone();
        let original = match storage.read(&old_ref).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("convert: cannot read {old_ref}: {e}");
                return ConversionOutcome::Failed(e.to_string());
            }
        };

        let normalizer = Arc::clone(&self.normalizer);
        let (sample_rate, channels) = (recording.sample_rate, recording.channels);
        let extension = recording.extension().map(str::to_owned);
        let source = original.clone();
        let joined = tokio::task::spawn_blocking(move || {
            normalizer.normalize(&source, sample_rate, channels, extension.as_deref())
        })
        .await;

        let canonical = match joined {
            Ok(Ok(Normalized::Unchanged)) => return ConversionOutcome::AlreadyCanonical,
            Ok(Ok(Normalized::Converted(c))) => c,
            Ok(Err(e)) => {
                log::warn!("convert: {id} left in original format: {e}");
                return ConversionOutcome::Failed(e.to_string());
            }
            Err(e) => {
                log::warn!("convert: {id} conversion task failed: {e}");
                return ConversionOutcome::Failed(e.to_string());
            }
        };

        let new_ref = format!("audio/{id}.wav");
        let staged = temp_ref(&old_ref, "convert");
        if let Err(e) = storage.write(&staged, &original).await {
            log::warn!("convert: cannot stage {old_ref}: {e}");
            return ConversionOutcome::Failed(e.to_string());
        }

        let format = AudioFormat {
            audio_ref: new_ref.clone(),
            file_size: canonical.bytes.len() as u64,
            duration_secs: canonical.duration_secs,
            sample_rate: canonical.sample_rate,
            channels: canonical.channels,
            bit_depth: canonical.bits_per_sample,
        };
        let promoted: Result<(), String> = async {
            storage
                .write(&new_ref, &canonical.bytes)
                .await
                .map_err(|e| e.to_string())?;
            repo.update_format(id, &old_ref, &format)
                .await
                .map(drop)
                .map_err(|e| e.to_string())
        }
        .await;

        match promoted {
            Ok(()) => {
                if let Err(e) = storage.delete_temp(&staged).await {
                    log::debug!("convert: cannot remove {staged}: {e}");
                }
                if old_ref != new_ref {
                    if let Err(e) = storage.delete(&old_ref).await {
                        log::warn!("convert: cannot remove replaced {old_ref}: {e}");
                    }
                }
                log::info!(
                    "convert: {id} now {} Hz/{} ch at {new_ref}",
                    canonical.sample_rate,
                    canonical.channels
                );
                ConversionOutcome::Converted { audio_ref: new_ref }
            }
            Err(e) => {
                log::warn!("convert: {id} left in original format: {e}");
                if old_ref == new_ref {
                    self.restore(&old_ref, &staged).await;
                } else if let Err(e) = storage.delete_temp(&staged).await {
                    log::debug!("convert: cannot remove {staged}: {e}");
                }
                ConversionOutcome::Failed(e)
            }
        }
    }

    /// Copy the staged original back over `blob_ref`.  The staged copy is
    /// kept when that fails.
    async fn restore(&self, blob_ref: &str, staged: &str) {
        let storage = &self.services.storage;
        let restored = match storage.read(staged).await {
            Ok(bytes) => storage.write(blob_ref, &bytes).await,
            Err(e) => Err(e),
        };
        match restored {
            Ok(()) => {
                if let Err(e) = storage.delete_temp(staged).await {
                    log::debug!("convert: cannot remove {staged}: {e}");
                }
            }
            Err(e) => {
                log::error!("convert: cannot restore {blob_ref}, original kept at {staged}: {e}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::analysis::AudioProperties;
    use crate::pipeline::dispatch::{DispatchError, TaskHandle};
    use crate::recording::{InMemoryRepository, InMemoryStorage, StorageError};
    use crate::test_support::{force_every, sine, wav_bytes};

    /// Records submissions instead of running them.
    #[derive(Default)]
    struct RecordingDispatcher {
        submitted: Mutex<Vec<Task>>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn submit(&self, task: Task) -> Result<TaskHandle, DispatchError> {
            self.submitted.lock().unwrap().push(task);
            Ok(TaskHandle {
                task_id: Uuid::new_v4(),
                recording_id: task.recording_id,
                kind: task.kind,
            })
        }
    }

    /// Storage whose writes always fail.
    struct ReadOnlyStorage(InMemoryStorage);

    #[async_trait]
    impl BlobStorage for ReadOnlyStorage {
        async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, StorageError> {
            self.0.read(blob_ref).await
        }

        async fn write(&self, _: &str, _: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        async fn delete(&self, blob_ref: &str) -> Result<(), StorageError> {
            self.0.delete(blob_ref).await
        }
    }

    /// Storage whose first write to `audio/` leaves a truncated blob behind
    /// and fails, as a torn write would.  Later writes succeed.
    struct TornAudioWrites(Arc<InMemoryStorage>, AtomicBool);

    #[async_trait]
    impl BlobStorage for TornAudioWrites {
        async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, StorageError> {
            self.0.read(blob_ref).await
        }

        async fn write(&self, blob_ref: &str, bytes: &[u8]) -> Result<(), StorageError> {
            if blob_ref.starts_with("audio/") && !self.1.swap(true, Ordering::SeqCst) {
                self.0.write(blob_ref, &bytes[..bytes.len() / 3]).await?;
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.0.write(blob_ref, bytes).await
        }

        async fn delete(&self, blob_ref: &str) -> Result<(), StorageError> {
            self.0.delete(blob_ref).await
        }
    }

    /// Storage that lets a reviewer validate the recording while a
    /// conversion is staging its blobs.
    struct ReviewDuringConversion {
        inner: Arc<InMemoryStorage>,
        repo: Arc<InMemoryRepository>,
        id: RecordingId,
    }

    #[async_trait]
    impl BlobStorage for ReviewDuringConversion {
        async fn read(&self, blob_ref: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.read(blob_ref).await
        }

        async fn write(&self, blob_ref: &str, bytes: &[u8]) -> Result<(), StorageError> {
            if blob_ref.starts_with("tmp/") {
                self.repo
                    .transition(self.id, RecordingStatus::Validated)
                    .await
                    .unwrap();
            }
            self.inner.write(blob_ref, bytes).await
        }

        async fn delete(&self, blob_ref: &str) -> Result<(), StorageError> {
            self.inner.delete(blob_ref).await
        }
    }

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        storage: Arc<InMemoryStorage>,
        dispatcher: Arc<RecordingDispatcher>,
        processor: RecordingProcessor,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let storage = Arc::new(InMemoryStorage::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = RecordingProcessor::new(
            Services {
                repository: repo.clone(),
                storage: storage.clone(),
                dispatcher: dispatcher.clone(),
            },
            &AppConfig::default(),
        );
        Fixture {
            repo,
            storage,
            dispatcher,
            processor,
        }
    }

    async fn seed(f: &Fixture, samples: &[f32], sample_rate: u32, channels: u16) -> RecordingId {
        seed_as(f, samples, sample_rate, channels, Some("wav")).await
    }

    async fn seed_as(
        f: &Fixture,
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
        extension: Option<&str>,
    ) -> RecordingId {
        let id = Uuid::new_v4();
        let audio_ref = match extension {
            Some(ext) => format!("audio/{id}.{ext}"),
            None => format!("audio/{id}"),
        };
        let bytes = wav_bytes(samples, sample_rate, channels);
        f.storage.write(&audio_ref, &bytes).await.unwrap();
        let frames = samples.len() / channels as usize;
        let rec = Recording::new(
            id,
            audio_ref,
            "take.wav",
            bytes.len() as u64,
            &AudioProperties {
                duration_secs: frames as f64 / sample_rate as f64,
                sample_rate,
                channels,
                bits_per_sample: Some(16),
            },
        );
        f.repo.save(&rec).await.unwrap();
        id
    }

    #[tokio::test]
    async fn silence_ends_in_error_with_metrics() {
        let f = fixture();
        let id = seed(&f, &[0.0; 32_000], 16_000, 1).await;

        let outcome = f.processor.process(id).await;
        assert!(matches!(outcome, ProcessOutcome::Rejected(_)), "{outcome:?}");

        let rec = f.repo.get(id).await.unwrap();
        assert_eq!(rec.status(), RecordingStatus::Error);
        assert!(rec.quality.silence_ratio.unwrap() > 0.99);

        let result = f.repo.processing_result(id).unwrap();
        assert!(!result.processing_errors.is_empty());
        assert!(result.processed_at.is_some());
        assert!(f.dispatcher.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clean_tone_is_processed() {
        let f = fixture();
        let id = seed(&f, &sine(1_000.0, 0.9, 16_000, 2.0), 16_000, 1).await;

        let outcome = f.processor.process(id).await;
        let quality_score = match outcome {
            ProcessOutcome::Processed { quality_score } => quality_score,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(quality_score > 0.5);

        let rec = f.repo.get(id).await.unwrap();
        assert_eq!(rec.status(), RecordingStatus::Processed);
        assert!(!rec.quality.clipping_detected);
        assert!(rec.quality.snr_db.unwrap() >= 30.0);

        let result = f.repo.processing_result(id).unwrap();
        assert!(result.processing_errors.is_empty());
        assert_eq!(result.mfcc_features.as_ref().unwrap().mean.len(), 13);
        assert!(!result.speech_segments.is_empty() || !result.silence_segments.is_empty());
        // Already canonical: no conversion queued.
        assert!(f.dispatcher.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clipped_tone_is_rejected() {
        let f = fixture();
        let mut tone = sine(1_000.0, 0.9, 16_000, 2.0);
        force_every(&mut tone, 20, 0.99);
        let id = seed(&f, &tone, 16_000, 1).await;

        assert!(matches!(
            f.processor.process(id).await,
            ProcessOutcome::Rejected(_)
        ));
        let rec = f.repo.get(id).await.unwrap();
        assert_eq!(rec.status(), RecordingStatus::Error);
        assert!(rec.quality.clipping_detected);
    }

    #[tokio::test]
    async fn undecodable_blob_fails_without_metrics() {
        let f = fixture();
        let id = seed(&f, &sine(440.0, 0.5, 16_000, 1.5), 16_000, 1).await;
        let rec = f.repo.get(id).await.unwrap();
        f.storage
            .write(&rec.audio_ref, b"not audio at all")
            .await
            .unwrap();

        assert!(matches!(
            f.processor.process(id).await,
            ProcessOutcome::Failed(_)
        ));
        let rec = f.repo.get(id).await.unwrap();
        assert_eq!(rec.status(), RecordingStatus::Error);
        assert_eq!(rec.quality.snr_db, None);
        let result = f.repo.processing_result(id).unwrap();
        assert_eq!(result.processing_errors.len(), 1);
        assert!(result.speech_segments.is_empty());
    }

    #[tokio::test]
    async fn missing_blob_fails() {
        let f = fixture();
        let id = seed(&f, &sine(440.0, 0.5, 16_000, 1.5), 16_000, 1).await;
        let rec = f.repo.get(id).await.unwrap();
        f.storage.delete(&rec.audio_ref).await.unwrap();

        assert!(matches!(
            f.processor.process(id).await,
            ProcessOutcome::Failed(_)
        ));
        assert_eq!(
            f.repo.get(id).await.unwrap().status(),
            RecordingStatus::Error
        );
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let f = fixture();
        assert_eq!(
            f.processor.process(Uuid::new_v4()).await,
            ProcessOutcome::NotFound
        );
        assert_eq!(
            f.processor.convert_format(Uuid::new_v4()).await,
            ConversionOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn reviewed_recordings_are_skipped() {
        let f = fixture();
        let id = seed(&f, &sine(1_000.0, 0.9, 16_000, 2.0), 16_000, 1).await;
        f.processor.process(id).await;

        let mut rec = f.repo.get(id).await.unwrap();
        rec.set_status(RecordingStatus::Validated).unwrap();
        f.repo.save(&rec).await.unwrap();

        assert_eq!(
            f.processor.process(id).await,
            ProcessOutcome::Skipped(RecordingStatus::Validated)
        );
        assert_eq!(f.repo.get(id).await.unwrap(), rec);
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let f = fixture();
        let id = seed(&f, &sine(700.0, 0.6, 16_000, 1.5), 16_000, 1).await;

        f.processor.process(id).await;
        let first_rec = f.repo.get(id).await.unwrap();
        let first = f.repo.processing_result(id).unwrap();

        f.processor.process(id).await;
        let second_rec = f.repo.get(id).await.unwrap();
        let second = f.repo.processing_result(id).unwrap();

        assert_eq!(first_rec.status(), second_rec.status());
        assert_eq!(first_rec.quality, second_rec.quality);
        assert_eq!(first.spectral_features, second.spectral_features);
        assert_eq!(first.mfcc_features, second.mfcc_features);
        assert_eq!(first.speech_segments, second.speech_segments);
        assert_eq!(first.silence_segments, second.silence_segments);
        assert_eq!(first.processing_errors, second.processing_errors);
    }

    #[tokio::test]
    async fn stereo_44k_schedules_and_runs_conversion() {
        let f = fixture();
        let mono = sine(1_000.0, 0.8, 44_100, 2.0);
        let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        let id = seed(&f, &stereo, 44_100, 2).await;

        assert!(matches!(
            f.processor.process(id).await,
            ProcessOutcome::Processed { .. }
        ));
        let queued = f.dispatcher.submitted.lock().unwrap().clone();
        assert_eq!(queued, vec![Task::convert_format(id)]);

        let outcome = f.processor.run_task(&queued[0]).await;
        assert_eq!(
            outcome,
            TaskOutcome::Convert(ConversionOutcome::Converted {
                audio_ref: format!("audio/{id}.wav")
            })
        );

        let rec = f.repo.get(id).await.unwrap();
        assert_eq!(rec.sample_rate, 16_000);
        assert_eq!(rec.channels, 1);
        assert_eq!(rec.bit_depth, 16);
        assert_eq!(rec.status(), RecordingStatus::Processed);
        assert!((rec.duration_secs - 2.0).abs() < 1e-3);
        assert_eq!(
            rec.file_size,
            f.storage.read(&rec.audio_ref).await.unwrap().len() as u64
        );
        // The staging blob is gone.
        assert_eq!(f.storage.refs(), vec![rec.audio_ref.clone()]);

        // A second conversion is a no-op.
        assert_eq!(
            f.processor.convert_format(id).await,
            ConversionOutcome::AlreadyCanonical
        );
    }

    #[tokio::test]
    async fn failed_conversion_keeps_original() {
        let f = fixture();
        let mono = sine(1_000.0, 0.8, 22_050, 1.5);
        let id = seed(&f, &mono, 22_050, 1).await;
        f.processor.process(id).await;
        let before = f.repo.get(id).await.unwrap();
        let original = f.storage.read(&before.audio_ref).await.unwrap();

        let processor = RecordingProcessor::new(
            Services {
                repository: f.repo.clone(),
                storage: Arc::new(ReadOnlyStorage(InMemoryStorage::new())),
                dispatcher: f.dispatcher.clone(),
            },
            &AppConfig::default(),
        );
        // Blob exists only in `f.storage`, so reading fails first.
        assert!(matches!(
            processor.convert_format(id).await,
            ConversionOutcome::Failed(_)
        ));

        let readonly = ReadOnlyStorage(InMemoryStorage::new());
        readonly.0.write(&before.audio_ref, &original).await.unwrap();
        let processor = RecordingProcessor::new(
            Services {
                repository: f.repo.clone(),
                storage: Arc::new(readonly),
                dispatcher: f.dispatcher.clone(),
            },
            &AppConfig::default(),
        );
        assert!(matches!(
            processor.convert_format(id).await,
            ConversionOutcome::Failed(_)
        ));
        assert_eq!(f.repo.get(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn torn_write_is_rolled_back_from_staged_original() {
        let f = fixture();
        let id = seed(&f, &sine(1_000.0, 0.8, 22_050, 1.5), 22_050, 1).await;
        f.processor.process(id).await;
        let before = f.repo.get(id).await.unwrap();
        let original = f.storage.read(&before.audio_ref).await.unwrap();

        let processor = RecordingProcessor::new(
            Services {
                repository: f.repo.clone(),
                storage: Arc::new(TornAudioWrites(f.storage.clone(), AtomicBool::new(false))),
                dispatcher: f.dispatcher.clone(),
            },
            &AppConfig::default(),
        );
        assert!(matches!(
            processor.convert_format(id).await,
            ConversionOutcome::Failed(_)
        ));

        assert_eq!(f.storage.read(&before.audio_ref).await.unwrap(), original);
        assert_eq!(f.storage.refs(), vec![before.audio_ref.clone()]);
        assert_eq!(f.repo.get(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn conversion_keeps_review_made_meanwhile() {
        let f = fixture();
        let mono = sine(1_000.0, 0.8, 44_100, 2.0);
        let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        let id = seed(&f, &stereo, 44_100, 2).await;
        f.processor.process(id).await;

        let processor = RecordingProcessor::new(
            Services {
                repository: f.repo.clone(),
                storage: Arc::new(ReviewDuringConversion {
                    inner: f.storage.clone(),
                    repo: f.repo.clone(),
                    id,
                }),
                dispatcher: f.dispatcher.clone(),
            },
            &AppConfig::default(),
        );
        assert!(matches!(
            processor.convert_format(id).await,
            ConversionOutcome::Converted { .. }
        ));

        let rec = f.repo.get(id).await.unwrap();
        assert_eq!(rec.status(), RecordingStatus::Validated);
        assert_eq!((rec.sample_rate, rec.channels), (16_000, 1));
    }

    #[tokio::test]
    async fn only_processed_recordings_are_converted() {
        let f = fixture();
        let id = seed(&f, &sine(1_000.0, 0.8, 44_100, 2.0), 44_100, 1).await;
        assert_eq!(
            f.processor.convert_format(id).await,
            ConversionOutcome::Skipped(RecordingStatus::Uploaded)
        );

        f.processor.process(id).await;
        f.repo
            .transition(id, RecordingStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(
            f.processor.convert_format(id).await,
            ConversionOutcome::Skipped(RecordingStatus::Rejected)
        );
        assert_eq!(f.repo.get(id).await.unwrap().sample_rate, 44_100);
    }

    #[tokio::test]
    async fn replaced_blob_is_removed_after_conversion() {
        let f = fixture();
        let id = seed_as(&f, &sine(1_000.0, 0.8, 22_050, 1.5), 22_050, 1, None).await;
        f.processor.process(id).await;

        assert_eq!(
            f.processor.convert_format(id).await,
            ConversionOutcome::Converted {
                audio_ref: format!("audio/{id}.wav")
            }
        );
        assert_eq!(f.storage.refs(), vec![format!("audio/{id}.wav")]);
    }
}
