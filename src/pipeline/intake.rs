//! Upload intake: synchronous screening, then hand-off to background
//! processing.
//!
//! An upload is analysed before anything is stored.  Undecodable audio and
//! audio failing a quality gate are turned away with every reason; accepted
//! audio is written to `audio/<id>.<ext>`, recorded as `Uploaded`, and a
//! `process` task is queued.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::analysis::ExtractionError;
use crate::config::AppConfig;
use crate::quality::QualityRejection;
use crate::recording::{
    extension_of, Recording, RecordingType, RepositoryError, SpeakerInfo, StorageError,
};

use super::assess::{Assessment, Assessor};
use super::dispatch::{DispatchError, Task};
use super::orchestrator::Services;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("audio file does not meet quality requirements: {0}")]
    Rejected(QualityRejection),

    #[error("audio file cannot be read: {0}")]
    Unreadable(#[from] ExtractionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("recording stored but processing could not be queued: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("analysis task failed: {0}")]
    Internal(String),
}

/// One contributed file plus its metadata.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub recording_type: RecordingType,
    pub speaker: SpeakerInfo,
    pub contributor_id: String,
}

pub struct UploadIntake {
    services: Services,
    assessor: Arc<Assessor>,
}

impl UploadIntake {
    pub fn new(services: Services, config: &AppConfig) -> Self {
        Self {
            services,
            assessor: Arc::new(Assessor::from_config(config)),
        }
    }

    /// Screen, store and queue one upload.
    pub async fn accept_upload(&self, request: UploadRequest) -> Result<Recording, UploadError> {
        let UploadRequest {
            bytes,
            filename,
            recording_type,
            speaker,
            contributor_id,
        } = request;

        let extension = extension_of(&filename).map(str::to_ascii_lowercase);
        let assessor = Arc::clone(&self.assessor);
        let hint = extension.clone();
        let (bytes, assessment) = tokio::task::spawn_blocking(move || {
            let assessment = assessor.assess_bytes(&bytes, hint.as_deref());
            (bytes, assessment)
        })
        .await
        .map_err(|e| UploadError::Internal(e.to_string()))?;

        let assessment: Assessment = assessment?;
        if let Some(rejection) = assessment.rejection() {
            log::info!("intake: rejected '{filename}': {rejection}");
            return Err(UploadError::Rejected(rejection));
        }

        let id = Uuid::new_v4();
        let audio_ref = match &extension {
            Some(ext) => format!("audio/{id}.{ext}"),
            None => format!("audio/{id}"),
        };
        self.services.storage.write(&audio_ref, &bytes).await?;

        let mut recording = Recording::new(
            id,
            audio_ref,
            filename,
            bytes.len() as u64,
            &assessment.extraction.properties,
        );
        recording.recording_type = recording_type;
        recording.speaker = speaker;
        recording.contributor_id = contributor_id;
        recording.apply_metrics(&assessment.extraction.metrics, assessment.quality_score);

        let repo = &self.services.repository;
        if let Err(e) = repo.save(&recording).await {
            if let Err(cleanup) = self.services.storage.delete(&recording.audio_ref).await {
                log::warn!(
                    "intake: cannot remove orphaned {}: {cleanup}",
                    recording.audio_ref
                );
            }
            return Err(e.into());
        }
        if let Err(e) = repo.get_or_create_processing_result(id).await {
            log::warn!("intake: {id} stored without processing result ({e}), processing creates it");
        }

        let handle = match self.services.dispatcher.submit(Task::process(id)) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("intake: {id} stored as uploaded but not queued ({e}); resubmit it");
                return Err(e.into());
            }
        };
        log::info!(
            "intake: accepted '{}' as {id} ({:.2}s, {} Hz, {} ch), task {}",
            recording.original_filename,
            recording.duration_secs,
            recording.sample_rate,
            recording.channels,
            handle.task_id
        );
        Ok(recording)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
