//! Persistence of [`Recording`] / [`ProcessingResult`] pairs.
//!
//! [`RecordingRepository`] is the only persistence seam the pipeline uses.
//! Two implementations ship with the crate:
//!
//! * [`InMemoryRepository`]: a `parking_lot` mutex over two maps, for tests
//!   and embedding.
//! * [`JsonFileRepository`]: one JSON document per recording under a
//!   directory, written atomically (temp file + rename).
//!
//! Background tasks never write back a whole recording they loaded earlier.
//! [`RecordingRepository::transition`], [`RecordingRepository::update_format`]
//! and [`RecordingRepository::commit`] re-read the stored copy under the
//! repository lock and change only the fields they own, so a review decision
//! or a finished conversion made in the meantime survives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::state::{RecordingStatus, TransitionError};

use super::model::{AudioFormat, ProcessingResult, Recording, RecordingId};

// ---------------------------------------------------------------------------
// RepositoryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("recording {0} not found")]
    NotFound(RecordingId),

    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt repository document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("processing result belongs to {result} but recording is {recording}")]
    Mismatch {
        recording: RecordingId,
        result: RecordingId,
    },

    #[error("recording {id}: {source}")]
    Conflict {
        id: RecordingId,
        #[source]
        source: TransitionError,
    },

    #[error("recording {id} now points at '{found}', not '{expected}'")]
    StaleRef {
        id: RecordingId,
        expected: String,
        found: String,
    },
}

// ---------------------------------------------------------------------------
// RecordingRepository trait
// ---------------------------------------------------------------------------

/// Reads and writes recordings and their processing results.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn RecordingRepository>` across worker tasks.
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn get(&self, id: RecordingId) -> Result<Recording, RepositoryError>;

    async fn save(&self, recording: &Recording) -> Result<(), RepositoryError>;

    /// The stored result, or a new empty one (which is persisted) when the
    /// recording has none yet.
    async fn get_or_create_processing_result(
        &self,
        id: RecordingId,
    ) -> Result<ProcessingResult, RepositoryError>;

    async fn save_processing_result(&self, result: &ProcessingResult)
        -> Result<(), RepositoryError>;

    /// Record a processing outcome and its result in a single update.
    ///
    /// Status, quality metrics and `updated_at` are taken from `recording`
    /// and must be a legal move from the stored status; blob reference and
    /// format fields keep their stored values.
    async fn commit(
        &self,
        recording: &Recording,
        result: &ProcessingResult,
    ) -> Result<(), RepositoryError>;

    /// Move the stored recording to `next` and return it.
    async fn transition(
        &self,
        id: RecordingId,
        next: RecordingStatus,
    ) -> Result<Recording, RepositoryError>;

    /// Replace the blob reference and format fields, provided the stored
    /// recording still points at `expected_ref`.  Status is left alone.
    async fn update_format(
        &self,
        id: RecordingId,
        expected_ref: &str,
        format: &AudioFormat,
    ) -> Result<Recording, RepositoryError>;

    /// Every stored recording, oldest first.
    async fn list(&self) -> Result<Vec<Recording>, RepositoryError>;
}

fn check_pair(recording: &Recording, result: &ProcessingResult) -> Result<(), RepositoryError> {
    if recording.id != result.recording_id {
        return Err(RepositoryError::Mismatch {
            recording: recording.id,
            result: result.recording_id,
        });
    }
    Ok(())
}

fn absorb(stored: &mut Recording, outcome: &Recording) -> Result<(), RepositoryError> {
    let id = stored.id;
    stored
        .absorb_outcome(outcome)
        .map_err(|source| RepositoryError::Conflict { id, source })
}

fn move_to(stored: &mut Recording, next: RecordingStatus) -> Result<(), RepositoryError> {
    let id = stored.id;
    stored
        .set_status(next)
        .map_err(|source| RepositoryError::Conflict { id, source })
}

fn reformat(
    stored: &mut Recording,
    expected_ref: &str,
    format: &AudioFormat,
) -> Result<(), RepositoryError> {
    if stored.audio_ref != expected_ref {
        return Err(RepositoryError::StaleRef {
            id: stored.id,
            expected: expected_ref.to_string(),
            found: stored.audio_ref.clone(),
        });
    }
    stored.set_format(format);
    Ok(())
}

// ---------------------------------------------------------------------------
// InMemoryRepository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    recordings: HashMap<RecordingId, Recording>,
    results: HashMap<RecordingId, ProcessingResult>,
}

/// Process-local repository.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored result without creating one.
    pub fn processing_result(&self, id: RecordingId) -> Option<ProcessingResult> {
        self.tables.lock().results.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordingRepository for InMemoryRepository {
    async fn get(&self, id: RecordingId) -> Result<Recording, RepositoryError> {
        self.tables
            .lock()
            .recordings
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn save(&self, recording: &Recording) -> Result<(), RepositoryError> {
        self.tables
            .lock()
            .recordings
            .insert(recording.id, recording.clone());
        Ok(())
    }

    async fn get_or_create_processing_result(
        &self,
        id: RecordingId,
    ) -> Result<ProcessingResult, RepositoryError> {
        let mut tables = self.tables.lock();
        if !tables.recordings.contains_key(&id) {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(tables
            .results
            .entry(id)
            .or_insert_with(|| ProcessingResult::empty(id))
            .clone())
    }

    async fn save_processing_result(
        &self,
        result: &ProcessingResult,
    ) -> Result<(), RepositoryError> {
        self.tables
            .lock()
            .results
            .insert(result.recording_id, result.clone());
        Ok(())
    }

    async fn commit(
        &self,
        recording: &Recording,
        result: &ProcessingResult,
    ) -> Result<(), RepositoryError> {
        check_pair(recording, result)?;
        let mut tables = self.tables.lock();
        let stored = tables
            .recordings
            .get_mut(&recording.id)
            .ok_or(RepositoryError::NotFound(recording.id))?;
        absorb(stored, recording)?;
        tables.results.insert(result.recording_id, result.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: RecordingId,
        next: RecordingStatus,
    ) -> Result<Recording, RepositoryError> {
        let mut tables = self.tables.lock();
        let stored = tables
            .recordings
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        move_to(stored, next)?;
        Ok(stored.clone())
    }

    async fn update_format(
        &self,
        id: RecordingId,
        expected_ref: &str,
        format: &AudioFormat,
    ) -> Result<Recording, RepositoryError> {
        let mut tables = self.tables.lock();
        let stored = tables
            .recordings
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        reformat(stored, expected_ref, format)?;
        Ok(stored.clone())
    }

    async fn list(&self) -> Result<Vec<Recording>, RepositoryError> {
        let mut all: Vec<Recording> = self.tables.lock().recordings.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// JsonFileRepository
// ---------------------------------------------------------------------------

/// On-disk document: one recording plus its optional result.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    recording: Recording,
    result: Option<ProcessingResult>,
}

/// One `<id>.json` file per recording under `root`.
pub struct JsonFileRepository {
    root: PathBuf,
    // Serializes read-modify-write cycles on documents.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileRepository {
    /// Open (creating if needed) a repository rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        log::debug!("repository: opened {}", root.display());
        Ok(Self {
            root,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: RecordingId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn read_document(&self, id: RecordingId) -> Result<Document, RepositoryError> {
        match tokio::fs::read(self.document_path(id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RepositoryError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, doc: &Document) -> Result<(), RepositoryError> {
        let path = self.document_path(doc.recording.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordingRepository for JsonFileRepository {
    async fn get(&self, id: RecordingId) -> Result<Recording, RepositoryError> {
        Ok(self.read_document(id).await?.recording)
    }

    async fn save(&self, recording: &Recording) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let result = match self.read_document(recording.id).await {
            Ok(doc) => doc.result,
            Err(RepositoryError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        self.write_document(&Document {
            recording: recording.clone(),
            result,
        })
        .await
    }

    async fn get_or_create_processing_result(
        &self,
        id: RecordingId,
    ) -> Result<ProcessingResult, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document(id).await?;
        match doc.result {
            Some(result) => Ok(result),
            None => {
                let result = ProcessingResult::empty(id);
                doc.result = Some(result.clone());
                self.write_document(&doc).await?;
                Ok(result)
            }
        }
    }

    async fn save_processing_result(
        &self,
        result: &ProcessingResult,
    ) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document(result.recording_id).await?;
        doc.result = Some(result.clone());
        self.write_document(&doc).await
    }

    async fn commit(
        &self,
        recording: &Recording,
        result: &ProcessingResult,
    ) -> Result<(), RepositoryError> {
        check_pair(recording, result)?;
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document(recording.id).await?;
        absorb(&mut doc.recording, recording)?;
        doc.result = Some(result.clone());
        self.write_document(&doc).await
    }

    async fn transition(
        &self,
        id: RecordingId,
        next: RecordingStatus,
    ) -> Result<Recording, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document(id).await?;
        move_to(&mut doc.recording, next)?;
        self.write_document(&doc).await?;
        Ok(doc.recording)
    }

    async fn update_format(
        &self,
        id: RecordingId,
        expected_ref: &str,
        format: &AudioFormat,
    ) -> Result<Recording, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document(id).await?;
        reformat(&mut doc.recording, expected_ref, format)?;
        self.write_document(&doc).await?;
        Ok(doc.recording)
    }

    async fn list(&self) -> Result<Vec<Recording>, RepositoryError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<Document>(&bytes) {
                Ok(doc) => all.push(doc.recording),
                Err(e) => log::warn!("repository: skipping {}: {e}", path.display()),
            }
        }
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AudioProperties;
    use uuid::Uuid;

    fn recording() -> Recording {
        let id = Uuid::new_v4();
        Recording::new(
            id,
            format!("audio/{id}.wav"),
            "take.wav",
            64,
            &AudioProperties {
                duration_secs: 1.5,
                sample_rate: 16_000,
                channels: 1,
                bits_per_sample: Some(16),
            },
        )
    }

    async fn exercise(repo: &dyn RecordingRepository) {
        let mut rec = recording();
        let id = rec.id;

        assert!(matches!(repo.get(id).await, Err(RepositoryError::NotFound(_))));
        assert!(matches!(
            repo.get_or_create_processing_result(id).await,
            Err(RepositoryError::NotFound(_))
        ));

        repo.save(&rec).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap(), rec);

        let mut result = repo.get_or_create_processing_result(id).await.unwrap();
        assert_eq!(result, ProcessingResult::empty(id));

        result.processing_errors.push("boom".into());
        repo.save_processing_result(&result).await.unwrap();
        assert_eq!(
            repo.get_or_create_processing_result(id).await.unwrap(),
            result
        );

        // Saving the recording alone keeps the result.
        rec.set_status(RecordingStatus::Processing).unwrap();
        repo.save(&rec).await.unwrap();
        assert_eq!(
            repo.get_or_create_processing_result(id).await.unwrap(),
            result
        );

        rec.set_status(RecordingStatus::Error).unwrap();
        result.processing_errors = vec!["second".into()];
        repo.commit(&rec, &result).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap().status(), RecordingStatus::Error);
        assert_eq!(
            repo.get_or_create_processing_result(id)
                .await
                .unwrap()
                .processing_errors,
            vec!["second".to_string()]
        );

        let other = ProcessingResult::empty(Uuid::new_v4());
        assert!(matches!(
            repo.commit(&rec, &other).await,
            Err(RepositoryError::Mismatch { .. })
        ));

        // Unknown recordings cannot be committed.
        let stranger = recording();
        assert!(matches!(
            repo.commit(&stranger, &ProcessingResult::empty(stranger.id))
                .await,
            Err(RepositoryError::NotFound(_))
        ));

        let second = recording();
        repo.save(&second).await.unwrap();
        let ids: Vec<RecordingId> = repo.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&id) && ids.contains(&second.id));
    }

    /// Writers that loaded a recording earlier must not undo changes made
    /// since: a conversion's format update or a reviewer's decision.
    async fn exercise_concurrent_writers(repo: &dyn RecordingRepository) {
        let rec = recording();
        let id = rec.id;
        let original_ref = rec.audio_ref.clone();
        repo.save(&rec).await.unwrap();

        let processing = repo
            .transition(id, RecordingStatus::Processing)
            .await
            .unwrap();
        assert_eq!(processing.status(), RecordingStatus::Processing);
        assert!(matches!(
            repo.transition(id, RecordingStatus::Validated).await,
            Err(RepositoryError::Conflict { .. })
        ));

        // A processing attempt holds its own copy...
        let mut outcome = processing.clone();
        outcome.quality.set_quality_score(0.9);
        outcome.set_status(RecordingStatus::Processed).unwrap();

        // ...while a conversion lands underneath it.
        let canonical = AudioFormat {
            audio_ref: format!("audio/{id}.canonical.wav"),
            file_size: 48_044,
            duration_secs: 1.5,
            sample_rate: 16_000,
            channels: 1,
            bit_depth: 16,
        };
        let converted = repo.update_format(id, &original_ref, &canonical).await.unwrap();
        assert_eq!(converted.format(), canonical);
        assert_eq!(converted.status(), RecordingStatus::Processing);

        repo.commit(&outcome, &ProcessingResult::empty(id))
            .await
            .unwrap();
        let stored = repo.get(id).await.unwrap();
        assert_eq!(stored.status(), RecordingStatus::Processed);
        assert_eq!(stored.quality.quality_score(), 0.9);
        assert_eq!(stored.format(), canonical);

        // A second format update from the stale reference is refused.
        assert!(matches!(
            repo.update_format(id, &original_ref, &rec.format()).await,
            Err(RepositoryError::StaleRef { .. })
        ));

        // Review decides; a late duplicate outcome cannot undo it.
        repo.transition(id, RecordingStatus::Validated).await.unwrap();
        assert!(matches!(
            repo.commit(&outcome, &ProcessingResult::empty(id)).await,
            Err(RepositoryError::Conflict { .. })
        ));
        assert_eq!(
            repo.get(id).await.unwrap().status(),
            RecordingStatus::Validated
        );
    }

    #[tokio::test]
    async fn in_memory_repository_contract() {
        let repo = InMemoryRepository::new();
        exercise(&repo).await;
        assert_eq!(repo.len(), 2);
        exercise_concurrent_writers(&repo).await;
    }

    #[tokio::test]
    async fn json_file_repository_keeps_concurrent_changes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        exercise_concurrent_writers(&repo).await;
    }

    #[tokio::test]
    async fn json_file_repository_contract() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("records"))
            .await
            .unwrap();
        exercise(&repo).await;
    }

    #[tokio::test]
    async fn json_file_repository_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recording();
        {
            let repo = JsonFileRepository::open(dir.path()).await.unwrap();
            repo.save(&rec).await.unwrap();
            repo.commit(&rec, &ProcessingResult::empty(rec.id))
                .await
                .unwrap();
        }
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        assert_eq!(repo.get(rec.id).await.unwrap(), rec);
        assert!(!dir.path().join(format!("{}.json.tmp", rec.id)).exists());
    }
}
