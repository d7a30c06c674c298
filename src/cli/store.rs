//! Commands that operate on the persistent store: `ingest`, `reprocess`,
//! `list`.
//!
//! Each builds the file-backed repository and blob storage under the data
//! directory, starts a worker pool, and waits for the queue to drain before
//! printing the final state of the recordings it touched.

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use speech_intake::config::{AppConfig, AppPaths};
use speech_intake::pipeline::{
    Dispatcher, RecordingProcessor, RecordingStatus, Services, TaskQueue, TaskReceiver,
    UploadError, UploadIntake, UploadRequest, WorkerPool,
};
use speech_intake::recording::{
    FsStorage, JsonFileRepository, Recording, RecordingId, RecordingRepository, SpeakerInfo,
};

use crate::cli::args::{IngestArgs, ReprocessArgs};

#[derive(Serialize)]
struct RecordingSummary {
    id: RecordingId,
    file: String,
    status: RecordingStatus,
    duration_secs: f64,
    sample_rate: u32,
    channels: u16,
    quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    snr_db: Option<f64>,
}

impl From<&Recording> for RecordingSummary {
    fn from(r: &Recording) -> Self {
        Self {
            id: r.id,
            file: r.original_filename.clone(),
            status: r.status(),
            duration_secs: r.duration_secs,
            sample_rate: r.sample_rate,
            channels: r.channels,
            quality_score: r.quality.quality_score(),
            snr_db: r.quality.snr_db,
        }
    }
}

#[derive(Serialize)]
struct Refused {
    file: String,
    reasons: Vec<String>,
}

#[derive(Serialize)]
struct IngestOutput {
    accepted: Vec<RecordingSummary>,
    refused: Vec<Refused>,
}

struct Store {
    repository: Arc<JsonFileRepository>,
    services: Services,
    queue: TaskQueue,
}

async fn open_store(config: &AppConfig) -> Result<(Store, TaskReceiver)> {
    let data_dir = config.storage.resolve_data_dir();
    let repository = Arc::new(
        JsonFileRepository::open(AppPaths::records_dir(&data_dir))
            .await
            .with_context(|| format!("failed to open store in {}", data_dir.display()))?,
    );
    let storage = Arc::new(FsStorage::new(AppPaths::blobs_dir(&data_dir)));
    let (queue, receiver) = TaskQueue::channel();
    log::info!("store: data dir {}", data_dir.display());

    let services = Services {
        repository: repository.clone(),
        storage,
        dispatcher: Arc::new(queue.clone()),
    };
    Ok((
        Store {
            repository,
            services,
            queue,
        },
        receiver,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

async fn summaries(repo: &JsonFileRepository, ids: &[RecordingId]) -> Vec<RecordingSummary> {
    let mut out = Vec::with_capacity(ids.len());
    for &id in ids {
        match repo.get(id).await {
            Ok(rec) => out.push(RecordingSummary::from(&rec)),
            Err(e) => log::warn!("store: cannot reload {id}: {e}"),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

pub async fn ingest(args: IngestArgs, config: &AppConfig) -> Result<()> {
    let (store, receiver) = open_store(config).await?;
    let processor = Arc::new(RecordingProcessor::new(store.services.clone(), config));
    let pool = WorkerPool::start(receiver, processor, config.dispatch.max_concurrency);
    let intake = UploadIntake::new(store.services.clone(), config);

    let speaker = SpeakerInfo {
        speaker_id: args.speaker_id.clone(),
        age_range: args.age_range,
        gender: args.gender,
    };

    let mut accepted = Vec::new();
    let mut refused = Vec::new();
    for path in &args.inputs {
        eprintln!("Ingesting: {}", path.display());
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let request = UploadRequest {
            bytes,
            filename,
            recording_type: args.recording_type,
            speaker: speaker.clone(),
            contributor_id: args.contributor.clone(),
        };
        match intake.accept_upload(request).await {
            Ok(rec) => {
                eprintln!("  accepted as {}", rec.id);
                accepted.push(rec.id);
            }
            Err(UploadError::Rejected(rejection)) => {
                eprintln!("  refused: {rejection}");
                refused.push(Refused {
                    file: path.display().to_string(),
                    reasons: rejection.reasons(),
                });
            }
            Err(e @ UploadError::Unreadable(_)) => {
                eprintln!("  refused: {e}");
                refused.push(Refused {
                    file: path.display().to_string(),
                    reasons: vec![e.to_string()],
                });
            }
            Err(e) => return Err(e).context("upload failed"),
        }
    }

    eprintln!("Waiting for {} task(s)...", store.queue.pending());
    store.queue.wait_idle().await;
    pool.shutdown();

    print_json(&IngestOutput {
        accepted: summaries(&store.repository, &accepted).await,
        refused,
    })
}

// ---------------------------------------------------------------------------
// reprocess
// ---------------------------------------------------------------------------

pub async fn reprocess(args: ReprocessArgs, config: &AppConfig) -> Result<()> {
    let (store, receiver) = open_store(config).await?;
    let processor = Arc::new(RecordingProcessor::new(store.services.clone(), config));
    let pool = WorkerPool::start(receiver, processor, config.dispatch.max_concurrency);

    let handles = store
        .services
        .dispatcher
        .submit_batch(&args.ids)
        .context("failed to queue tasks")?;
    eprintln!("Queued {} task(s)", handles.len());

    store.queue.wait_idle().await;
    pool.shutdown();

    print_json(&summaries(&store.repository, &args.ids).await)
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

pub async fn list(config: &AppConfig) -> Result<()> {
    let (store, _receiver) = open_store(config).await?;
    let mut recordings = store.repository.list().await?;
    recordings.sort_by_key(|r| r.created_at);
    let out: Vec<RecordingSummary> = recordings.iter().map(RecordingSummary::from).collect();
    print_json(&out)
}
