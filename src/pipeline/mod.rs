//! Recording lifecycle: intake, dispatch, processing and conversion.
//!
//! # Architecture
//!
//! ```text
//! UploadIntake::accept_upload
//!        │  assess (spawn_blocking) → reject | store blob + Recording(Uploaded)
//!        ▼
//!   Dispatcher::submit(process)          TaskQueue ──▶ WorkerPool
//!                                                         │
//!                       RecordingProcessor::run_task ◀────┘
//!                              ├─ process        Uploaded → Processing → Processed | Error
//!                              └─ convert_format (queued by process when non-canonical)
//! ```
//!
//! Recording and ProcessingResult are persisted through
//! [`RecordingRepository`](crate::recording::RecordingRepository), audio
//! through [`BlobStorage`](crate::recording::BlobStorage).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speech_intake::config::AppConfig;
//! use speech_intake::pipeline::{RecordingProcessor, Services, TaskQueue, UploadIntake, WorkerPool};
//! use speech_intake::recording::{InMemoryRepository, InMemoryStorage};
//!
//! # async fn example(bytes: Vec<u8>) {
//! let config = AppConfig::default();
//! let (queue, receiver) = TaskQueue::channel();
//! let services = Services {
//!     repository: Arc::new(InMemoryRepository::new()),
//!     storage: Arc::new(InMemoryStorage::new()),
//!     dispatcher: Arc::new(queue.clone()),
//! };
//!
//! let processor = Arc::new(RecordingProcessor::new(services.clone(), &config));
//! let _pool = WorkerPool::start(receiver, processor, config.dispatch.max_concurrency);
//!
//! let intake = UploadIntake::new(services, &config);
//! let _ = intake
//!     .accept_upload(speech_intake::pipeline::UploadRequest {
//!         bytes,
//!         filename: "take.wav".into(),
//!         ..Default::default()
//!     })
//!     .await;
//! queue.wait_idle().await;
//! # }
//! ```

pub mod assess;
pub mod dispatch;
pub mod intake;
pub mod orchestrator;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use assess::{Assessment, Assessor};
pub use dispatch::{
    DispatchError, Dispatcher, Task, TaskHandle, TaskKind, TaskQueue, TaskReceiver, WorkerPool,
};
pub use intake::{UploadError, UploadIntake, UploadRequest};
pub use orchestrator::{
    ConversionOutcome, ProcessOutcome, RecordingProcessor, Services, TaskOutcome,
};
pub use state::{RecordingStatus, TransitionError};
