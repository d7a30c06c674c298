//! Asynchronous task dispatch.
//!
//! The orchestrator only sees the [`Dispatcher`] trait: submit a task, get a
//! handle back immediately, observe completion through persisted status.
//! [`TaskQueue`] + [`WorkerPool`] is the in-process implementation:
//!
//! ```text
//! submit() ──▶ mpsc (unbounded) ──▶ dispatcher task ──▶ tokio::spawn per task
//!                                        │                 (≤ max_concurrency,
//!                                        │                  Semaphore permits)
//!  pending counter (watch) ◀── +1 on submit, −1 when a task finishes
//! ```
//!
//! Delivery is at-least-once from the caller's point of view: resubmitting an
//! identifier simply runs the task again.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::recording::RecordingId;

use super::orchestrator::RecordingProcessor;

// ---------------------------------------------------------------------------
// Task types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Analyse, validate and score a recording.
    Process,
    /// Re-encode a recording to the canonical format.
    ConvertFormat,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Process => "process",
            TaskKind::ConvertFormat => "convert_format",
        })
    }
}

/// A unit of work for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub recording_id: RecordingId,
}

impl Task {
    pub fn process(recording_id: RecordingId) -> Self {
        Self {
            kind: TaskKind::Process,
            recording_id,
        }
    }

    pub fn convert_format(recording_id: RecordingId) -> Self {
        Self {
            kind: TaskKind::ConvertFormat,
            recording_id,
        }
    }
}

/// Returned by every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: Uuid,
    pub recording_id: RecordingId,
    pub kind: TaskKind,
}

impl TaskHandle {
    fn new(task: &Task) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            recording_id: task.recording_id,
            kind: task.kind,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("task queue is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Dispatcher trait
// ---------------------------------------------------------------------------

/// Fire-and-forget task submission.  Never waits for the task to run.
pub trait Dispatcher: Send + Sync {
    fn submit(&self, task: Task) -> Result<TaskHandle, DispatchError>;

    /// One independent `process` task per identifier.
    fn submit_batch(&self, recording_ids: &[RecordingId]) -> Result<Vec<TaskHandle>, DispatchError> {
        recording_ids
            .iter()
            .map(|&id| self.submit(Task::process(id)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

struct Envelope {
    handle: TaskHandle,
    task: Task,
}

/// Submission side of the in-process queue.  Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Envelope>,
    pending: Arc<watch::Sender<usize>>,
}

/// Receiving side, consumed by [`WorkerPool::start`].
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
    pending: Arc<watch::Sender<usize>>,
}

impl TaskQueue {
    pub fn channel() -> (TaskQueue, TaskReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        (
            TaskQueue {
                tx,
                pending: Arc::clone(&pending),
            },
            TaskReceiver { rx, pending },
        )
    }

    /// Tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolve once no task is queued or running.
    ///
    /// Follow-up tasks submitted by a running task are counted before that
    /// task finishes, so this also waits for them.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|&n| n == 0).await;
    }
}

impl Dispatcher for TaskQueue {
    fn submit(&self, task: Task) -> Result<TaskHandle, DispatchError> {
        let handle = TaskHandle::new(&task);
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(Envelope { handle, task }).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(DispatchError::Closed);
        }
        log::debug!(
            "dispatch: queued {} for {} (task {})",
            handle.kind,
            handle.recording_id,
            handle.task_id
        );
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Decrements the pending counter when a task finishes, even by panic.
struct PendingGuard(Arc<watch::Sender<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Drains a [`TaskReceiver`] and runs each task on its own tokio task.
pub struct WorkerPool {
    dispatcher: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the dispatcher loop.  At most `max_concurrency` tasks run at once.
    pub fn start(
        receiver: TaskReceiver,
        processor: Arc<RecordingProcessor>,
        max_concurrency: usize,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let TaskReceiver { mut rx, pending } = receiver;

        let dispatcher = tokio::spawn(async move {
            while let Some(Envelope { handle, task }) = rx.recv().await {
                let guard = PendingGuard(Arc::clone(&pending));
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let processor = Arc::clone(&processor);
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    log::debug!("worker: start task {} ({})", handle.task_id, handle.kind);
                    processor.run_task(&task).await;
                });
            }
            log::info!("worker: queue closed, dispatcher stopping");
        });

        Self { dispatcher }
    }

    /// Stop accepting work.  Tasks already running finish on their own.
    pub fn shutdown(self) {
        self.dispatcher.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
