//! Task executor.
//!
//! Runs tasks on tokio workers with a bounded number of concurrent
//! executions. Tasks that target the same resource form a queue: each waits
//! until its predecessor has fully completed, successfully or not, before it
//! starts. Tasks with disjoint targets run concurrently.
//!
//! ```text
//!   submit ──► [wait for predecessor] ──► [wait for permit] ──► execute ──► result
//!                     │                          │                  │
//!                  cancel                     cancel              cancel
//!                     ▼                          ▼                  ▼
//!                 Cancelled                  Cancelled     Cancelled (task keeps
//!                                                          running, result dropped)
//! ```

use dashmap::DashMap;
use mxsync_types::{ResourceId, TaskId};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch, Semaphore};

use super::{Task, TaskError};

/// Queue tail for one resource: the completion signal of the last task
/// submitted for it.
struct QueueTail {
    generation: u64,
    done: oneshot::Receiver<()>,
}

/// Bounded, per-resource serializing task executor.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct TaskExecutor {
    permits: Arc<Semaphore>,
    queues: Arc<DashMap<ResourceId, QueueTail>>,
    generation: Arc<AtomicU64>,
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("available_permits", &self.permits.available_permits())
            .field("queued_resources", &self.queues.len())
            .finish()
    }
}

impl TaskExecutor {
    /// Create an executor running at most `max_concurrent` tasks at once.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            queues: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit a task for execution.
    ///
    /// Returns immediately. The task is queued behind any earlier task with
    /// the same target; the returned handle resolves with its result.
    pub fn submit<T: Task>(&self, task: Arc<T>, params: T::Params) -> TaskHandle<T::Output> {
        let id = TaskId::new();
        let name = task.name();
        let target = task.target(&params);
        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Enqueue synchronously so tasks start in submission order.
        let (predecessor, completion) = match &target {
            Some(resource) => {
                let (done_tx, done_rx) = oneshot::channel();
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let previous = self.queues.insert(
                    resource.clone(),
                    QueueTail {
                        generation,
                        done: done_rx,
                    },
                );
                (
                    previous.map(|tail| tail.done),
                    Some(Completion {
                        resource: resource.clone(),
                        generation,
                        _done: done_tx,
                    }),
                )
            }
            None => (None, None),
        };

        tracing::debug!("Submitted {} task {} (target: {:?})", name, id, target);

        let permits = self.permits.clone();
        let queues = self.queues.clone();
        tokio::spawn(async move {
            let outcome = run(task, params, predecessor, permits, cancel_rx, result_tx, id).await;
            if let Some(completion) = completion {
                completion.release(&queues);
            }
            outcome
        });

        TaskHandle {
            id,
            cancel: Arc::new(cancel_tx),
            result: result_rx,
        }
    }

    /// Request cancellation of a submitted task.
    pub fn cancel<T>(&self, handle: &TaskHandle<T>) {
        handle.cancel();
    }

    /// Resources that currently have a queued or running task.
    pub fn pending_resources(&self) -> Vec<ResourceId> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of tasks that could start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Held by a running task; releases its successor when dropped.
struct Completion {
    resource: ResourceId,
    generation: u64,
    _done: oneshot::Sender<()>,
}

impl Completion {
    fn release(self, queues: &DashMap<ResourceId, QueueTail>) {
        // Only clear the slot if nobody queued behind us.
        queues.remove_if(&self.resource, |_, tail| tail.generation == self.generation);
    }
}

async fn run<T: Task>(
    task: Arc<T>,
    params: T::Params,
    predecessor: Option<oneshot::Receiver<()>>,
    permits: Arc<Semaphore>,
    mut cancel_rx: watch::Receiver<bool>,
    result_tx: oneshot::Sender<Result<T::Output, TaskError>>,
    id: TaskId,
) {
    let name = task.name();

    if let Some(predecessor) = predecessor {
        tokio::pin!(predecessor);
        let cancelled_early = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => true,
            _ = &mut predecessor => false,
        };
        if cancelled_early {
            tracing::debug!("{} task {} cancelled while queued", name, id);
            let _ = result_tx.send(Err(TaskError::Cancelled));
            // Keep our place in the queue until the predecessor finishes.
            let _ = predecessor.await;
            return;
        }
    }

    let permit = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {
            tracing::debug!("{} task {} cancelled while waiting for a worker", name, id);
            let _ = result_tx.send(Err(TaskError::Cancelled));
            return;
        }
        permit = permits.acquire_owned() => permit,
    };
    let _permit = match permit {
        Ok(permit) => permit,
        Err(_) => {
            let _ = result_tx.send(Err(TaskError::Aborted("executor shut down".into())));
            return;
        }
    };

    tracing::debug!("Starting {} task {}", name, id);
    let worker = tokio::spawn(async move { task.execute(params).await });
    tokio::pin!(worker);

    let joined = tokio::select! {
        biased;
        joined = &mut worker => Some(joined),
        _ = cancelled(&mut cancel_rx) => None,
    };

    match joined {
        Some(joined) => {
            let _ = result_tx.send(flatten(name, id, joined));
        }
        None => {
            // Already in flight: let it finish so no transaction is cut short.
            let _ = result_tx.send(Err(TaskError::Cancelled));
            match flatten(name, id, worker.await) {
                Ok(_) => tracing::warn!(
                    "{} task {} was cancelled in flight; discarding its result",
                    name,
                    id
                ),
                Err(e) => tracing::warn!(
                    "{} task {} was cancelled in flight and then failed: {}",
                    name,
                    id,
                    e
                ),
            }
        }
    }
}

fn flatten<O>(
    name: &str,
    id: TaskId,
    joined: Result<Result<O, TaskError>, tokio::task::JoinError>,
) -> Result<O, TaskError> {
    match joined {
        Ok(result) => {
            if let Err(e) = &result {
                tracing::debug!("{} task {} failed: {}", name, id, e);
            }
            result
        }
        Err(e) => {
            tracing::error!("{} task {} panicked or was aborted: {}", name, id, e);
            Err(TaskError::Aborted(e.to_string()))
        }
    }
}

/// Resolves once cancellation is requested; never resolves if the handle
/// was dropped without cancelling.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Handle to a submitted task.
///
/// Await it to get the task's result. Dropping the handle detaches the task;
/// it still runs.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    cancel: Arc<watch::Sender<bool>>,
    result: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// Identifier of the submitted task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Request cancellation.
    ///
    /// A queued task never starts. A running task finishes its current
    /// work, but the handle resolves with [`TaskError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// A cloneable token that can cancel this task after the handle has been
    /// moved into an `.await`.
    pub fn canceller(&self) -> TaskCanceller {
        TaskCanceller {
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(TaskError::Aborted("task dropped its result".into())))
        })
    }
}

/// Cancels one submitted task.
#[derive(Debug, Clone)]
pub struct TaskCanceller {
    cancel: Arc<watch::Sender<bool>>,
}

impl TaskCanceller {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}
