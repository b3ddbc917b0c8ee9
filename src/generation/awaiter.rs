//! Caller-driven polling of provider-hosted generation tasks.
//!
//! Nothing here runs in the background: `await_completion` lives exactly as
//! long as the future its caller is awaiting, so dropping it stops polling.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::generation::task::{GenerationTask, TaskHandle, TaskStatus};

/// Where task status comes from and where cancellations go.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// One status read. Callers own the retry loop.
    async fn poll(&self, handle: &TaskHandle) -> Result<GenerationTask>;

    async fn cancel(&self, handle: &TaskHandle) -> Result<()>;
}

#[async_trait]
impl<B: TaskBackend + ?Sized> TaskBackend for std::sync::Arc<B> {
    async fn poll(&self, handle: &TaskHandle) -> Result<GenerationTask> {
        (**self).poll(handle).await
    }

    async fn cancel(&self, handle: &TaskHandle) -> Result<()> {
        (**self).cancel(handle).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
    /// How long a task may sit in `starting` before it is treated as a stuck cold start.
    pub stuck_start_after: Duration,
}

impl PollPolicy {
    pub fn budget(&self) -> Duration {
        self.interval * self.max_polls
    }
}

/// Cancel without caring whether it worked.
pub async fn cancel_quietly<B: TaskBackend + ?Sized>(backend: &B, handle: &TaskHandle) {
    match backend.cancel(handle).await {
        Ok(()) => info!("Canceled {} task {}", handle.kind, handle.id),
        Err(e) => warn!("Cancel of {} task {} failed (ignored): {}", handle.kind, handle.id, e),
    }
}

pub struct TaskAwaiter<B> {
    backend: B,
    policy: PollPolicy,
}

impl<B: TaskBackend> TaskAwaiter<B> {
    pub fn new(backend: B, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Poll until the task reaches a terminal state and return its output URLs.
    ///
    /// `observer` sees every snapshot, including the terminal one. A failed
    /// read that `is_transient` counts as a missed poll; anything else ends
    /// the wait.
    pub async fn await_completion<F>(&self, handle: &TaskHandle, mut observer: F) -> Result<Vec<String>>
    where
        F: FnMut(&GenerationTask) + Send,
    {
        // Whole seconds queued before the first snapshot, and when that snapshot arrived.
        let mut queued: Option<(Duration, Instant)> = None;
        let mut seen_processing = false;

        for attempt in 0..self.policy.max_polls {
            if attempt > 0 {
                sleep(self.policy.interval).await;
            }

            let task = match self.backend.poll(handle).await {
                Ok(task) => task,
                Err(e) if e.is_transient() => {
                    warn!(
                        "Poll {}/{} for {} task {} failed, retrying: {}",
                        attempt + 1,
                        self.policy.max_polls,
                        handle.kind,
                        handle.id,
                        e
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!(
                "Poll {}/{} for {} task {}: {}",
                attempt + 1,
                self.policy.max_polls,
                handle.kind,
                handle.id,
                task.status
            );
            observer(&task);
            let (age, first_seen) = *queued.get_or_insert_with(|| {
                let secs = (Utc::now() - task.created_at).num_seconds().max(0);
                (Duration::from_secs(secs as u64), Instant::now())
            });

            match task.status {
                TaskStatus::Completed => {
                    if task.output.is_empty() {
                        return Err(Error::EmptyOutput(handle.id.clone()));
                    }
                    info!("{} task {} completed after {} polls", handle.kind, handle.id, attempt + 1);
                    return Ok(task.output);
                }
                TaskStatus::Failed => {
                    let reason = task.error.unwrap_or_else(|| "generation failed".to_string());
                    warn!("{} task {} failed: {}", handle.kind, handle.id, reason);
                    return Err(Error::GenerationFailed(reason));
                }
                TaskStatus::Canceled => {
                    return Err(Error::Canceled(handle.id.clone()));
                }
                TaskStatus::Processing => {
                    seen_processing = true;
                }
                TaskStatus::Starting => {
                    let waited = age + first_seen.elapsed();
                    if !seen_processing && waited > self.policy.stuck_start_after {
                        warn!(
                            "{} task {} still starting after {:?}, canceling",
                            handle.kind, handle.id, waited
                        );
                        cancel_quietly(&self.backend, handle).await;
                        return Err(Error::ColdStartAborted(handle.id.clone()));
                    }
                }
            }
        }

        warn!(
            "{} task {} exhausted its poll budget of {}",
            handle.kind, handle.id, self.policy.max_polls
        );
        Err(Error::Timeout {
            task_id: handle.id.clone(),
            polls: self.policy.max_polls,
        })
    }
}
