// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Job manager and worker pool.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{Job, JobContext, JobSpec};
use super::queue::{JobQueue, QueuedJob};
use super::JobError;
use crate::config::JobConfig;
use crate::storage::{self, JobRecord};

/// Identifier assigned to a job when it is added.
pub type JobId = String;

struct Inner {
    context: JobContext,
    config: JobConfig,
    queue: Mutex<JobQueue>,
    running: Mutex<HashSet<JobId>>,
    canceled: Mutex<HashSet<JobId>>,
    wake: Notify,
    shutdown: AtomicBool,
}

/// Schedules, runs and retries jobs.
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(context: JobContext, config: JobConfig) -> Self {
        JobManager {
            inner: Arc::new(Inner {
                context,
                config,
                queue: Mutex::new(JobQueue::new()),
                running: Mutex::new(HashSet::new()),
                canceled: Mutex::new(HashSet::new()),
                wake: Notify::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the context jobs run with.
    pub fn context(&self) -> &JobContext {
        &self.inner.context
    }

    fn queue(&self) -> Result<MutexGuard<'_, JobQueue>, JobError> {
        self.inner.queue.lock().map_err(|_| JobError::Poisoned)
    }

    fn running(&self) -> Result<MutexGuard<'_, HashSet<JobId>>, JobError> {
        self.inner.running.lock().map_err(|_| JobError::Poisoned)
    }

    fn canceled(&self) -> Result<MutexGuard<'_, HashSet<JobId>>, JobError> {
        self.inner.canceled.lock().map_err(|_| JobError::Poisoned)
    }

    /// Enqueues a job.
    ///
    /// Persistent jobs are written to storage first, then `on_added` runs.
    pub fn add(&self, mut job: Box<dyn Job>) -> Result<JobId, JobError> {
        let parameters = job.parameters();
        let id = Uuid::new_v4().to_string();

        if parameters.persistent {
            let record = JobRecord {
                id: id.clone(),
                payload: job.spec().to_json()?,
                attempts: 0,
                created_at: storage::now_secs(),
            };
            storage::lock(&self.inner.context.storage)?.insert_job(&record)?;
        }

        if let Err(e) = job.on_added(&self.inner.context) {
            warn!(job = %id, error = %e, "on_added failed");
        }

        debug!(job = %id, group = ?parameters.group_id, "job added");
        self.queue()?.push(QueuedJob {
            id: id.clone(),
            job,
            parameters,
            attempts: 0,
            not_before: None,
        });
        self.inner.wake.notify_waiters();
        Ok(id)
    }

    /// Re-enqueues persisted jobs after a restart.
    ///
    /// Unreadable records are dropped. Jobs already known to this manager
    /// are skipped.
    pub fn restore(&self) -> Result<usize, JobError> {
        let records = storage::lock(&self.inner.context.storage)?.load_jobs()?;
        let mut restored = 0;

        for record in records {
            let known = self.queue()?.pending_ids().contains(&record.id)
                || self.running()?.contains(&record.id);
            if known {
                continue;
            }

            match JobSpec::from_json(&record.payload) {
                Ok(spec) => {
                    let job = spec.into_job();
                    let parameters = job.parameters();
                    self.queue()?.push(QueuedJob {
                        id: record.id,
                        job,
                        parameters,
                        attempts: record.attempts,
                        not_before: None,
                    });
                    restored += 1;
                }
                Err(e) => {
                    warn!(job = %record.id, error = %e, "dropping unreadable job");
                    storage::lock(&self.inner.context.storage)?.delete_job(&record.id)?;
                }
            }
        }

        if restored > 0 {
            info!(count = restored, "restored persisted jobs");
            self.inner.wake.notify_waiters();
        }
        Ok(restored)
    }

    /// Cancels a job.
    ///
    /// A waiting job is removed and compensated at once. A running job
    /// finishes its attempt and is not retried.
    pub fn cancel(&self, id: &str) -> Result<bool, JobError> {
        let removed = self.queue()?.remove(id);
        if let Some(mut queued) = removed {
            info!(job = %id, "job canceled");
            queued.job.on_canceled(&self.inner.context);
            self.forget(id, queued.parameters.persistent);
            return Ok(true);
        }

        if self.running()?.contains(id) {
            self.canceled()?.insert(id.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    /// Number of jobs waiting to run.
    pub fn pending_count(&self) -> usize {
        self.queue().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Ids of waiting jobs in queue order.
    pub fn pending_jobs(&self) -> Vec<JobId> {
        self.queue()
            .map(|queue| queue.pending_ids())
            .unwrap_or_default()
    }

    /// Returns true when nothing is waiting or running.
    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0 && self.running().map(|r| r.is_empty()).unwrap_or(false)
    }

    /// Runs runnable jobs on the calling thread until none is left.
    ///
    /// Retry backoff is not waited out; jobs with unmet requirements stay
    /// queued. Returns the number of runs.
    pub fn run_until_idle(&self) -> Result<usize, JobError> {
        let mut runs = 0;
        while self.run_next(None)? {
            runs += 1;
        }
        Ok(runs)
    }

    /// Runs the next runnable job, if any.
    fn run_next(&self, now: Option<Instant>) -> Result<bool, JobError> {
        let queued = self
            .queue()?
            .take_runnable(&self.inner.context.environment, now);
        match queued {
            Some(queued) => {
                self.running()?.insert(queued.id.clone());
                self.execute(queued)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn execute(&self, queued: QueuedJob) -> Result<(), JobError> {
        let QueuedJob {
            id,
            mut job,
            parameters,
            attempts,
            ..
        } = queued;
        let context = &self.inner.context;
        let group = parameters.group_id.clone();

        debug!(job = %id, attempt = attempts + 1, "running job");
        // A panicking job is released and compensated like a permanent failure.
        let result = panic::catch_unwind(AssertUnwindSafe(|| job.on_run(context)))
            .unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(payload.as_ref()))));

        self.running()?.remove(&id);
        let was_canceled = self.canceled()?.remove(&id);

        match result {
            Ok(()) => {
                debug!(job = %id, "job finished");
                self.forget(&id, parameters.persistent);
                self.queue()?.finish(group.as_deref());
            }
            Err(error) => {
                let attempts = attempts + 1;
                if !was_canceled && job.should_retry(&error) && attempts < parameters.retry_count {
                    let delay = self.inner.config.backoff(attempts - 1);
                    warn!(
                        job = %id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "job failed, retrying"
                    );
                    if parameters.persistent {
                        if let Err(e) = storage::lock(&context.storage)
                            .and_then(|s| s.update_job_attempts(&id, attempts))
                        {
                            warn!(job = %id, error = %e, "failed to persist attempt count");
                        }
                    }
                    let mut queue = self.queue()?;
                    queue.requeue(QueuedJob {
                        id,
                        job,
                        parameters,
                        attempts,
                        not_before: Some(Instant::now() + delay),
                    });
                    queue.finish(group.as_deref());
                } else {
                    warn!(job = %id, attempts, error = %error, "job failed permanently");
                    job.on_canceled(context);
                    self.forget(&id, parameters.persistent);
                    self.queue()?.finish(group.as_deref());
                }
            }
        }
        self.inner.wake.notify_waiters();
        Ok(())
    }

    /// Drops the persisted record of a finished job.
    fn forget(&self, id: &str, persistent: bool) {
        if !persistent {
            return;
        }
        if let Err(e) = storage::lock(&self.inner.context.storage).and_then(|s| s.delete_job(id)) {
            warn!(job = %id, error = %e, "failed to delete finished job");
        }
    }

    /// How long an idle worker sleeps before looking again.
    fn idle_wait(&self) -> Duration {
        let poll = self.inner.config.poll_interval();
        let deadline = self.queue().ok().and_then(|queue| queue.next_deadline());
        match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(poll),
            None => poll,
        }
    }

    /// Starts the worker pool on the current tokio runtime.
    pub fn start(&self) -> JobWorkers {
        self.inner.shutdown.store(false, Ordering::SeqCst);
        let handles = (0..self.inner.config.workers.max(1))
            .map(|_| {
                let manager = self.clone();
                tokio::spawn(async move { manager.worker_loop().await })
            })
            .collect();
        info!(workers = self.inner.config.workers, "job workers started");
        JobWorkers {
            manager: self.clone(),
            handles,
        }
    }

    async fn worker_loop(self) {
        while !self.inner.shutdown.load(Ordering::SeqCst) {
            let manager = self.clone();
            // Jobs block on storage and network, so they run off the reactor.
            let ran = tokio::task::spawn_blocking(move || manager.run_next(Some(Instant::now())))
                .await;
            match ran {
                Ok(Ok(true)) => continue,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => warn!(error = %e, "job worker error"),
                Err(e) => warn!(error = %e, "job worker panicked"),
            }

            let wait = self.idle_wait();
            tokio::select! {
                _ = self.inner.wake.notified() => {}
                _ = self.inner.context.environment.changed() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running worker pool.
pub struct JobWorkers {
    manager: JobManager,
    handles: Vec<JoinHandle<()>>,
}

impl JobWorkers {
    /// Stops the workers after their current job.
    pub async fn shutdown(self) {
        self.manager.inner.shutdown.store(true, Ordering::SeqCst);
        self.manager.inner.wake.notify_waiters();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "job worker did not stop cleanly");
            }
        }
        info!("job workers stopped");
    }
}
