//! In-memory ordering of pending jobs.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use super::job::{Job, JobParameters};
use super::requirement::JobEnvironment;

/// A job waiting in the queue.
pub(crate) struct QueuedJob {
    pub id: String,
    pub job: Box<dyn Job>,
    pub parameters: JobParameters,
    /// Failed runs so far.
    pub attempts: u32,
    /// Earliest time of the next run, set while backing off.
    pub not_before: Option<Instant>,
}

/// FIFO of pending jobs with requirement gating and per-group exclusion.
///
/// A job is runnable when its requirements hold, its backoff has elapsed,
/// no job of its group is running, and no earlier job of its group is
/// still waiting.
#[derive(Default)]
pub(crate) struct JobQueue {
    pending: VecDeque<QueuedJob>,
    running_groups: HashSet<String>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the ids of waiting jobs in queue order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|q| q.id.clone()).collect()
    }

    pub(crate) fn push(&mut self, job: QueuedJob) {
        self.pending.push_back(job);
    }

    /// Puts a retried job back ahead of later jobs of its group.
    pub(crate) fn requeue(&mut self, job: QueuedJob) {
        self.pending.push_front(job);
    }

    /// Removes a waiting job.
    pub(crate) fn remove(&mut self, id: &str) -> Option<QueuedJob> {
        let index = self.pending.iter().position(|q| q.id == id)?;
        self.pending.remove(index)
    }

    /// Takes the first runnable job and marks its group running.
    ///
    /// With `now` set to `None` backoff delays are ignored.
    pub(crate) fn take_runnable(
        &mut self,
        env: &JobEnvironment,
        now: Option<Instant>,
    ) -> Option<QueuedJob> {
        let mut blocked_groups: HashSet<&str> = HashSet::new();
        let mut found = None;

        for (index, queued) in self.pending.iter().enumerate() {
            let group = queued.parameters.group_id.as_deref();
            if let Some(group) = group {
                if self.running_groups.contains(group) || blocked_groups.contains(group) {
                    continue;
                }
            }

            let backing_off = match (now, queued.not_before) {
                (Some(now), Some(not_before)) => now < not_before,
                _ => false,
            };

            if !backing_off && queued.parameters.requirements_met(env) {
                found = Some(index);
                break;
            }

            if let Some(group) = group {
                blocked_groups.insert(group);
            }
        }

        let queued = self.pending.remove(found?)?;
        if let Some(group) = &queued.parameters.group_id {
            self.running_groups.insert(group.clone());
        }
        Some(queued)
    }

    /// Releases the group of a job that finished running.
    pub(crate) fn finish(&mut self, group_id: Option<&str>) {
        if let Some(group) = group_id {
            self.running_groups.remove(group);
        }
    }

    /// Earliest backoff deadline among waiting jobs.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().filter_map(|q| q.not_before).min()
    }
}
