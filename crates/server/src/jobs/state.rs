// crates/server/src/jobs/state.rs
//! Progress state for batch upload jobs.
//!
//! [`ProgressSlot`] is the single-value cell a runner publishes phases into and
//! broadcasters observe. [`JobState`] wraps one slot together with the
//! bookkeeping of a single job.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::types::{JobId, JobProgress, JobStatus, Phase, Progress};

/// Single-slot holder of the most recently published phase.
///
/// Backed by a `watch` channel: reads never block, and observers can await
/// the next change instead of polling. `None` means nothing has been
/// published yet. Each value carries the id of the job that wrote it, so an
/// observer can tell a new job apart from the one it was following.
#[derive(Debug)]
pub struct ProgressSlot {
    tx: watch::Sender<Option<Progress>>,
}

impl ProgressSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Overwrite the slot and wake every observer.
    pub fn publish(&self, job_id: JobId, phase: Phase) {
        self.tx.send_replace(Some(Progress { job_id, phase }));
    }

    /// Current phase in the slot.
    pub fn observe(&self) -> Option<Phase> {
        self.tx.borrow().map(|p| p.phase)
    }

    /// Current phase together with the job that published it.
    pub fn progress(&self) -> Option<Progress> {
        *self.tx.borrow()
    }

    /// Receiver for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<Option<Progress>> {
        self.tx.subscribe()
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single upload job.
///
/// `status` is an atomic so snapshots never contend with the runner; the
/// timestamps are written once each.
pub struct JobState {
    id: JobId,
    status: AtomicU8,
    slot: ProgressSlot,
    started_at: DateTime<Utc>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
}

impl JobState {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: AtomicU8::new(JobStatus::Running as u8),
            slot: ProgressSlot::new(),
            started_at: Utc::now(),
            finished_at: RwLock::new(None),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn phase(&self) -> Option<Phase> {
        self.slot.observe()
    }

    pub fn slot(&self) -> &ProgressSlot {
        &self.slot
    }

    /// Publish the job's current phase. Publishing `COMPLETED` also marks the
    /// job as completed.
    pub fn publish(&self, phase: Phase) {
        self.slot.publish(self.id, phase);
        if phase.is_terminal() {
            self.finish(JobStatus::Completed);
        }
    }

    /// Mark a job that stopped before `COMPLETED`. No-op on a finished job.
    pub fn abort(&self) {
        if self.status() == JobStatus::Running {
            self.finish(JobStatus::Aborted);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status() != JobStatus::Running
    }

    fn finish(&self, status: JobStatus) {
        match self.finished_at.write() {
            Ok(mut guard) => *guard = Some(Utc::now()),
            Err(e) => tracing::error!("RwLock poisoned writing finished_at: {e}"),
        }
        self.status.store(status as u8, Ordering::Release);
    }

    /// Get a snapshot of the current job state.
    pub fn snapshot(&self) -> JobProgress {
        let phase = self.phase();
        JobProgress {
            job_id: self.id,
            status: self.status().as_str().to_string(),
            phase,
            step: phase.map_or(0, |p| p.index() + 1),
            total_steps: Phase::SEQUENCE.len(),
            started_at: self.started_at.to_rfc3339(),
            finished_at: match self.finished_at.read() {
                Ok(g) => g.map(|t| t.to_rfc3339()),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading finished_at: {e}");
                    None
                }
            },
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
