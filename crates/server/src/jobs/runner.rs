// crates/server/src/jobs/runner.rs
//! Runner that drives batch uploads through their phases.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use super::state::{JobState, ProgressSlot};
use super::types::{JobError, JobHandle, JobId, JobProgress, Phase, Progress};

/// Starts upload jobs, owns the shared progress slot and keeps a bounded
/// history of job records.
///
/// At most one job runs at a time, so the shared slot has exactly one writer.
pub struct JobRunner {
    next_id: AtomicU64,
    phase_delay: Duration,
    history_limit: usize,
    latest: Arc<ProgressSlot>,
    active: Arc<Mutex<Option<JobId>>>,
    jobs: RwLock<BTreeMap<JobId, Arc<JobState>>>,
}

impl JobRunner {
    /// `history_limit` is the number of job records kept; `Config::validate`
    /// rejects zero.
    pub fn new(phase_delay: Duration, history_limit: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            phase_delay,
            history_limit,
            latest: Arc::new(ProgressSlot::new()),
            active: Arc::new(Mutex::new(None)),
            jobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Start a batch upload on a background task.
    ///
    /// Fails with [`JobError::AlreadyRunning`] while another upload has not
    /// yet published `COMPLETED`.
    pub fn start_upload(&self) -> Result<JobHandle, JobError> {
        let id = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(running) = *active {
                return Err(JobError::AlreadyRunning { active: running });
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *active = Some(id);
            id
        };

        let state = Arc::new(JobState::new(id));
        self.remember(Arc::clone(&state));

        let claim = ActiveClaim {
            id,
            state: Arc::clone(&state),
            active: Arc::clone(&self.active),
        };
        let latest = Arc::clone(&self.latest);
        let delay = self.phase_delay;

        tracing::info!(
            job_id = id,
            delay_ms = delay.as_millis() as u64,
            observers = latest.observer_count(),
            "Batch upload started"
        );
        let task = tokio::spawn(async move {
            run_phases(&claim, &latest, delay).await;
            claim.state.snapshot()
        });

        Ok(JobHandle::new(id, task))
    }

    /// The shared progress state: the phase most recently published by any job.
    pub fn latest(&self) -> &ProgressSlot {
        &self.latest
    }

    /// Id of the running upload, if any.
    pub fn active_job(&self) -> Option<JobId> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase_delay(&self) -> Duration {
        self.phase_delay
    }

    /// Get current status of a specific job.
    pub fn get_job(&self, id: JobId) -> Option<JobProgress> {
        self.job(id).map(|s| s.snapshot())
    }

    /// Change notifications for one job's phase.
    pub fn subscribe_job(&self, id: JobId) -> Option<watch::Receiver<Option<Progress>>> {
        self.job(id).map(|s| s.slot().subscribe())
    }

    /// Snapshots of all remembered jobs, newest first.
    pub fn jobs(&self) -> Vec<JobProgress> {
        match self.jobs.read() {
            Ok(jobs) => jobs.values().rev().map(|s| s.snapshot()).collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs: {e}");
                Vec::new()
            }
        }
    }

    fn job(&self, id: JobId) -> Option<Arc<JobState>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(&id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// Store a new job record, evicting the oldest finished ones past the limit.
    fn remember(&self, state: Arc<JobState>) {
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("RwLock poisoned writing jobs map: {e}");
                return;
            }
        };
        jobs.insert(state.id(), state);

        while jobs.len() > self.history_limit {
            let oldest_finished = jobs
                .iter()
                .find(|(_, s)| s.is_finished())
                .map(|(id, _)| *id);
            match oldest_finished {
                Some(id) => {
                    jobs.remove(&id);
                    tracing::debug!(job_id = id, "Evicted job record");
                }
                None => break,
            }
        }
    }
}

/// Walk the phase sequence, publishing each phase to the job's own slot and
/// to the shared slot, then sleeping `delay` before the next one.
async fn run_phases(claim: &ActiveClaim, latest: &ProgressSlot, delay: Duration) {
    let state = &claim.state;
    for &phase in Phase::SEQUENCE {
        if phase.is_terminal() {
            // Publish and release under the claim lock so a new upload cannot
            // start between the two.
            claim.release_with(|| {
                state.publish(phase);
                latest.publish(state.id(), phase);
            });
            tracing::info!(job_id = state.id(), "Batch upload completed");
            break;
        }

        state.publish(phase);
        latest.publish(state.id(), phase);
        tracing::debug!(job_id = state.id(), %phase, "Phase published");
        tokio::time::sleep(delay).await;
    }
}

/// Exclusive claim on the runner for one job. Released when the job completes,
/// or on drop if the task stops early, which marks the job aborted.
struct ActiveClaim {
    id: JobId,
    state: Arc<JobState>,
    active: Arc<Mutex<Option<JobId>>>,
}

impl ActiveClaim {
    fn release_with(&self, f: impl FnOnce()) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        f();
        if *active == Some(self.id) {
            *active = None;
        }
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        if !self.state.is_finished() {
            self.state.abort();
            tracing::warn!(
                job_id = self.id,
                phase = ?self.state.phase(),
                "Batch upload stopped before completion"
            );
        }
        self.release_with(|| {});
    }
}
