// crates/server/src/jobs/types.rs
//! Types for the batch upload job system.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Unique identifier for an upload job.
pub type JobId = u64;

/// One named step of the batch upload, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Phase {
    UploadingArea = 0,
    UploadingDepartment = 1,
    UploadingDesignation = 2,
    UploadingEmployee = 3,
    UploadingSchedule = 4,
    UploadingDrivers = 5,
    UploadingAssignCar = 6,
    Completed = 7,
}

impl Phase {
    /// Every phase, in the order the runner publishes them.
    pub const SEQUENCE: &[Phase] = &[
        Phase::UploadingArea,
        Phase::UploadingDepartment,
        Phase::UploadingDesignation,
        Phase::UploadingEmployee,
        Phase::UploadingSchedule,
        Phase::UploadingDrivers,
        Phase::UploadingAssignCar,
        Phase::Completed,
    ];

    /// Wire label, as sent in `data:` frames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadingArea => "UPLOADING_AREA",
            Self::UploadingDepartment => "UPLOADING_DEPARTMENT",
            Self::UploadingDesignation => "UPLOADING_DESIGNATION",
            Self::UploadingEmployee => "UPLOADING_EMPLOYEE",
            Self::UploadingSchedule => "UPLOADING_SCHEDULE",
            Self::UploadingDrivers => "UPLOADING_DRIVERS",
            Self::UploadingAssignCar => "UPLOADING_ASSIGN_CAR",
            Self::Completed => "COMPLETED",
        }
    }

    /// Zero-based position in [`Phase::SEQUENCE`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }

    /// The phase that follows this one, `None` after `COMPLETED`.
    pub fn next(self) -> Option<Phase> {
        Self::SEQUENCE.get(self.index() + 1).copied()
    }

    /// Phases a reader must emit to move from `seen` to `current` of the same
    /// job without skipping a transition.
    ///
    /// When `current` is ahead of `seen` this is every phase after `seen` up to
    /// and including `current`. Otherwise it is just `current`.
    pub fn advance(seen: Option<Phase>, current: Phase) -> &'static [Phase] {
        let sequence: &'static [Phase] = Self::SEQUENCE;
        match seen {
            Some(prev) if current > prev => &sequence[prev.index() + 1..=current.index()],
            _ => &sequence[current.index()..=current.index()],
        }
    }

    /// Every phase after this one, through `COMPLETED`. Empty for `COMPLETED`.
    pub fn remaining(self) -> &'static [Phase] {
        let sequence: &'static [Phase] = Self::SEQUENCE;
        match self.next() {
            Some(next) => &sequence[next.index()..],
            None => &[],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase as published into a slot, tagged with the job that published it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub job_id: JobId,
    pub phase: Phase,
}

/// Lifecycle of one upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    Running = 0,
    Completed = 1,
    /// The job task ended before publishing `COMPLETED`.
    Aborted = 2,
}

impl JobStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Completed,
            _ => Self::Aborted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Handle to a started job. Awaiting it does not affect the job itself:
/// dropping the handle leaves the job running to completion.
pub struct JobHandle {
    pub id: JobId,
    task: JoinHandle<JobProgress>,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, task: JoinHandle<JobProgress>) -> Self {
        Self { id, task }
    }

    /// Wait for the job to publish `COMPLETED` and return its final snapshot.
    pub async fn wait(self) -> Result<JobProgress, JobError> {
        self.task
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))
    }
}

/// Snapshot of a job, served by `/api/jobs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: String,
    pub phase: Option<Phase>,
    /// 1-based position of `phase` in the sequence, 0 before the first phase.
    pub step: usize,
    pub total_steps: usize,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub timestamp: String,
}

/// Errors raised by the job runner.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("batch upload {active} is already running")]
    AlreadyRunning { active: JobId },

    #[error("batch upload aborted: {0}")]
    Aborted(String),
}
