// crates/server/src/jobs/mod.rs
//! Batch upload jobs and their progress streams.
//!
//! Provides:
//! - `JobRunner` — starts uploads and walks them through their phases
//! - `ProgressSlot` — single-value progress cell with change notification
//! - `JobState` — per-job slot and lifecycle
//! - `phase_frames` — the progress broadcaster behind the SSE endpoints

pub mod broadcast;
pub mod runner;
pub mod state;
pub mod types;

pub use broadcast::{frame_payload, phase_frames, StreamSettings};
pub use runner::JobRunner;
pub use state::{JobState, ProgressSlot};
pub use types::{JobError, JobHandle, JobId, JobProgress, JobStatus, Phase, Progress};
