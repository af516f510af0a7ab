// crates/server/src/jobs/broadcast.rs
//! Progress broadcaster: turns a progress slot into a stream of frames.
//!
//! A frame is the slot value at read time (`None` before anything was
//! published). The stream re-reads the slot every poll interval and as soon as
//! it changes, and ends after emitting `COMPLETED`.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_stream::Stream;

use super::types::{JobId, Phase, Progress};

/// Timing knobs for one event stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Cadence at which the current value is re-emitted when nothing changes.
    pub poll_interval: Duration,
    /// Hard cap on the stream lifetime; `None` keeps it open until `COMPLETED`.
    pub max_duration: Option<Duration>,
}

/// Wire payload of a frame: the phase label, or empty before the first phase.
pub fn frame_payload(frame: Option<Phase>) -> &'static str {
    frame.map_or("", |p| p.as_str())
}

/// Stream the values of `source` until `COMPLETED`.
///
/// Every transition after the first read is delivered, in order, even when
/// several phases were published between two reads. A reader that first saw
/// the empty slot is owed the whole sequence from the first phase. If the
/// slot has moved on to another job, the followed job finished in between:
/// its remaining phases through `COMPLETED` are emitted and the stream ends.
/// The stream also ends when `shutdown` flips to `true`, when the max
/// duration elapses, or when the slot's sender is dropped.
pub fn phase_frames(
    mut source: watch::Receiver<Option<Progress>>,
    job_id: Option<JobId>,
    settings: StreamSettings,
    mut shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Option<Phase>> + Send + 'static {
    async_stream::stream! {
        let mut guard = StreamGuard::new(job_id);
        let deadline = settings.max_duration.map(|d| Instant::now() + d);
        let sequence: &'static [Phase] = Phase::SEQUENCE;
        let mut seen: Option<Progress> = None;
        let mut saw_empty = false;

        loop {
            if *shutdown.borrow() {
                guard.reason = "shutdown";
                break;
            }

            let current = *source.borrow_and_update();
            match current {
                None => {
                    saw_empty = true;
                    guard.frames += 1;
                    yield None;
                }
                Some(progress) => {
                    let owed: &'static [Phase] = match seen {
                        Some(prev) if prev.job_id != progress.job_id => {
                            // A new job only starts once the previous one
                            // published COMPLETED.
                            tracing::debug!(
                                followed = prev.job_id,
                                current = progress.job_id,
                                "Slot moved to a new job, finishing the followed one"
                            );
                            prev.phase.remaining()
                        }
                        Some(prev) => Phase::advance(Some(prev.phase), progress.phase),
                        None if saw_empty => &sequence[..=progress.phase.index()],
                        None => Phase::advance(None, progress.phase),
                    };
                    for &p in owed {
                        guard.frames += 1;
                        yield Some(p);
                    }
                    if owed.last().is_some_and(|p| p.is_terminal()) {
                        guard.reason = "completed";
                        break;
                    }
                    seen = Some(progress);
                }
            }

            tokio::select! {
                changed = source.changed() => {
                    if changed.is_err() {
                        guard.reason = "source closed";
                        break;
                    }
                }
                () = tokio::time::sleep(settings.poll_interval) => {}
                Ok(()) = shutdown.changed() => {}
                () = sleep_until(deadline) => {
                    tracing::warn!(
                        job_id = ?job_id,
                        frames = guard.frames,
                        "Event stream reached its maximum duration"
                    );
                    guard.reason = "max duration";
                    break;
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Logs how a stream ended. A stream dropped mid-way means the client went
/// away, since axum drops the body stream with the connection.
struct StreamGuard {
    job_id: Option<JobId>,
    opened: Instant,
    frames: u64,
    reason: &'static str,
}

impl StreamGuard {
    fn new(job_id: Option<JobId>) -> Self {
        tracing::debug!(job_id = ?job_id, "Event stream opened");
        Self {
            job_id,
            opened: Instant::now(),
            frames: 0,
            reason: "client disconnected",
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        tracing::debug!(
            job_id = ?self.job_id,
            frames = self.frames,
            reason = self.reason,
            elapsed_ms = self.opened.elapsed().as_millis() as u64,
            "Event stream closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobRunner, ProgressSlot};
    use pretty_assertions::assert_eq;
    use tokio_stream::StreamExt;

    const POLL: Duration = Duration::from_millis(200);
    const DELAY: Duration = Duration::from_millis(500);
    const SLACK: Duration = Duration::from_millis(5);

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + SLACK,
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn settings() -> StreamSettings {
        StreamSettings {
            poll_interval: POLL,
            max_duration: None,
        }
    }

    /// Collapse consecutive repeats so cadence re-emissions don't count.
    fn distinct(frames: &[Option<Phase>]) -> Vec<Option<Phase>> {
        let mut out: Vec<Option<Phase>> = Vec::new();
        for f in frames {
            if out.last() != Some(f) {
                out.push(*f);
            }
        }
        out
    }

    #[test]
    fn payload_is_label_or_empty() {
        assert_eq!(frame_payload(Some(Phase::UploadingDrivers)), "UPLOADING_DRIVERS");
        assert_eq!(frame_payload(None), "");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_slot_repeats_empty_frames_at_cadence() {
        let slot = ProgressSlot::new();
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        let start = Instant::now();
        for i in 0..5u32 {
            assert_eq!(stream.next().await, Some(None));
            assert_near(start.elapsed(), POLL * i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_upload_ends_with_completed() {
        let runner = JobRunner::new(DELAY, 4);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        runner.start_upload().unwrap();
        while runner.latest().observe().is_none() {
            tokio::task::yield_now().await;
        }

        let stream = phase_frames(runner.latest().subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        let start = Instant::now();
        let mut frames = Vec::new();
        let mut last_at = start;
        while let Some(frame) = stream.next().await {
            let now = Instant::now();
            assert!(now - last_at <= POLL + SLACK, "gap of {:?} before {frame:?}", now - last_at);
            last_at = now;
            frames.push(frame);
        }

        assert_eq!(frames.last(), Some(&Some(Phase::Completed)));
        assert_eq!(
            distinct(&frames),
            Phase::SEQUENCE.iter().copied().map(Some).collect::<Vec<_>>()
        );
        assert_near(start.elapsed(), DELAY * 7);
    }

    #[tokio::test]
    async fn skipped_phases_are_filled_in() {
        let slot = ProgressSlot::new();
        slot.publish(1, Phase::UploadingArea);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(Some(Phase::UploadingArea)));

        slot.publish(1, Phase::UploadingDepartment);
        slot.publish(1, Phase::UploadingDesignation);
        slot.publish(1, Phase::UploadingEmployee);

        assert_eq!(stream.next().await, Some(Some(Phase::UploadingDepartment)));
        assert_eq!(stream.next().await, Some(Some(Phase::UploadingDesignation)));
        assert_eq!(stream.next().await, Some(Some(Phase::UploadingEmployee)));
    }

    #[tokio::test]
    async fn reader_waiting_on_empty_slot_gets_whole_sequence() {
        let slot = ProgressSlot::new();
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(None));
        slot.publish(1, Phase::UploadingDepartment);

        assert_eq!(stream.next().await, Some(Some(Phase::UploadingArea)));
        assert_eq!(stream.next().await, Some(Some(Phase::UploadingDepartment)));
    }

    #[tokio::test]
    async fn new_job_in_slot_finishes_followed_sequence() {
        let slot = ProgressSlot::new();
        slot.publish(1, Phase::UploadingSchedule);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(Some(Phase::UploadingSchedule)));

        for phase in [Phase::UploadingDrivers, Phase::UploadingAssignCar, Phase::Completed] {
            slot.publish(1, phase);
        }
        slot.publish(2, Phase::UploadingArea);
        slot.publish(2, Phase::UploadingDepartment);

        let rest: Vec<_> = stream.collect().await;
        assert_eq!(
            rest,
            vec![
                Some(Phase::UploadingDrivers),
                Some(Phase::UploadingAssignCar),
                Some(Phase::Completed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_uploads_close_stream_at_first_completed() {
        let runner = JobRunner::new(DELAY, 4);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let first = runner.start_upload().unwrap();
        while runner.latest().observe().is_none() {
            tokio::task::yield_now().await;
        }

        let stream = phase_frames(runner.latest().subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);
        loop {
            match stream.next().await {
                Some(Some(Phase::UploadingAssignCar)) => break,
                Some(_) => {}
                None => panic!("stream ended before UPLOADING_ASSIGN_CAR"),
            }
        }

        // The reader stalls while job 1 completes and job 2 starts.
        first.wait().await.unwrap();
        let _second = runner.start_upload().unwrap();
        while runner.latest().observe() != Some(Phase::UploadingArea) {
            tokio::task::yield_now().await;
        }
        assert_eq!(runner.latest().progress().map(|p| p.job_id), Some(2));

        assert_eq!(stream.next().await, Some(Some(Phase::Completed)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn late_reader_starts_at_current_phase() {
        let slot = ProgressSlot::new();
        slot.publish(1, Phase::UploadingSchedule);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(Some(Phase::UploadingSchedule)));
    }

    #[tokio::test]
    async fn completed_slot_emits_once_and_closes() {
        let slot = ProgressSlot::new();
        slot.publish(1, Phase::Completed);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let frames: Vec<_> = phase_frames(slot.subscribe(), Some(1), settings(), shutdown)
            .collect()
            .await;

        assert_eq!(frames, vec![Some(Phase::Completed)]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_open_stream() {
        let slot = ProgressSlot::new();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(None));
        shutdown_tx.send(true).unwrap();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_ends_open_stream() {
        let slot = ProgressSlot::new();
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let settings = StreamSettings {
            poll_interval: POLL,
            max_duration: Some(Duration::from_millis(1000)),
        };

        let start = Instant::now();
        let frames: Vec<_> = phase_frames(slot.subscribe(), None, settings, shutdown)
            .collect()
            .await;

        assert!(frames.iter().all(Option::is_none));
        assert!(!frames.is_empty());
        assert!(start.elapsed() <= Duration::from_millis(1000) + SLACK);
    }

    #[tokio::test]
    async fn dropped_source_ends_stream() {
        let slot = ProgressSlot::new();
        slot.publish(1, Phase::UploadingArea);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(Some(Phase::UploadingArea)));
        drop(slot);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_does_not_end_stream() {
        let slot = ProgressSlot::new();
        let (shutdown_tx, shutdown) = watch::channel(false);
        drop(shutdown_tx);
        let stream = phase_frames(slot.subscribe(), None, settings(), shutdown);
        tokio::pin!(stream);

        for _ in 0..3 {
            assert_eq!(stream.next().await, Some(None));
        }
    }
}
