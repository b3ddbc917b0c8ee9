//! Cosmetic progress bar projection.
//!
//! Pure functions of phase and elapsed time. The poll loop never reads these
//! values back.

use std::time::Duration;

use crate::generation::task::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Prompt authoring before the task is submitted.
    Authoring,
    Starting,
    Processing,
    Completed,
    /// Failed, canceled or timed out. Holds the phase the task stopped in.
    Stopped(StoppedIn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppedIn {
    Authoring,
    Starting,
    Processing,
}

impl ProgressPhase {
    pub fn from_status(status: TaskStatus, previous: ProgressPhase) -> Self {
        match status {
            TaskStatus::Starting => ProgressPhase::Starting,
            TaskStatus::Processing => ProgressPhase::Processing,
            TaskStatus::Completed => ProgressPhase::Completed,
            TaskStatus::Failed | TaskStatus::Canceled => previous.stop(),
        }
    }

    pub fn stop(self) -> Self {
        match self {
            ProgressPhase::Authoring => ProgressPhase::Stopped(StoppedIn::Authoring),
            ProgressPhase::Starting => ProgressPhase::Stopped(StoppedIn::Starting),
            ProgressPhase::Processing => ProgressPhase::Stopped(StoppedIn::Processing),
            other => other,
        }
    }
}

/// Checkpoints and the time each phase is expected to take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressCurve {
    pub authoring_estimate: Duration,
    pub starting_estimate: Duration,
    pub processing_estimate: Duration,
}

const AUTHORING: (f32, f32) = (0.0, 25.0);
const STARTING: (f32, f32) = (25.0, 35.0);
const PROCESSING: (f32, f32) = (35.0, 92.0);

impl Default for ProgressCurve {
    fn default() -> Self {
        Self {
            authoring_estimate: Duration::from_secs(8),
            starting_estimate: Duration::from_secs(45),
            processing_estimate: Duration::from_secs(120),
        }
    }
}

impl ProgressCurve {
    /// Percentage in `0.0..=100.0` for a task that has spent `elapsed` in `phase`.
    pub fn project(&self, phase: ProgressPhase, elapsed: Duration) -> f32 {
        match phase {
            ProgressPhase::Authoring => interpolate(AUTHORING, elapsed, self.authoring_estimate),
            ProgressPhase::Starting => interpolate(STARTING, elapsed, self.starting_estimate),
            ProgressPhase::Processing => interpolate(PROCESSING, elapsed, self.processing_estimate),
            ProgressPhase::Completed => 100.0,
            ProgressPhase::Stopped(StoppedIn::Authoring) => AUTHORING.0,
            ProgressPhase::Stopped(StoppedIn::Starting) => STARTING.0,
            ProgressPhase::Stopped(StoppedIn::Processing) => PROCESSING.0,
        }
    }
}

fn interpolate((floor, ceiling): (f32, f32), elapsed: Duration, estimate: Duration) -> f32 {
    if estimate.is_zero() {
        return ceiling;
    }
    let fraction = (elapsed.as_secs_f32() / estimate.as_secs_f32()).clamp(0.0, 1.0);
    floor + (ceiling - floor) * fraction
}
