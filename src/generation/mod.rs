//! Generation task lifecycle: data model, polling, progress and the service
//! that ties adapters, gating and the credit ledger together.

pub mod awaiter;
pub mod progress;
pub mod service;
pub mod task;

pub use awaiter::{cancel_quietly, PollPolicy, TaskAwaiter, TaskBackend};
pub use progress::{ProgressCurve, ProgressPhase, StoppedIn};
pub use service::{Caller, GenerationService, ImageResult, SubmittedTask};
pub use task::{Feature, GenerationTask, TaskHandle, TaskKind, TaskStatus};
