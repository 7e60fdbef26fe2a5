use thiserror::Error;

use crate::scheduler::{ThreadPoolError, TimerError};
use crate::telemetry::LogError;

/// Errors surfaced by the safe-call coordinator.
///
/// A call rejected because its identifier is busy is not an error; see
/// [`StartOutcome`](super::StartOutcome) and [`CallOutcome`](super::CallOutcome).
#[derive(Error, Debug)]
pub enum SafeCallError {
    #[error("Safe-call coordinator is shutting down")]
    ShuttingDown,

    #[error("Worker pool rejected safe-call: {0}")]
    Submit(#[from] ThreadPoolError),

    #[error("Watchdog timer unavailable: {0}")]
    Timer(#[from] TimerError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LogError),
}
