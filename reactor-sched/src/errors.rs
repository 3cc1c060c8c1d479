///
/// Scheduler error types.
///
/// Covers platform-primitive construction failures, the scheduler's own
/// invariant violations, and configuration errors. Timeouts are not an
/// error variant here — a timed wait returning late is a normal signal
/// the caller interprets, not a failure (see `WaitOutcome`).
///

use thiserror::Error;

use crate::reaction::ReactionStatus;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to initialize platform primitive: {reason}")]
    PlatformInit { reason: String },

    #[error(
        "invariant violation: reaction {reaction_id} expected status {expected:?}, found {actual:?}"
    )]
    InvariantViolation {
        reaction_id: u64,
        expected: ReactionStatus,
        actual: ReactionStatus,
    },

    #[error("level {level} exceeds configured max level {max_level}")]
    CapacityExceeded { level: usize, max_level: usize },

    #[error("platform primitive failed to shut down cleanly: {reason}")]
    ShutdownFailed { reason: String },
}
