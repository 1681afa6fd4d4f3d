use thiserror::Error;

/// Fatal conditions the runtime can detect at its own boundaries.
///
/// These are programming errors, not expected runtime conditions: a caller
/// hitting one of these has misused the API (parked two waiters on a
/// single-task waker) or the runtime itself has a bug. Nothing in this enum
/// is meant to be recovered from gracefully by ordinary task code.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("single-task waker already has a waiter registered")]
    WakerAlreadyOccupied,

    #[error("coroutine frame polled with no executor reference installed")]
    MissingExecutorReference,
}
