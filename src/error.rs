//! Store error taxonomy.
//!
//! Every failure here is local and recoverable: the caller surfaces a failed
//! authentication round, never a crash.  An oversized token is not an error
//! at all — the key codec falls back to a content hash and logs a warning.

/// Errors returned by the session-state store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    /// Creation refused: the ceiling of live tracked sessions was reached.
    /// Surface an application-level rejection; the store never retries.
    #[error("at maximum ongoing session limit ({max_sessions})")]
    CapacityExceeded { max_sessions: u32 },

    /// A colliding key was already present in the lookup index.  Practically
    /// unreachable with random keys, but failing safely beats silently
    /// overwriting another conversation's data.
    #[error("insertion into state index failed: key collision")]
    InsertConflict,

    /// The entry for this token is already checked out by an in-flight
    /// request — a replayed token or a race.  The restore is refused and the
    /// request proceeds as if it had no prior state.
    #[error("state entry already thawed by request {by}")]
    DuplicateRestore { by: u64 },
}

pub type Result<T> = std::result::Result<T, StateError>;
