//! Command-level error kinds
//!
//! The teacher crate carries `thiserror` in its dependency table but never
//! actually used it (errors were ad hoc `io::Error`/`String`). The hash
//! command surface has real structured failure modes, so this is where
//! that dependency earns its keep.

use thiserror::Error;

use crate::protocol::Response;

/// Errors a hash command can fail with before any state change.
///
/// `NotFound` and `ConditionNotMet` exist here because the storage layer's
/// `GetRes`/`SetExRes`/`ApplyRes` enums carry them as per-field outcomes,
/// not because a command ever returns them as a top-level `Err` -- per
/// spec they're reply codes, not command failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HfeError {
    #[error("WRONGTYPE key holds the wrong kind of value")]
    WrongType,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("invalid expire time, must be >= 0 and not overflow")]
    ExpireTimeOverflow,

    #[error("no such field")]
    NotFound,

    #[error("condition not met")]
    ConditionNotMet,

    #[error("command not allowed, insufficient memory")]
    OutOfMemory,
}

impl From<crate::storage::KeyError> for HfeError {
    fn from(err: crate::storage::KeyError) -> Self {
        match err {
            crate::storage::KeyError::WrongType => HfeError::WrongType,
            crate::storage::KeyError::ExpireTimeOverflow => HfeError::ExpireTimeOverflow,
        }
    }
}

impl From<HfeError> for Response {
    fn from(err: HfeError) -> Self {
        Response::Error(err.to_string())
    }
}
