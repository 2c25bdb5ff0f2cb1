//! Error taxonomy shared by rooms, engines and matchmaking

use serde::Serialize;

/// Rejection class sent back to the client alongside a reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    Conflict,
    State,
    Internal,
}

/// Core error. Every variant except `Internal` is recoverable by retrying
/// with a corrected action; the state it was raised against is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Malformed or out-of-turn action
    #[error("validation failed: {0}")]
    Validation(&'static str),

    /// Conflicts with existing state (already queued, room full, ...)
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// Action against a terminal or missing room/engine
    #[error("invalid state: {0}")]
    State(&'static str),

    /// Unexpected engine failure
    #[error("internal fault: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::Validation(_) => ErrorClass::Validation,
            CoreError::Conflict(_) => ErrorClass::Conflict,
            CoreError::State(_) => ErrorClass::State,
            CoreError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Stable snake_case reason code
    pub fn reason(&self) -> &str {
        match self {
            CoreError::Validation(r) | CoreError::Conflict(r) | CoreError::State(r) => r,
            CoreError::Internal(_) => "internal_error",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(CoreError::Conflict("already_queued").reason(), "already_queued");
        assert_eq!(CoreError::Internal("boom".into()).reason(), "internal_error");
        assert_eq!(CoreError::State("room_ended").class(), ErrorClass::State);
    }
}
