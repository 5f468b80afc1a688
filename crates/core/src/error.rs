//! Contract errors.
//!
//! These indicate caller bugs (operating on a session that does not exist,
//! dispatching an unknown function name) and are never converted into
//! user-facing apology text by the layers above.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),
}
