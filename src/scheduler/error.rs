//! Scheduler error types

use crate::runtime::ManagerId;
use std::fmt;

/// Scheduler result type
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors raised while building tasks or configuring managers
///
/// Panics inside task callbacks are not represented here: they propagate
/// out of the tick that ran them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// A must-finish task declared neither a frame nor a second duration,
    /// so its retirement condition could never be met
    MustFinishWithoutDuration { name: String },
    /// No background thread pool could be created
    DispatcherUnavailable(String),
    /// No manager is registered under this handle
    UnknownManager(ManagerId),
    /// Configuration could not be parsed or failed validation
    InvalidConfig(String),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::MustFinishWithoutDuration { name } => {
                write!(f, "must-finish task '{}' declares no duration", name)
            }
            SchedError::DispatcherUnavailable(msg) => write!(f, "dispatcher unavailable: {}", msg),
            SchedError::UnknownManager(id) => write!(f, "unknown task manager: {}", id),
            SchedError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for SchedError {}

impl From<serde_json::Error> for SchedError {
    fn from(e: serde_json::Error) -> Self {
        SchedError::InvalidConfig(e.to_string())
    }
}
