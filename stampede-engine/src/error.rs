//! Error types for the load engine
//!
//! Only fatal configuration faults surface as [`EngineError`]. Per-action
//! failures are absorbed into metrics as outcomes and never reach here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid scenario profile '{profile}': {message}")]
    InvalidProfile { profile: String, message: String },

    #[error("Unknown scenario profile: {0}")]
    UnknownProfile(String),

    #[error("Failed to parse profile definitions: {0}")]
    ProfileParse(#[from] serde_yaml::Error),

    #[error("Failed to read profile definitions: {0}")]
    ProfileIo(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] stampede_config::ConfigError),

    #[error("Target unreachable: no worker received a response ({0})")]
    TargetUnreachable(String),

    #[error("Worker {worker} failed: {message}")]
    WorkerFailed { worker: usize, message: String },
}

impl EngineError {
    pub(crate) fn invalid_profile(profile: &str, message: impl Into<String>) -> Self {
        Self::InvalidProfile {
            profile: profile.to_string(),
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
