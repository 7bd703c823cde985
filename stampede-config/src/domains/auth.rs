//! Virtual-user authentication configuration

use crate::error::ConfigResult;
use crate::validation::{
    validate_duration_limit, validate_path, validate_positive, validate_required_string,
    Validatable,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Login behaviour for virtual users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Login endpoint
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// JSON field carrying the access token in a successful login response
    #[serde(default = "default_token_field")]
    pub token_field: String,

    /// Total login attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound of the random delay before a user's first login
    #[serde(
        with = "crate::domains::duration::millis",
        default = "default_start_jitter"
    )]
    pub start_jitter_ms: Duration,

    /// Wait used when a rate-limited response carries no usable retry hint
    #[serde(
        with = "crate::domains::duration::seconds",
        default = "default_retry_after"
    )]
    pub default_retry_after: Duration,

    /// Pause after a successful login before the first action
    #[serde(
        with = "crate::domains::duration::millis",
        default = "default_warmup"
    )]
    pub warmup_ms: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            token_field: default_token_field(),
            max_attempts: default_max_attempts(),
            start_jitter_ms: default_start_jitter(),
            default_retry_after: default_retry_after(),
            warmup_ms: default_warmup(),
        }
    }
}

impl Validatable for AuthConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_path(&self.login_path, "login_path", self.domain_name())?;
        validate_required_string(&self.token_field, "token_field", self.domain_name())?;
        validate_positive(self.max_attempts, "max_attempts", self.domain_name())?;
        validate_duration_limit(self.start_jitter_ms, "start_jitter_ms", self.domain_name())?;
        validate_duration_limit(self.default_retry_after, "default_retry_after", self.domain_name())?;
        validate_duration_limit(self.warmup_ms, "warmup_ms", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "auth"
    }
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_token_field() -> String {
    "accessToken".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_start_jitter() -> Duration {
    Duration::from_secs(2)
}

fn default_retry_after() -> Duration {
    Duration::from_secs(1)
}

fn default_warmup() -> Duration {
    Duration::from_millis(500)
}
