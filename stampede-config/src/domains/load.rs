//! Load shape configuration

use crate::error::ConfigResult;
use crate::validation::{
    validate_duration_limit, validate_positive, validate_required_string, Validatable,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slowest accepted ramp-up: one user every thousand seconds
pub const MIN_SPAWN_RATE: f64 = 0.001;

/// How many virtual users to run, how fast to spawn them and for how long
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of concurrent virtual users
    #[serde(default = "default_users")]
    pub users: usize,

    /// Users spawned per second during ramp-up
    #[serde(default = "default_spawn_rate")]
    pub spawn_rate: f64,

    /// Total run duration
    #[serde(
        with = "crate::domains::duration::seconds",
        default = "default_run_time"
    )]
    pub run_time: Duration,

    /// Scenario profile name
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Optional YAML file with additional scenario profiles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles_file: Option<String>,

    /// Grace period for in-flight actions after the stop signal
    #[serde(
        with = "crate::domains::duration::seconds",
        default = "default_stop_timeout"
    )]
    pub stop_timeout: Duration,

    /// Base seed for per-user random number generators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            spawn_rate: default_spawn_rate(),
            run_time: default_run_time(),
            profile: default_profile(),
            profiles_file: None,
            stop_timeout: default_stop_timeout(),
            seed: None,
        }
    }
}

impl Validatable for LoadConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.users, "users", self.domain_name())?;
        validate_positive(self.spawn_rate, "spawn_rate", self.domain_name())?;
        if !self.spawn_rate.is_finite() {
            return Err(self.validation_error("spawn_rate must be finite"));
        }
        if self.spawn_rate < MIN_SPAWN_RATE {
            return Err(self.validation_error(format!(
                "spawn_rate must be at least {}, got {}",
                MIN_SPAWN_RATE, self.spawn_rate
            )));
        }
        validate_positive(self.run_time.as_secs(), "run_time", self.domain_name())?;
        validate_duration_limit(self.run_time, "run_time", self.domain_name())?;
        validate_duration_limit(self.stop_timeout, "stop_timeout", self.domain_name())?;
        validate_required_string(&self.profile, "profile", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "load"
    }
}

fn default_users() -> usize {
    10
}

fn default_spawn_rate() -> f64 {
    1.0
}

fn default_run_time() -> Duration {
    Duration::from_secs(60)
}

fn default_profile() -> String {
    "cache-focus".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}
