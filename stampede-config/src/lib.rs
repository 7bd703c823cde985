//! Domain-driven configuration for stampede runs
//!
//! Configuration is split by functional domain (target, load shape,
//! authentication, HTTP client, logging), loaded from YAML, overridden from
//! `STAMPEDE_*` environment variables and validated once before a run starts.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    auth::AuthConfig,
    http::HttpConfig,
    load::LoadConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    target::{Credentials, TargetConfig},
    StampedeConfig,
};

// Upper bound shared by every duration setting
pub use domains::duration::MAX_DURATION;
