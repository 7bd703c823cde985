//! Errors raised while loading run configuration

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("malformed configuration YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `STAMPEDE_*` override that could not be parsed
    #[error("bad environment override: {0}")]
    EnvError(String),

    /// A value rejected by its domain's `Validatable` impl
    #[error("invalid {domain} configuration: {message}")]
    DomainError { domain: String, message: String },
}
