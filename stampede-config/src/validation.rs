//! Configuration validation traits and utilities

use crate::domains::duration::MAX_DURATION;
use crate::error::{ConfigError, ConfigResult};
use std::time::Duration;

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate that a duration setting stays within [`MAX_DURATION`]
pub fn validate_duration_limit(value: Duration, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value > MAX_DURATION {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} must be at most {} seconds, got {}",
                field_name,
                MAX_DURATION.as_secs(),
                value.as_secs()
            ),
        });
    }
    Ok(())
}

/// Validate an HTTP(S) base URL
pub fn validate_http_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(url, field_name, domain)?;

    let parsed = url::Url::parse(url).map_err(|e| ConfigError::DomainError {
        domain: domain.to_string(),
        message: format!("{} has invalid URL format: {}", field_name, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ConfigError::DomainError {
                domain: domain.to_string(),
                message: format!(
                    "{} scheme '{}' is not supported (only http/https)",
                    field_name, scheme
                ),
            })
        }
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must have a valid host", field_name),
        });
    }

    Ok(())
}

/// Validate a request path (must be absolute)
pub fn validate_path(path: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(path, field_name, domain)?;
    if !path.starts_with('/') {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must start with '/', got '{}'", field_name, path),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_string() {
        assert!(validate_required_string("value", "field", "test").is_ok());
        assert!(validate_required_string("", "field", "test").is_err());
        assert!(validate_required_string("   ", "field", "test").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u32, "count", "test").is_ok());
        assert!(validate_positive(0.5f64, "rate", "test").is_ok());
        assert!(validate_positive(0u32, "count", "test").is_err());
        assert!(validate_positive(-1.0f64, "rate", "test").is_err());
    }

    #[test]
    fn test_validate_duration_limit() {
        assert!(validate_duration_limit(Duration::ZERO, "run_time", "test").is_ok());
        assert!(validate_duration_limit(MAX_DURATION, "run_time", "test").is_ok());
        assert!(validate_duration_limit(Duration::MAX, "run_time", "test").is_err());
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("http://localhost:3000", "host", "test").is_ok());
        assert!(validate_http_url("https://api.example.com/v1", "host", "test").is_ok());
        assert!(validate_http_url("ftp://example.com", "host", "test").is_err());
        assert!(validate_http_url("not-a-url", "host", "test").is_err());
        assert!(validate_http_url("", "host", "test").is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/auth/login", "login_path", "test").is_ok());
        assert!(validate_path("auth/login", "login_path", "test").is_err());
    }
}
