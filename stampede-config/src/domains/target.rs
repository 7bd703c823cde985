//! Target service configuration

use crate::error::ConfigResult;
use crate::validation::{validate_http_url, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base address of the service, e.g. `http://localhost:3000`
    #[serde(default = "default_host")]
    pub host: String,

    /// Credential pair shared by every virtual user
    #[serde(default)]
    pub credentials: Credentials,
}

/// Login credentials for virtual users
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            credentials: Credentials::default(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            email: "loadtest@example.com".to_string(),
            password: "loadtest-password".to_string(),
        }
    }
}

impl Validatable for TargetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_http_url(&self.host, "host", self.domain_name())?;
        validate_required_string(&self.credentials.email, "credentials.email", self.domain_name())?;
        validate_required_string(
            &self.credentials.password,
            "credentials.password",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "target"
    }
}

fn default_host() -> String {
    "http://localhost:3000".to_string()
}
