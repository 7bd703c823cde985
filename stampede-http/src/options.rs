//! Settings for the connection pool a run shares

use stampede_config::HttpConfig;
use std::time::Duration;

/// Client settings applied once per run; every virtual user goes through the
/// same pool
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Accept self-signed certificates, e.g. on staging targets
    pub accept_invalid_certs: bool,
    pub max_idle_per_host: usize,
}

impl TransportOptions {
    /// Never keep fewer idle connections than there are virtual users
    pub fn sized_for(mut self, users: usize) -> Self {
        self.max_idle_per_host = self.max_idle_per_host.max(users);
        self
    }

    pub(crate) fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .build()
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for TransportOptions {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
            user_agent: config.user_agent.clone(),
            accept_invalid_certs: !config.verify_ssl,
            max_idle_per_host: config.max_idle_per_host,
        }
    }
}
