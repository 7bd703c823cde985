//! Backoff-aware authenticator
//!
//! Turns a [`VirtualUserSession`] into an ACTIVE or AUTH_FAILED one. A
//! rate-limited login waits for the server-advised interval before the next
//! attempt; any other rejection ends authentication immediately. The
//! authenticator touches no shared state: what happened is returned as an
//! [`AuthReport`] for the caller to record.

use crate::api::{parse_retry_after, parse_token, RetryAdvice};
use crate::session::{SessionState, VirtualUserSession};
use serde_json::json;
use stampede_config::{AuthConfig, Credentials};
use stampede_http::{Transport, TransportRequest};
use stampede_resilience::{RetryExecutor, RetryPolicy, Retryable};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// What one authentication pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReport {
    pub state: SessionState,
    pub attempts: u32,
    pub rate_limited: u32,
    /// 429 bodies whose retry interval could not be read
    pub malformed_responses: u32,
    pub responses: u32,
    pub transport_failures: u32,
    /// An existing credential was used without a login request
    pub reused: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
enum AttemptError {
    #[error("rate limited, retrying after {0:?}")]
    RateLimited(Duration),

    #[error("login rejected with status {0}")]
    Rejected(u16),

    #[error("login response unusable: {0}")]
    BadResponse(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::RateLimited(_))
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self {
            AttemptError::RateLimited(delay) => Some(*delay),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct AttemptCounters {
    attempts: AtomicU32,
    rate_limited: AtomicU32,
    malformed: AtomicU32,
    responses: AtomicU32,
    transport_failures: AtomicU32,
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: Credentials,
    login_path: String,
    token_field: String,
    max_attempts: u32,
    default_retry_after: Duration,
}

impl Authenticator {
    pub fn new(config: &AuthConfig, credentials: Credentials) -> Self {
        Self {
            credentials,
            login_path: config.login_path.clone(),
            token_field: config.token_field.clone(),
            max_attempts: config.max_attempts.max(1),
            default_retry_after: config.default_retry_after,
        }
    }

    pub async fn authenticate(
        &self,
        transport: &dyn Transport,
        session: &mut VirtualUserSession,
    ) -> AuthReport {
        if let Some(token) = session.credential().map(str::to_string) {
            debug!("Reusing existing credential");
            session.activate(token);
            return AuthReport {
                state: session.state(),
                attempts: 0,
                rate_limited: 0,
                malformed_responses: 0,
                responses: 0,
                transport_failures: 0,
                reused: true,
            };
        }

        session.begin();

        // Fallback interval for the fixed policy; server advice wins when present
        let executor = RetryExecutor::new(RetryPolicy::fixed(
            self.max_attempts,
            self.default_retry_after,
        ));
        let counters = AttemptCounters::default();
        let counters_ref = &counters;

        let result = executor
            .execute_with_context(move |attempt| async move {
                self.attempt(transport, counters_ref, attempt).await
            })
            .await;

        match result {
            Ok(token) => session.activate(token),
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                session.fail();
            }
        }

        AuthReport {
            state: session.state(),
            attempts: counters.attempts.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            malformed_responses: counters.malformed.load(Ordering::Relaxed),
            responses: counters.responses.load(Ordering::Relaxed),
            transport_failures: counters.transport_failures.load(Ordering::Relaxed),
            reused: false,
        }
    }

    async fn attempt(
        &self,
        transport: &dyn Transport,
        counters: &AttemptCounters,
        attempt: u32,
    ) -> Result<String, AttemptError> {
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        debug!(attempt, path = %self.login_path, "Login attempt");

        let request = TransportRequest::post(
            self.login_path.clone(),
            json!({
                "email": self.credentials.email,
                "password": self.credentials.password,
            }),
        );

        let response = match transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                counters.transport_failures.fetch_add(1, Ordering::Relaxed);
                return Err(AttemptError::Transport(e.to_string()));
            }
        };
        counters.responses.fetch_add(1, Ordering::Relaxed);

        match response.status {
            200 => parse_token(&response.body, &self.token_field)
                .map_err(|e| AttemptError::BadResponse(e.to_string())),
            429 => {
                counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                let delay = match parse_retry_after(&response) {
                    RetryAdvice::After(delay) => delay,
                    RetryAdvice::Missing => self.default_retry_after,
                    RetryAdvice::Malformed => {
                        counters.malformed.fetch_add(1, Ordering::Relaxed);
                        self.default_retry_after
                    }
                };
                Err(AttemptError::RateLimited(delay))
            }
            status => Err(AttemptError::Rejected(status)),
        }
    }
}
