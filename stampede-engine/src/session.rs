//! Per-worker authentication session

use serde::{Deserialize, Serialize};
use stampede_http::TransportRequest;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Active,
    AuthFailed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::AuthFailed => "auth_failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential and derived header owned by exactly one worker
#[derive(Clone)]
pub struct VirtualUserSession {
    credential: Option<String>,
    auth_header: Option<String>,
    state: SessionState,
}

impl VirtualUserSession {
    pub fn new() -> Self {
        Self {
            credential: None,
            auth_header: None,
            state: SessionState::Unauthenticated,
        }
    }

    /// Start from a credential obtained earlier; authentication will reuse it
    pub fn with_credential(token: impl Into<String>) -> Self {
        Self {
            credential: Some(token.into()),
            ..Self::new()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Value for the `Authorization` header, empty until a credential is held
    pub fn auth_header(&self) -> Option<&str> {
        self.auth_header.as_deref()
    }

    pub(crate) fn begin(&mut self) {
        self.state = SessionState::Authenticating;
    }

    pub(crate) fn activate(&mut self, token: String) {
        self.auth_header = Some(format!("Bearer {}", token));
        self.credential = Some(token);
        self.state = SessionState::Active;
    }

    pub(crate) fn fail(&mut self) {
        self.credential = None;
        self.auth_header = None;
        self.state = SessionState::AuthFailed;
    }

    /// Attach the authorization header when one is held
    pub fn authorize(&self, request: TransportRequest) -> TransportRequest {
        match &self.auth_header {
            Some(header) => request.with_header("Authorization", header.clone()),
            None => request,
        }
    }
}

impl Default for VirtualUserSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VirtualUserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualUserSession")
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state)
            .finish()
    }
}
