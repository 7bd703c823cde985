//! Scripted in-memory transport
//!
//! Replies are looked up by method and route. Queued replies are consumed
//! first, after which a route's sticky reply repeats. Unmatched requests get
//! the fallback reply, which defaults to a 404 with an empty body. Every
//! request is recorded with the (tokio) instant it arrived so tests running
//! on a paused clock can assert on spacing.

use crate::client::Transport;
use crate::errors::TransportError;
use crate::types::{HttpMethod, TransportRequest, TransportResponse};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::debug;

/// Canned outcome for a scripted route
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(TransportResponse),
    /// Transport-level failure carrying this message
    Fail(String),
}

impl From<TransportResponse> for ScriptedReply {
    fn from(response: TransportResponse) -> Self {
        ScriptedReply::Respond(response)
    }
}

/// A request observed by the scripted transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<JsonValue>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct Route {
    method: HttpMethod,
    pattern: String,
    queued: VecDeque<ScriptedReply>,
    sticky: Option<ScriptedReply>,
}

impl Route {
    /// `pattern` ending in `*` matches by prefix, otherwise the query-less
    /// path must match exactly.
    fn matches(&self, method: HttpMethod, route: &str) -> bool {
        if self.method != method {
            return false;
        }
        match self.pattern.strip_suffix('*') {
            Some(prefix) => route.starts_with(prefix),
            None => route == self.pattern,
        }
    }

    fn specificity(&self) -> usize {
        // Exact routes beat any prefix route
        if self.pattern.ends_with('*') {
            self.pattern.len()
        } else {
            usize::MAX
        }
    }
}

#[derive(Debug)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    fallback: Mutex<ScriptedReply>,
    log: Mutex<Vec<RecordedRequest>>,
    simulate_latency: bool,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            fallback: Mutex::new(ScriptedReply::Respond(TransportResponse::empty(404))),
            log: Mutex::new(Vec::new()),
            simulate_latency: false,
        }
    }

    /// Sleep for each reply's latency before returning it
    pub fn with_simulated_latency(mut self) -> Self {
        self.simulate_latency = true;
        self
    }

    /// Reply to every matching request with `reply` once queued replies run out
    pub fn on(&self, method: HttpMethod, pattern: &str, reply: impl Into<ScriptedReply>) -> &Self {
        let mut routes = self.routes.lock();
        let reply = reply.into();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.sticky = Some(reply),
            None => routes.push(Route {
                method,
                pattern: pattern.to_string(),
                queued: VecDeque::new(),
                sticky: Some(reply),
            }),
        }
        self
    }

    /// Queue a one-shot reply for the next matching request
    pub fn enqueue(&self, method: HttpMethod, pattern: &str, reply: impl Into<ScriptedReply>) -> &Self {
        let mut routes = self.routes.lock();
        let reply = reply.into();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.queued.push_back(reply),
            None => routes.push(Route {
                method,
                pattern: pattern.to_string(),
                queued: VecDeque::from([reply]),
                sticky: None,
            }),
        }
        self
    }

    /// Reply used when no route matches
    pub fn fallback(&self, reply: impl Into<ScriptedReply>) -> &Self {
        *self.fallback.lock() = reply.into();
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Requests whose query-less path equals `route`
    pub fn requests_to(&self, method: HttpMethod, route: &str) -> Vec<RecordedRequest> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path.split('?').next() == Some(route))
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.log.lock().clear();
    }

    fn next_reply(&self, method: HttpMethod, route: &str) -> ScriptedReply {
        let mut routes = self.routes.lock();
        let best = routes
            .iter_mut()
            .filter(|r| r.matches(method, route))
            .filter(|r| !r.queued.is_empty() || r.sticky.is_some())
            .max_by_key(|r| r.specificity());

        match best {
            Some(route) => match route.queued.pop_front() {
                Some(reply) => reply,
                None => route
                    .sticky
                    .clone()
                    .unwrap_or_else(|| self.fallback.lock().clone()),
            },
            None => self.fallback.lock().clone(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let route = request.route().to_string();
        self.log.lock().push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        });

        let reply = self.next_reply(request.method, &route);
        debug!(method = %request.method, path = %request.path, "Scripted reply");

        match reply {
            ScriptedReply::Respond(response) => {
                if self.simulate_latency && !response.latency.is_zero() {
                    tokio::time::sleep(response.latency).await;
                }
                Ok(response)
            }
            ScriptedReply::Fail(message) => Err(TransportError::Scripted(message)),
        }
    }
}
