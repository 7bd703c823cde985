//! Cross-worker metrics aggregation
//!
//! Counters live in a single map behind one mutex; every increment is one
//! short critical section and [`MetricsAggregator::snapshot`] holds the lock
//! only for the copy. Per-action latency histograms sit behind a second
//! lock so percentile bookkeeping never extends counter critical sections.

use crate::action::ActionSpec;
use crate::auth::AuthReport;
use crate::resource::ResourceKind;
use crate::session::SessionState;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::warn;

/// Responses faster than this are counted as cache hits
pub const CACHE_HIT_THRESHOLD: Duration = Duration::from_millis(50);

/// Counter names
pub mod counters {
    pub const REQUESTS: &str = "requests";
    pub const CACHE_HITS: &str = "cache.hits";
    pub const CACHE_MISSES: &str = "cache.misses";
    pub const AUTH_ACTIVE: &str = "auth.active";
    pub const AUTH_FAILED: &str = "auth.failed";
    pub const AUTH_RATE_LIMITED: &str = "auth.rate_limited";
    pub const AUTH_REUSED: &str = "auth.reused";
    pub const PARSE_FAILURES: &str = "parse.failures";

    pub fn action(name: &str, outcome: &str) -> String {
        format!("action.{}.{}", name, outcome)
    }

    pub fn resource_created(kind: &str) -> String {
        format!("resource.{}.created", kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeClass {
    Success,
    ExpectedFailure,
    UnexpectedFailure,
}

impl OutcomeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::ExpectedFailure => "expected_failure",
            OutcomeClass::UnexpectedFailure => "unexpected_failure",
        }
    }

    /// Classify a received status
    ///
    /// 2xx is a success. Rate limiting, authorization failures of a worker
    /// that holds no valid session, and statuses the action lists as
    /// expected are expected failures. Everything else is unexpected.
    pub fn from_status(status: u16, expected: &[u16], session: SessionState) -> Self {
        if (200..300).contains(&status) {
            return OutcomeClass::Success;
        }
        let unauthorized = matches!(status, 401 | 403) && session != SessionState::Active;
        if status == 429 || unauthorized || expected.contains(&status) {
            OutcomeClass::ExpectedFailure
        } else {
            OutcomeClass::UnexpectedFailure
        }
    }
}

/// Result of one request made on behalf of an action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action_name: String,
    /// `METHOD /route`, without ids or query
    pub request: String,
    /// `None` when the transport failed before a status was received
    pub status: Option<u16>,
    pub latency: Duration,
    pub classification: OutcomeClass,
    /// A success body could not be decoded
    pub parse_failed: bool,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.classification == OutcomeClass::Success
    }

    /// Latency heuristic: a fast successful response was probably served from cache
    pub fn is_cache_hit(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s)) && self.latency < CACHE_HIT_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage in `[0, 100]`
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(hits: u64, misses: u64) -> Self {
        Self {
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
        }
    }
}

/// `hits / (hits + misses)` as a percentage, 0 when nothing was sampled
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        let ms = |micros: u64| micros as f64 / 1000.0;
        Self {
            count: hist.len(),
            min_ms: ms(hist.min()),
            mean_ms: hist.mean() / 1000.0,
            p50_ms: ms(hist.value_at_quantile(0.50)),
            p95_ms: ms(hist.value_at_quantile(0.95)),
            p99_ms: ms(hist.value_at_quantile(0.99)),
            max_ms: ms(hist.max()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn cache(&self) -> CacheStats {
        CacheStats::new(self.get(counters::CACHE_HITS), self.get(counters::CACHE_MISSES))
    }
}

/// Shared by every worker of a run
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    counters: Mutex<BTreeMap<String, u64>>,
    latencies: Mutex<HashMap<String, Histogram<u64>>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the counters
    pub fn classify(&self, action: &ActionSpec, outcome: &ActionOutcome) {
        {
            let mut values = self.counters.lock();
            bump(&mut values, counters::REQUESTS, 1);
            bump(
                &mut values,
                &counters::action(&outcome.action_name, outcome.classification.as_str()),
                1,
            );
            if action.cache_probe {
                let key = if outcome.is_cache_hit() {
                    counters::CACHE_HITS
                } else {
                    counters::CACHE_MISSES
                };
                bump(&mut values, key, 1);
            }
            if outcome.parse_failed {
                bump(&mut values, counters::PARSE_FAILURES, 1);
            }
        }

        if outcome.status.is_some() {
            self.record_latency(&outcome.action_name, outcome.latency);
        }
    }

    pub fn record_skip(&self, action: &ActionSpec) {
        self.increment(&counters::action(&action.name, "skipped"), 1);
    }

    pub fn record_auth(&self, report: &AuthReport) {
        let mut values = self.counters.lock();
        let state_key = match report.state {
            SessionState::Active => counters::AUTH_ACTIVE,
            _ => counters::AUTH_FAILED,
        };
        bump(&mut values, state_key, 1);
        if report.reused {
            bump(&mut values, counters::AUTH_REUSED, 1);
        }
        bump(&mut values, counters::AUTH_RATE_LIMITED, report.rate_limited as u64);
        bump(&mut values, counters::PARSE_FAILURES, report.malformed_responses as u64);
    }

    pub fn record_created(&self, kind: ResourceKind) {
        self.increment(&counters::resource_created(kind.as_str()), 1);
    }

    pub fn increment(&self, name: &str, by: u64) {
        bump(&mut self.counters.lock(), name, by);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.lock().clone(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let values = self.counters.lock();
        let read = |key: &str| values.get(key).copied().unwrap_or(0);
        CacheStats::new(read(counters::CACHE_HITS), read(counters::CACHE_MISSES))
    }

    pub fn latency_stats(&self, action_name: &str) -> Option<LatencyStats> {
        self.latencies
            .lock()
            .get(action_name)
            .filter(|hist| !hist.is_empty())
            .map(LatencyStats::from_histogram)
    }

    pub fn latency_snapshot(&self) -> BTreeMap<String, LatencyStats> {
        self.latencies
            .lock()
            .iter()
            .filter(|(_, hist)| !hist.is_empty())
            .map(|(name, hist)| (name.clone(), LatencyStats::from_histogram(hist)))
            .collect()
    }

    /// Clear everything; called at run start
    pub fn reset(&self) {
        self.counters.lock().clear();
        self.latencies.lock().clear();
    }

    fn record_latency(&self, action_name: &str, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        let mut latencies = self.latencies.lock();
        if !latencies.contains_key(action_name) {
            match Histogram::<u64>::new(3) {
                Ok(hist) => {
                    latencies.insert(action_name.to_string(), hist);
                }
                Err(e) => {
                    warn!(action = action_name, error = %e, "Failed to create latency histogram");
                    return;
                }
            }
        }
        if let Some(hist) = latencies.get_mut(action_name) {
            if let Err(e) = hist.record(micros) {
                warn!(action = action_name, micros, error = %e, "Dropped latency sample");
            }
        }
    }
}

fn bump(values: &mut BTreeMap<String, u64>, name: &str, by: u64) {
    if by == 0 {
        return;
    }
    match values.get_mut(name) {
        Some(value) => *value += by,
        None => {
            values.insert(name.to_string(), by);
        }
    }
}
