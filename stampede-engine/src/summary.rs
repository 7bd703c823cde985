//! End-of-run report

use crate::metrics::{counters, CacheStats, LatencyStats, MetricsAggregator};
use crate::plan::ExecutionMode;
use crate::profile::ScenarioProfile;
use crate::resource::ResourceTracker;
use crate::session::SessionState;
use crate::worker::WorkerReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTally {
    pub spawned: usize,
    pub authenticated: usize,
    pub auth_failed: usize,
    /// Still busy when the stop timeout elapsed
    pub aborted: usize,
}

impl WorkerTally {
    pub fn from_reports(reports: &[WorkerReport], spawned: usize, aborted: usize) -> Self {
        let count = |state: SessionState| reports.iter().filter(|r| r.session_state == state).count();
        Self {
            spawned,
            authenticated: count(SessionState::Active),
            auth_failed: count(SessionState::AuthFailed),
            aborted,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub success: u64,
    pub expected_failure: u64,
    pub unexpected_failure: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyStats>,
}

impl ActionSummary {
    pub fn requests(&self) -> u64 {
        self.success + self.expected_failure + self.unexpected_failure
    }
}

/// Read-only snapshot of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub profile: String,
    pub mode: ExecutionMode,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub workers: WorkerTally,
    pub requests: u64,
    pub cache: CacheStats,
    pub created_resources: BTreeMap<String, usize>,
    pub actions: BTreeMap<String, ActionSummary>,
    pub counters: BTreeMap<String, u64>,
}

impl RunSummary {
    pub fn build(
        profile: &ScenarioProfile,
        started_at: DateTime<Utc>,
        duration: Duration,
        workers: WorkerTally,
        metrics: &MetricsAggregator,
        tracker: &ResourceTracker,
    ) -> Self {
        let snapshot = metrics.snapshot();
        let latencies = metrics.latency_snapshot();

        let mut actions = BTreeMap::new();
        for spec in profile.plan.specs() {
            let tally = |outcome: &str| snapshot.get(&counters::action(&spec.name, outcome));
            actions.insert(
                spec.name.clone(),
                ActionSummary {
                    success: tally("success"),
                    expected_failure: tally("expected_failure"),
                    unexpected_failure: tally("unexpected_failure"),
                    skipped: tally("skipped"),
                    latency: latencies.get(&spec.name).cloned(),
                },
            );
        }

        let created_resources = tracker
            .counts()
            .into_iter()
            .map(|(kind, count)| (kind.as_str().to_string(), count))
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            profile: profile.name.clone(),
            mode: profile.execution_mode(),
            started_at,
            duration_secs: duration.as_secs_f64(),
            workers,
            requests: snapshot.get(counters::REQUESTS),
            cache: snapshot.cache(),
            created_resources,
            actions,
            counters: snapshot.counters,
        }
    }

    pub fn action(&self, name: &str) -> Option<&ActionSummary> {
        self.actions.get(name)
    }

    pub fn unexpected_failures(&self) -> u64 {
        self.actions.values().map(|a| a.unexpected_failure).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionId, ActionSpec};
    use crate::metrics::{ActionOutcome, OutcomeClass};
    use crate::plan::ActionPlan;
    use crate::profile::WaitTime;
    use crate::resource::ResourceKind;
    use crate::worker::WorkerState;

    fn report(id: usize, session_state: SessionState) -> WorkerReport {
        WorkerReport {
            id,
            session_state,
            final_state: WorkerState::Stopped,
            iterations: 0,
            requests: 0,
            responses: 0,
            transport_failures: 0,
            skipped: 0,
        }
    }

    #[test]
    fn test_summary_collects_tallies() {
        let list = ActionSpec::new(ActionId::ListBooks, 3);
        let update = ActionSpec::new(ActionId::UpdateBook, 1);
        let profile = ScenarioProfile::new(
            "mixed",
            "",
            WaitTime::constant(Duration::from_secs(1)),
            ActionPlan::weighted(vec![list.clone(), update.clone()]).unwrap(),
        );

        let metrics = MetricsAggregator::new();
        for latency in [10, 20, 80] {
            metrics.classify(
                &list,
                &ActionOutcome {
                    action_name: list.name.clone(),
                    request: "GET /books".to_string(),
                    status: Some(200),
                    latency: Duration::from_millis(latency),
                    classification: OutcomeClass::Success,
                    parse_failed: false,
                    error: None,
                },
            );
        }
        metrics.record_skip(&update);

        let tracker = ResourceTracker::new();
        tracker.record(ResourceKind::Book, "b1");

        let workers = WorkerTally::from_reports(
            &[report(0, SessionState::Active), report(1, SessionState::AuthFailed)],
            3,
            1,
        );
        let summary = RunSummary::build(&profile, Utc::now(), Duration::from_secs(30), workers, &metrics, &tracker);

        assert_eq!(summary.requests, 3);
        assert_eq!(summary.cache, CacheStats::new(2, 1));
        assert_eq!(summary.workers.authenticated, 1);
        assert_eq!(summary.workers.auth_failed, 1);
        assert_eq!(summary.workers.aborted, 1);
        assert_eq!(summary.created_resources["book"], 1);
        assert_eq!(summary.created_resources["borrow"], 0);

        let listing = summary.action("list-books").unwrap();
        assert_eq!(listing.success, 3);
        assert_eq!(listing.latency.as_ref().unwrap().count, 3);
        let updates = summary.action("update-book").unwrap();
        assert_eq!(updates.skipped, 1);
        assert_eq!(updates.requests(), 0);
        assert!(updates.latency.is_none());

        let json = summary.to_json().unwrap();
        let parsed: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.actions, summary.actions);
    }
}
