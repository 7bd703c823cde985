//! Virtual user control loop
//!
//! `SPAWNED -> AUTHENTICATING -> RUNNING -> STOPPED`. A worker owns its
//! session, random generator and journey state; the tracker and metrics are
//! the only shared state it touches. The stop signal is observed at every
//! suspension point (start jitter, login backoff, think time, wait time) and
//! before every action, so nothing new is issued once it is raised.

use crate::action::{self, ActionContext, ActionResult, ActionSpec, JourneyState};
use crate::auth::{AuthReport, Authenticator};
use crate::error::EngineResult;
use crate::metrics::MetricsAggregator;
use crate::plan::{ActionPlan, JourneyStep};
use crate::profile::ScenarioProfile;
use crate::resource::ResourceTracker;
use crate::session::{SessionState, VirtualUserSession};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stampede_http::Transport;
use stampede_resilience::{uniform_jitter, ShutdownListener};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Spawned,
    Authenticating,
    Running,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Spawned => write!(f, "spawned"),
            WorkerState::Authenticating => write!(f, "authenticating"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shared collaborators handed to every worker of a run
#[derive(Clone)]
pub struct WorkerContext {
    pub transport: Arc<dyn Transport>,
    pub tracker: Arc<ResourceTracker>,
    pub metrics: Arc<MetricsAggregator>,
    pub profile: Arc<ScenarioProfile>,
    pub authenticator: Arc<Authenticator>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerSettings {
    /// Upper bound of the random delay before authentication starts,
    /// applied whether or not a login request follows
    pub start_jitter: Duration,
    /// Pause between a successful login and the first action
    pub warmup: Duration,
    /// Credential obtained earlier; skips the login request
    pub initial_credential: Option<String>,
}

/// Final tallies of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub id: usize,
    pub session_state: SessionState,
    pub final_state: WorkerState,
    pub iterations: u64,
    /// Requests issued, login attempts included
    pub requests: u64,
    pub responses: u64,
    pub transport_failures: u64,
    pub skipped: u64,
}

impl WorkerReport {
    fn new(id: usize) -> Self {
        Self {
            id,
            session_state: SessionState::Unauthenticated,
            final_state: WorkerState::Spawned,
            iterations: 0,
            requests: 0,
            responses: 0,
            transport_failures: 0,
            skipped: 0,
        }
    }

    /// Issued requests but never received a response
    pub fn only_transport_failures(&self) -> bool {
        self.responses == 0 && self.transport_failures > 0
    }
}

pub struct VirtualUser {
    id: usize,
    state: WorkerState,
    session: VirtualUserSession,
    rng: StdRng,
    ctx: WorkerContext,
    settings: WorkerSettings,
    listener: ShutdownListener,
    report: WorkerReport,
}

impl VirtualUser {
    pub fn new(
        id: usize,
        ctx: WorkerContext,
        settings: WorkerSettings,
        rng: StdRng,
        listener: ShutdownListener,
    ) -> Self {
        let session = match &settings.initial_credential {
            Some(token) => VirtualUserSession::with_credential(token.clone()),
            None => VirtualUserSession::new(),
        };
        Self {
            id,
            state: WorkerState::Spawned,
            session,
            rng,
            ctx,
            settings,
            listener,
            report: WorkerReport::new(id),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn session(&self) -> &VirtualUserSession {
        &self.session
    }

    /// Drive the worker until the stop signal. Only an invalid profile is an error.
    pub async fn run(mut self) -> EngineResult<WorkerReport> {
        self.ctx.profile.validate()?;
        info!(user_id = self.id, profile = %self.ctx.profile.name, "Virtual user spawned");

        let jitter = uniform_jitter(self.settings.start_jitter, &mut self.rng);
        if !self.pause(jitter).await {
            return Ok(self.finish());
        }

        self.transition(WorkerState::Authenticating);
        let auth = tokio::select! {
            biased;
            _ = self.listener.stopped() => None,
            report = self.ctx.authenticator.authenticate(self.ctx.transport.as_ref(), &mut self.session) => Some(report),
        };
        let Some(auth) = auth else {
            return Ok(self.finish());
        };
        self.record_auth(&auth);

        if self.session.is_active() && !self.pause(self.settings.warmup).await {
            return Ok(self.finish());
        }

        self.transition(WorkerState::Running);
        let profile = self.ctx.profile.clone();
        loop {
            if self.listener.is_stopped() {
                break;
            }

            let started = Instant::now();
            let finished = match &profile.plan {
                ActionPlan::WeightedPool(pool) => {
                    let spec = pool.select(&mut self.rng);
                    let mut journey = JourneyState::default();
                    self.perform(spec, &mut journey).await;
                    true
                }
                ActionPlan::Sequential(steps) => self.journey(steps).await,
            };
            if !finished {
                break;
            }
            self.report.iterations += 1;

            let wait = profile.wait_time.next_wait(started.elapsed(), &mut self.rng);
            if !self.pause(wait).await {
                break;
            }
        }

        Ok(self.finish())
    }

    /// One pass through the journey. Returns false if it was cut short by the stop signal.
    async fn journey(&mut self, steps: &[JourneyStep]) -> bool {
        let mut journey = JourneyState::default();

        for step in steps {
            if self.listener.is_stopped() {
                return false;
            }
            // Each step draws independently
            if !self.rng.random_bool(step.probability) {
                continue;
            }

            let result = self.perform(&step.spec, &mut journey).await;
            if result.is_skipped() {
                if step.halt_if_skipped {
                    break;
                }
                continue;
            }

            if let Some(think_time) = &step.think_time {
                let pause = think_time.next_wait(Duration::ZERO, &mut self.rng);
                if !self.pause(pause).await {
                    return false;
                }
            }
        }
        true
    }

    async fn perform(&mut self, spec: &ActionSpec, journey: &mut JourneyState) -> ActionResult {
        let result = {
            let mut ctx = ActionContext {
                transport: self.ctx.transport.as_ref(),
                session: &self.session,
                tracker: &self.ctx.tracker,
                rng: &mut self.rng,
                journey,
            };
            action::execute(spec, &mut ctx).await
        };

        for outcome in &result.outcomes {
            self.ctx.metrics.classify(spec, outcome);
            self.report.requests += 1;
            match outcome.status {
                Some(status) => {
                    self.report.responses += 1;
                    debug!(
                        user_id = self.id,
                        action = %spec.name,
                        request = %outcome.request,
                        status,
                        latency_ms = outcome.latency.as_millis() as u64,
                        outcome = outcome.classification.as_str(),
                        "Action completed"
                    );
                }
                None => self.report.transport_failures += 1,
            }
        }

        if let Some(reason) = &result.skipped {
            self.ctx.metrics.record_skip(spec);
            self.report.skipped += 1;
            debug!(user_id = self.id, action = %spec.name, reason = %reason, "Action skipped");
        }

        for created in &result.created {
            let added = if created.discovered {
                self.ctx.tracker.record_unique(created.kind, created.id.clone())
            } else {
                self.ctx.tracker.record(created.kind, created.id.clone());
                true
            };
            if added {
                self.ctx.metrics.record_created(created.kind);
            }
        }

        result
    }

    fn record_auth(&mut self, auth: &AuthReport) {
        self.ctx.metrics.record_auth(auth);
        self.report.requests += (auth.responses + auth.transport_failures) as u64;
        self.report.responses += auth.responses as u64;
        self.report.transport_failures += auth.transport_failures as u64;
        info!(
            user_id = self.id,
            state = %auth.state,
            attempts = auth.attempts,
            rate_limited = auth.rate_limited,
            "Authentication finished"
        );
    }

    /// Sleep unless stopped first. Returns false when the stop signal won.
    async fn pause(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            // Iterations that skip every action never reach an await otherwise
            tokio::task::yield_now().await;
            return !self.listener.is_stopped();
        }
        tokio::select! {
            biased;
            _ = self.listener.stopped() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(user_id = self.id, from = %self.state, to = %next, "Worker state change");
        self.state = next;
    }

    fn finish(mut self) -> WorkerReport {
        self.transition(WorkerState::Stopped);
        self.report.session_state = self.session.state();
        self.report.final_state = self.state;
        info!(
            user_id = self.id,
            iterations = self.report.iterations,
            requests = self.report.requests,
            "Virtual user stopped"
        );
        self.report
    }
}
