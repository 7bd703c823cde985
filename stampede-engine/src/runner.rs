//! Run driver
//!
//! Spawns virtual users at the configured rate, lets them run until the run
//! time elapses or the stop signal is raised, drains them within the stop
//! timeout and builds the [`RunSummary`].

use crate::auth::Authenticator;
use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsAggregator;
use crate::profile::{ProfileRegistry, ScenarioProfile};
use crate::resource::ResourceTracker;
use crate::summary::{RunSummary, WorkerTally};
use crate::worker::{VirtualUser, WorkerContext, WorkerReport, WorkerSettings};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stampede_config::{AuthConfig, LoadConfig, StampedeConfig};
use stampede_http::Transport;
use stampede_resilience::{ShutdownCoordinator, ShutdownError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub users: usize,
    /// Users started per second
    pub spawn_rate: f64,
    pub run_time: Duration,
    pub stop_timeout: Duration,
    /// Base seed; worker `n` uses `seed + n`
    pub seed: Option<u64>,
    pub start_jitter: Duration,
    pub warmup: Duration,
}

impl RunSettings {
    pub fn from_config(load: &LoadConfig, auth: &AuthConfig) -> Self {
        Self {
            users: load.users,
            spawn_rate: load.spawn_rate,
            run_time: load.run_time,
            stop_timeout: load.stop_timeout,
            seed: load.seed,
            start_jitter: auth.start_jitter_ms,
            warmup: auth.warmup_ms,
        }
    }

    /// Gap between two spawns. Rates too small to express wait out the run.
    pub fn spawn_interval(&self) -> Duration {
        if self.spawn_rate.is_finite() && self.spawn_rate > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.spawn_rate)
                .map_or(FAR_FUTURE, |interval| interval.min(FAR_FUTURE))
        } else {
            Duration::ZERO
        }
    }
}

/// Stand-in for "never" when an instant would not fit the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&LoadConfig::default(), &AuthConfig::default())
    }
}

pub struct LoadRunner {
    transport: Arc<dyn Transport>,
    profile: Arc<ScenarioProfile>,
    authenticator: Arc<Authenticator>,
    settings: RunSettings,
    metrics: Arc<MetricsAggregator>,
    shutdown: Arc<ShutdownCoordinator>,
    shared_credential: Option<String>,
}

impl LoadRunner {
    pub fn new(
        transport: Arc<dyn Transport>,
        profile: Arc<ScenarioProfile>,
        authenticator: Authenticator,
        settings: RunSettings,
    ) -> Self {
        Self {
            transport,
            profile,
            authenticator: Arc::new(authenticator),
            settings,
            metrics: Arc::new(MetricsAggregator::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            shared_credential: None,
        }
    }

    /// Validate `config` and resolve its profile from `registry`
    pub fn from_config(
        config: &StampedeConfig,
        registry: &ProfileRegistry,
        transport: Arc<dyn Transport>,
    ) -> EngineResult<Self> {
        config.validate_all()?;
        let profile = registry.get(&config.load.profile)?;
        let authenticator = Authenticator::new(&config.auth, config.target.credentials.clone());
        Ok(Self::new(
            transport,
            profile,
            authenticator,
            RunSettings::from_config(&config.load, &config.auth),
        ))
    }

    /// Give every worker this credential so none of them logs in
    pub fn with_shared_credential(mut self, token: impl Into<String>) -> Self {
        self.shared_credential = Some(token.into());
        self
    }

    /// Handle for raising the stop signal from outside the run
    pub fn stop_handle(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        self.metrics.clone()
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn profile(&self) -> &ScenarioProfile {
        &self.profile
    }

    pub async fn run(self) -> EngineResult<RunSummary> {
        self.profile.validate()?;
        self.metrics.reset();

        let tracker = Arc::new(ResourceTracker::new());
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started
            .checked_add(self.settings.run_time)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let base_seed = match self.settings.seed {
            Some(seed) => seed,
            None => rand::rng().random(),
        };
        info!(
            profile = %self.profile.name,
            mode = %self.profile.execution_mode(),
            users = self.settings.users,
            spawn_rate = self.settings.spawn_rate,
            run_time_secs = self.settings.run_time.as_secs_f64(),
            seed = base_seed,
            "Starting load run"
        );

        let ctx = WorkerContext {
            transport: self.transport.clone(),
            tracker: tracker.clone(),
            metrics: self.metrics.clone(),
            profile: self.profile.clone(),
            authenticator: self.authenticator.clone(),
        };
        let worker_settings = WorkerSettings {
            start_jitter: self.settings.start_jitter,
            warmup: self.settings.warmup,
            initial_credential: self.shared_credential.clone(),
        };

        let interval = self.settings.spawn_interval();
        let mut listener = self.shutdown.subscribe();
        let mut workers: JoinSet<EngineResult<WorkerReport>> = JoinSet::new();
        let mut task_ids: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut reports: Vec<WorkerReport> = Vec::new();
        let mut fatal: Option<EngineError> = None;
        let mut spawned = 0usize;
        let mut next_spawn = started;

        loop {
            tokio::select! {
                biased;
                _ = listener.stopped() => {
                    info!("Stop requested");
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!("Run time elapsed");
                    break;
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    match collect(joined, &task_ids) {
                        Ok(report) => reports.push(report),
                        Err(e) => {
                            error!(error = %e, "Worker failed fatally");
                            fatal = Some(e);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(next_spawn), if spawned < self.settings.users => {
                    let id = spawned;
                    let user = VirtualUser::new(
                        id,
                        ctx.clone(),
                        worker_settings.clone(),
                        StdRng::seed_from_u64(base_seed.wrapping_add(id as u64)),
                        self.shutdown.subscribe(),
                    );
                    let guard = self.shutdown.task_guard();
                    let handle = workers.spawn(async move {
                        let _guard = guard;
                        user.run().await
                    });
                    task_ids.insert(handle.id(), id);
                    spawned += 1;
                    next_spawn = next_spawn.checked_add(interval).unwrap_or(deadline);
                }
            }
        }

        let aborted = match self.shutdown.shutdown(self.settings.stop_timeout).await {
            Ok(()) => 0,
            Err(ShutdownError::TasksRemaining(remaining)) => {
                warn!(remaining, "Aborting workers that did not stop in time");
                workers.abort_all();
                remaining
            }
        };

        while let Some(joined) = workers.join_next().await {
            match joined {
                Err(e) if e.is_cancelled() => {}
                joined => match collect(joined, &task_ids) {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        error!(error = %e, "Worker failed fatally");
                        fatal.get_or_insert(e);
                    }
                },
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let attempted: Vec<&WorkerReport> = reports.iter().filter(|r| r.requests > 0).collect();
        if !attempted.is_empty() && attempted.iter().all(|r| r.only_transport_failures()) {
            let failures: u64 = attempted.iter().map(|r| r.transport_failures).sum();
            return Err(EngineError::TargetUnreachable(format!(
                "{} workers, {} transport failures",
                attempted.len(),
                failures
            )));
        }

        let workers = WorkerTally::from_reports(&reports, spawned, aborted);
        let summary = RunSummary::build(
            &self.profile,
            started_at,
            started.elapsed(),
            workers,
            &self.metrics,
            &tracker,
        );
        info!(
            requests = summary.requests,
            cache_hit_rate = summary.cache.hit_rate,
            duration_secs = summary.duration_secs,
            "Load run finished"
        );
        Ok(summary)
    }
}

fn collect(
    joined: Result<EngineResult<WorkerReport>, tokio::task::JoinError>,
    task_ids: &HashMap<tokio::task::Id, usize>,
) -> EngineResult<WorkerReport> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(EngineError::WorkerFailed {
            worker: task_ids.get(&e.id()).copied().unwrap_or_default(),
            message: e.to_string(),
        }),
    }
}
