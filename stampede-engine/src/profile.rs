//! Scenario profiles and their registry
//!
//! A profile names a wait-time policy and an action plan. Profiles are
//! immutable once registered; the runner selects one per run. Besides the
//! built-in set, profiles can be declared in YAML:
//!
//! ```yaml
//! profiles:
//!   - name: browse-only
//!     wait_time: { type: between, min: 200ms, max: 1s }
//!     actions:
//!       - { action: list-books, weight: 5 }
//!       - { action: search-books, weight: 1, search_terms: [rust] }
//!   - name: short-journey
//!     wait_time: { type: constant, duration: 3s }
//!     steps:
//!       - { action: journey-browse, think_time: { type: constant, duration: 1s } }
//!       - { action: journey-view-details, halt_if_skipped: true }
//!       - { action: journey-borrow, probability: 0.3 }
//! ```

use crate::action::{ActionId, ActionSpec};
use crate::error::{EngineError, EngineResult};
use crate::plan::{ActionPlan, ExecutionMode, JourneyStep};
use rand::Rng;
use serde::{Deserialize, Serialize};
use stampede_resilience::uniform_between;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_PROFILE: &str = "cache-focus";

/// Pause between iterations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitTime {
    /// Uniform in `[min, max]`
    Between {
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
    Constant {
        #[serde(with = "humantime_serde")]
        duration: Duration,
    },
    /// Start iterations `interval` apart, less the time the iteration took
    ConstantPacing {
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
}

impl WaitTime {
    pub fn between(min: Duration, max: Duration) -> Self {
        WaitTime::Between { min, max }
    }

    pub fn constant(duration: Duration) -> Self {
        WaitTime::Constant { duration }
    }

    pub fn constant_pacing(interval: Duration) -> Self {
        WaitTime::ConstantPacing { interval }
    }

    /// Next pause given how long the finished iteration took
    pub fn next_wait<R: Rng + ?Sized>(&self, elapsed: Duration, rng: &mut R) -> Duration {
        match *self {
            WaitTime::Between { min, max } => uniform_between(min, max, rng),
            WaitTime::Constant { duration } => duration,
            WaitTime::ConstantPacing { interval } => interval.saturating_sub(elapsed),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            WaitTime::Between { min, max } if min > max => Err(format!(
                "wait time minimum {:?} exceeds maximum {:?}",
                min, max
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for WaitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTime::Between { min, max } => write!(f, "between({:?}, {:?})", min, max),
            WaitTime::Constant { duration } => write!(f, "constant({:?})", duration),
            WaitTime::ConstantPacing { interval } => write!(f, "constant_pacing({:?})", interval),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioProfile {
    pub name: String,
    pub description: String,
    pub wait_time: WaitTime,
    pub plan: ActionPlan,
}

impl ScenarioProfile {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        wait_time: WaitTime,
        plan: ActionPlan,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            wait_time,
            plan,
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.plan.mode()
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.wait_time
            .validate()
            .and_then(|_| self.plan.validate())
            .map_err(|message| EngineError::invalid_profile(&self.name, message))?;

        if let ActionPlan::WeightedPool(pool) = &self.plan {
            if let Some(step) = pool.actions().iter().find(|a| a.action.is_journey_step()) {
                return Err(EngineError::invalid_profile(
                    &self.name,
                    format!("journey step '{}' cannot be used in a weighted pool", step.action),
                ));
            }
        }
        Ok(())
    }

    fn from_definition(definition: ProfileDefinition) -> EngineResult<Self> {
        let name = definition.name;
        let mode = definition.mode.unwrap_or(if definition.steps.is_empty() {
            ExecutionMode::WeightedPool
        } else {
            ExecutionMode::Sequential
        });

        let plan = match mode {
            ExecutionMode::WeightedPool => {
                if !definition.steps.is_empty() {
                    return Err(EngineError::invalid_profile(&name, "a weighted pool takes `actions`, not `steps`"));
                }
                let actions = definition
                    .actions
                    .into_iter()
                    .map(|a| {
                        let spec = ActionSpec::new(a.action, a.weight);
                        a.into_spec(spec)
                    })
                    .collect();
                ActionPlan::weighted(actions)
            }
            ExecutionMode::Sequential => {
                if !definition.actions.is_empty() {
                    return Err(EngineError::invalid_profile(&name, "a sequential journey takes `steps`, not `actions`"));
                }
                let steps = definition
                    .steps
                    .into_iter()
                    .map(|s| {
                        let spec = ActionSpec::step(s.action.action);
                        JourneyStep {
                            spec: s.action.into_spec(spec),
                            probability: s.probability,
                            think_time: s.think_time,
                            halt_if_skipped: s.halt_if_skipped,
                        }
                    })
                    .collect();
                ActionPlan::sequential(steps)
            }
        }
        .map_err(|message| EngineError::invalid_profile(&name, message))?;

        let profile = ScenarioProfile::new(name, definition.description, definition.wait_time, plan);
        profile.validate()?;
        Ok(profile)
    }
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    profiles: Vec<ProfileDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileDefinition {
    name: String,
    #[serde(default)]
    description: String,
    wait_time: WaitTime,
    #[serde(default)]
    mode: Option<ExecutionMode>,
    #[serde(default)]
    actions: Vec<ActionDefinition>,
    #[serde(default)]
    steps: Vec<StepDefinition>,
}

#[derive(Debug, Deserialize)]
struct ActionDefinition {
    action: ActionId,
    #[serde(default = "default_weight")]
    weight: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cache_probe: Option<bool>,
    #[serde(default)]
    expected_statuses: Option<Vec<u16>>,
    #[serde(default)]
    search_terms: Vec<String>,
}

impl ActionDefinition {
    fn into_spec(self, mut spec: ActionSpec) -> ActionSpec {
        if let Some(name) = self.name {
            spec.name = name;
        }
        if let Some(cache_probe) = self.cache_probe {
            spec.cache_probe = cache_probe;
        }
        if let Some(statuses) = self.expected_statuses {
            spec.expected_statuses = statuses;
        }
        spec.search_terms = self.search_terms;
        spec
    }
}

#[derive(Debug, Deserialize)]
struct StepDefinition {
    #[serde(flatten)]
    action: ActionDefinition,
    #[serde(default = "default_probability")]
    probability: f64,
    #[serde(default)]
    think_time: Option<WaitTime>,
    #[serde(default)]
    halt_if_skipped: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_probability() -> f64 {
    1.0
}

/// Named profiles available for a run
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<ScenarioProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in profile
    pub fn with_builtins() -> EngineResult<Self> {
        let mut registry = Self::new();
        for profile in builtin_profiles()? {
            registry.register(profile)?;
        }
        Ok(registry)
    }

    /// Add `profile`, replacing any profile of the same name
    pub fn register(&mut self, profile: ScenarioProfile) -> EngineResult<()> {
        profile.validate()?;
        if self.profiles.contains_key(&profile.name) {
            debug!(profile = %profile.name, "Replacing registered profile");
        }
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
        Ok(())
    }

    /// Register every profile in a YAML document. Nothing is registered if
    /// any definition is invalid.
    pub fn load_yaml_str(&mut self, yaml: &str) -> EngineResult<usize> {
        let file: ProfilesFile = serde_yaml::from_str(yaml)?;
        let profiles = file
            .profiles
            .into_iter()
            .map(ScenarioProfile::from_definition)
            .collect::<EngineResult<Vec<_>>>()?;

        let count = profiles.len();
        for profile in profiles {
            self.register(profile)?;
        }
        Ok(count)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> EngineResult<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let count = self.load_yaml_str(&content)?;
        info!(path = %path.display(), count, "Loaded custom profiles");
        Ok(count)
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<ScenarioProfile>> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProfile(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenarioProfile> {
        self.profiles.values().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn secs(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

fn pool(name: &str, description: &str, wait_time: WaitTime, actions: &[(ActionId, u32)]) -> EngineResult<ScenarioProfile> {
    let specs = actions
        .iter()
        .map(|(action, weight)| ActionSpec::new(*action, *weight))
        .collect();
    let plan = ActionPlan::weighted(specs).map_err(|message| EngineError::invalid_profile(name, message))?;
    Ok(ScenarioProfile::new(name, description, wait_time, plan))
}

/// Profiles shipped with stampede
pub fn builtin_profiles() -> EngineResult<Vec<ScenarioProfile>> {
    use ActionId::*;

    let journey = ActionPlan::sequential(vec![
        JourneyStep::new(JourneyBrowse).with_think_time(WaitTime::between(secs(2), secs(5))),
        JourneyStep::new(JourneyViewDetails)
            .with_think_time(WaitTime::between(secs(5), secs(10)))
            .halting(),
        JourneyStep::new(JourneyBorrow)
            .with_probability(0.3)
            .with_think_time(WaitTime::between(secs(1), secs(2))),
        JourneyStep::new(JourneyCheckNotifications)
            .with_probability(0.5)
            .with_think_time(WaitTime::between(secs(1), secs(3))),
        JourneyStep::new(JourneyMyBorrows).with_probability(0.2),
    ])
    .map_err(|message| EngineError::invalid_profile("realistic-journey", message))?;

    Ok(vec![
        pool(
            "cache-focus",
            "Repeated book reads to measure cache effectiveness",
            WaitTime::between(ms(100), ms(500)),
            &[(ListBooks, 10), (ViewBook, 1), (SearchBooks, 1)],
        )?,
        pool(
            "read-heavy",
            "Mostly reads with occasional writes",
            WaitTime::between(ms(500), secs(2)),
            &[
                (ListBooks, 50),
                (ViewBook, 20),
                (SearchBooks, 10),
                (ViewNotifications, 5),
                (ViewMyBorrows, 3),
                (CreateBook, 1),
            ],
        )?,
        pool(
            "write-heavy",
            "Creation and state changes of books and borrows",
            WaitTime::between(secs(1), secs(3)),
            &[
                (CreateBook, 20),
                (UpdateBook, 15),
                (CreateBorrow, 15),
                (ApproveBorrow, 10),
                (ListBooks, 10),
            ],
        )?,
        pool(
            "cache-stress",
            "High-frequency reads of the same listings",
            WaitTime::between(ms(100), ms(300)),
            &[(ListBooks, 80), (ViewBook, 15), (SearchBooks, 5)],
        )?,
        pool(
            "spike",
            "Even mix of endpoints at a fixed one second cadence",
            WaitTime::constant(secs(1)),
            &[(ListBooks, 1), (ListBorrows, 1), (ViewNotifications, 1), (HealthCheck, 1)],
        )?,
        pool(
            "soak",
            "Long-running steady load",
            WaitTime::between(secs(2), secs(5)),
            &[
                (ListBooks, 30),
                (ViewBook, 10),
                (ViewNotifications, 5),
                (ViewMyBorrows, 3),
                (CreateBorrow, 2),
            ],
        )?,
        pool(
            "health-monitor",
            "Low-rate availability probes every ten seconds",
            WaitTime::constant_pacing(secs(10)),
            &[(HealthCheck, 1), (ListBooks, 1), (ListBorrows, 1), (ViewNotifications, 1)],
        )?,
        pool(
            "stress",
            "Short waits with a write share",
            WaitTime::between(ms(100), ms(500)),
            &[(ListBooks, 10), (CreateBook, 5), (SearchBooks, 3)],
        )?,
        pool(
            "lifecycle",
            "Every resource-dependent action against resources created in the run",
            WaitTime::between(ms(500), ms(1500)),
            &[
                (CreateBook, 5),
                (UpdateBook, 3),
                (ListMyBooks, 2),
                (CreateBorrow, 4),
                (ApproveBorrow, 2),
                (ReturnBorrow, 1),
                (ViewNotifications, 3),
                (MarkNotificationRead, 2),
                (ListBorrows, 2),
            ],
        )?,
        ScenarioProfile::new(
            "realistic-journey",
            "Browse, inspect a book, sometimes borrow it and check notifications",
            WaitTime::between(secs(3), secs(10)),
            journey,
        ),
    ])
}
