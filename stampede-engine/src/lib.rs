//! Stampede load generation engine
//!
//! Spawns many concurrent virtual users against a target service. Each user
//! authenticates once (backing off when rate-limited), then repeatedly picks
//! and performs actions from its scenario profile until the run is stopped.
//! Resources created along the way are shared through a [`ResourceTracker`]
//! so dependent actions have something to act on, and every outcome is
//! folded into a [`MetricsAggregator`] that the final [`RunSummary`] reads.

pub mod action;
pub mod api;
pub mod auth;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod profile;
pub mod resource;
pub mod runner;
pub mod session;
pub mod summary;
pub mod worker;

// Re-export main types
pub use action::{ActionContext, ActionId, ActionKind, ActionResult, ActionSpec, JourneyState, NewResource, SkipReason};
pub use auth::{AuthReport, Authenticator};
pub use error::{EngineError, EngineResult};
pub use metrics::{ActionOutcome, CacheStats, LatencyStats, MetricsAggregator, MetricsSnapshot, OutcomeClass};
pub use plan::{ActionPlan, ExecutionMode, JourneyStep, WeightedPool};
pub use profile::{builtin_profiles, ProfileRegistry, ScenarioProfile, WaitTime, DEFAULT_PROFILE};
pub use resource::{CreatedResource, ResourceKind, ResourceTracker};
pub use runner::{LoadRunner, RunSettings};
pub use session::{SessionState, VirtualUserSession};
pub use summary::{ActionSummary, RunSummary, WorkerTally};
pub use worker::{VirtualUser, WorkerContext, WorkerReport, WorkerSettings, WorkerState};
