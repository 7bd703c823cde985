//! Action plans: a weighted pool sampled per iteration, or an ordered journey

use crate::action::{ActionId, ActionSpec};
use crate::profile::WaitTime;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    #[default]
    WeightedPool,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::WeightedPool => write!(f, "weighted_pool"),
        }
    }
}

/// Independently sampled actions
///
/// Each selection is `weight / total` likely for its action. Zero weights are
/// allowed for individual entries; those are never selected.
#[derive(Debug, Clone)]
pub struct WeightedPool {
    actions: Vec<ActionSpec>,
    index: WeightedIndex<u32>,
}

impl WeightedPool {
    pub fn new(actions: Vec<ActionSpec>) -> Result<Self, String> {
        if actions.is_empty() {
            return Err("weighted pool has no actions".to_string());
        }
        if actions.iter().all(|a| a.weight == 0) {
            return Err("total action weight must be positive".to_string());
        }
        let index = WeightedIndex::new(actions.iter().map(|a| a.weight))
            .map_err(|e| format!("invalid action weights: {}", e))?;
        Ok(Self { actions, index })
    }

    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &ActionSpec {
        &self.actions[self.index.sample(rng)]
    }

    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn total_weight(&self) -> u64 {
        self.actions.iter().map(|a| a.weight as u64).sum()
    }
}

/// One step of a journey
#[derive(Debug, Clone, PartialEq)]
pub struct JourneyStep {
    pub spec: ActionSpec,
    /// Independent chance this step runs in a given journey
    pub probability: f64,
    /// Pause after the step completes
    pub think_time: Option<WaitTime>,
    /// End the journey early when this step is skipped
    pub halt_if_skipped: bool,
}

impl JourneyStep {
    pub fn new(action: ActionId) -> Self {
        Self {
            spec: ActionSpec::step(action),
            probability: 1.0,
            think_time: None,
            halt_if_skipped: false,
        }
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_think_time(mut self, think_time: WaitTime) -> Self {
        self.think_time = Some(think_time);
        self
    }

    pub fn halting(mut self) -> Self {
        self.halt_if_skipped = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum ActionPlan {
    WeightedPool(WeightedPool),
    Sequential(Vec<JourneyStep>),
}

impl ActionPlan {
    pub fn weighted(actions: Vec<ActionSpec>) -> Result<Self, String> {
        WeightedPool::new(actions).map(ActionPlan::WeightedPool)
    }

    pub fn sequential(steps: Vec<JourneyStep>) -> Result<Self, String> {
        let plan = ActionPlan::Sequential(steps);
        plan.validate()?;
        Ok(plan)
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            ActionPlan::WeightedPool(_) => ExecutionMode::WeightedPool,
            ActionPlan::Sequential(_) => ExecutionMode::Sequential,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ActionPlan::WeightedPool(pool) => {
                if pool.actions.is_empty() {
                    return Err("weighted pool has no actions".to_string());
                }
                if pool.total_weight() == 0 {
                    return Err("total action weight must be positive".to_string());
                }
                Ok(())
            }
            ActionPlan::Sequential(steps) => {
                if steps.is_empty() {
                    return Err("journey has no steps".to_string());
                }
                for step in steps {
                    if !(0.0..=1.0).contains(&step.probability) {
                        return Err(format!(
                            "step '{}' probability {} is outside [0, 1]",
                            step.spec.name, step.probability
                        ));
                    }
                    if let Some(think_time) = &step.think_time {
                        think_time
                            .validate()
                            .map_err(|e| format!("step '{}': {}", step.spec.name, e))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Every action the plan can perform, in declaration order
    pub fn specs(&self) -> Vec<&ActionSpec> {
        match self {
            ActionPlan::WeightedPool(pool) => pool.actions.iter().collect(),
            ActionPlan::Sequential(steps) => steps.iter().map(|s| &s.spec).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_selection_converges_to_weights() {
        let pool = WeightedPool::new(vec![
            ActionSpec::new(ActionId::ListBooks, 10),
            ActionSpec::new(ActionId::ViewBook, 1),
            ActionSpec::new(ActionId::SearchBooks, 1),
        ])
        .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let draws = 12_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(pool.select(&mut rng).name.clone()).or_default() += 1;
        }

        let share = |name: &str| counts.get(name).copied().unwrap_or(0) as f64 / draws as f64;
        assert!((share("list-books") - 10.0 / 12.0).abs() < 0.02);
        assert!((share("view-book") - 1.0 / 12.0).abs() < 0.02);
        assert!((share("search-books") - 1.0 / 12.0).abs() < 0.02);
    }

    #[test]
    fn test_zero_weight_entry_is_never_selected() {
        let pool = WeightedPool::new(vec![
            ActionSpec::new(ActionId::ListBooks, 1),
            ActionSpec::new(ActionId::CreateBook, 0),
        ])
        .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert_eq!(pool.select(&mut rng).action, ActionId::ListBooks);
        }
    }

    #[test]
    fn test_invalid_pools_rejected() {
        assert!(WeightedPool::new(vec![]).is_err());
        assert!(WeightedPool::new(vec![
            ActionSpec::new(ActionId::ListBooks, 0),
            ActionSpec::new(ActionId::ViewBook, 0),
        ])
        .is_err());
    }

    #[test]
    fn test_journey_validation() {
        assert!(ActionPlan::sequential(vec![]).is_err());
        assert!(ActionPlan::sequential(vec![
            JourneyStep::new(ActionId::JourneyBrowse).with_probability(1.5)
        ])
        .is_err());
        assert!(ActionPlan::sequential(vec![JourneyStep::new(ActionId::JourneyBrowse)
            .with_think_time(WaitTime::between(Duration::from_secs(5), Duration::from_secs(2)))])
        .is_err());

        let plan = ActionPlan::sequential(vec![
            JourneyStep::new(ActionId::JourneyBrowse),
            JourneyStep::new(ActionId::JourneyBorrow).with_probability(0.0),
        ])
        .unwrap();
        assert_eq!(plan.mode(), ExecutionMode::Sequential);
        assert_eq!(plan.specs().len(), 2);
    }
}
