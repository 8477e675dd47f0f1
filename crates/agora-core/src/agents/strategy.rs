//! Task distribution strategies
//!
//! Strategies are a pair of capabilities: pick an agent for a task,
//! and decide whether the fleet's state calls for the fallback
//! strategy instead. New strategies slot in without touching callers.

use super::agent::Agent;
use super::task::TaskRequest;

/// Picks assignees and flags degraded fleets
pub trait DistributionStrategy: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Choose an agent for `task` among `agents` (active agents only).
    /// Returns `None` when no agent qualifies.
    fn select_agent(&self, task: &TaskRequest, agents: &[Agent]) -> Option<String>;

    /// Whether this assignment should be handed to the fallback
    /// strategy instead.
    fn should_intervene(&self, task: &TaskRequest, agents: &[Agent]) -> bool;
}

/// Prefers the agent with the fewest tasks in flight.
///
/// Ties break by higher quality score, then lexicographically smaller
/// id, so selection is deterministic.
#[derive(Debug, Default)]
pub struct LeastLoaded;

impl DistributionStrategy for LeastLoaded {
    fn name(&self) -> &'static str {
        "least_loaded"
    }

    fn select_agent(&self, _task: &TaskRequest, agents: &[Agent]) -> Option<String> {
        agents
            .iter()
            .filter(|a| a.is_active)
            .min_by(|a, b| {
                a.counters
                    .in_flight()
                    .cmp(&b.counters.in_flight())
                    .then_with(|| {
                        b.counters
                            .quality_score
                            .partial_cmp(&a.counters.quality_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|a| a.id.clone())
    }

    fn should_intervene(&self, _task: &TaskRequest, agents: &[Agent]) -> bool {
        agents
            .iter()
            .filter(|a| a.is_active)
            .any(|a| a.counters.error_rate > 0.5)
    }
}

/// Prefers the agent with the best success/error margin.
///
/// Used as the fallback when [`LeastLoaded`] flags a degraded fleet.
#[derive(Debug, Default)]
pub struct PerformanceWeighted;

impl DistributionStrategy for PerformanceWeighted {
    fn name(&self) -> &'static str {
        "performance_weighted"
    }

    fn select_agent(&self, _task: &TaskRequest, agents: &[Agent]) -> Option<String> {
        agents
            .iter()
            .filter(|a| a.is_active)
            .max_by(|a, b| {
                let score_a = a.counters.success_rate - a.counters.error_rate;
                let score_b = b.counters.success_rate - b.counters.error_rate;
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|a| a.id.clone())
    }

    fn should_intervene(&self, _task: &TaskRequest, _agents: &[Agent]) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::agent::{AgentPersonality, AgentRole, AgentSpec};
    use chrono::Utc;

    fn agent(id: &str) -> Agent {
        AgentSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            role: AgentRole::Specialist,
            personality: AgentPersonality::Analytical,
            provider_id: "mock".to_string(),
            model_id: "mock-model".to_string(),
            capabilities: Default::default(),
            max_tokens: 512,
            temperature: 0.2,
        }
        .into_agent(Utc::now())
    }

    fn request() -> TaskRequest {
        TaskRequest::new("chat", "answer")
    }

    #[test]
    fn least_loaded_picks_fewest_in_flight() {
        let mut a = agent("a1");
        a.counters.tasks_assigned = 5;
        a.counters.tasks_completed = 2;
        let mut b = agent("b1");
        b.counters.tasks_assigned = 3;
        b.counters.tasks_completed = 2;

        let picked = LeastLoaded.select_agent(&request(), &[a, b]);
        assert_eq!(picked.as_deref(), Some("b1"));
    }

    #[test]
    fn least_loaded_ties_break_by_quality_then_id() {
        let mut a = agent("b-agent");
        a.counters.quality_score = 0.9;
        let b = agent("a-agent");

        let picked = LeastLoaded.select_agent(&request(), &[a.clone(), b.clone()]);
        assert_eq!(picked.as_deref(), Some("b-agent"));

        // Equal quality: smaller id wins.
        a.counters.quality_score = b.counters.quality_score;
        let picked = LeastLoaded.select_agent(&request(), &[a, b]);
        assert_eq!(picked.as_deref(), Some("a-agent"));
    }

    #[test]
    fn least_loaded_skips_inactive() {
        let mut a = agent("a1");
        a.is_active = false;
        let b = agent("b1");
        let picked = LeastLoaded.select_agent(&request(), &[a, b]);
        assert_eq!(picked.as_deref(), Some("b1"));
    }

    #[test]
    fn intervention_triggers_on_high_error_rate() {
        let mut a = agent("a1");
        assert!(!LeastLoaded.should_intervene(&request(), std::slice::from_ref(&a)));
        a.counters.error_rate = 0.6;
        assert!(LeastLoaded.should_intervene(&request(), &[a]));
    }

    #[test]
    fn performance_weighted_maximizes_margin() {
        let mut a = agent("a1");
        a.counters.success_rate = 0.9;
        a.counters.error_rate = 0.1;
        let mut b = agent("b1");
        b.counters.success_rate = 0.7;
        b.counters.error_rate = 0.6;

        let picked = PerformanceWeighted.select_agent(&request(), &[b, a]);
        assert_eq!(picked.as_deref(), Some("a1"));
    }
}
