//! Agent manager
//!
//! Authoritative owner of agents and their tasks. Agent table mutation
//! is serialized behind one lock; per-agent counters only change
//! through this module, so an agent never observes its own counters
//! going backwards.

use super::agent::{Agent, AgentSpec, PerformanceCounters};
use super::strategy::{DistributionStrategy, LeastLoaded, PerformanceWeighted};
use super::task::{Task, TaskRequest, TaskStatus};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::event_bus::{AgentEvent, EventBus, HubEvent};
use crate::id::IdGenerator;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const PRODUCER: &str = "agent_manager";

/// Manages the agent fleet and its task queue
pub struct AgentManager {
    agents: RwLock<HashMap<String, Agent>>,
    /// Agents removed while tasks were still in flight. Kept so late
    /// completions still land their counter updates and events.
    departed: RwLock<HashMap<String, Agent>>,
    tasks: RwLock<HashMap<String, Task>>,
    queue: Mutex<VecDeque<String>>,
    capacity: usize,
    smoothing: f64,
    strategy: Box<dyn DistributionStrategy>,
    fallback: Box<dyn DistributionStrategy>,
    bus: Arc<EventBus>,
    ids: Arc<IdGenerator>,
}

impl AgentManager {
    /// Create a manager with the default strategy pair
    #[must_use]
    pub fn new(config: &AgentConfig, bus: Arc<EventBus>, ids: Arc<IdGenerator>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            departed: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            capacity: config.task_queue_capacity.max(1),
            smoothing: config.smoothing,
            strategy: Box::new(LeastLoaded),
            fallback: Box::new(PerformanceWeighted),
            bus,
            ids,
        }
    }

    async fn emit(&self, event: AgentEvent) {
        let envelope = HubEvent::new(self.ids.mint(), self.ids.now(), PRODUCER, event);
        self.bus.publish(envelope).await;
    }

    /// Register a new agent
    pub async fn add_agent(&self, spec: AgentSpec) -> Result<Agent> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&spec.id) {
            return Err(Error::InvalidArgument(format!(
                "agent {} already exists",
                spec.id
            )));
        }
        let agent = spec.into_agent(self.ids.now());
        agents.insert(agent.id.clone(), agent.clone());
        drop(agents);

        info!(agent = %agent.id, "Agent added");
        self.emit(AgentEvent::AgentAdded {
            agent_id: agent.id.clone(),
        })
        .await;
        Ok(agent)
    }

    /// Remove an agent.
    ///
    /// In-flight tasks stay runnable and their terminal updates still
    /// count; new assignments to this agent fail with `NotFound`.
    pub async fn remove_agent(&self, agent_id: &str) -> Result<()> {
        let agent = {
            let mut agents = self.agents.write().await;
            agents
                .remove(agent_id)
                .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))?
        };
        self.departed
            .write()
            .await
            .insert(agent.id.clone(), agent);

        info!(agent = %agent_id, "Agent removed");
        self.emit(AgentEvent::AgentRemoved {
            agent_id: agent_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Replace an agent's configuration, keeping its counters
    pub async fn update_agent(&self, spec: AgentSpec) -> Result<Agent> {
        let updated = {
            let mut agents = self.agents.write().await;
            let agent = agents
                .get_mut(&spec.id)
                .ok_or_else(|| Error::NotFound(format!("agent {}", spec.id)))?;
            agent.display_name = spec.display_name;
            agent.role = spec.role;
            agent.personality = spec.personality;
            agent.provider_id = spec.provider_id;
            agent.model_id = spec.model_id;
            agent.capabilities = spec.capabilities;
            agent.max_tokens = spec.max_tokens;
            agent.temperature = spec.temperature;
            agent.updated_at = self.ids.now();
            agent.clone()
        };
        self.emit(AgentEvent::AgentUpdated {
            agent_id: updated.id.clone(),
        })
        .await;
        Ok(updated)
    }

    /// Flip an agent's active flag
    pub async fn set_active(&self, agent_id: &str, active: bool) -> Result<()> {
        {
            let mut agents = self.agents.write().await;
            let agent = agents
                .get_mut(agent_id)
                .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))?;
            agent.is_active = active;
            agent.updated_at = self.ids.now();
        }
        self.emit(AgentEvent::StatusUpdated {
            agent_id: agent_id.to_string(),
            active,
        })
        .await;
        Ok(())
    }

    /// Look up a live agent
    pub async fn get(&self, agent_id: &str) -> Result<Agent> {
        let agents = self.agents.read().await;
        agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))
    }

    /// Whether `agent_id` names a live agent
    pub async fn exists(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    /// All live agents, sorted by id
    pub async fn list(&self) -> Vec<Agent> {
        let agents = self.agents.read().await;
        let mut all: Vec<Agent> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Live agents accepting work, sorted by id
    pub async fn active_agents(&self) -> Vec<Agent> {
        let agents = self.agents.read().await;
        let mut active: Vec<Agent> = agents.values().filter(|a| a.is_active).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    /// Assign a task.
    ///
    /// With no explicit assignee the distribution strategy picks one;
    /// a degraded fleet (intervention) switches the pick to the
    /// fallback strategy. The task lands in the bounded queue.
    pub async fn assign_task(&self, request: TaskRequest) -> Result<Task> {
        let assignee = match &request.assignee_id {
            Some(id) => {
                if !self.exists(id).await {
                    return Err(Error::NotFound(format!("agent {id}")));
                }
                id.clone()
            }
            None => {
                let candidates = self.active_agents().await;
                let strategy: &dyn DistributionStrategy =
                    if self.strategy.should_intervene(&request, &candidates) {
                        warn!(strategy = self.fallback.name(), "Intervention: using fallback strategy");
                        self.fallback.as_ref()
                    } else {
                        self.strategy.as_ref()
                    };
                strategy
                    .select_agent(&request, &candidates)
                    .ok_or_else(|| Error::NotFound("no active agent available".to_string()))?
            }
        };

        let task = Task {
            id: self.ids.mint(),
            assignee_id: assignee.clone(),
            task_type: request.task_type,
            description: request.description,
            priority: request.priority,
            status: TaskStatus::Pending,
            created_at: self.ids.now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            metadata: request.metadata,
        };

        // Capacity check and push stay under one queue lock so two
        // concurrent assigns cannot both pass the check and overflow.
        // Lock order (queue, then tasks) matches claim_next/start_task.
        {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.capacity {
                return Err(Error::QueueFull {
                    capacity: self.capacity,
                });
            }
            self.tasks
                .write()
                .await
                .insert(task.id.clone(), task.clone());
            queue.push_back(task.id.clone());
        }

        {
            let mut agents = self.agents.write().await;
            if let Some(agent) = agents.get_mut(&assignee) {
                agent.counters.tasks_assigned += 1;
                agent.counters.last_seen = self.ids.now();
            }
        }

        debug!(task = %task.id, agent = %assignee, "Task assigned");
        self.emit(AgentEvent::TaskAssigned {
            task_id: task.id.clone(),
            agent_id: assignee,
        })
        .await;
        Ok(task)
    }

    /// Claim the highest-priority pending task, marking it running
    pub async fn claim_next(&self) -> Option<Task> {
        let mut queue = self.queue.lock().await;
        let mut tasks = self.tasks.write().await;

        let best = queue
            .iter()
            .enumerate()
            .filter_map(|(i, id)| tasks.get(id).map(|t| (i, t.priority)))
            .max_by_key(|(i, priority)| (*priority, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)?;
        let task_id = queue.remove(best)?;

        let task = tasks.get_mut(&task_id)?;
        task.status = TaskStatus::Running;
        task.started_at = Some(self.ids.now());
        Some(task.clone())
    }

    /// Mark a specific pending task running
    pub async fn start_task(&self, task_id: &str) -> Result<Task> {
        let mut queue = self.queue.lock().await;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if task.status != TaskStatus::Pending {
            return Err(Error::InvalidState(format!(
                "task {task_id} is {}, expected pending",
                task.status
            )));
        }
        queue.retain(|id| id != task_id);
        task.status = TaskStatus::Running;
        task.started_at = Some(self.ids.now());
        Ok(task.clone())
    }

    async fn finish(
        &self,
        task_id: &str,
        outcome: TaskStatus,
        body: std::result::Result<String, String>,
        quality: Option<f64>,
    ) -> Result<Task> {
        let task = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
            if task.status.is_terminal() {
                return Err(Error::InvalidState(format!(
                    "task {task_id} already {}",
                    task.status
                )));
            }
            task.status = outcome;
            task.completed_at = Some(self.ids.now());
            match body {
                Ok(result) => task.result = Some(result),
                Err(error) => task.error = Some(error),
            }
            task.clone()
        };
        // Queue entry may still exist for tasks cancelled while pending.
        self.queue.lock().await.retain(|id| id != task_id);

        let latency_ms = task
            .completed_at
            .zip(task.started_at.or(Some(task.created_at)))
            .map(|(end, start)| (end - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        let success = outcome == TaskStatus::Completed;
        let now = self.ids.now();
        let mut updated = false;
        {
            let mut agents = self.agents.write().await;
            if let Some(agent) = agents.get_mut(&task.assignee_id) {
                agent
                    .counters
                    .record_outcome(success, latency_ms, quality, self.smoothing, now);
                updated = true;
            }
        }
        if !updated {
            let mut departed = self.departed.write().await;
            if let Some(agent) = departed.get_mut(&task.assignee_id) {
                agent
                    .counters
                    .record_outcome(success, latency_ms, quality, self.smoothing, now);
            }
        }

        if success {
            self.emit(AgentEvent::TaskCompleted {
                task_id: task.id.clone(),
                agent_id: task.assignee_id.clone(),
                latency_ms,
            })
            .await;
        } else {
            self.emit(AgentEvent::TaskFailed {
                task_id: task.id.clone(),
                agent_id: task.assignee_id.clone(),
                reason: task.error.clone().unwrap_or_else(|| outcome.to_string()),
            })
            .await;
        }
        Ok(task)
    }

    /// Complete a task with its result and an optional quality score
    pub async fn complete_task(
        &self,
        task_id: &str,
        result: impl Into<String>,
        quality: Option<f64>,
    ) -> Result<Task> {
        self.finish(task_id, TaskStatus::Completed, Ok(result.into()), quality)
            .await
    }

    /// Fail a task with an error description
    pub async fn fail_task(&self, task_id: &str, error: impl Into<String>) -> Result<Task> {
        self.finish(task_id, TaskStatus::Failed, Err(error.into()), None)
            .await
    }

    /// Cancel a pending or running task.
    ///
    /// Emits `task_failed` carrying the cancellation reason.
    pub async fn cancel_task(&self, task_id: &str, reason: impl Into<String>) -> Result<Task> {
        self.finish(
            task_id,
            TaskStatus::Cancelled,
            Err(format!("cancelled: {}", reason.into())),
            None,
        )
        .await
    }

    /// Look up a task
    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    /// Pending tasks currently queued
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Performance counters for one agent, live or departed
    pub async fn performance(&self, agent_id: &str) -> Result<PerformanceCounters> {
        if let Some(agent) = self.agents.read().await.get(agent_id) {
            return Ok(agent.counters.clone());
        }
        self.departed
            .read()
            .await
            .get(agent_id)
            .map(|a| a.counters.clone())
            .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))
    }
}

#[cfg(test)]
mod tests;
