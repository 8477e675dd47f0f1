//! Agent fleet management
//!
//! Agents, their tasks, the bounded task queue and the distribution
//! strategies that pick assignees.

mod agent;
mod manager;
mod strategy;
mod task;

pub use agent::{Agent, AgentPersonality, AgentRole, AgentSpec, Capability, PerformanceCounters};
pub use manager::AgentManager;
pub use strategy::{DistributionStrategy, LeastLoaded, PerformanceWeighted};
pub use task::{Task, TaskRequest, TaskStatus};
