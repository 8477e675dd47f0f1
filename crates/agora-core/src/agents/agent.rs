//! Agent types and performance counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role an agent plays in conversations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Directs other agents and keeps discussions on track
    Coordinator,
    /// Deep domain expertise
    Specialist,
    /// Challenges answers and hunts for flaws
    Critic,
    /// Merges several answers into one
    Synthesizer,
    /// Gathers and verifies information
    Researcher,
    /// Turns plans into artifacts
    Implementer,
    /// Reviews other participants' work
    Reviewer,
}

impl AgentRole {
    /// Returns the string representation of the role
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Specialist => "specialist",
            Self::Critic => "critic",
            Self::Synthesizer => "synthesizer",
            Self::Researcher => "researcher",
            Self::Implementer => "implementer",
            Self::Reviewer => "reviewer",
        }
    }
}

/// Personality flavor injected into the system preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPersonality {
    /// Methodical, evidence-first
    Analytical,
    /// Generates unconventional options
    Creative,
    /// Doubts by default
    Skeptical,
    /// Builds on others' contributions
    Collaborative,
    /// Short answers, no digressions
    Efficient,
    /// Exhaustive coverage
    Thorough,
    /// Softens disagreement
    Diplomatic,
}

impl AgentPersonality {
    /// Returns the string representation of the personality
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Creative => "creative",
            Self::Skeptical => "skeptical",
            Self::Collaborative => "collaborative",
            Self::Efficient => "efficient",
            Self::Thorough => "thorough",
            Self::Diplomatic => "diplomatic",
        }
    }
}

/// Capability tag used by specialist routing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// General prose
    TextGeneration,
    /// Writing and editing code
    CodeGeneration,
    /// Working with structured data
    DataAnalysis,
    /// Searching external sources
    WebSearch,
    /// Reading and transforming files
    FileProcessing,
    /// Multi-step reasoning
    Reasoning,
    /// Language translation
    Translation,
    /// Condensing long inputs
    Summarization,
    /// Anything the taxonomy does not name
    #[serde(untagged)]
    Other(String),
}

impl Capability {
    /// The tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TextGeneration => "text_generation",
            Self::CodeGeneration => "code_generation",
            Self::DataAnalysis => "data_analysis",
            Self::WebSearch => "web_search",
            Self::FileProcessing => "file_processing",
            Self::Reasoning => "reasoning",
            Self::Translation => "translation",
            Self::Summarization => "summarization",
            Self::Other(tag) => tag,
        }
    }
}

/// Performance counters for one agent
///
/// Assigned/completed counts are monotonic; the rates are exponential
/// moving averages over task outcomes and the quality score over
/// caller-supplied scores in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceCounters {
    /// Tasks ever assigned
    pub tasks_assigned: u64,
    /// Tasks ever completed successfully
    pub tasks_completed: u64,
    /// EMA of success outcomes
    pub success_rate: f64,
    /// EMA of failure outcomes
    pub error_rate: f64,
    /// EMA of task latency in milliseconds
    pub avg_latency_ms: f64,
    /// EMA of caller-supplied quality scores, bounded [0, 1]
    pub quality_score: f64,
    /// Last activity of any kind
    pub last_seen: DateTime<Utc>,
}

impl PerformanceCounters {
    /// Fresh counters with a neutral quality score
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            tasks_assigned: 0,
            tasks_completed: 0,
            success_rate: 0.0,
            error_rate: 0.0,
            avg_latency_ms: 0.0,
            quality_score: 0.5,
            last_seen: now,
        }
    }

    /// Record a terminal task outcome
    pub fn record_outcome(
        &mut self,
        success: bool,
        latency_ms: u64,
        quality: Option<f64>,
        smoothing: f64,
        now: DateTime<Utc>,
    ) {
        let alpha = smoothing.clamp(0.0, 1.0);
        if success {
            self.tasks_completed += 1;
        }
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = (1.0 - alpha) * self.success_rate + alpha * outcome;
        self.error_rate = (1.0 - alpha) * self.error_rate + alpha * (1.0 - outcome);
        self.avg_latency_ms = if self.avg_latency_ms == 0.0 {
            latency_ms as f64
        } else {
            (1.0 - alpha) * self.avg_latency_ms + alpha * latency_ms as f64
        };
        if let Some(score) = quality {
            let score = score.clamp(0.0, 1.0);
            self.quality_score = (1.0 - alpha) * self.quality_score + alpha * score;
        }
        self.last_seen = now;
    }

    /// Tasks assigned but not yet terminal
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.tasks_assigned.saturating_sub(self.tasks_completed)
    }
}

/// A managed agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent id
    pub id: String,
    /// Human-facing name
    pub display_name: String,
    /// Role tag
    pub role: AgentRole,
    /// Personality tag
    pub personality: AgentPersonality,
    /// Provider the agent completes through
    pub provider_id: String,
    /// Model the agent uses
    pub model_id: String,
    /// Declared capabilities
    pub capabilities: BTreeSet<Capability>,
    /// Token budget per completion
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Whether the agent accepts new work
    pub is_active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last configuration change
    pub updated_at: DateTime<Utc>,
    /// Performance counters
    pub counters: PerformanceCounters,
}

/// Builder-style agent definition used on registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent id; must be unique
    pub id: String,
    /// Human-facing name
    pub display_name: String,
    /// Role tag
    pub role: AgentRole,
    /// Personality tag
    pub personality: AgentPersonality,
    /// Provider the agent completes through
    pub provider_id: String,
    /// Model the agent uses
    pub model_id: String,
    /// Declared capabilities
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Token budget per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

impl AgentSpec {
    /// Materialize the spec into a live agent
    #[must_use]
    pub fn into_agent(self, now: DateTime<Utc>) -> Agent {
        Agent {
            id: self.id,
            display_name: self.display_name,
            role: self.role,
            personality: self.personality,
            provider_id: self.provider_id,
            model_id: self.model_id,
            capabilities: self.capabilities,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            is_active: true,
            created_at: now,
            updated_at: now,
            counters: PerformanceCounters::new(now),
        }
    }
}
