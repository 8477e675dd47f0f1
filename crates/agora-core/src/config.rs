//! Hub configuration
//!
//! Deserialized by the binary from the layered `config` sources and
//! passed down to every manager. Defaults match the documented
//! behavior so an empty config file is a working hub.

use crate::event_bus::DropPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level hub configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubConfig {
    /// Root of persisted state; resolved by the binary when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Journal behavior
    #[serde(default)]
    pub journal: JournalConfig,
    /// Event bus defaults
    #[serde(default)]
    pub event_bus: EventBusConfig,
    /// Agent manager knobs
    #[serde(default)]
    pub agent: AgentConfig,
    /// Provider call behavior
    #[serde(default)]
    pub provider: ProviderConfig,
    /// File store limits
    #[serde(default)]
    pub file: FileConfig,
    /// Per-conversation-type settings overrides, keyed by type tag
    #[serde(default)]
    pub conversation: HashMap<String, serde_json::Value>,
}

/// Journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Fsync every append before returning
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { fsync: true }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Default bounded buffer size per subscriber
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Default drop policy for subscribers that do not pick one
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
            drop_policy: DropPolicy::default(),
        }
    }
}

/// Agent manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Bounded task queue capacity
    #[serde(default = "default_task_queue_capacity")]
    pub task_queue_capacity: usize,
    /// Smoothing factor for success/error/latency moving averages
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            task_queue_capacity: default_task_queue_capacity(),
            smoothing: default_smoothing(),
        }
    }
}

/// Provider call configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Deadline applied to provider calls that do not carry one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Retry schedule for transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Default deadline as a [`Duration`]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Retry schedule: exponential backoff with a delay cap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First retry delay in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub base_ms: u64,
    /// Delay multiplier per attempt
    #[serde(default = "default_retry_factor")]
    pub factor: f64,
    /// Total attempts, the initial request included
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound on any single delay in milliseconds
    #[serde(default = "default_retry_cap_ms")]
    pub cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            factor: default_retry_factor(),
            max_attempts: default_retry_max_attempts(),
            cap_ms: default_retry_cap_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based), capped
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_ms as f64 * self.factor.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((raw as u64).min(self.cap_ms))
    }
}

/// File store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Upload size limit in bytes
    #[serde(default = "default_file_max_bytes")]
    pub max_bytes: u64,
    /// Allowed extensions; empty means the built-in allow-list
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_file_max_bytes(),
            allowed_extensions: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_task_queue_capacity() -> usize {
    100
}

fn default_smoothing() -> f64 {
    0.2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_factor() -> f64 {
    2.0
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_cap_ms() -> u64 {
    30_000
}

fn default_file_max_bytes() -> u64 {
    100 * 1024 * 1024
}
