//! Conversation types and their configuration
//!
//! Types are data, not code: min/max participants, moderator
//! requirement and protocol settings load from a JSON file at startup
//! and are validated here. Only the message router branches on the
//! tag.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Conversation protocol tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Every participant speaks once per round; majority vote decides
    Democratic,
    /// Agents answer, a synthesizer refines
    Ensemble,
    /// Moderator selects every next speaker
    Hierarchical,
    /// Independent answers, scored; highest wins
    Competitive,
    /// Routing by declared capability
    Specialist,
    /// Agree/disagree rounds until a threshold is met
    Consensus,
    /// Divergent idea phase, then convergent critique phase
    Brainstorm,
    /// Two sides with timed speaking windows
    Debate,
    /// Anonymized cross-review of submissions
    PeerReview,
    /// Moderator only asks questions
    Socratic,
}

impl ConversationKind {
    /// All ten standard kinds
    pub const ALL: [ConversationKind; 10] = [
        Self::Democratic,
        Self::Ensemble,
        Self::Hierarchical,
        Self::Competitive,
        Self::Specialist,
        Self::Consensus,
        Self::Brainstorm,
        Self::Debate,
        Self::PeerReview,
        Self::Socratic,
    ];

    /// Returns the type tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Democratic => "democratic",
            Self::Ensemble => "ensemble",
            Self::Hierarchical => "hierarchical",
            Self::Competitive => "competitive",
            Self::Specialist => "specialist",
            Self::Consensus => "consensus",
            Self::Brainstorm => "brainstorm",
            Self::Debate => "debate",
            Self::PeerReview => "peer_review",
            Self::Socratic => "socratic",
        }
    }

    /// Whether message order is enforced against the turn cursor
    #[must_use]
    pub fn strict_turn(&self) -> bool {
        matches!(self, Self::Democratic | Self::Debate)
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConversationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown conversation type: {s}")))
    }
}

/// Protocol settings, one schema across all kinds.
///
/// Irrelevant fields for a kind are simply unused; unknown fields are
/// a configuration error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSettings {
    /// democratic: seconds a vote stays open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_timeout_seconds: Option<u64>,
    /// ensemble: refinement passes by the synthesizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_rounds: Option<u32>,
    /// competitive: seconds contestants get to answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<u64>,
    /// consensus: agree-ratio that ends the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_threshold: Option<f64>,
    /// consensus: wall-clock bound on the discussion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discussion_seconds: Option<u64>,
    /// consensus: round bound when the threshold is never met
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    /// debate: seconds per speaking window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking_time_seconds: Option<u64>,
    /// debate: seconds per rebuttal window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuttal_time_seconds: Option<u64>,
    /// socratic: follow-up question depth bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_followups: Option<u32>,
    /// router: prefix length bound; `None` means full history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
}

impl ProtocolSettings {
    /// democratic vote window, defaulted
    #[must_use]
    pub fn vote_timeout_seconds(&self) -> u64 {
        self.vote_timeout_seconds.unwrap_or(30)
    }

    /// ensemble refinement rounds, defaulted
    #[must_use]
    pub fn refinement_rounds(&self) -> u32 {
        self.refinement_rounds.unwrap_or(3)
    }

    /// competitive time limit, defaulted
    #[must_use]
    pub fn time_limit_seconds(&self) -> u64 {
        self.time_limit_seconds.unwrap_or(300)
    }

    /// consensus threshold, defaulted
    #[must_use]
    pub fn consensus_threshold(&self) -> f64 {
        self.consensus_threshold.unwrap_or(0.8)
    }

    /// consensus round bound, defaulted
    #[must_use]
    pub fn max_rounds(&self) -> u32 {
        self.max_rounds.unwrap_or(3)
    }

    /// debate speaking window, defaulted
    #[must_use]
    pub fn speaking_time_seconds(&self) -> u64 {
        self.speaking_time_seconds.unwrap_or(120)
    }

    /// debate rebuttal window, defaulted
    #[must_use]
    pub fn rebuttal_time_seconds(&self) -> u64 {
        self.rebuttal_time_seconds.unwrap_or(60)
    }

    /// socratic follow-up depth, defaulted
    #[must_use]
    pub fn max_followups(&self) -> u32 {
        self.max_followups.unwrap_or(3)
    }

    /// Sanity-check value ranges
    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.consensus_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::InvalidConfiguration(format!(
                    "consensus_threshold {threshold} outside [0, 1]"
                )));
            }
        }
        if self.refinement_rounds == Some(0) {
            return Err(Error::InvalidConfiguration(
                "refinement_rounds must be at least 1".to_string(),
            ));
        }
        if self.max_rounds == Some(0) {
            return Err(Error::InvalidConfiguration(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for one conversation type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConfig {
    /// Protocol tag
    pub kind: ConversationKind,
    /// Human-facing name
    pub display_name: String,
    /// One-line description
    pub description: String,
    /// Minimum participants to create
    pub min_participants: usize,
    /// Maximum participants allowed
    pub max_participants: usize,
    /// Whether a moderator must be among the participants
    pub requires_moderator: bool,
    /// Protocol settings
    #[serde(default)]
    pub settings: ProtocolSettings,
    /// Whether the type can be used
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Registry of conversation type configurations
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    configs: HashMap<ConversationKind, TypeConfig>,
}

impl TypeRegistry {
    /// The ten standard types with their documented defaults
    #[must_use]
    pub fn defaults() -> Self {
        let entry = |kind: ConversationKind,
                     display_name: &str,
                     description: &str,
                     min: usize,
                     max: usize,
                     moderator: bool,
                     settings: ProtocolSettings| {
            (
                kind,
                TypeConfig {
                    kind,
                    display_name: display_name.to_string(),
                    description: description.to_string(),
                    min_participants: min,
                    max_participants: max,
                    requires_moderator: moderator,
                    settings,
                    enabled: true,
                },
            )
        };

        let configs = HashMap::from([
            entry(
                ConversationKind::Democratic,
                "Democratic",
                "All participants discuss equally, decisions made by majority vote",
                2,
                20,
                false,
                ProtocolSettings {
                    vote_timeout_seconds: Some(30),
                    ..Default::default()
                },
            ),
            entry(
                ConversationKind::Ensemble,
                "Ensemble",
                "Agents build on each other's responses into a refined final output",
                2,
                10,
                false,
                ProtocolSettings {
                    refinement_rounds: Some(3),
                    ..Default::default()
                },
            ),
            entry(
                ConversationKind::Hierarchical,
                "Hierarchical",
                "Moderator directs the conversation, others follow the chain of command",
                2,
                50,
                true,
                ProtocolSettings::default(),
            ),
            entry(
                ConversationKind::Competitive,
                "Competitive",
                "Agents compete to provide the best solution, winner takes all",
                2,
                8,
                true,
                ProtocolSettings {
                    time_limit_seconds: Some(300),
                    ..Default::default()
                },
            ),
            entry(
                ConversationKind::Specialist,
                "Specialist",
                "Each agent has domain expertise and answers what it is best at",
                1,
                15,
                false,
                ProtocolSettings::default(),
            ),
            entry(
                ConversationKind::Consensus,
                "Consensus",
                "Agents work together until agreement is reached",
                3,
                12,
                true,
                ProtocolSettings {
                    consensus_threshold: Some(0.8),
                    max_discussion_seconds: Some(600),
                    max_rounds: Some(3),
                    ..Default::default()
                },
            ),
            entry(
                ConversationKind::Brainstorm,
                "Brainstorm",
                "Free-flow idea generation without criticism, then convergence",
                3,
                25,
                false,
                ProtocolSettings::default(),
            ),
            entry(
                ConversationKind::Debate,
                "Debate",
                "Structured debate on opposing viewpoints with formal timing",
                2,
                6,
                true,
                ProtocolSettings {
                    speaking_time_seconds: Some(120),
                    rebuttal_time_seconds: Some(60),
                    ..Default::default()
                },
            ),
            entry(
                ConversationKind::PeerReview,
                "Peer Review",
                "Agents review and critique each other's work, reviewers anonymized",
                2,
                8,
                false,
                ProtocolSettings::default(),
            ),
            entry(
                ConversationKind::Socratic,
                "Socratic",
                "Question-based dialogue; the moderator only ever asks",
                2,
                12,
                true,
                ProtocolSettings {
                    max_followups: Some(3),
                    ..Default::default()
                },
            ),
        ]);
        Self { configs }
    }

    /// Load from a JSON file, materializing defaults when missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let configs: HashMap<ConversationKind, TypeConfig> =
                    serde_json::from_str(&content).map_err(|e| {
                        Error::InvalidConfiguration(format!(
                            "failed to parse {}: {e}",
                            path.display()
                        ))
                    })?;
                let registry = Self { configs };
                registry.validate()?;
                info!(path = %path.display(), types = registry.configs.len(), "Conversation types loaded");
                Ok(registry)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let registry = Self::defaults();
                registry.save(path)?;
                info!(path = %path.display(), "Default conversation types written");
                Ok(registry)
            }
            Err(e) => Err(Error::Journal(agora_replay::Error::Io(e))),
        }
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(agora_replay::Error::Io)?;
        }
        let content = serde_json::to_string_pretty(&self.configs)
            .map_err(agora_replay::Error::Schema)?;
        std::fs::write(path, content).map_err(agora_replay::Error::Io)?;
        Ok(())
    }

    /// Check every config
    pub fn validate(&self) -> Result<()> {
        for config in self.configs.values() {
            if config.min_participants == 0 || config.min_participants > config.max_participants {
                return Err(Error::InvalidConfiguration(format!(
                    "{}: participant range [{}, {}] is invalid",
                    config.kind, config.min_participants, config.max_participants
                )));
            }
            config.settings.validate()?;
        }
        Ok(())
    }

    /// Merge per-type settings overrides (from the hub config) into the
    /// registry. Keys are type tags; values are settings objects.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, serde_json::Value>) -> Result<()> {
        for (tag, value) in overrides {
            let kind: ConversationKind = tag.parse()?;
            let settings: ProtocolSettings =
                serde_json::from_value(value.clone()).map_err(|e| {
                    Error::InvalidConfiguration(format!("conversation.{tag}: {e}"))
                })?;
            settings.validate()?;
            if let Some(config) = self.configs.get_mut(&kind) {
                config.settings = settings;
            }
        }
        Ok(())
    }

    /// Configuration for one kind
    #[must_use]
    pub fn get(&self, kind: ConversationKind) -> Option<&TypeConfig> {
        self.configs.get(&kind)
    }

    /// Enabled configurations, sorted by tag
    #[must_use]
    pub fn enabled(&self) -> Vec<&TypeConfig> {
        let mut enabled: Vec<&TypeConfig> =
            self.configs.values().filter(|c| c.enabled).collect();
        enabled.sort_by_key(|c| c.kind.as_str());
        enabled
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}
