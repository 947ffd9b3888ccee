//! Tuning configuration.
//!
//! Every numeric constant the engine uses lives here. The defaults are tuning
//! values, not derived ones; deployments override them from a TOML file.

use dialogue_state::{Dimension, DimensionWeights, SituationComposition, NORMALIZATION_TOLERANCE};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::signals::{default_semantic_intents, Priority, SignalId};

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub situation: SituationConfig,
    pub scoring: ScoringConfig,
    pub budget: BudgetConfig,
    pub detection: DetectionConfig,
    pub dynamics: DynamicsConfig,
    pub context: ContextConfig,
}

impl PolicyConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: PolicyConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject configurations that would break engine invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.situation.validate()?;
        self.budget.validate()?;
        self.detection.validate()?;

        if self.scoring.recency_window == 0 {
            return Err(ConfigError::Invalid(
                "scoring.recency_window must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.dynamics.emotion_retain) {
            return Err(ConfigError::Invalid(
                "dynamics.emotion_retain must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Situation vector dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SituationConfig {
    /// Weight added to a dimension per matching signal.
    pub increment: f32,

    /// Fraction of the distance to the baseline covered each turn (0.0-1.0).
    pub decay_fraction: f32,

    /// Resting composition the vector decays toward.
    pub baseline: DimensionWeights,
}

impl Default for SituationConfig {
    fn default() -> Self {
        let baseline = Dimension::ALL
            .into_iter()
            .map(|d| {
                let weight = match d {
                    Dimension::Discovery => 0.25,
                    Dimension::Assessment => 0.15,
                    _ => 0.10,
                };
                (d, weight)
            })
            .collect();

        Self {
            increment: 0.2,
            decay_fraction: 0.1,
            baseline,
        }
    }
}

impl SituationConfig {
    pub fn baseline_composition(&self) -> SituationComposition {
        SituationComposition::from_weights(&self.baseline)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.increment < 0.0 {
            return Err(ConfigError::Invalid(
                "situation.increment must not be negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decay_fraction) {
            return Err(ConfigError::Invalid(
                "situation.decay_fraction must be within [0, 1]".to_string(),
            ));
        }
        if self.baseline.values().any(|w| *w < 0.0) {
            return Err(ConfigError::Invalid(
                "situation.baseline weights must not be negative".to_string(),
            ));
        }
        let total: f32 = self.baseline.values().sum();
        if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(ConfigError::Invalid(format!(
                "situation.baseline must sum to 1.0, got {:.4}",
                total
            )));
        }
        Ok(())
    }
}

/// Bonus per priority level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityBonus {
    pub critical: f32,
    pub high: f32,
    pub medium: f32,
    pub low: f32,
}

impl PriorityBonus {
    pub fn for_priority(&self, priority: Priority) -> f32 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Composite score weights for action selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Multiplier on the situation affinity dot product.
    pub affinity_weight: f32,
    pub signal_bonus: PriorityBonus,
    pub action_bonus: PriorityBonus,

    /// Subtracted when the action was used within the recency window.
    pub recency_penalty: f32,
    /// Number of past selections the selector remembers.
    pub recency_window: usize,

    /// Minimum relevance for a proactive action to follow the reactive one.
    pub continuity_threshold: f32,
    pub same_category_relevance: f32,
    pub shared_dimension_relevance: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            affinity_weight: 10.0,
            signal_bonus: PriorityBonus {
                critical: 5.0,
                high: 3.0,
                medium: 1.0,
                low: 0.0,
            },
            action_bonus: PriorityBonus {
                critical: 8.0,
                high: 4.0,
                medium: 2.0,
                low: 0.0,
            },
            recency_penalty: 5.0,
            recency_window: 10,
            continuity_threshold: 0.5,
            same_category_relevance: 0.5,
            shared_dimension_relevance: 0.3,
        }
    }
}

/// Token budgets per composition slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub reactive: u32,
    pub proactive_primary: u32,
    pub proactive_secondary: u32,
    /// Hard cap on the sum of all slots.
    pub ceiling: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            reactive: 150,
            proactive_primary: 100,
            proactive_secondary: 60,
            ceiling: 310,
        }
    }
}

impl BudgetConfig {
    /// Budget for the proactive slot at `position` (0 or 1).
    pub fn proactive_slot(&self, position: usize) -> u32 {
        match position {
            0 => self.proactive_primary,
            _ => self.proactive_secondary,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.reactive > self.proactive_primary && self.proactive_primary > self.proactive_secondary) {
            return Err(ConfigError::Invalid(
                "budget slots must be ordered reactive > proactive_primary > proactive_secondary"
                    .to_string(),
            ));
        }
        let total = self
            .reactive
            .checked_add(self.proactive_primary)
            .and_then(|sum| sum.checked_add(self.proactive_secondary))
            .ok_or_else(|| ConfigError::Invalid("budget slots overflow".to_string()))?;
        if total > self.ceiling {
            return Err(ConfigError::Invalid(format!(
                "budget slots sum to {} which exceeds the ceiling of {}",
                total, self.ceiling
            )));
        }
        Ok(())
    }
}

/// An intent the semantic matcher is asked about when lexical rules miss it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticIntent {
    pub signal: SignalId,
    pub examples: Vec<String>,
    pub threshold: f32,
}

/// Signal detection thresholds and vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub frustration_threshold: f32,
    pub confusion_threshold: f32,
    /// Turns without progress before a stalled signal.
    pub stalled_turns: u32,
    /// A milestone is signalled every this many rated components.
    pub milestone_interval: u32,
    /// Consecutive fallback turns before a repeated-fallback signal.
    pub fallback_streak: u32,

    /// Vocabulary that marks an utterance as about the subject domain.
    pub domain_terms: Vec<String>,
    /// Profanity-equivalent intensity markers.
    pub intensity_markers: Vec<String>,
    pub semantic_intents: Vec<SemanticIntent>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let to_strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };

        Self {
            frustration_threshold: 0.7,
            confusion_threshold: 0.7,
            stalled_turns: 3,
            milestone_interval: 3,
            fallback_streak: 2,
            domain_terms: to_strings(&[
                "data quality",
                "data",
                "process",
                "processes",
                "tooling",
                "tools",
                "reporting",
                "reports",
                "pipeline",
                "governance",
                "documentation",
                "onboarding",
                "workflow",
                "infrastructure",
                "security",
                "testing",
                "deployment",
                "analytics",
                "integration",
                "automation",
                "customer experience",
            ]),
            intensity_markers: to_strings(&[
                "damn", "dammit", "hell", "crap", "crappy", "shit", "shitty", "fuck", "fucking",
                "freaking", "frickin", "bloody", "wtf", "f***", "s***",
            ]),
            semantic_intents: default_semantic_intents(),
        }
    }
}

impl DetectionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("frustration_threshold", self.frustration_threshold),
            ("confusion_threshold", self.confusion_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "detection.{} must be within [0, 1]",
                    name
                )));
            }
        }
        if let Some(intent) = self
            .semantic_intents
            .iter()
            .find(|i| !(0.0..=1.0).contains(&i.threshold))
        {
            return Err(ConfigError::Invalid(format!(
                "semantic intent {} has a threshold outside [0, 1]",
                intent.signal
            )));
        }
        Ok(())
    }
}

/// How signals move the conversation's emotional readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    pub frustration_step: f32,
    pub confusion_step: f32,
    pub engagement_step: f32,
    /// Fraction of frustration and confusion kept at the end of each turn.
    pub emotion_retain: f32,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            frustration_step: 0.3,
            confusion_step: 0.3,
            engagement_step: 0.1,
            emotion_retain: 0.8,
        }
    }
}

/// Selective-context and fallback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Number of past turns of action history exposed to the generator.
    pub history_window: usize,
    /// Text returned when the generator fails or is absent.
    pub fallback_text: String,
    /// Action category whose selection counts as explaining a component.
    pub education_category: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            fallback_text: "Sorry, I lost my train of thought there. Could you tell me a bit more about what you're looking for?".to_string(),
            education_category: "education".to_string(),
        }
    }
}
