//! Signal detection - turns an utterance plus conversation state into cues.
//!
//! Detection runs in four passes:
//! 1. **Explicit**: literal requests (navigation, help, review, ...)
//! 2. **Implicit**: inferred needs, with ratings checked before anything else
//!    so a rated component is an assessment, not an education opportunity
//! 3. **Proactive opportunities**: context worth extracting or explaining,
//!    suppressed once the knowledge state already has it
//! 4. **State-based**: thresholds on the knowledge state alone
//!
//! The result is sorted by priority, highest first.

mod lexicon;
mod semantic;

pub use lexicon::*;
pub use semantic::*;

use dialogue_state::{Dimension, KnowledgeState};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::config::{DetectionConfig, SemanticIntent};

/// Longest utterance excerpt carried in a signal payload, in characters.
const PAYLOAD_EXCERPT_CHARS: usize = 120;

/// Priority shared by signals and catalog actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Explicit,
    Implicit,
    ProactiveOpportunity,
    StateBased,
}

/// What a signal is about. Each category feeds exactly one situation dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Navigation,
    Help,
    Review,
    Recommendation,
    Analysis,
    Confusion,
    Contradiction,
    ScopeAmbiguity,
    Assessment,
    Discovery,
    Frustration,
    Satisfaction,
    NonSubstantive,
    ContextExtraction,
    Education,
    Onboarding,
    Stalled,
    Milestone,
    Recovery,
}

impl SignalCategory {
    /// The fixed category -> dimension table.
    pub fn dimension(self) -> Dimension {
        match self {
            SignalCategory::Discovery | SignalCategory::Onboarding => Dimension::Discovery,
            SignalCategory::Assessment => Dimension::Assessment,
            SignalCategory::Analysis => Dimension::Analysis,
            SignalCategory::Recommendation => Dimension::Recommendation,
            SignalCategory::ContextExtraction => Dimension::Feasibility,
            SignalCategory::Help
            | SignalCategory::Confusion
            | SignalCategory::ScopeAmbiguity
            | SignalCategory::Education => Dimension::Clarification,
            SignalCategory::Review | SignalCategory::Contradiction | SignalCategory::Milestone => {
                Dimension::Validation
            }
            SignalCategory::Navigation
            | SignalCategory::Frustration
            | SignalCategory::Satisfaction
            | SignalCategory::NonSubstantive
            | SignalCategory::Stalled
            | SignalCategory::Recovery => Dimension::Meta,
        }
    }

    /// Whether a signal of this category counts as forward progress.
    pub fn is_progress(self) -> bool {
        matches!(
            self,
            SignalCategory::Assessment | SignalCategory::Discovery | SignalCategory::ContextExtraction
        )
    }
}

/// Stable signal identifiers. Catalog trigger bindings refer to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalId {
    NavigationRequest,
    HelpRequest,
    ReviewRequest,
    RecommendationRequest,
    AnalysisRequest,
    UserConfused,
    Contradiction,
    ScopeAmbiguity,
    ComponentRating,
    ImprovementNeed,
    Dissatisfaction,
    PainPointRevealed,
    UserFrustrated,
    PositiveAcknowledgment,
    NonSubstantive,
    TimelineMentioned,
    BudgetMentioned,
    StakeholderMentioned,
    EducationOpportunity,
    FirstTurn,
    FrustrationThreshold,
    ConfusionThreshold,
    StalledProgress,
    Milestone,
    RepeatedFallback,
}

impl SignalId {
    /// Default kind, category, and priority for this signal.
    pub fn profile(self) -> (SignalKind, SignalCategory, Priority) {
        use SignalCategory as C;
        use SignalKind as K;

        match self {
            SignalId::NavigationRequest => (K::Explicit, C::Navigation, Priority::High),
            SignalId::HelpRequest => (K::Explicit, C::Help, Priority::High),
            SignalId::ReviewRequest => (K::Explicit, C::Review, Priority::Medium),
            SignalId::RecommendationRequest => (K::Explicit, C::Recommendation, Priority::High),
            SignalId::AnalysisRequest => (K::Explicit, C::Analysis, Priority::Medium),
            SignalId::UserConfused => (K::Implicit, C::Confusion, Priority::Critical),
            SignalId::Contradiction => (K::Implicit, C::Contradiction, Priority::High),
            SignalId::ScopeAmbiguity => (K::Implicit, C::ScopeAmbiguity, Priority::Medium),
            SignalId::ComponentRating => (K::Implicit, C::Assessment, Priority::High),
            SignalId::ImprovementNeed => (K::Implicit, C::Discovery, Priority::Medium),
            SignalId::Dissatisfaction => (K::Implicit, C::Discovery, Priority::Medium),
            SignalId::PainPointRevealed => (K::Implicit, C::Discovery, Priority::Critical),
            SignalId::UserFrustrated => (K::Implicit, C::Frustration, Priority::High),
            SignalId::PositiveAcknowledgment => (K::Implicit, C::Satisfaction, Priority::Low),
            SignalId::NonSubstantive => (K::Implicit, C::NonSubstantive, Priority::Low),
            SignalId::TimelineMentioned => {
                (K::ProactiveOpportunity, C::ContextExtraction, Priority::Medium)
            }
            SignalId::BudgetMentioned => {
                (K::ProactiveOpportunity, C::ContextExtraction, Priority::Medium)
            }
            SignalId::StakeholderMentioned => {
                (K::ProactiveOpportunity, C::ContextExtraction, Priority::Low)
            }
            SignalId::EducationOpportunity => (K::ProactiveOpportunity, C::Education, Priority::Low),
            SignalId::FirstTurn => (K::StateBased, C::Onboarding, Priority::High),
            SignalId::FrustrationThreshold => (K::StateBased, C::Frustration, Priority::Critical),
            SignalId::ConfusionThreshold => (K::StateBased, C::Confusion, Priority::Critical),
            SignalId::StalledProgress => (K::StateBased, C::Stalled, Priority::Medium),
            SignalId::Milestone => (K::StateBased, C::Milestone, Priority::Medium),
            SignalId::RepeatedFallback => (K::StateBased, C::Recovery, Priority::High),
        }
    }
}

impl FromStr for SignalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string()))
            .map_err(|_| format!("unknown signal id: {}", s))
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => write!(f, "{}", name),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// Structured detail attached to some signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalDetail {
    /// A rating, with the component it applies to when one was named.
    Rating {
        component: Option<String>,
        score: u8,
        quantitative: bool,
    },
    /// A domain component the signal concerns.
    Component { name: String },
}

/// A detected cue. Produced fresh every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub kind: SignalKind,
    pub category: SignalCategory,
    pub priority: Priority,

    /// Set when an intensity marker re-weighted this signal.
    pub intensity: bool,

    /// Excerpt of the source utterance (empty for state-based signals).
    pub payload: String,

    pub detail: Option<SignalDetail>,
}

impl Signal {
    /// Create a signal with its default profile.
    pub fn new(id: SignalId, payload: impl Into<String>) -> Self {
        let (kind, category, priority) = id.profile();
        Self {
            id,
            kind,
            category,
            priority,
            intensity: false,
            payload: payload.into(),
            detail: None,
        }
    }

    /// Create a state-based signal with no utterance payload.
    pub fn from_state(id: SignalId) -> Self {
        Self::new(id, String::new())
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Mark as re-weighted by an intensity marker.
    pub fn with_intensity(mut self, intensity: bool) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_detail(mut self, detail: SignalDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// The situation dimension this signal reinforces.
    pub fn dimension(&self) -> Dimension {
        self.category.dimension()
    }

    /// Component named in the detail, if any.
    pub fn component(&self) -> Option<&str> {
        match &self.detail {
            Some(SignalDetail::Rating { component, .. }) => component.as_deref(),
            Some(SignalDetail::Component { name }) => Some(name.as_str()),
            None => None,
        }
    }
}

/// Sort highest priority first. Equal priorities keep detection order.
pub fn sort_by_priority(signals: &mut [Signal]) {
    signals.sort_by(|a, b| b.priority.cmp(&a.priority));
}

/// The narrow classifier seam: utterance plus state in, ordered signals out.
///
/// The engine only talks to this trait, so the lexical detector can be replaced
/// by a learned classifier without touching selection or situation tracking.
pub trait SignalSource: Send {
    fn detect(&self, utterance: &str, knowledge: &KnowledgeState) -> Vec<Signal>;
}

/// Lexical detector with an optional semantic matcher for hard-to-phrase intents.
pub struct SignalDetector {
    lexicon: Lexicon,
    config: DetectionConfig,
    semantic: Option<Box<dyn SemanticMatcher>>,
}

impl SignalDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            lexicon: Lexicon::new(config),
            config: config.clone(),
            semantic: None,
        }
    }

    /// Attach a semantic matcher consulted for the configured intents.
    pub fn with_matcher(mut self, matcher: Box<dyn SemanticMatcher>) -> Self {
        self.semantic = Some(matcher);
        self
    }

    fn explicit_signals(&self, features: &UtteranceFeatures, excerpt: &str, out: &mut Vec<Signal>) {
        out.extend(
            features
                .explicit
                .iter()
                .map(|id| Signal::new(*id, excerpt)),
        );
    }

    fn implicit_signals(&self, features: &UtteranceFeatures, excerpt: &str, out: &mut Vec<Signal>) {
        let first_component = features.components.first().cloned();

        // Ratings first: they take precedence over education opportunities.
        // A marker on a dissatisfied qualitative remark makes it a pain point instead.
        let pain_point = features.intensity && features.dissatisfied && features.has_domain_vocabulary();
        if let Some((score, quantitative)) = features.rating() {
            if quantitative || !pain_point {
                out.push(
                    Signal::new(SignalId::ComponentRating, excerpt).with_detail(SignalDetail::Rating {
                        component: first_component.clone(),
                        score,
                        quantitative,
                    }),
                );
            }
        }

        if pain_point {
            let mut signal = Signal::new(SignalId::PainPointRevealed, excerpt)
                .with_priority(Priority::Critical)
                .with_intensity(true);
            if let Some(name) = first_component.clone() {
                signal = signal.with_detail(SignalDetail::Component { name });
            }
            out.push(signal);
        } else if features.dissatisfied {
            out.push(Signal::new(SignalId::Dissatisfaction, excerpt).with_intensity(features.intensity));
        }

        if features.frustrated {
            let mut signal = Signal::new(SignalId::UserFrustrated, excerpt);
            if features.intensity {
                signal = signal.with_priority(Priority::Critical).with_intensity(true);
            }
            out.push(signal);
        }

        if features.satisfied {
            out.push(
                Signal::new(SignalId::PositiveAcknowledgment, excerpt)
                    .with_priority(Priority::Low)
                    .with_intensity(features.intensity),
            );
        }

        if features.intensity && !features.has_sentiment() && !features.has_domain_vocabulary() {
            out.push(Signal::new(SignalId::NonSubstantive, excerpt).with_intensity(true));
        }

        if features.confused {
            out.push(Signal::new(SignalId::UserConfused, excerpt));
        }
        if features.contradiction {
            out.push(Signal::new(SignalId::Contradiction, excerpt));
        }
        if features.scope_ambiguous {
            out.push(Signal::new(SignalId::ScopeAmbiguity, excerpt));
        }
        if features.improvement && !pain_point {
            let mut signal = Signal::new(SignalId::ImprovementNeed, excerpt);
            if let Some(name) = first_component {
                signal = signal.with_detail(SignalDetail::Component { name });
            }
            out.push(signal);
        }
    }

    fn opportunity_signals(
        &self,
        features: &UtteranceFeatures,
        knowledge: &KnowledgeState,
        excerpt: &str,
        component_claimed: bool,
        out: &mut Vec<Signal>,
    ) {
        let system = &knowledge.system;

        if features.timeline && !system.timeline_known {
            out.push(Signal::new(SignalId::TimelineMentioned, excerpt));
        }
        if features.budget && !system.budget_known {
            out.push(Signal::new(SignalId::BudgetMentioned, excerpt));
        }
        if features.stakeholder && !system.stakeholders_known {
            out.push(Signal::new(SignalId::StakeholderMentioned, excerpt));
        }

        if component_claimed {
            return;
        }
        let unexplained = features
            .components
            .iter()
            .find(|c| !knowledge.user.explained_components.contains(*c));
        if let Some(name) = unexplained {
            out.push(
                Signal::new(SignalId::EducationOpportunity, excerpt)
                    .with_detail(SignalDetail::Component { name: name.clone() }),
            );
        }
    }

    fn semantic_signals(&self, utterance: &str, out: &mut Vec<Signal>) {
        let Some(matcher) = self.semantic.as_deref() else {
            return;
        };

        for intent in &self.config.semantic_intents {
            if out.iter().any(|s| s.id == intent.signal) {
                continue;
            }
            match matcher.matches(utterance, &intent.examples, intent.threshold) {
                Ok(result) if result.matched => {
                    debug!(signal = %intent.signal, similarity = result.similarity, "semantic match");
                    out.push(Signal::new(intent.signal, excerpt(utterance)));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "semantic matcher unavailable, using lexical rules only");
                    return;
                }
            }
        }
    }

    fn state_signals(&self, knowledge: &KnowledgeState, out: &mut Vec<Signal>) {
        let conversation = &knowledge.conversation;

        if conversation.first_turn {
            out.push(Signal::from_state(SignalId::FirstTurn));
        }
        if conversation.frustration >= self.config.frustration_threshold {
            out.push(Signal::from_state(SignalId::FrustrationThreshold));
        }
        if conversation.confusion >= self.config.confusion_threshold {
            out.push(Signal::from_state(SignalId::ConfusionThreshold));
        }
        if conversation.turns_since_progress >= self.config.stalled_turns {
            out.push(Signal::from_state(SignalId::StalledProgress));
        }

        let rated = knowledge.rated_count();
        if self.config.milestone_interval > 0
            && rated > 0
            && rated % self.config.milestone_interval == 0
            && rated > conversation.last_milestone
        {
            out.push(Signal::from_state(SignalId::Milestone));
        }

        if conversation.fallback_streak >= self.config.fallback_streak {
            out.push(Signal::from_state(SignalId::RepeatedFallback));
        }
    }
}

impl SignalSource for SignalDetector {
    fn detect(&self, utterance: &str, knowledge: &KnowledgeState) -> Vec<Signal> {
        let features = self.lexicon.features(utterance);
        let excerpt = excerpt(utterance);
        let mut signals = Vec::new();

        self.explicit_signals(&features, &excerpt, &mut signals);
        self.implicit_signals(&features, &excerpt, &mut signals);
        // A rated component stays an assessment even when the rating became a pain point.
        let component_claimed = features.rating().is_some()
            || signals
                .iter()
                .any(|s| matches!(s.id, SignalId::ComponentRating | SignalId::PainPointRevealed));
        self.opportunity_signals(&features, knowledge, &excerpt, component_claimed, &mut signals);
        self.semantic_signals(utterance, &mut signals);
        self.state_signals(knowledge, &mut signals);

        sort_by_priority(&mut signals);
        signals
    }
}

/// Trim and cap an utterance for use as a signal payload.
fn excerpt(utterance: &str) -> String {
    utterance.trim().chars().take(PAYLOAD_EXCERPT_CHARS).collect()
}

/// Build the intent list used when no configuration overrides it.
pub(crate) fn default_semantic_intents() -> Vec<SemanticIntent> {
    vec![
        SemanticIntent {
            signal: SignalId::UserConfused,
            examples: vec![
                "I have no idea what this means".to_string(),
                "this is going over my head".to_string(),
                "can you say that a different way".to_string(),
            ],
            threshold: 0.6,
        },
        SemanticIntent {
            signal: SignalId::HelpRequest,
            examples: vec![
                "what am I supposed to do here".to_string(),
                "how am I meant to use this".to_string(),
            ],
            threshold: 0.6,
        },
        SemanticIntent {
            signal: SignalId::RecommendationRequest,
            examples: vec!["what would you do in my position".to_string()],
            threshold: 0.6,
        },
    ]
}
