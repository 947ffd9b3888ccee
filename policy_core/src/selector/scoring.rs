//! Composite scoring of candidate actions.

use dialogue_state::{KnowledgeView, SituationComposition};
use serde::Serialize;

use crate::catalog::Action;
use crate::config::ScoringConfig;
use crate::signals::Priority;

/// Every term of a composite score, kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub affinity: f32,
    pub fields: f32,
    pub signal_bonus: f32,
    pub priority_bonus: f32,
    pub recency_penalty: f32,
    pub total: f32,
}

/// Inputs shared by every candidate in one selection.
pub struct ScoringContext<'a> {
    pub config: &'a ScoringConfig,
    pub situation: &'a SituationComposition,
    pub knowledge: &'a KnowledgeView,
}

impl ScoringContext<'_> {
    /// Score `action` as the answer to a signal of `signal_priority`.
    pub fn score(&self, action: &Action, signal_priority: Priority, recently_used: bool) -> ScoreBreakdown {
        let affinity = self.situation.dot(&action.affinity) * self.config.affinity_weight;

        // Missing or unclassifiable fields contribute nothing.
        let fields = action
            .field_weights
            .iter()
            .map(|(path, weight)| weight * self.knowledge.normalized(path).unwrap_or(0.0))
            .sum::<f32>();

        let signal_bonus = self.config.signal_bonus.for_priority(signal_priority);
        let priority_bonus = self.config.action_bonus.for_priority(action.priority);
        let recency_penalty = if recently_used {
            self.config.recency_penalty
        } else {
            0.0
        };

        ScoreBreakdown {
            affinity,
            fields,
            signal_bonus,
            priority_bonus,
            recency_penalty,
            total: affinity + fields + signal_bonus + priority_bonus - recency_penalty,
        }
    }

    /// Relevance of `candidate` as a follow-up to `reactive`.
    pub fn relevance(&self, reactive: &Action, candidate: &Action) -> f32 {
        let same_category = if reactive.category == candidate.category {
            self.config.same_category_relevance
        } else {
            0.0
        };
        same_category
            + self.config.shared_dimension_relevance * reactive.shared_dimensions(candidate) as f32
    }
}
