//! Action selector - one reactive action and up to two proactive ones per turn.
//!
//! Reactive selection answers the highest-priority signals: every catalog
//! action bound to one of them whose prerequisites hold is scored, and the
//! best wins. Proactive selection ignores signals and ranks follow-up actions
//! by how well their situation affinity matches the current composition,
//! restricted to actions that continue the reactive action's topic.
//!
//! The selector owns one piece of state: the ids it recently chose
//! reactively, which feed the recency penalty.

mod scoring;

pub use scoring::*;

use dialogue_state::{KnowledgeView, SituationComposition};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use crate::catalog::{Action, ActionCatalog, ActionRole};
use crate::config::{BudgetConfig, ScoringConfig};
use crate::signals::{Signal, SignalId};

/// An action chosen for this turn with its token budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelectedAction<'a> {
    pub action: &'a Action,
    pub role: ActionRole,
    pub budget: u32,
    /// Composite score for reactive picks, situation affinity for proactive ones.
    pub score: f32,
}

impl SelectedAction<'_> {
    pub fn id(&self) -> &str {
        &self.action.id
    }

    pub fn category(&self) -> &str {
        &self.action.category
    }
}

/// The raw outcome of one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection<'a> {
    pub reactive: SelectedAction<'a>,
    pub proactive: Vec<SelectedAction<'a>>,

    /// Signal the reactive action answers; `None` for the fallback.
    pub trigger: Option<SignalId>,
    pub is_fallback: bool,
}

/// Chooses actions from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSelector {
    scoring: ScoringConfig,
    budget: BudgetConfig,
    history: VecDeque<String>,
}

impl ActionSelector {
    pub fn new(scoring: ScoringConfig, budget: BudgetConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(scoring.recency_window),
            scoring,
            budget,
        }
    }

    /// Select this turn's actions. `signals` must be sorted highest priority first.
    pub fn select<'a>(
        &self,
        catalog: &'a ActionCatalog,
        signals: &[Signal],
        situation: &SituationComposition,
        knowledge: &KnowledgeView,
    ) -> Selection<'a> {
        let ctx = ScoringContext {
            config: &self.scoring,
            situation,
            knowledge,
        };

        let Some((reactive, trigger)) = self.select_reactive(&ctx, catalog, signals) else {
            debug!(signals = signals.len(), "no reactive action qualifies, using fallback");
            return Selection {
                reactive: SelectedAction {
                    action: catalog.fallback(),
                    role: ActionRole::Reactive,
                    budget: self.budget.reactive,
                    score: 0.0,
                },
                proactive: Vec::new(),
                trigger: None,
                is_fallback: true,
            };
        };

        let proactive = self.select_proactive(&ctx, catalog, reactive.action);

        debug!(
            reactive = %reactive.action.id,
            trigger = %trigger,
            score = reactive.score,
            proactive = ?proactive.iter().map(|p| p.id()).collect::<Vec<_>>(),
            "actions selected"
        );

        Selection {
            reactive,
            proactive,
            trigger: Some(trigger),
            is_fallback: false,
        }
    }

    fn select_reactive<'a>(
        &self,
        ctx: &ScoringContext<'_>,
        catalog: &'a ActionCatalog,
        signals: &[Signal],
    ) -> Option<(SelectedAction<'a>, SignalId)> {
        let top = signals.iter().map(|s| s.priority).max()?;
        let mut best: Option<(SelectedAction<'a>, SignalId)> = None;

        for signal in signals.iter().filter(|s| s.priority == top) {
            for action in catalog.reactive_for(signal.id) {
                if !action.prerequisites_met(ctx.knowledge) {
                    continue;
                }
                let score = ctx.score(action, signal.priority, self.recently_used(&action.id));
                // Strictly greater: ties keep the earlier signal and catalog order.
                if best.as_ref().map_or(true, |(b, _)| score.total > b.score) {
                    best = Some((
                        SelectedAction {
                            action,
                            role: ActionRole::Reactive,
                            budget: self.budget.reactive,
                            score: score.total,
                        },
                        signal.id,
                    ));
                }
            }
        }

        best
    }

    fn select_proactive<'a>(
        &self,
        ctx: &ScoringContext<'_>,
        catalog: &'a ActionCatalog,
        reactive: &Action,
    ) -> Vec<SelectedAction<'a>> {
        let mut ranked: Vec<(&'a Action, f32)> = catalog
            .proactive()
            .filter(|a| a.id != reactive.id)
            .filter(|a| a.prerequisites_met(ctx.knowledge))
            .filter(|a| self.continues(ctx, reactive, a))
            .map(|a| (a, ctx.situation.dot(&a.affinity)))
            .filter(|(_, affinity)| *affinity > 0.0)
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranked
            .into_iter()
            .take(2)
            .enumerate()
            .map(|(position, (action, affinity))| SelectedAction {
                action,
                role: ActionRole::Proactive,
                budget: self.budget.proactive_slot(position),
                score: affinity,
            })
            .collect()
    }

    /// Continuity check. A same-category follow-up must also share a context key.
    fn continues(&self, ctx: &ScoringContext<'_>, reactive: &Action, candidate: &Action) -> bool {
        let shares_context = reactive.shares_context(candidate);
        if reactive.category == candidate.category {
            return shares_context;
        }
        shares_context || ctx.relevance(reactive, candidate) >= self.scoring.continuity_threshold
    }

    /// Whether `id` is among the remembered reactive selections.
    pub fn recently_used(&self, id: &str) -> bool {
        self.history.iter().any(|h| h == id)
    }

    /// Remember a reactive selection, forgetting the oldest past the window.
    pub fn record(&mut self, id: impl Into<String>) {
        self.history.push_back(id.into());
        while self.history.len() > self.scoring.recency_window {
            self.history.pop_front();
        }
    }

    /// Recent reactive selections, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::signals::{Priority, SignalDetector, SignalSource};
    use dialogue_state::{Dimension, DimensionWeights, KnowledgeState};

    const CATALOG: &str = r#"
        fallback = "general_response"

        [[actions]]
        id = "general_response"
        category = "general"
        triggers = ["non_substantive"]
        priority = "low"

        [[actions]]
        id = "rate_component"
        category = "assessment"
        triggers = ["component_rating"]
        priority = "high"
        context_keys = ["component"]

        [[actions]]
        id = "explain_component"
        category = "education"
        triggers = ["education_opportunity", "component_rating"]
        priority = "low"
        context_keys = ["component"]

        [[actions]]
        id = "calm_down"
        category = "support"
        triggers = ["user_frustrated"]
        priority = "high"

        [[actions]]
        id = "say_thanks"
        category = "social"
        triggers = ["positive_acknowledgment"]

        [[actions]]
        id = "clarify_a"
        category = "clarification"
        triggers = ["user_confused"]

        [[actions]]
        id = "clarify_b"
        category = "clarification"
        triggers = ["user_confused"]

        [[actions]]
        id = "gated"
        category = "assessment"
        triggers = ["help_request"]
        priority = "critical"
        [actions.prerequisites]
        "user.knows_rating_scale" = true

        [[actions]]
        id = "help"
        category = "help"
        triggers = ["help_request"]

        [[actions]]
        id = "ask_evidence"
        category = "assessment"
        affinity = { assessment = 1.0 }
        context_keys = ["component"]

        [[actions]]
        id = "ask_next_component"
        category = "assessment"
        affinity = { assessment = 0.8, discovery = 0.2 }

        [[actions]]
        id = "ask_timeline"
        category = "feasibility"
        affinity = { feasibility = 1.0 }

        [[actions]]
        id = "deep_dive"
        category = "analysis"
        affinity = { analysis = 1.0 }
        context_keys = ["component"]
    "#;

    fn catalog() -> ActionCatalog {
        ActionCatalog::from_toml_str(CATALOG).unwrap()
    }

    fn selector() -> ActionSelector {
        let config = PolicyConfig::default();
        ActionSelector::new(config.scoring, config.budget)
    }

    fn situation(pairs: &[(Dimension, f32)]) -> SituationComposition {
        let weights: DimensionWeights = pairs.iter().copied().collect();
        SituationComposition::from_weights(&weights)
    }

    #[test]
    fn test_zero_signals_selects_fallback() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();

        let selection = selector().select(&catalog, &[], &SituationComposition::uniform(), &view);

        assert!(selection.is_fallback);
        assert_eq!(selection.reactive.id(), "general_response");
        assert!(selection.proactive.is_empty());
        assert_eq!(selection.trigger, None);
    }

    #[test]
    fn test_unmatched_signal_selects_fallback() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();
        let signals = vec![Signal::new(SignalId::BudgetMentioned, "budget")];

        let selection = selector().select(&catalog, &signals, &SituationComposition::uniform(), &view);
        assert!(selection.is_fallback);
    }

    #[test]
    fn test_critical_signal_beats_low() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();
        let mut signals = vec![
            Signal::new(SignalId::PositiveAcknowledgment, "").with_priority(Priority::Low),
            Signal::new(SignalId::UserFrustrated, "").with_priority(Priority::Critical),
        ];
        crate::signals::sort_by_priority(&mut signals);

        let selection = selector().select(&catalog, &signals, &SituationComposition::uniform(), &view);
        assert_eq!(selection.reactive.id(), "calm_down");
        assert_eq!(selection.trigger, Some(SignalId::UserFrustrated));
    }

    #[test]
    fn test_prerequisites_gate_reactive() {
        let catalog = catalog();
        let signals = vec![Signal::new(SignalId::HelpRequest, "help")];

        let view = KnowledgeState::new().view();
        let selection = selector().select(&catalog, &signals, &SituationComposition::uniform(), &view);
        assert_eq!(selection.reactive.id(), "help");

        let mut knowledge = KnowledgeState::new();
        knowledge.user.knows_rating_scale = true;
        let selection =
            selector().select(&catalog, &signals, &SituationComposition::uniform(), &knowledge.view());
        assert_eq!(selection.reactive.id(), "gated");
    }

    #[test]
    fn test_recency_penalty_lets_equal_alternative_win() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();
        let signals = vec![Signal::new(SignalId::UserConfused, "huh")];
        let mut selector = selector();

        let first = selector.select(&catalog, &signals, &SituationComposition::uniform(), &view);
        assert_eq!(first.reactive.id(), "clarify_a");
        selector.record(first.reactive.id());

        let second = selector.select(&catalog, &signals, &SituationComposition::uniform(), &view);
        assert_eq!(second.reactive.id(), "clarify_b");
    }

    #[test]
    fn test_recency_window_forgets() {
        let mut selector = selector();
        selector.record("clarify_a");
        for i in 0..10 {
            selector.record(format!("other_{}", i));
        }
        assert!(!selector.recently_used("clarify_a"));
        assert_eq!(selector.history().count(), 10);
    }

    #[test]
    fn test_proactive_respects_context_continuity() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();
        let signals = vec![Signal::new(SignalId::ComponentRating, "3 stars")];
        let situation = situation(&[
            (Dimension::Assessment, 0.5),
            (Dimension::Feasibility, 0.3),
            (Dimension::Analysis, 0.2),
        ]);

        let selection = selector().select(&catalog, &signals, &situation, &view);

        assert_eq!(selection.reactive.id(), "rate_component");
        let ids: Vec<_> = selection.proactive.iter().map(|p| p.id()).collect();
        // ask_next_component shares the category but no context key;
        // ask_timeline is unrelated.
        assert_eq!(ids, vec!["ask_evidence", "deep_dive"]);

        for p in &selection.proactive {
            assert!(
                p.category() != selection.reactive.category()
                    || p.action.shares_context(selection.reactive.action)
            );
        }
    }

    #[test]
    fn test_proactive_budgets_follow_rank() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();
        let signals = vec![Signal::new(SignalId::ComponentRating, "3 stars")];
        let situation = situation(&[(Dimension::Assessment, 0.7), (Dimension::Analysis, 0.3)]);

        let selection = selector().select(&catalog, &signals, &situation, &view);

        assert_eq!(selection.reactive.budget, 150);
        assert_eq!(selection.proactive[0].id(), "ask_evidence");
        assert_eq!(selection.proactive[0].budget, 100);
        assert_eq!(selection.proactive[1].budget, 60);
    }

    #[test]
    fn test_zero_affinity_proactive_is_not_offered() {
        let catalog = catalog();
        let view = KnowledgeState::new().view();
        let signals = vec![Signal::new(SignalId::ComponentRating, "3 stars")];
        let situation = situation(&[(Dimension::Meta, 1.0)]);

        let selection = selector().select(&catalog, &signals, &situation, &view);
        assert!(selection.proactive.is_empty());
    }

    #[test]
    fn test_rating_utterance_selects_assessment() {
        let catalog = catalog();
        let knowledge = KnowledgeState::new();
        let detector = SignalDetector::new(&PolicyConfig::default().detection);
        let signals = detector.detect("Data quality is about 3 stars", &knowledge);

        let selection =
            selector().select(&catalog, &signals, &SituationComposition::uniform(), &knowledge.view());

        assert_eq!(selection.reactive.category(), "assessment");
        assert_eq!(selection.trigger, Some(SignalId::ComponentRating));
    }
}
