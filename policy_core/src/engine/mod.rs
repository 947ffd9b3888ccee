//! Policy engine - runs one conversation turn end to end.
//!
//! Each turn:
//! 1. **Detect**: the signal source turns the utterance and state into signals
//! 2. **Situate**: signals reinforce the situation composition
//! 3. **Select**: one reactive action and up to two proactive ones
//! 4. **Compose**: slot budgets under the ceiling
//! 5. **Extract**: the selective context for the generator
//! 6. **Generate**: hand composition and context to the generator
//! 7. **Learn**: apply signal effects and the generator's knowledge updates
//! 8. **Advance**: counters, history, situation decay
//!
//! Every step works on copies of the knowledge state, situation tracker, and
//! selector history. They replace the engine's state only once the turn has
//! completed, so an abandoned turn leaves nothing half-applied.

mod context;
mod effects;
mod generation;
mod session;

pub use context::*;
pub use effects::*;
pub use generation::*;
pub use session::*;

use dialogue_state::{KnowledgeState, SituationComposition};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::catalog::ActionCatalog;
use crate::composer::ResponseComposer;
use crate::config::PolicyConfig;
use crate::error::{CapabilityError, CatalogError, Result};
use crate::selector::ActionSelector;
use crate::signals::{SemanticMatcher, SignalDetector, SignalSource};
use crate::tracker::SituationTracker;

/// What one turn produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub reactive_action_id: String,
    pub proactive_action_ids: Vec<String>,
    pub generated_text: String,
    /// Whether the generator's knowledge updates changed anything.
    pub knowledge_updated: bool,
    /// Serialized size of the selective context in bytes.
    pub context_size: usize,
}

/// Running totals across turns.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub turn_count: u64,
    pub average_context_size: f64,
    /// Turns answered with the fallback action, including failed turns.
    pub fallback_turns: u64,
}

/// Everything a completed turn commits.
struct TurnOutcome {
    knowledge: KnowledgeState,
    tracker: SituationTracker,
    selector: ActionSelector,
    result: TurnResult,
    is_fallback: bool,
}

/// Drives the per-turn pipeline for one conversation.
pub struct PolicyEngine {
    config: PolicyConfig,
    catalog: Arc<ActionCatalog>,
    signals: Box<dyn SignalSource>,
    generator: Box<dyn ResponseGenerator>,
    tracker: SituationTracker,
    selector: ActionSelector,
    composer: ResponseComposer,
    knowledge: KnowledgeState,
    turn_count: u64,
    total_context_size: u64,
    fallback_turns: u64,
}

impl PolicyEngine {
    /// Create an engine with the lexical signal detector and the outline generator.
    pub fn new(config: PolicyConfig, catalog: ActionCatalog) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            signals: Box::new(SignalDetector::new(&config.detection)),
            generator: Box::new(OutlineGenerator),
            tracker: SituationTracker::new(&config.situation),
            selector: ActionSelector::new(config.scoring.clone(), config.budget.clone()),
            composer: ResponseComposer::new(config.budget.clone()),
            catalog: Arc::new(catalog),
            knowledge: KnowledgeState::new(),
            turn_count: 0,
            total_context_size: 0,
            fallback_turns: 0,
            config,
        })
    }

    /// Load configuration and catalog from files.
    pub fn from_files(
        config_path: impl AsRef<std::path::Path>,
        catalog_path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        let config = PolicyConfig::load(config_path)?;
        let catalog = ActionCatalog::load(catalog_path)?;
        Self::new(config, catalog)
    }

    pub fn with_generator(mut self, generator: Box<dyn ResponseGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use the lexical detector backed by a semantic matcher.
    pub fn with_semantic_matcher(mut self, matcher: Box<dyn SemanticMatcher>) -> Self {
        self.signals = Box::new(SignalDetector::new(&self.config.detection).with_matcher(matcher));
        self
    }

    /// Replace signal detection entirely.
    pub fn with_signal_source(mut self, source: Box<dyn SignalSource>) -> Self {
        self.signals = source;
        self
    }

    /// Resume from a previously saved knowledge state.
    pub fn with_knowledge(mut self, knowledge: KnowledgeState) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Run one turn. Never fails: any per-turn error becomes a fallback turn.
    #[instrument(
        skip_all,
        fields(
            conversation = %self.knowledge.conversation_id,
            turn = self.knowledge.conversation.turn_count + 1
        )
    )]
    pub fn process_turn(&mut self, utterance: &str, is_first_turn: bool) -> TurnResult {
        let catalog = Arc::clone(&self.catalog);

        let outcome = match self.run_turn(&catalog, utterance, is_first_turn) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "turn failed, answering with fallback");
                self.fallback_turn(&catalog, is_first_turn)
            }
        };

        self.commit(outcome)
    }

    fn run_turn(&self, catalog: &ActionCatalog, utterance: &str, is_first_turn: bool) -> Result<TurnOutcome> {
        let mut knowledge = self.knowledge.clone();
        knowledge.conversation.first_turn = is_first_turn;

        let signals = guarded("signal source", || self.signals.detect(utterance, &knowledge))?;
        debug!(
            signals = ?signals.iter().map(|s| s.id).collect::<Vec<_>>(),
            "signals detected"
        );

        let mut tracker = self.tracker.clone();
        tracker.update(&signals);

        let view = knowledge.view();
        let selection = self.selector.select(catalog, &signals, tracker.composition(), &view);
        let is_fallback = selection.is_fallback;
        let composition = self.composer.compose(selection);

        let history = knowledge
            .conversation
            .recent_actions(self.config.context.history_window);
        let context = SelectiveContext::extract(
            &composition,
            catalog,
            &view,
            &history,
            self.config.context.history_window,
        );
        let context_size = context.size()?;

        let generated = match guarded("generator", || self.generator.generate(&composition, &context))? {
            Ok(generated) => generated,
            Err(e) => {
                warn!(error = %e, "generator unavailable, using canned text");
                GeneratedResponse::text(self.config.context.fallback_text.clone())
            }
        };

        apply_signal_effects(&mut knowledge, &signals, &self.config.dynamics);
        record_explanations(
            &mut knowledge,
            &signals,
            &composition,
            &self.config.context.education_category,
        );

        let before_updates = knowledge.clone();
        for update in &generated.knowledge_updates {
            if let Err(e) = knowledge.apply_update(update) {
                warn!(path = %update.path, error = %e, "ignoring knowledge update");
            }
        }
        let knowledge_updated = knowledge != before_updates;

        let reactive_action_id = composition.reactive().id().to_string();
        let proactive_action_ids = composition
            .proactive()
            .iter()
            .map(|p| p.id().to_string())
            .collect();

        let mut selector = self.selector.clone();
        advance(&mut knowledge, &mut tracker, &mut selector, &reactive_action_id, is_fallback);

        Ok(TurnOutcome {
            knowledge,
            tracker,
            selector,
            result: TurnResult {
                reactive_action_id,
                proactive_action_ids,
                generated_text: generated.text,
                knowledge_updated,
                context_size,
            },
            is_fallback,
        })
    }

    /// A turn that records the fallback without consulting detection or the generator.
    fn fallback_turn(&self, catalog: &ActionCatalog, is_first_turn: bool) -> TurnOutcome {
        let mut knowledge = self.knowledge.clone();
        knowledge.conversation.first_turn = is_first_turn;
        let mut tracker = self.tracker.clone();
        let mut selector = self.selector.clone();
        let fallback_id = catalog.fallback().id.clone();

        advance(&mut knowledge, &mut tracker, &mut selector, &fallback_id, true);

        TurnOutcome {
            knowledge,
            tracker,
            selector,
            result: TurnResult {
                reactive_action_id: fallback_id,
                proactive_action_ids: Vec::new(),
                generated_text: self.config.context.fallback_text.clone(),
                knowledge_updated: false,
                context_size: 0,
            },
            is_fallback: true,
        }
    }

    fn commit(&mut self, outcome: TurnOutcome) -> TurnResult {
        self.knowledge = outcome.knowledge;
        self.tracker = outcome.tracker;
        self.selector = outcome.selector;

        self.turn_count += 1;
        self.total_context_size += outcome.result.context_size as u64;
        if outcome.is_fallback {
            self.fallback_turns += 1;
        }

        debug!(
            reactive = %outcome.result.reactive_action_id,
            proactive = ?outcome.result.proactive_action_ids,
            context_size = outcome.result.context_size,
            fallback = outcome.is_fallback,
            "turn committed"
        );

        outcome.result
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        let average_context_size = if self.turn_count == 0 {
            0.0
        } else {
            self.total_context_size as f64 / self.turn_count as f64
        };
        EngineMetrics {
            turn_count: self.turn_count,
            average_context_size,
            fallback_turns: self.fallback_turns,
        }
    }

    /// Swap in a new catalog. Takes effect from the next turn.
    pub fn reload_catalog(&mut self, catalog: ActionCatalog) {
        info!(
            previous = self.catalog.len(),
            actions = catalog.len(),
            "action catalog reloaded"
        );
        self.catalog = Arc::new(catalog);
    }

    /// Load a catalog file and swap it in. On error the current catalog stays.
    pub fn reload_catalog_from(&mut self, path: impl AsRef<std::path::Path>) -> std::result::Result<(), CatalogError> {
        let catalog = ActionCatalog::load(path)?;
        self.reload_catalog(catalog);
        Ok(())
    }

    pub fn knowledge(&self) -> &KnowledgeState {
        &self.knowledge
    }

    pub fn situation(&self) -> &SituationComposition {
        self.tracker.composition()
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("conversation", &self.knowledge.conversation_id)
            .field("turn_count", &self.turn_count)
            .field("catalog", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// Run an injected capability, turning a panic into a failed capability.
fn guarded<T>(capability: &str, call: impl FnOnce() -> T) -> std::result::Result<T, CapabilityError> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| CapabilityError::Failed {
        capability: capability.to_string(),
        reason: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

/// End-of-turn bookkeeping shared by normal and fallback turns.
fn advance(
    knowledge: &mut KnowledgeState,
    tracker: &mut SituationTracker,
    selector: &mut ActionSelector,
    reactive_id: &str,
    is_fallback: bool,
) {
    let conversation = &mut knowledge.conversation;
    conversation.turn_count += 1;
    conversation.first_turn = false;
    conversation.record_action(reactive_id);
    if is_fallback {
        conversation.fallback_streak += 1;
    } else {
        conversation.fallback_streak = 0;
    }

    selector.record(reactive_id);
    tracker.decay();
}
