//! What detected signals change in the knowledge state.

use dialogue_state::{ConversationState, KnowledgeState, Level};

use crate::composer::Composition;
use crate::config::DynamicsConfig;
use crate::signals::{Signal, SignalDetail, SignalId};

/// Record what this turn's signals tell us and move the emotional readings.
pub fn apply_signal_effects(knowledge: &mut KnowledgeState, signals: &[Signal], dynamics: &DynamicsConfig) {
    let mut progressed = false;

    for signal in signals {
        progressed |= signal.category.is_progress();

        match (signal.id, &signal.detail) {
            (
                SignalId::ComponentRating,
                Some(SignalDetail::Rating {
                    component,
                    score,
                    quantitative,
                }),
            ) => {
                if let Some(component) = component {
                    knowledge
                        .system
                        .component_ratings
                        .insert(component.clone(), *score);
                    knowledge.system.current_component = Some(component.clone());
                }
                if *quantitative {
                    knowledge.metrics.quantitative_evidence += 1;
                } else {
                    knowledge.metrics.qualitative_evidence += 1;
                }
            }
            (SignalId::PainPointRevealed, _) => {
                let pain = signal
                    .component()
                    .map(str::to_string)
                    .unwrap_or_else(|| signal.payload.clone());
                knowledge.system.primary_pain_point = Some(pain);
                knowledge.system.urgency = Level::High;
                knowledge.metrics.anecdotal_evidence += 1;
            }
            (SignalId::TimelineMentioned, _) => knowledge.system.timeline_known = true,
            (SignalId::BudgetMentioned, _) => knowledge.system.budget_known = true,
            (SignalId::StakeholderMentioned, _) => knowledge.system.stakeholders_known = true,
            (SignalId::Contradiction, _) => knowledge.metrics.contradictions += 1,
            (SignalId::UserFrustrated, _) => {
                let step = if signal.intensity {
                    dynamics.frustration_step * 2.0
                } else {
                    dynamics.frustration_step
                };
                ConversationState::raise(&mut knowledge.conversation.frustration, step);
            }
            (SignalId::UserConfused, _) => {
                ConversationState::raise(&mut knowledge.conversation.confusion, dynamics.confusion_step);
            }
            (SignalId::PositiveAcknowledgment, _) => {
                ConversationState::raise(&mut knowledge.conversation.engagement, dynamics.engagement_step);
            }
            (SignalId::NonSubstantive, _) => {
                knowledge.conversation.off_topic_count += 1;
                ConversationState::raise(&mut knowledge.conversation.engagement, -dynamics.engagement_step);
            }
            (SignalId::Milestone, _) => {
                knowledge.conversation.last_milestone = knowledge.rated_count();
            }
            (SignalId::ImprovementNeed, _) => {
                if let Some(component) = signal.component() {
                    knowledge.system.current_component = Some(component.to_string());
                }
            }
            _ => {}
        }
    }

    if progressed {
        knowledge.conversation.turns_since_progress = 0;
    } else {
        knowledge.conversation.turns_since_progress += 1;
    }

    knowledge.conversation.decay_emotions(dynamics.emotion_retain);
}

/// Mark components as explained when an education action was selected for them.
pub fn record_explanations(
    knowledge: &mut KnowledgeState,
    signals: &[Signal],
    composition: &Composition<'_>,
    education_category: &str,
) {
    if !composition.entries().any(|e| e.category() == education_category) {
        return;
    }
    let explained = signals
        .iter()
        .filter(|s| s.id == SignalId::EducationOpportunity)
        .filter_map(|s| s.component());
    for component in explained {
        knowledge
            .user
            .explained_components
            .insert(component.to_string());
    }
}
