//! Selective context - the only view of a turn the generator receives.
//!
//! The payload is bounded by the composition, never by the catalog or the
//! conversation length: at most three action briefs, the knowledge fields
//! those actions declare, and a short tail of action history.

use dialogue_state::KnowledgeView;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalog::{ActionCatalog, ActionRole};
use crate::composer::Composition;

/// What the generator needs to know about one selected action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBrief {
    pub id: String,
    pub category: String,
    pub role: ActionRole,
    pub budget: u32,
    pub behaviors: Vec<String>,
}

/// Minimal turn context handed to the generation capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectiveContext {
    /// Selected actions, reactive first.
    pub actions: Vec<ActionBrief>,

    /// Knowledge path -> value, only for fields the selected actions name.
    pub knowledge: BTreeMap<String, Value>,

    /// Most recent action ids, oldest first.
    pub recent_actions: Vec<String>,
}

impl SelectiveContext {
    /// Extract the context for `composition`.
    ///
    /// Knowledge fields come from each selected action's prerequisites and its
    /// category's declared needs. Fields that do not resolve are left out.
    pub fn extract(
        composition: &Composition<'_>,
        catalog: &ActionCatalog,
        knowledge: &KnowledgeView,
        history: &[String],
        history_window: usize,
    ) -> Self {
        let mut context = Self::default();

        for entry in composition.entries() {
            let action = entry.action;
            context.actions.push(ActionBrief {
                id: action.id.clone(),
                category: action.category.clone(),
                role: entry.role,
                budget: entry.budget,
                behaviors: action.behaviors.clone(),
            });

            let named = action
                .prerequisites
                .keys()
                .chain(catalog.needs_for(&action.category));
            for path in named {
                if let Some(value) = knowledge.get(path) {
                    context.knowledge.insert(path.clone(), value.clone());
                }
            }
        }

        let skip = history.len().saturating_sub(history_window);
        context.recent_actions = history[skip..].to_vec();
        context
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Size of the serialized payload in bytes.
    pub fn size(&self) -> serde_json::Result<usize> {
        self.to_json().map(|json| json.len())
    }

    /// Format the context as a prompt section.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Actions\n");
        for brief in &self.actions {
            let role = match brief.role {
                ActionRole::Reactive => "respond",
                ActionRole::Proactive => "then",
            };
            prompt.push_str(&format!(
                "- [{}] {} ({}, ~{} tokens)\n",
                role, brief.id, brief.category, brief.budget
            ));
            for behavior in &brief.behaviors {
                prompt.push_str(&format!("  - {}\n", behavior));
            }
        }
        prompt.push('\n');

        if !self.knowledge.is_empty() {
            prompt.push_str("## Known Context\n");
            for (path, value) in &self.knowledge {
                prompt.push_str(&format!("- {}: {}\n", path, value));
            }
            prompt.push('\n');
        }

        if !self.recent_actions.is_empty() {
            prompt.push_str("## Recent Actions\n");
            prompt.push_str(&self.recent_actions.join(", "));
            prompt.push_str("\n\n");
        }

        prompt
    }
}
