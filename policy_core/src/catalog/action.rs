//! Action definitions - raw catalog entries and their validated form.

use dialogue_state::{Dimension, DimensionWeights, KnowledgeState, KnowledgeView};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::signals::{Priority, SignalId};

/// Id of the action used when the catalog does not designate a valid fallback.
pub const BUILTIN_FALLBACK_ID: &str = "general_response";

/// Whether an action answers a signal or advances the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionRole {
    Reactive,
    Proactive,
}

/// A validated catalog action. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub id: String,
    pub category: String,
    pub role: ActionRole,

    /// Signals this action reacts to.
    pub triggers: Vec<SignalId>,

    /// Situation dimension -> affinity weight.
    pub affinity: DimensionWeights,

    /// Knowledge path -> value that must hold for the action to apply.
    pub prerequisites: BTreeMap<String, Value>,

    /// Knowledge path -> weight applied to the field's normalized value.
    pub field_weights: BTreeMap<String, f32>,

    pub priority: Priority,

    /// Topics this action is about; shared keys allow same-category pairing.
    pub context_keys: BTreeSet<String>,

    /// Instructions handed to the generator when this action is selected.
    pub behaviors: Vec<String>,
}

impl Action {
    /// The action used when nothing in the catalog applies.
    pub fn builtin_fallback() -> Self {
        Self {
            id: BUILTIN_FALLBACK_ID.to_string(),
            category: "general".to_string(),
            role: ActionRole::Reactive,
            triggers: Vec::new(),
            affinity: DimensionWeights::new(),
            prerequisites: BTreeMap::new(),
            field_weights: BTreeMap::new(),
            priority: Priority::Low,
            context_keys: BTreeSet::new(),
            behaviors: vec![
                "Respond helpfully to what the user just said".to_string(),
                "Invite them to keep going".to_string(),
            ],
        }
    }

    pub fn is_triggered_by(&self, signal: SignalId) -> bool {
        self.triggers.contains(&signal)
    }

    /// Every prerequisite holds against the knowledge snapshot.
    pub fn prerequisites_met(&self, knowledge: &KnowledgeView) -> bool {
        self.prerequisites
            .iter()
            .all(|(path, required)| knowledge.satisfies(path, required))
    }

    /// The two actions name at least one common context key.
    pub fn shares_context(&self, other: &Action) -> bool {
        !self.context_keys.is_disjoint(&other.context_keys)
    }

    /// Dimensions where both actions have positive affinity.
    pub fn shared_dimensions(&self, other: &Action) -> usize {
        self.affinity
            .iter()
            .filter(|(dimension, weight)| {
                **weight > 0.0 && other.affinity.get(dimension).is_some_and(|w| *w > 0.0)
            })
            .count()
    }
}

/// A catalog entry as written, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionDefinition {
    pub id: Option<String>,
    pub category: Option<String>,
    pub role: Option<String>,
    pub triggers: Vec<String>,
    pub affinity: BTreeMap<String, f32>,
    pub prerequisites: BTreeMap<String, Value>,
    pub field_weights: BTreeMap<String, f32>,
    pub priority: Option<String>,
    pub context_keys: Vec<String>,
    pub behaviors: Vec<String>,
}

/// Why a catalog entry was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogIssue {
    /// Position of the entry in the source file.
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "action #{} ({}): {}", self.index, id, self.reason),
            None => write!(f, "action #{}: {}", self.index, self.reason),
        }
    }
}

/// Knowledge paths an action may refer to: `section.field`, optionally followed
/// by a key into a map-valued field.
pub(crate) fn is_known_path(known: &BTreeSet<String>, path: &str) -> bool {
    let mut segments = path.splitn(3, '.');
    match (segments.next(), segments.next()) {
        (Some(section), Some(field)) => known.contains(&format!("{}.{}", section, field)),
        _ => false,
    }
}

/// All `section.field` paths of the knowledge state.
pub(crate) fn known_paths() -> BTreeSet<String> {
    KnowledgeState::default().to_map().into_keys().collect()
}

impl ActionDefinition {
    /// Validate into an [`Action`], or explain why the entry must be skipped.
    pub fn validate(self, index: usize, known: &BTreeSet<String>) -> Result<Action, CatalogIssue> {
        let id = self.id.clone().filter(|s| !s.trim().is_empty());
        let issue = |reason: String| CatalogIssue {
            index,
            id: id.clone(),
            reason,
        };

        let Some(action_id) = id.clone() else {
            return Err(issue("missing id".to_string()));
        };
        let Some(category) = self.category.filter(|s| !s.trim().is_empty()) else {
            return Err(issue("missing category".to_string()));
        };

        let mut triggers = Vec::with_capacity(self.triggers.len());
        for name in &self.triggers {
            let signal = name.parse::<SignalId>().map_err(&issue)?;
            if !triggers.contains(&signal) {
                triggers.push(signal);
            }
        }

        let mut affinity = DimensionWeights::new();
        for (name, weight) in &self.affinity {
            let dimension = name.parse::<Dimension>().map_err(&issue)?;
            if !weight.is_finite() || *weight < 0.0 {
                return Err(issue(format!("affinity for {} must be a non-negative number", name)));
            }
            affinity.insert(dimension, *weight);
        }

        let role = match self.role.as_deref().map(|r| r.trim().to_ascii_lowercase()) {
            Some(r) if r == "reactive" => ActionRole::Reactive,
            Some(r) if r == "proactive" => ActionRole::Proactive,
            Some(other) => return Err(issue(format!("unknown role: {}", other))),
            None if !triggers.is_empty() => ActionRole::Reactive,
            None if !affinity.is_empty() => ActionRole::Proactive,
            None => return Err(issue("no trigger bindings or situation affinity".to_string())),
        };

        match role {
            ActionRole::Reactive if triggers.is_empty() => {
                return Err(issue("reactive action has no trigger bindings".to_string()));
            }
            ActionRole::Proactive if affinity.is_empty() => {
                return Err(issue("proactive action has no situation affinity".to_string()));
            }
            _ => {}
        }

        let priority = match self.priority.as_deref() {
            Some(p) => p.parse::<Priority>().map_err(&issue)?,
            None => Priority::Medium,
        };

        if let Some(path) = self
            .prerequisites
            .keys()
            .chain(self.field_weights.keys())
            .find(|path| !is_known_path(known, path))
        {
            return Err(issue(format!("unknown knowledge field: {}", path)));
        }

        Ok(Action {
            id: action_id,
            category: category.trim().to_string(),
            role,
            triggers,
            affinity,
            prerequisites: self.prerequisites,
            field_weights: self.field_weights,
            priority,
            context_keys: self.context_keys.into_iter().collect(),
            behaviors: self.behaviors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> ActionDefinition {
        ActionDefinition {
            id: Some("ask_rating".to_string()),
            category: Some("assessment".to_string()),
            triggers: vec!["component_rating".to_string()],
            ..Default::default()
        }
    }

    fn validate(def: ActionDefinition) -> Result<Action, CatalogIssue> {
        def.validate(0, &known_paths())
    }

    #[test]
    fn test_valid_reactive_definition() {
        let action = validate(definition()).unwrap();
        assert_eq!(action.role, ActionRole::Reactive);
        assert_eq!(action.priority, Priority::Medium);
        assert!(action.is_triggered_by(SignalId::ComponentRating));
    }

    #[test]
    fn test_role_inferred_from_affinity() {
        let mut def = definition();
        def.triggers.clear();
        def.affinity.insert("feasibility".to_string(), 0.7);

        let action = validate(def).unwrap();
        assert_eq!(action.role, ActionRole::Proactive);
        assert_eq!(action.affinity.get(&Dimension::Feasibility), Some(&0.7));
    }

    #[test]
    fn test_missing_category_is_issue() {
        let mut def = definition();
        def.category = None;

        let issue = validate(def).unwrap_err();
        assert_eq!(issue.id.as_deref(), Some("ask_rating"));
        assert!(issue.reason.contains("category"));
    }

    #[test]
    fn test_missing_id_is_issue() {
        let mut def = definition();
        def.id = Some("  ".to_string());
        assert!(validate(def).unwrap_err().reason.contains("id"));
    }

    #[test]
    fn test_reactive_without_bindings_is_issue() {
        let mut def = definition();
        def.triggers.clear();
        def.role = Some("reactive".to_string());
        assert!(validate(def).is_err());
    }

    #[test]
    fn test_unknown_signal_and_dimension_are_issues() {
        let mut bad_signal = definition();
        bad_signal.triggers.push("telepathy".to_string());
        assert!(validate(bad_signal).is_err());

        let mut bad_dimension = definition();
        bad_dimension.affinity.insert("astrology".to_string(), 0.5);
        assert!(validate(bad_dimension).is_err());
    }

    #[test]
    fn test_unknown_prerequisite_path_is_issue() {
        let mut def = definition();
        def.prerequisites.insert("user.shoe_size".to_string(), json!(9));
        assert!(validate(def).is_err());

        let mut nested = definition();
        nested
            .prerequisites
            .insert("system.component_ratings.tooling".to_string(), json!(3));
        assert!(validate(nested).is_ok());
    }

    #[test]
    fn test_prerequisites_met() {
        let mut def = definition();
        def.prerequisites
            .insert("user.knows_rating_scale".to_string(), json!(true));
        let action = validate(def).unwrap();

        let mut knowledge = KnowledgeState::new();
        assert!(!action.prerequisites_met(&knowledge.view()));

        knowledge.user.knows_rating_scale = true;
        assert!(action.prerequisites_met(&knowledge.view()));
    }

    #[test]
    fn test_shared_context_and_dimensions() {
        let mut a = validate(definition()).unwrap();
        let mut b = Action::builtin_fallback();
        assert!(!a.shares_context(&b));

        a.context_keys.insert("component".to_string());
        b.context_keys.insert("component".to_string());
        assert!(a.shares_context(&b));

        a.affinity.insert(Dimension::Assessment, 0.5);
        a.affinity.insert(Dimension::Analysis, 0.2);
        b.affinity.insert(Dimension::Assessment, 0.9);
        b.affinity.insert(Dimension::Analysis, 0.0);
        assert_eq!(a.shared_dimensions(&b), 1);
    }
}
