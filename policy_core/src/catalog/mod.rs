//! Action catalog - the declarative set of behaviors the engine can choose from.
//!
//! A catalog file (TOML or JSON) lists actions, per-category context needs,
//! and the id of the designated fallback action. Entries are validated once
//! at load time: malformed entries are skipped and logged, while an unreadable
//! or unparseable file, or one with no valid entries, is a startup error.
//!
//! ```toml
//! fallback = "general_response"
//!
//! [categories.assessment]
//! needs = ["system.current_component", "user.knows_rating_scale"]
//!
//! [[actions]]
//! id = "acknowledge_rating"
//! category = "assessment"
//! role = "reactive"
//! priority = "high"
//! triggers = ["component_rating"]
//! context_keys = ["component"]
//! behaviors = ["Acknowledge the rating", "Ask what evidence supports it"]
//! ```

mod action;

pub use action::*;

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::signals::SignalId;

/// Context a category always needs from the knowledge state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryDefinition {
    pub needs: Vec<String>,
}

/// A catalog document as written.
///
/// Action entries stay untyped until validation so one badly typed entry is
/// skipped instead of failing the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogDocument {
    pub fallback: Option<String>,
    pub categories: BTreeMap<String, CategoryDefinition>,
    pub actions: Vec<Value>,
}

/// Validated, immutable set of actions.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    actions: Vec<Action>,
    index: HashMap<String, usize>,
    fallback: Action,
    category_needs: BTreeMap<String, Vec<String>>,
    issues: Vec<CatalogIssue>,
}

impl ActionCatalog {
    /// Validate a parsed document.
    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let known = known_paths();
        let mut actions: Vec<Action> = Vec::new();
        let mut index = HashMap::new();
        let mut issues = Vec::new();

        for (position, entry) in document.actions.into_iter().enumerate() {
            let id = entry.get("id").and_then(Value::as_str).map(str::to_string);
            let definition = match ActionDefinition::deserialize(entry) {
                Ok(definition) => definition,
                Err(e) => {
                    issues.push(CatalogIssue {
                        index: position,
                        id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match definition.validate(position, &known) {
                Ok(action) if index.contains_key(&action.id) => issues.push(CatalogIssue {
                    index: position,
                    id: Some(action.id),
                    reason: "duplicate id".to_string(),
                }),
                Ok(action) => {
                    index.insert(action.id.clone(), actions.len());
                    actions.push(action);
                }
                Err(issue) => issues.push(issue),
            }
        }

        for issue in &issues {
            warn!(%issue, "skipping malformed catalog action");
        }

        if actions.is_empty() {
            return Err(CatalogError::Empty {
                skipped: issues.len(),
            });
        }

        let mut category_needs = BTreeMap::new();
        for (category, definition) in document.categories {
            let (valid, unknown): (Vec<String>, Vec<String>) = definition
                .needs
                .into_iter()
                .partition(|path| is_known_path(&known, path));
            for path in unknown {
                warn!(%category, %path, "ignoring unknown knowledge field in category needs");
            }
            category_needs.insert(category, valid);
        }

        let fallback = match document.fallback.as_deref() {
            Some(id) => match index.get(id).map(|i| &actions[*i]) {
                Some(action) if action.role == ActionRole::Reactive => action.clone(),
                Some(_) => {
                    warn!(fallback = %id, "designated fallback is not reactive, using built-in");
                    Action::builtin_fallback()
                }
                None => {
                    warn!(fallback = %id, "designated fallback not in catalog, using built-in");
                    Action::builtin_fallback()
                }
            },
            None => Action::builtin_fallback(),
        };

        info!(
            actions = actions.len(),
            skipped = issues.len(),
            fallback = %fallback.id,
            "action catalog loaded"
        );

        Ok(Self {
            actions,
            index,
            fallback,
            category_needs,
            issues,
        })
    }

    /// Parse and validate a TOML catalog.
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        Self::from_document(toml::from_str(source)?)
    }

    /// Parse and validate a JSON catalog.
    pub fn from_json_str(source: &str) -> Result<Self, CatalogError> {
        Self::from_document(serde_json::from_str(source)?)
    }

    /// Load a catalog file; the format follows the extension (`.toml` or `.json`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&source),
            Some("json") => Self::from_json_str(&source),
            other => Err(CatalogError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// All valid actions in catalog order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, id: &str) -> Option<&Action> {
        if id == self.fallback.id {
            return Some(&self.fallback);
        }
        self.index.get(id).map(|i| &self.actions[*i])
    }

    /// The action used when no other reactive action applies.
    pub fn fallback(&self) -> &Action {
        &self.fallback
    }

    /// Reactive actions bound to `signal`, in catalog order.
    pub fn reactive_for(&self, signal: SignalId) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(move |a| a.role == ActionRole::Reactive && a.is_triggered_by(signal))
    }

    /// Proactive actions, in catalog order.
    pub fn proactive(&self) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(|a| a.role == ActionRole::Proactive)
    }

    /// Knowledge paths the category declares it needs.
    pub fn needs_for(&self, category: &str) -> &[String] {
        self.category_needs
            .get(category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Entries skipped during validation.
    pub fn issues(&self) -> &[CatalogIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        fallback = "keep_talking"

        [categories.assessment]
        needs = ["system.current_component", "user.knows_rating_scale", "user.nope"]

        [[actions]]
        id = "keep_talking"
        category = "general"
        role = "reactive"
        triggers = ["non_substantive"]
        priority = "low"

        [[actions]]
        id = "acknowledge_rating"
        category = "assessment"
        role = "reactive"
        priority = "high"
        triggers = ["component_rating"]
        context_keys = ["component"]
        behaviors = ["Acknowledge the rating"]

        [actions.prerequisites]
        "user.knows_rating_scale" = true

        [actions.field_weights]
        "conversation.engagement" = 2.0

        [[actions]]
        id = "ask_timeline"
        category = "feasibility"
        role = "proactive"

        [actions.affinity]
        feasibility = 0.8
        discovery = 0.2

        [[actions]]
        category = "broken"
        triggers = ["component_rating"]

        [[actions]]
        id = "acknowledge_rating"
        category = "assessment"
        triggers = ["component_rating"]
    "#;

    #[test]
    fn test_load_toml_catalog() {
        let catalog = ActionCatalog::from_toml_str(CATALOG).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.fallback().id, "keep_talking");
        assert_eq!(catalog.issues().len(), 2);
        assert!(catalog.issues().iter().any(|i| i.reason == "duplicate id"));
        assert!(catalog.issues().iter().any(|i| i.reason == "missing id"));

        let rating = catalog.get("acknowledge_rating").unwrap();
        assert_eq!(rating.priority, crate::signals::Priority::High);
        assert_eq!(rating.prerequisites.len(), 1);
        assert_eq!(rating.field_weights.get("conversation.engagement"), Some(&2.0));
    }

    #[test]
    fn test_badly_typed_entry_is_skipped() {
        let catalog = ActionCatalog::from_toml_str(
            r#"
            [[actions]]
            id = "help"
            category = "help"
            triggers = ["help_request"]

            [[actions]]
            id = "numeric_priority"
            category = "help"
            priority = 5
            triggers = ["help_request"]

            [[actions]]
            id = "string_triggers"
            category = "help"
            triggers = "help_request"

            [[actions]]
            id = "string_weight"
            category = "feasibility"
            affinity = { feasibility = "a lot" }
            "#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.issues().len(), 3);
        let skipped: Vec<_> = catalog.issues().iter().filter_map(|i| i.id.as_deref()).collect();
        assert_eq!(skipped, vec!["numeric_priority", "string_triggers", "string_weight"]);
    }

    #[test]
    fn test_category_needs_drop_unknown_paths() {
        let catalog = ActionCatalog::from_toml_str(CATALOG).unwrap();
        assert_eq!(
            catalog.needs_for("assessment"),
            &["system.current_component".to_string(), "user.knows_rating_scale".to_string()]
        );
        assert!(catalog.needs_for("feasibility").is_empty());
    }

    #[test]
    fn test_role_filters() {
        let catalog = ActionCatalog::from_toml_str(CATALOG).unwrap();

        let reactive: Vec<_> = catalog
            .reactive_for(SignalId::ComponentRating)
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(reactive, vec!["acknowledge_rating"]);

        let proactive: Vec<_> = catalog.proactive().map(|a| a.id.as_str()).collect();
        assert_eq!(proactive, vec!["ask_timeline"]);
    }

    #[test]
    fn test_missing_fallback_uses_builtin() {
        let catalog = ActionCatalog::from_toml_str(
            r#"
            fallback = "not_there"

            [[actions]]
            id = "only"
            category = "help"
            triggers = ["help_request"]
            "#,
        )
        .unwrap();

        assert_eq!(catalog.fallback().id, BUILTIN_FALLBACK_ID);
        assert_eq!(catalog.get(BUILTIN_FALLBACK_ID).unwrap().category, "general");
    }

    #[test]
    fn test_json_catalog() {
        let catalog = ActionCatalog::from_json_str(
            r#"{
                "actions": [
                    {"id": "explain", "category": "education", "triggers": ["education_opportunity"]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.actions()[0].id, "explain");
    }

    #[test]
    fn test_unparseable_catalog_is_error() {
        let result = ActionCatalog::from_toml_str("[[actions]\nid = ");
        assert!(matches!(result, Err(CatalogError::Toml(_))));
    }

    #[test]
    fn test_catalog_with_no_valid_actions_is_error() {
        let result = ActionCatalog::from_toml_str(
            r#"
            [[actions]]
            id = "nothing"
            "#,
        );
        assert!(matches!(result, Err(CatalogError::Empty { skipped: 1 })));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = std::env::temp_dir().join(format!("policy_catalog_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let toml_path = dir.join("catalog.toml");
        std::fs::write(&toml_path, CATALOG).unwrap();
        assert_eq!(ActionCatalog::load(&toml_path).unwrap().len(), 3);

        let yaml_path = dir.join("catalog.yaml");
        std::fs::write(&yaml_path, "actions: []").unwrap();
        assert!(matches!(
            ActionCatalog::load(&yaml_path),
            Err(CatalogError::UnsupportedFormat(ext)) if ext == "yaml"
        ));

        assert!(matches!(
            ActionCatalog::load(dir.join("missing.toml")),
            Err(CatalogError::Io { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
