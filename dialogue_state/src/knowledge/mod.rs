//! Knowledge state - everything a conversation has accumulated so far.
//!
//! The state is split into four sections:
//! - **user**: what the user has learned during the conversation
//! - **system**: what the system has inferred about the subject being discussed
//! - **conversation**: decaying emotional readings, progress counters, action history
//! - **metrics**: evidence-tier counters for the quality of what was gathered
//!
//! Fields are addressed externally by dotted paths (`"section.field"`), which is
//! how catalog prerequisites, per-field weights, and knowledge updates name them.

mod value;

pub use value::*;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use uuid::Uuid;

use crate::error::{Result, StateError};

/// Maximum number of action ids kept in the conversation history.
pub const ACTION_HISTORY_CAPACITY: usize = 20;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new random conversation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a nil conversation ID (useful for fixtures).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How familiar the user is with the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpertiseLevel {
    Novice,
    #[default]
    Intermediate,
    Expert,
}

/// Three-step qualitative level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

/// What the user has learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct UserKnowledge {
    pub knows_rating_scale: bool,
    pub knows_methodology: bool,
    pub has_seen_summary: bool,
    pub expertise: ExpertiseLevel,

    /// Components the system has already explained to the user.
    pub explained_components: BTreeSet<String>,
}

/// What the system has inferred about the conversation's subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SystemKnowledge {
    /// Component most recently under discussion.
    pub current_component: Option<String>,
    pub primary_pain_point: Option<String>,
    pub timeline_known: bool,
    pub budget_known: bool,
    pub stakeholders_known: bool,
    pub urgency: Level,

    /// Component name -> rating on a 1-5 scale.
    pub component_ratings: BTreeMap<String, u8>,
}

/// Decaying readings and counters for the running conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversationState {
    /// Set by the caller for the opening turn of a conversation.
    pub first_turn: bool,
    pub turn_count: u32,

    /// Emotional readings from 0.0 to 1.0.
    pub frustration: f32,
    pub confusion: f32,
    pub engagement: f32,

    pub turns_since_progress: u32,
    pub off_topic_count: u32,

    /// Rating count at which the last milestone was acknowledged.
    pub last_milestone: u32,

    /// Consecutive turns answered by the fallback action.
    pub fallback_streak: u32,

    /// Most recent action ids, oldest first.
    pub action_history: VecDeque<String>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            first_turn: false,
            turn_count: 0,
            frustration: 0.0,
            confusion: 0.0,
            engagement: 0.5,
            turns_since_progress: 0,
            off_topic_count: 0,
            last_milestone: 0,
            fallback_streak: 0,
            action_history: VecDeque::new(),
        }
    }
}

impl ConversationState {
    /// Append an action id, dropping the oldest entry past capacity.
    pub fn record_action(&mut self, action_id: impl Into<String>) {
        self.action_history.push_back(action_id.into());
        while self.action_history.len() > ACTION_HISTORY_CAPACITY {
            self.action_history.pop_front();
        }
    }

    /// The last `n` action ids, oldest first.
    pub fn recent_actions(&self, n: usize) -> Vec<String> {
        let skip = self.action_history.len().saturating_sub(n);
        self.action_history.iter().skip(skip).cloned().collect()
    }

    /// Multiply each emotional reading by `retain` (0.0-1.0).
    pub fn decay_emotions(&mut self, retain: f32) {
        let retain = retain.clamp(0.0, 1.0);
        self.frustration *= retain;
        self.confusion *= retain;
    }

    /// Raise a reading, saturating at 1.0.
    pub fn raise(reading: &mut f32, amount: f32) {
        *reading = (*reading + amount).clamp(0.0, 1.0);
    }
}

/// Evidence-tier counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct QualityMetrics {
    /// Tier 1: numeric ratings ("3 stars", "4 out of 5").
    pub quantitative_evidence: u32,
    /// Tier 2: qualitative assessments ("the tooling is poor").
    pub qualitative_evidence: u32,
    /// Tier 3: anecdotes and revealed pain points.
    pub anecdotal_evidence: u32,
    pub contradictions: u32,
}

impl QualityMetrics {
    /// Total pieces of evidence across all tiers.
    pub fn total_evidence(&self) -> u32 {
        self.quantitative_evidence + self.qualitative_evidence + self.anecdotal_evidence
    }
}

/// A single field change returned by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUpdate {
    /// Dotted path such as `"user.knows_rating_scale"`.
    pub path: String,
    pub value: Value,
}

impl KnowledgeUpdate {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// The complete knowledge state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct KnowledgeState {
    pub conversation_id: ConversationId,
    pub user: UserKnowledge,
    pub system: SystemKnowledge,
    pub conversation: ConversationState,
    pub metrics: QualityMetrics,
}

impl KnowledgeState {
    /// Create a fresh state for a new conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh state bound to an existing conversation id.
    pub fn for_conversation(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            ..Self::default()
        }
    }

    /// Flatten into a plain map keyed by `"section.field"`.
    ///
    /// Top-level scalars (the conversation id) keep their bare name. Values that
    /// are themselves maps, such as component ratings, stay nested.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        let Ok(Value::Object(sections)) = serde_json::to_value(self) else {
            return map;
        };

        for (section, value) in sections {
            match value {
                Value::Object(fields) => {
                    for (field, field_value) in fields {
                        map.insert(format!("{}.{}", section, field), field_value);
                    }
                }
                other => {
                    map.insert(section, other);
                }
            }
        }

        map
    }

    /// Rebuild a state from a flat map produced by [`KnowledgeState::to_map`].
    ///
    /// Missing fields take their defaults; unknown sections or fields are rejected.
    pub fn from_map(map: &BTreeMap<String, Value>) -> Result<Self> {
        let mut root = Map::new();

        for (key, value) in map {
            match key.split_once('.') {
                Some((section, field)) => {
                    let entry = root
                        .entry(section.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    match entry {
                        Value::Object(fields) => {
                            fields.insert(field.to_string(), value.clone());
                        }
                        _ => return Err(StateError::UnknownField(key.clone())),
                    }
                }
                None => {
                    root.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(serde_json::from_value(Value::Object(root))?)
    }

    /// Snapshot the state for repeated path lookups.
    pub fn view(&self) -> KnowledgeView {
        KnowledgeView::new(serde_json::to_value(self).unwrap_or(Value::Null))
    }

    /// Look up a single value by dotted path.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        self.view().get(path).cloned()
    }

    /// Set one field by dotted path.
    ///
    /// The path must already exist and the value must deserialize into the
    /// field's type; on failure the state is left unchanged.
    pub fn apply_update(&mut self, update: &KnowledgeUpdate) -> Result<()> {
        let mut root = serde_json::to_value(&*self)?;
        let slot = root
            .pointer_mut(&path_to_pointer(&update.path))
            .ok_or_else(|| StateError::UnknownField(update.path.clone()))?;
        *slot = update.value.clone();

        let updated: KnowledgeState =
            serde_json::from_value(root).map_err(|e| StateError::InvalidValue {
                field: update.path.clone(),
                reason: e.to_string(),
            })?;

        *self = updated;
        Ok(())
    }

    /// Number of components rated so far.
    pub fn rated_count(&self) -> u32 {
        self.system.component_ratings.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_state() {
        let state = KnowledgeState::new();
        assert_eq!(state.conversation.turn_count, 0);
        assert_eq!(state.conversation.engagement, 0.5);
        assert!(!state.user.knows_rating_scale);
        assert!(state.system.component_ratings.is_empty());
    }

    #[test]
    fn test_action_history_is_bounded() {
        let mut conversation = ConversationState::default();
        for i in 0..(ACTION_HISTORY_CAPACITY + 5) {
            conversation.record_action(format!("action_{}", i));
        }

        assert_eq!(conversation.action_history.len(), ACTION_HISTORY_CAPACITY);
        assert_eq!(conversation.action_history.front().unwrap(), "action_5");
        assert_eq!(
            conversation.recent_actions(2),
            vec!["action_23".to_string(), "action_24".to_string()]
        );
    }

    #[test]
    fn test_recent_actions_shorter_than_window() {
        let mut conversation = ConversationState::default();
        conversation.record_action("only");
        assert_eq!(conversation.recent_actions(5), vec!["only".to_string()]);
    }

    #[test]
    fn test_emotion_decay_and_raise() {
        let mut conversation = ConversationState::default();
        ConversationState::raise(&mut conversation.frustration, 0.8);
        ConversationState::raise(&mut conversation.frustration, 0.8);
        assert_eq!(conversation.frustration, 1.0);

        conversation.decay_emotions(0.5);
        assert!((conversation.frustration - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_to_map_keys() {
        let state = KnowledgeState::new();
        let map = state.to_map();

        assert!(map.contains_key("conversation_id"));
        assert!(map.contains_key("user.knows_rating_scale"));
        assert!(map.contains_key("system.component_ratings"));
        assert!(map.contains_key("conversation.frustration"));
        assert!(map.contains_key("metrics.contradictions"));
    }

    #[test]
    fn test_map_round_trip() {
        let mut state = KnowledgeState::for_conversation(ConversationId::nil());
        state.user.knows_rating_scale = true;
        state.user.expertise = ExpertiseLevel::Expert;
        state.user.explained_components.insert("data quality".to_string());
        state.system.current_component = Some("tooling".to_string());
        state.system.urgency = Level::High;
        state.system.component_ratings.insert("tooling".to_string(), 2);
        state.conversation.turn_count = 7;
        state.conversation.frustration = 0.25;
        state.conversation.record_action("ask_rating");
        state.metrics.quantitative_evidence = 3;

        let rebuilt = KnowledgeState::from_map(&state.to_map()).unwrap();
        assert_eq!(rebuilt, state);
    }

    #[test]
    fn test_from_partial_map_uses_defaults() {
        let mut map = BTreeMap::new();
        map.insert("user.knows_methodology".to_string(), json!(true));
        map.insert("conversation.turn_count".to_string(), json!(4));

        let state = KnowledgeState::from_map(&map).unwrap();
        assert!(state.user.knows_methodology);
        assert_eq!(state.conversation.turn_count, 4);
        assert_eq!(state.conversation.engagement, 0.5);
    }

    #[test]
    fn test_from_map_rejects_unknown_field() {
        let mut map = BTreeMap::new();
        map.insert("user.favourite_colour".to_string(), json!("blue"));
        assert!(KnowledgeState::from_map(&map).is_err());
    }

    #[test]
    fn test_get_path() {
        let mut state = KnowledgeState::new();
        state.system.component_ratings.insert("tooling".to_string(), 4);

        assert_eq!(state.get_path("user.knows_rating_scale"), Some(json!(false)));
        assert_eq!(
            state.get_path("system.component_ratings.tooling"),
            Some(json!(4))
        );
        assert_eq!(state.get_path("system.nothing_here"), None);
    }

    #[test]
    fn test_apply_update() {
        let mut state = KnowledgeState::new();
        state
            .apply_update(&KnowledgeUpdate::new("user.knows_rating_scale", true))
            .unwrap();
        state
            .apply_update(&KnowledgeUpdate::new("system.urgency", "high"))
            .unwrap();

        assert!(state.user.knows_rating_scale);
        assert_eq!(state.system.urgency, Level::High);
    }

    #[test]
    fn test_apply_update_rejects_bad_values() {
        let mut state = KnowledgeState::new();
        let before = state.clone();

        let unknown = state.apply_update(&KnowledgeUpdate::new("user.nope", true));
        assert!(matches!(unknown, Err(StateError::UnknownField(_))));

        let mismatch =
            state.apply_update(&KnowledgeUpdate::new("conversation.turn_count", "many"));
        assert!(matches!(mismatch, Err(StateError::InvalidValue { .. })));

        assert_eq!(state, before);
    }

    #[test]
    fn test_quality_metrics_total() {
        let metrics = QualityMetrics {
            quantitative_evidence: 2,
            qualitative_evidence: 1,
            anecdotal_evidence: 4,
            contradictions: 9,
        };
        assert_eq!(metrics.total_evidence(), 7);
    }
}
