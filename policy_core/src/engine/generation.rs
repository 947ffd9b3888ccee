//! Text generation capability.

use dialogue_state::KnowledgeUpdate;
use serde::{Deserialize, Serialize};

use crate::composer::Composition;
use crate::error::CapabilityError;
use crate::engine::SelectiveContext;

/// Generator output: prose plus any facts it learned along the way.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedResponse {
    pub text: String,
    #[serde(default)]
    pub knowledge_updates: Vec<KnowledgeUpdate>,
}

impl GeneratedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            knowledge_updates: Vec::new(),
        }
    }

    pub fn with_update(mut self, update: KnowledgeUpdate) -> Self {
        self.knowledge_updates.push(update);
        self
    }
}

/// Turns a composition and its selective context into a response.
///
/// Implementations talk to a language model or a template engine. The engine
/// treats any error as "unavailable" and substitutes canned text.
pub trait ResponseGenerator: Send {
    fn generate(
        &self,
        composition: &Composition<'_>,
        context: &SelectiveContext,
    ) -> Result<GeneratedResponse, CapabilityError>;
}

/// Renders the composition as a plain outline. Used when no generator is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineGenerator;

impl ResponseGenerator for OutlineGenerator {
    fn generate(
        &self,
        _composition: &Composition<'_>,
        context: &SelectiveContext,
    ) -> Result<GeneratedResponse, CapabilityError> {
        Ok(GeneratedResponse::text(context.to_prompt_string().trim_end()))
    }
}
