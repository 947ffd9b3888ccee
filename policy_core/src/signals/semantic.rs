//! Semantic matching - the injectable embedding-similarity capability.

use std::collections::HashSet;

use crate::error::CapabilityError;

/// Outcome of comparing an utterance against worked examples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticMatch {
    pub matched: bool,
    /// Best similarity against any example, 0.0-1.0.
    pub similarity: f32,
}

/// Compares text against example utterances.
///
/// Implementations may call out to an embedding service and can fail or be
/// slow; the detector treats any error as "unavailable" and keeps going with
/// lexical rules only. Timeouts are the implementation's concern.
pub trait SemanticMatcher: Send {
    fn matches(
        &self,
        text: &str,
        examples: &[String],
        threshold: f32,
    ) -> Result<SemanticMatch, CapabilityError>;
}

/// Jaccard similarity over lowercase word tokens.
///
/// Deterministic and dependency-free; useful when no embedding service is
/// configured and in tests.
#[derive(Debug, Clone, Default)]
pub struct TokenOverlapMatcher;

impl TokenOverlapMatcher {
    pub fn new() -> Self {
        Self
    }

    fn tokens(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
        let union = a.union(b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(b).count() as f32 / union as f32
    }
}

impl SemanticMatcher for TokenOverlapMatcher {
    fn matches(
        &self,
        text: &str,
        examples: &[String],
        threshold: f32,
    ) -> Result<SemanticMatch, CapabilityError> {
        let query = Self::tokens(text);
        let similarity = examples
            .iter()
            .map(|example| Self::similarity(&query, &Self::tokens(example)))
            .fold(0.0f32, f32::max);

        Ok(SemanticMatch {
            matched: similarity >= threshold,
            similarity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_matches() {
        let matcher = TokenOverlapMatcher::new();
        let result = matcher
            .matches("How does this work", &["how does this work".to_string()], 0.9)
            .unwrap();
        assert!(result.matched);
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unrelated_text_does_not_match() {
        let matcher = TokenOverlapMatcher::new();
        let result = matcher
            .matches("the weather is nice", &["what should I do next".to_string()], 0.5)
            .unwrap();
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_best_example_wins() {
        let matcher = TokenOverlapMatcher::new();
        let examples = vec!["completely different".to_string(), "over my head".to_string()];
        let result = matcher.matches("way over my head", &examples, 0.7).unwrap();
        assert!(result.matched);
        assert!((result.similarity - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_no_examples() {
        let matcher = TokenOverlapMatcher::new();
        let result = matcher.matches("anything", &[], 0.1).unwrap();
        assert!(!result.matched);
    }
}
