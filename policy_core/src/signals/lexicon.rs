//! Lexical rules - keyword lists and patterns read off a single utterance.
//!
//! This is a hand-built classifier. It only reports features; turning features
//! into prioritized signals is the detector's job.

use regex::Regex;
use std::sync::LazyLock;

use super::SignalId;
use crate::config::DetectionConfig;

static NUMERIC_RATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+(?:\.\d+)?)\s*(?:stars?\b|/\s*5\b|out\s+of\s+(?:5|five)\b)").unwrap()
});

static VERB_RATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:rate|rating|give it|score)\s+(?:it\s+)?(?:an?\s+)?([1-5])\b").unwrap()
});

static WORD_RATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(one|two|three|four|five)\s+(?:stars?|out\s+of\s+(?:5|five))\b").unwrap()
});

static TIMELINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:deadline|timeline|timeframe|next\s+(?:week|month|quarter|year)|q[1-4]|by\s+(?:the\s+)?end\s+of|within\s+\d+\s+(?:days?|weeks?|months?)|asap|this\s+(?:quarter|year))\b",
    )
    .unwrap()
});

static BUDGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\$\s?\d|\b\d+\s?k\b|\b(?:budget|budgets|cost|costs|spend|spending|funding|afford|price|pricing|dollars|euros)\b)",
    )
    .unwrap()
});

const EXPLICIT_RULES: &[(SignalId, &[&str])] = &[
    (
        SignalId::NavigationRequest,
        &["go back", "next step", "move on", "skip", "start over", "next question", "let's continue"],
    ),
    (
        SignalId::HelpRequest,
        &["help", "how do i", "how does this work", "what can you do"],
    ),
    (
        SignalId::ReviewRequest,
        &["review", "summarize", "summarise", "summary", "recap", "where are we", "what have we covered"],
    ),
    (
        SignalId::RecommendationRequest,
        &["what should i", "what should we", "recommend", "recommendation", "suggest", "advice", "next steps"],
    ),
    (
        SignalId::AnalysisRequest,
        &["why is", "why are", "why does", "analyze", "analyse", "root cause", "compare", "what's causing", "what is causing"],
    ),
];

const CONFUSION: &[&str] = &[
    "confused",
    "confusing",
    "don't understand",
    "do not understand",
    "what do you mean",
    "not sure what you mean",
    "lost me",
    "i'm lost",
    "makes no sense",
    "unclear",
];

const CONTRADICTION: &[&str] = &[
    "but earlier",
    "but you said",
    "contradicts",
    "contradiction",
    "i already said",
    "that's not what i said",
    "actually no",
    "that's wrong",
];

const SCOPE_AMBIGUITY: &[&str] = &[
    "everything",
    "all of it",
    "the whole thing",
    "not sure where to start",
    "where do i start",
    "where do i even start",
];

const IMPROVEMENT: &[&str] = &[
    "need to improve",
    "want to improve",
    "improve",
    "problem",
    "problems",
    "struggle",
    "struggling",
    "issue",
    "issues",
    "challenge",
    "pain point",
    "bottleneck",
    "fix",
];

const DISSATISFACTION: &[&str] = &[
    "hate",
    "terrible",
    "awful",
    "horrible",
    "useless",
    "sucks",
    "broken",
    "garbage",
    "mess",
    "nightmare",
    "worst",
    "disaster",
    "painful",
];

const FRUSTRATION: &[&str] = &[
    "frustrated",
    "frustrating",
    "frustration",
    "annoying",
    "annoyed",
    "waste of time",
    "not working",
    "isn't working",
    "going in circles",
    "fed up",
    "sick of",
    "pointless",
];

const SATISFACTION: &[&str] = &[
    "thanks",
    "thank you",
    "helpful",
    "love it",
    "love this",
    "perfect",
    "awesome",
    "this is great",
    "nice",
    "brilliant",
];

const STAKEHOLDERS: &[&str] = &[
    "stakeholder",
    "stakeholders",
    "my boss",
    "my manager",
    "leadership",
    "ceo",
    "cto",
    "the board",
    "executive",
    "executives",
    "team lead",
    "vp",
];

/// Adjective -> rating, strongest wording first.
const QUALITATIVE_RATINGS: &[(&str, u8)] = &[
    ("excellent", 5),
    ("outstanding", 5),
    ("great", 4),
    ("good", 4),
    ("solid", 4),
    ("decent", 3),
    ("okay", 3),
    ("ok", 3),
    ("average", 3),
    ("fine", 3),
    ("mediocre", 2),
    ("weak", 2),
    ("poor", 2),
    ("bad", 1),
    ("terrible", 1),
    ("awful", 1),
    ("horrible", 1),
];

/// Everything the lexical rules found in one utterance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UtteranceFeatures {
    /// Domain components mentioned, in order of appearance.
    pub components: Vec<String>,
    pub numeric_rating: Option<u8>,
    pub qualitative_rating: Option<u8>,
    pub intensity: bool,
    pub dissatisfied: bool,
    pub frustrated: bool,
    pub satisfied: bool,
    pub confused: bool,
    pub contradiction: bool,
    pub scope_ambiguous: bool,
    pub improvement: bool,
    pub timeline: bool,
    pub budget: bool,
    pub stakeholder: bool,
    /// Explicit requests, in rule order.
    pub explicit: Vec<SignalId>,
}

impl UtteranceFeatures {
    pub fn has_domain_vocabulary(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn has_sentiment(&self) -> bool {
        self.dissatisfied || self.frustrated || self.satisfied
    }

    /// Numeric rating if present, otherwise a qualitative one tied to a component.
    pub fn rating(&self) -> Option<(u8, bool)> {
        match (self.numeric_rating, self.qualitative_rating) {
            (Some(score), _) => Some((score, true)),
            (None, Some(score)) if self.has_domain_vocabulary() => Some((score, false)),
            _ => None,
        }
    }
}

/// Keyword and pattern rules, configured with domain vocabulary and intensity markers.
#[derive(Debug, Clone)]
pub struct Lexicon {
    domain_terms: Vec<String>,
    intensity_markers: Vec<String>,
}

impl Lexicon {
    pub fn new(config: &DetectionConfig) -> Self {
        let mut domain_terms: Vec<String> = config
            .domain_terms
            .iter()
            .map(|t| normalize_text(t))
            .filter(|t| !t.is_empty())
            .collect();
        // Longest first so "data quality" claims its span before "data".
        domain_terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        domain_terms.dedup();

        Self {
            domain_terms,
            intensity_markers: config
                .intensity_markers
                .iter()
                .map(|m| normalize_text(m))
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Read every lexical feature from an utterance.
    pub fn features(&self, utterance: &str) -> UtteranceFeatures {
        let text = normalize_text(utterance);

        UtteranceFeatures {
            components: find_terms(&text, &self.domain_terms),
            numeric_rating: numeric_rating(&text),
            qualitative_rating: QUALITATIVE_RATINGS
                .iter()
                .find(|(word, _)| contains_phrase(&text, word))
                .map(|(_, score)| *score),
            intensity: self
                .intensity_markers
                .iter()
                .any(|marker| contains_phrase(&text, marker)),
            dissatisfied: contains_any(&text, DISSATISFACTION),
            frustrated: contains_any(&text, FRUSTRATION),
            satisfied: contains_any(&text, SATISFACTION),
            confused: contains_any(&text, CONFUSION),
            contradiction: contains_any(&text, CONTRADICTION),
            scope_ambiguous: contains_any(&text, SCOPE_AMBIGUITY),
            improvement: contains_any(&text, IMPROVEMENT),
            timeline: TIMELINE.is_match(&text),
            budget: BUDGET.is_match(&text),
            stakeholder: contains_any(&text, STAKEHOLDERS),
            explicit: EXPLICIT_RULES
                .iter()
                .filter(|(_, phrases)| contains_any(&text, phrases))
                .map(|(id, _)| *id)
                .collect(),
        }
    }
}

/// Lowercase and fold typographic apostrophes.
pub(crate) fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

fn score_from_digits(caps: regex::Captures<'_>) -> Option<u8> {
    caps.get(1)
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|score| score.round().clamp(1.0, 5.0) as u8)
}

fn numeric_rating(text: &str) -> Option<u8> {
    if let Some(score) = NUMERIC_RATING.captures(text).and_then(score_from_digits) {
        return Some(score);
    }
    if let Some(score) = VERB_RATING.captures(text).and_then(score_from_digits) {
        return Some(score);
    }

    WORD_RATING.captures(text).and_then(|caps| {
        let score = match caps.get(1)?.as_str() {
            "one" => 1,
            "two" => 2,
            "three" => 3,
            "four" => 4,
            "five" => 5,
            _ => return None,
        };
        Some(score)
    })
}

fn is_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
}

/// Whole-word (or whole-phrase) containment.
pub(crate) fn contains_phrase(text: &str, phrase: &str) -> bool {
    !phrase.is_empty()
        && text
            .match_indices(phrase)
            .any(|(start, _)| is_boundary(text, start, start + phrase.len()))
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(text, phrase))
}

/// Find non-overlapping term mentions, ordered by position. `terms` must be longest first.
fn find_terms(text: &str, terms: &[String]) -> Vec<String> {
    let mut claimed: Vec<(usize, usize, &str)> = Vec::new();

    for term in terms {
        for (start, _) in text.match_indices(term.as_str()) {
            let end = start + term.len();
            if !is_boundary(text, start, end) {
                continue;
            }
            if claimed.iter().any(|(s, e, _)| start < *e && *s < end) {
                continue;
            }
            claimed.push((start, end, term.as_str()));
        }
    }

    claimed.sort_by_key(|(start, _, _)| *start);

    let mut found: Vec<String> = Vec::new();
    for (_, _, term) in claimed {
        if !found.iter().any(|f| f == term) {
            found.push(term.to_string());
        }
    }
    found
}
