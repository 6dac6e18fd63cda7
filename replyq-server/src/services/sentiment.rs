//! Sentiment and escalation classification
//!
//! Deterministic, no I/O: the same review always classifies the same way,
//! which keeps re-classification on retry paths idempotent.
//!
//! Scoring:
//! - Base score: (rating - 3) / 2, range [-1, 1]
//! - Text adjustment: clamp(positive - negative keyword hits, -4, 4) * 0.05
//! - Final score clamped to [-1, 1]
//! - Label: > 0.1 positive, < -0.1 negative, else neutral
//!
//! Escalation is an independent keyword-category scan; any hit flags the
//! review for human-worded caution regardless of the sentiment score.

use crate::models::Sentiment;

const POSITIVE_KEYWORDS: &[&str] = &[
    "great", "excellent", "amazing", "wonderful", "fantastic", "delicious", "friendly",
    "love", "loved", "perfect", "best", "awesome", "recommend", "helpful", "clean",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "bad", "terrible", "awful", "horrible", "rude", "slow", "dirty", "worst",
    "disgusting", "disappointed", "disappointing", "poor", "overpriced", "stale",
];

/// Escalation keyword categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationCategory {
    Health,
    LegalThreat,
    Discrimination,
    Refund,
    ExtremeNegativity,
}

impl EscalationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationCategory::Health => "health",
            EscalationCategory::LegalThreat => "legal_threat",
            EscalationCategory::Discrimination => "discrimination",
            EscalationCategory::Refund => "refund",
            EscalationCategory::ExtremeNegativity => "extreme_negativity",
        }
    }
}

/// Phrase lists per escalation category. Matched as substrings of the
/// lowercased text so multi-word phrases work.
const ESCALATION_CATEGORIES: &[(EscalationCategory, &[&str])] = &[
    (
        EscalationCategory::Health,
        &["food poisoning", "got sick", "made me sick", "allergic reaction", "hospital", "health department", "vomit"],
    ),
    (
        EscalationCategory::LegalThreat,
        &["lawyer", "attorney", "lawsuit", "sue you", "suing", "legal action", "court"],
    ),
    (
        EscalationCategory::Discrimination,
        &["racist", "racism", "discriminat", "sexist", "harass", "prejudice"],
    ),
    (
        EscalationCategory::Refund,
        &["refund", "money back", "chargeback", "charge back", "dispute the charge"],
    ),
    (
        EscalationCategory::ExtremeNegativity,
        &["scam", "fraud", "never again", "worst experience", "health hazard", "shut down"],
    ),
];

/// Classification result for one review
#[derive(Debug, Clone)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    /// Final score in [-1, 1]
    pub score: f64,
    /// Positive keyword hits in the text
    pub positive_signals: usize,
    /// Negative keyword hits in the text
    pub negative_signals: usize,
}

/// Deterministic sentiment and escalation classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentClassifier;

impl SentimentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a review from its star rating and text
    pub fn classify(&self, rating: i64, text: &str) -> SentimentResult {
        let base = (rating as f64 - 3.0) / 2.0;

        let tokens = tokenize(text);
        let positive_signals = count_hits(&tokens, POSITIVE_KEYWORDS);
        let negative_signals = count_hits(&tokens, NEGATIVE_KEYWORDS);

        let signal = (positive_signals as f64 - negative_signals as f64).clamp(-4.0, 4.0);
        let score = (base + signal * 0.05).clamp(-1.0, 1.0);

        let sentiment = if score > 0.1 {
            Sentiment::Positive
        } else if score < -0.1 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        SentimentResult {
            sentiment,
            score,
            positive_signals,
            negative_signals,
        }
    }

    /// Scan the text for escalation categories
    ///
    /// Returns the set of matched categories (each at most once, in
    /// declaration order).
    pub fn escalation_reasons(&self, text: &str) -> Vec<EscalationCategory> {
        let lowered = text.to_lowercase();

        ESCALATION_CATEGORIES
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p)))
            .map(|(category, _)| *category)
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn count_hits(tokens: &[String], keywords: &[&str]) -> usize {
    tokens.iter().filter(|t| keywords.contains(&t.as_str())).count()
}
