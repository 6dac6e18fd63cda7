//! Inbound SMS command parsing
//!
//! Parsing is state-sensitive: free-text states capture almost anything,
//! the cancel-confirm state only recognizes YES/NO families (anything else
//! denies, so ambiguous input can never trigger a cancellation), and YES/NO
//! outside that state are deliberately unknown.
//!
//! Idle matching order: exact dictionary, common-misspelling dictionary,
//! single-edit-distance fuzzy match, verb-phrase compound (COMPETITOR ADD
//! <name>), then Unknown.

use crate::models::ConversationState;
use strsim::levenshtein;

/// Parsed owner command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Approve,
    Edit,
    Ignore,
    Pause,
    Resume,
    Status,
    Billing,
    Cancel,
    Help,
    Stop,
    /// YES in awaiting_cancel_confirm
    CancelConfirm,
    /// NO (or anything unrecognized) in awaiting_cancel_confirm
    CancelDeny,
    /// Free text in awaiting_custom_reply; raw text preserved
    CustomReply(String),
    /// COMPETITOR [ADD <name>]; None prompts for the name
    CompetitorAdd(Option<String>),
    /// Free text in awaiting_competitor_add
    CompetitorName(String),
    Unknown,
}

impl Command {
    /// Stable label for the notification log
    pub fn label(&self) -> &'static str {
        match self {
            Command::Approve => "APPROVE",
            Command::Edit => "EDIT",
            Command::Ignore => "IGNORE",
            Command::Pause => "PAUSE",
            Command::Resume => "RESUME",
            Command::Status => "STATUS",
            Command::Billing => "BILLING",
            Command::Cancel => "CANCEL",
            Command::Help => "HELP",
            Command::Stop => "STOP",
            Command::CancelConfirm => "CANCEL_CONFIRM",
            Command::CancelDeny => "CANCEL_DENY",
            Command::CustomReply(_) => "CUSTOM_REPLY",
            Command::CompetitorAdd(_) => "COMPETITOR_ADD",
            Command::CompetitorName(_) => "COMPETITOR_NAME",
            Command::Unknown => "UNKNOWN",
        }
    }
}

/// Exact command dictionary
const COMMANDS: &[(&str, Command)] = &[
    ("APPROVE", Command::Approve),
    ("EDIT", Command::Edit),
    ("IGNORE", Command::Ignore),
    ("PAUSE", Command::Pause),
    ("RESUME", Command::Resume),
    ("STATUS", Command::Status),
    ("BILLING", Command::Billing),
    ("CANCEL", Command::Cancel),
    ("HELP", Command::Help),
    ("STOP", Command::Stop),
];

/// Common misspellings observed in the wild
const MISSPELLINGS: &[(&str, Command)] = &[
    ("APROVE", Command::Approve),
    ("APPROVED", Command::Approve),
    ("APPOVE", Command::Approve),
    ("APRROVE", Command::Approve),
    ("IGNOR", Command::Ignore),
    ("INGORE", Command::Ignore),
    ("CANCLE", Command::Cancel),
    ("CANCELL", Command::Cancel),
    ("BILING", Command::Billing),
    ("STATS", Command::Status),
    ("RESUM", Command::Resume),
];

const YES_TOKENS: &[&str] = &["YES", "Y", "YEAH", "YEP", "YA", "CONFIRM"];
const NO_TOKENS: &[&str] = &["NO", "N", "NOPE", "NAH"];

/// Minimum token length eligible for fuzzy matching; short tokens produce
/// too many accidental single-edit neighbors
const FUZZY_MIN_LEN: usize = 4;

/// Parse an inbound SMS body against the current conversation state
pub fn parse(raw_body: &str, state: ConversationState) -> Command {
    let trimmed = raw_body.trim();
    let normalized = trimmed.to_uppercase();

    match state {
        ConversationState::AwaitingCustomReply => {
            // Only unambiguous overrides escape free-text capture; YES/NO
            // stay literal text here
            match normalized.as_str() {
                "IGNORE" => Command::Ignore,
                "STOP" => Command::Stop,
                "" => Command::Unknown,
                _ => Command::CustomReply(trimmed.to_string()),
            }
        }
        ConversationState::AwaitingCancelConfirm => {
            if YES_TOKENS.contains(&normalized.as_str()) {
                Command::CancelConfirm
            } else if normalized == "STOP" {
                Command::Stop
            } else {
                // NO-family and everything else both deny; ambiguous input
                // never cancels a subscription
                Command::CancelDeny
            }
        }
        ConversationState::AwaitingCompetitorAdd => match normalized.as_str() {
            "IGNORE" => Command::Ignore,
            "STOP" => Command::Stop,
            "" => Command::Unknown,
            _ => Command::CompetitorName(trimmed.to_string()),
        },
        ConversationState::Idle => parse_idle(trimmed, &normalized),
    }
}

fn parse_idle(raw: &str, normalized: &str) -> Command {
    if normalized.is_empty() {
        return Command::Unknown;
    }

    let tokens: Vec<String> = normalized
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|t| !t.is_empty())
        .collect();

    let Some(first) = tokens.first() else {
        return Command::Unknown;
    };

    // Verb-phrase compound: COMPETITOR ADD <free text>
    if matches_word(first, "COMPETITOR") {
        if tokens.get(1).map(String::as_str) == Some("ADD") {
            let name = raw
                .split_whitespace()
                .skip(2)
                .collect::<Vec<_>>()
                .join(" ");
            return if name.is_empty() {
                Command::CompetitorAdd(None)
            } else {
                Command::CompetitorAdd(Some(name))
            };
        }
        return Command::CompetitorAdd(None);
    }

    // Confirmation tokens have no meaning outside awaiting_cancel_confirm
    if YES_TOKENS.contains(&first.as_str()) || NO_TOKENS.contains(&first.as_str()) {
        return Command::Unknown;
    }

    if tokens.len() > 1 {
        return Command::Unknown;
    }

    // Exact dictionary
    for (word, command) in COMMANDS {
        if first == word {
            return command.clone();
        }
    }

    // Known misspellings
    for (word, command) in MISSPELLINGS {
        if first == word {
            return command.clone();
        }
    }

    // Single-edit-distance fuzzy match; must be unique to count
    if first.len() >= FUZZY_MIN_LEN {
        let mut matched: Option<Command> = None;
        for (word, command) in COMMANDS {
            if levenshtein(first, word) == 1 {
                if matched.is_some() {
                    return Command::Unknown;
                }
                matched = Some(command.clone());
            }
        }
        if let Some(command) = matched {
            return command;
        }
    }

    Command::Unknown
}

fn strip_punctuation(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_string()
}

fn matches_word(token: &str, word: &str) -> bool {
    token == word || (token.len() >= FUZZY_MIN_LEN && levenshtein(token, word) == 1)
}
