//! Keyword heuristics applied to captured training messages.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    HelpRequest,
    Gratitude,
    Farewell,
    KoasyncRelated,
    GeneralStatement,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::HelpRequest => "help_request",
            Self::Gratitude => "gratitude",
            Self::Farewell => "farewell",
            Self::KoasyncRelated => "koasync_related",
            Self::GeneralStatement => "general_statement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnalysis {
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub complexity: Complexity,
    pub suggestions: Vec<String>,
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "awesome", "amazing", "love", "like", "happy", "excited",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "hate", "dislike", "sad", "angry", "frustrated", "disappointed",
];

/// Topic label and the substrings that trigger it.
const TOPICS: &[(&str, &[&str])] = &[
    ("blockchain", &["solana", "blockchain"]),
    ("defi", &["jupiter", "swap"]),
    ("cryptocurrency", &["token", "coin"]),
    ("anime", &["anime", "character"]),
    ("communication", &["voice", "chat"]),
];

/// Main topic label and the substrings that select it, first match wins.
const MAIN_TOPICS: &[(&str, &[&str])] = &[
    ("Non-Custodial Trading", &["non-custodial", "custodial"]),
    ("Jupiter Integration", &["jupiter"]),
    ("Wallet & Transactions", &["wallet", "transaction"]),
    ("Automated Services", &["automated", "service"]),
    ("Market Watching", &["market", "watching"]),
    ("Koasync Features", &["koasync", "koa"]),
];

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

pub fn analyze(message: &str) -> MessageAnalysis {
    MessageAnalysis {
        intent: intent(message),
        sentiment: sentiment(message),
        topics: topics(message),
        complexity: complexity(message),
        suggestions: suggestions(message),
    }
}

pub fn intent(message: &str) -> Intent {
    let lower = message.to_lowercase();
    if contains_any(&lower, &["how", "what", "why"]) {
        Intent::Question
    } else if contains_any(&lower, &["help", "support"]) {
        Intent::HelpRequest
    } else if lower.contains("thank") {
        Intent::Gratitude
    } else if lower.contains("bye") {
        Intent::Farewell
    } else if lower.contains("koa") {
        Intent::KoasyncRelated
    } else {
        Intent::GeneralStatement
    }
}

pub fn sentiment(message: &str) -> Sentiment {
    let lower = message.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

pub fn topics(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut found: Vec<String> = TOPICS
        .iter()
        .filter(|(_, triggers)| contains_any(&lower, triggers))
        .map(|(label, _)| label.to_string())
        .collect();
    // "ai" as a substring matches too many ordinary words
    if has_word(&lower, "ai") || lower.contains("artificial intelligence") {
        let pos = found
            .iter()
            .position(|t| t == "anime" || t == "communication")
            .unwrap_or(found.len());
        found.insert(pos, "ai".to_string());
    }
    if found.is_empty() {
        found.push("general".to_string());
    }
    found
}

pub fn complexity(message: &str) -> Complexity {
    let word_count = message.split(' ').count();
    let has_special = message.chars().any(|c| SPECIAL_CHARS.contains(c));
    let has_digit = message.chars().any(|c| c.is_ascii_digit());
    if word_count > 20 || has_special || has_digit {
        Complexity::High
    } else if word_count > 10 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

pub fn suggestions(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut out = Vec::new();
    if lower.contains("jupiter") {
        out.push("Clarify that Jupiter integration is coming soon".to_string());
        out.push("Direct to X page for updates".to_string());
    }
    if lower.contains("roadmap") {
        out.push("Provide timeline overview".to_string());
        out.push("Link to GitBook for details".to_string());
    }
    if lower.contains("token") {
        out.push("Explain utility and access levels".to_string());
        out.push("Mention subscription benefits".to_string());
    }
    if out.is_empty() {
        out.push("Continue conversation naturally".to_string());
    }
    out
}

pub fn main_topic(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    MAIN_TOPICS
        .iter()
        .find(|(_, triggers)| contains_any(&lower, triggers))
        .map(|(label, _)| *label)
        .unwrap_or("General Training")
}

/// Conversational acknowledgement sent back for a captured message.
pub fn natural_response(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("jupiter") {
        "Thanks for sharing that about Jupiter integration! I'm learning about the planned \
         features and will be able to give you better updates on this soon. Keep an eye on our \
         X page for when it goes live!"
    } else if contains_any(&lower, &["non-custodial", "wallet"]) {
        "Great information about our non-custodial approach! I'm understanding better how users \
         maintain full control of their funds. This is a key feature that sets us apart."
    } else if contains_any(&lower, &["automated", "market"]) {
        "Thanks for explaining the automated market watching features! I'm learning how I can \
         help users with pre-set parameters and trade execution. This will make me much more \
         helpful!"
    } else if lower.contains("koa") {
        "Thanks for teaching me more about Koasync! I'm learning the details so I can give you \
         better, more accurate information about our platform."
    } else {
        "Thanks for sharing that information! I'm learning from our conversation and this will \
         help me give you better answers in the future. Keep teaching me!"
    }
}

/// Search keywords for a captured message: topics, the main topic, then
/// words longer than three characters. Duplicates are dropped.
pub fn training_keywords(message: &str, analysis: &MessageAnalysis) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let candidates = analysis
        .topics
        .iter()
        .cloned()
        .chain(std::iter::once(main_topic(message).to_lowercase()))
        .chain(
            message
                .to_lowercase()
                .split(' ')
                .filter(|w| w.chars().count() > 3)
                .map(str::to_string)
                .collect::<Vec<_>>(),
        );
    for k in candidates {
        if !keywords.contains(&k) {
            keywords.push(k);
        }
    }
    keywords
}
