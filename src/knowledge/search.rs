//! Heuristic relevance scoring over the active snippet collection.
//!
//! Scoring is an ordered table of weighted rules evaluated per snippet.
//! Each rule reports how many times it fired; the snippet score is the sum of
//! `weight * hits` over all rules. Bonus rules only count when at least one
//! relevance rule fired, so a snippet with no textual overlap always scores 0
//! and is dropped.
//!
//! The computation is pure: no store access, no randomness, and a stable sort,
//! so the same query over the same collection always yields the same ranking.

use serde::Serialize;

use super::types::Snippet;

/// Default number of snippets returned.
pub const MAX_RESULTS: usize = 8;

/// Words this many positions either side of a phrase occurrence count as context.
const CONTEXT_WINDOW: usize = 20;

// ── Public types ──────────────────────────────────────────────────────────────

/// A snippet that survived scoring, with the labels of the rules that fired.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSnippet {
    pub snippet: Snippet,
    pub score: u32,
    pub matched: Vec<&'static str>,
}

/// Rank `snippets` against `query`, returning at most [`MAX_RESULTS`].
pub fn search(query: &str, snippets: &[Snippet]) -> Vec<ScoredSnippet> {
    search_with_limit(query, snippets, MAX_RESULTS)
}

/// Rank `snippets` against `query`, returning at most `limit` results.
///
/// An empty or whitespace-only query returns an empty list.
pub fn search_with_limit(query: &str, snippets: &[Snippet], limit: usize) -> Vec<ScoredSnippet> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let terms = query_terms(&query);

    let mut scored: Vec<ScoredSnippet> = snippets
        .iter()
        .filter_map(|snippet| {
            let signals = Signals::new(&query, &terms, snippet);
            let (score, matched) = score(&signals);
            (score > 0).then(|| ScoredSnippet {
                snippet: snippet.clone(),
                score,
                matched,
            })
        })
        .collect();

    // Vec::sort_by is stable: ties keep collection order.
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);

    tracing::debug!(
        query = %query,
        candidates = snippets.len(),
        returned = scored.len(),
        top_score = scored.first().map(|s| s.score).unwrap_or(0),
        "relevance search complete"
    );
    scored
}

// ── Rule table ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    /// Evidence that the snippet is about the query.
    Relevance,
    /// Only counted once some relevance rule fired.
    Bonus,
}

struct Rule {
    label: &'static str,
    weight: u32,
    kind: RuleKind,
    hits: fn(&Signals<'_>) -> u32,
}

fn flag(b: bool) -> u32 {
    u32::from(b)
}

const RULES: &[Rule] = &[
    Rule {
        label: "exact_phrase",
        weight: 100,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.phrase_in_haystack),
    },
    Rule {
        label: "title_match",
        weight: 50,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.title.contains(s.query)),
    },
    Rule {
        label: "body_match",
        weight: 45,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.phrase_in_body),
    },
    Rule {
        label: "term_match",
        weight: 10,
        kind: RuleKind::Relevance,
        hits: |s| s.terms_in_body,
    },
    Rule {
        label: "section_match",
        weight: 20,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.section.contains(s.query)),
    },
    Rule {
        label: "training_content",
        weight: 30,
        kind: RuleKind::Bonus,
        hits: |s| flag(s.is_training),
    },
    Rule {
        label: "training_phrase",
        weight: 20,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.is_training && s.phrase_in_body),
    },
    Rule {
        label: "keyword_match",
        weight: 15,
        kind: RuleKind::Relevance,
        hits: |s| s.keywords.iter().filter(|k| k.contains(s.query)).count() as u32,
    },
    Rule {
        label: "intent_match",
        weight: 25,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.intent.as_deref().is_some_and(|i| i.contains(s.query))),
    },
    Rule {
        label: "substantive_body",
        weight: 5,
        kind: RuleKind::Bonus,
        hits: |s| flag(s.body_chars > 200),
    },
    Rule {
        label: "phrase_in_long_body",
        weight: 15,
        kind: RuleKind::Relevance,
        hits: |s| flag(s.phrase_in_haystack && s.body_chars > 100),
    },
    Rule {
        label: "multi_term",
        weight: 8,
        kind: RuleKind::Relevance,
        hits: |s| s.terms_in_body.saturating_sub(1),
    },
    Rule {
        label: "fuzzy_partial",
        weight: 5,
        kind: RuleKind::Relevance,
        hits: |s| s.fuzzy_terms,
    },
    Rule {
        label: "context_relevance",
        weight: 3,
        kind: RuleKind::Relevance,
        hits: |s| s.context_terms,
    },
];

fn score(signals: &Signals<'_>) -> (u32, Vec<&'static str>) {
    let fired: Vec<(&Rule, u32)> = RULES
        .iter()
        .map(|rule| (rule, (rule.hits)(signals)))
        .filter(|(_, hits)| *hits > 0)
        .collect();

    if !fired.iter().any(|(rule, _)| rule.kind == RuleKind::Relevance) {
        return (0, Vec::new());
    }

    let total = fired.iter().map(|(rule, hits)| rule.weight * hits).sum();
    let labels = fired.iter().map(|(rule, _)| rule.label).collect();
    (total, labels)
}

// ── Per-snippet signals ───────────────────────────────────────────────────────

/// Everything the rules look at, computed once per snippet.
struct Signals<'a> {
    query: &'a str,
    title: String,
    section: String,
    keywords: Vec<String>,
    intent: Option<String>,
    is_training: bool,
    body_chars: usize,
    phrase_in_haystack: bool,
    phrase_in_body: bool,
    terms_in_body: u32,
    fuzzy_terms: u32,
    context_terms: u32,
}

impl<'a> Signals<'a> {
    fn new(query: &'a str, terms: &[String], snippet: &Snippet) -> Self {
        let title = snippet.title.to_lowercase();
        let body = snippet.body.to_lowercase();
        let section = snippet.section.to_lowercase();
        let haystack = format!("{title} {body} {section}");

        let phrase_in_haystack = haystack.contains(query);
        let phrase_in_body = body.contains(query);

        let terms_in_body = terms.iter().filter(|t| body.contains(t.as_str())).count() as u32;

        let body_words: Vec<&str> = body
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 3)
            .collect();
        let fuzzy_terms = terms
            .iter()
            .filter(|t| {
                body_words
                    .iter()
                    .any(|w| w.contains(t.as_str()) || t.contains(*w))
            })
            .count() as u32;

        let context_terms = if phrase_in_haystack {
            context_term_hits(&body, query, terms)
        } else {
            0
        };

        Self {
            query,
            title,
            section,
            keywords: snippet.keywords.iter().map(|k| k.to_lowercase()).collect(),
            intent: snippet.intent().map(str::to_lowercase),
            is_training: snippet.is_user_training(),
            body_chars: snippet.body.chars().count(),
            phrase_in_haystack,
            phrase_in_body,
            terms_in_body,
            fuzzy_terms,
            context_terms,
        }
    }
}

/// Distinct query words longer than two characters, edge punctuation removed.
pub(crate) fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.chars().count() > 2 && !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}

/// Count terms that appear within [`CONTEXT_WINDOW`] words of any occurrence
/// of `phrase` in `body`. Each term counts at most once.
fn context_term_hits(body: &str, phrase: &str, terms: &[String]) -> u32 {
    let words: Vec<(usize, &str)> = word_offsets(body);
    if words.is_empty() {
        return 0;
    }
    let phrase_len = phrase.split_whitespace().count().max(1);

    let mut windows: Vec<(usize, usize)> = Vec::new();
    for (offset, _) in body.match_indices(phrase) {
        // Index of the word containing the start of the match.
        let start = words
            .iter()
            .rposition(|(word_start, _)| *word_start <= offset)
            .unwrap_or(0);
        let lo = start.saturating_sub(CONTEXT_WINDOW);
        let hi = (start + phrase_len + CONTEXT_WINDOW).min(words.len());
        windows.push((lo, hi));
    }

    terms
        .iter()
        .filter(|term| {
            windows
                .iter()
                .any(|&(lo, hi)| words[lo..hi].iter().any(|(_, w)| w.contains(term.as_str())))
        })
        .count() as u32
}

/// Whitespace-separated words with their byte offsets.
fn word_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                out.push((s, &text[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out
}
