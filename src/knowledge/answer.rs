//! Composes the direct answer returned by the knowledge search endpoint.

use serde::Serialize;

use super::search::ScoredSnippet;
use super::seed::{GITBOOK_URL, TWITTER_URL};

pub const NO_INFO_MESSAGE: &str = "I don't have specific information about that yet. You can visit \
     our GitBook for comprehensive documentation or ask me to train on this topic!";

const JUPITER_NOTE: &str = "**Important Note:** Jupiter Integration is not live yet, but it's \
     planned! The utility is coming soon. Keep an eye on our Twitter page for updates on its launch!";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnswer {
    pub message: String,
    pub has_training_data: bool,
    pub training_data_count: usize,
    pub official_content_count: usize,
}

/// Truncate to `max_chars` characters, appending "..." if anything was cut.
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((end, _)) => format!("{}...", &content[..end]),
    }
}

pub fn links_block() -> String {
    format!("**For more detailed information:**\n- GitBook: {GITBOOK_URL}\n- Twitter: {TWITTER_URL}")
}

/// Build the answer text for `query` from ranked results.
///
/// User training and official content are reported separately; training
/// leads when any training hit was captured from a question.
pub fn compose_answer(query: &str, results: &[ScoredSnippet]) -> SearchAnswer {
    if results.is_empty() {
        return SearchAnswer {
            message: NO_INFO_MESSAGE.to_string(),
            has_training_data: false,
            training_data_count: 0,
            official_content_count: 0,
        };
    }

    let (training, official): (Vec<&ScoredSnippet>, Vec<&ScoredSnippet>) =
        results.iter().partition(|r| r.snippet.is_user_training());

    let mut message = match (training.first(), official.first()) {
        (Some(t), Some(o)) => {
            let mut m = format!(
                "I found both official documentation and user training data about \"{query}\". \
                 Here's what I know:"
            );
            let training_first = training.iter().any(|r| r.snippet.intent() == Some("question"));
            let docs = truncate_chars(&o.snippet.body, 200);
            if training_first {
                m.push_str(&format!("\n\n**Based on user training:** {}", t.snippet.body));
                m.push_str(&format!("\n\n**Official documentation:** {docs}"));
            } else {
                m.push_str(&format!("\n\n**Official documentation:** {docs}"));
                m.push_str(&format!(
                    "\n\n**Additional insights from training:** {}",
                    t.snippet.body
                ));
            }
            m
        }
        (Some(t), None) => format!(
            "Based on user training data, here's what I know about \"{query}\":\n\n{}\n\n\
             *This information comes from user training. For official documentation, visit our GitBook.*",
            t.snippet.body
        ),
        (None, Some(o)) => format!(
            "Here's what I found about \"{query}\":\n\n{}",
            truncate_chars(&o.snippet.body, 300)
        ),
        (None, None) => String::new(),
    };

    let lower = query.to_lowercase();
    if lower.contains("jupiter") || lower.contains("swap") {
        message.push_str("\n\n");
        message.push_str(JUPITER_NOTE);
    }
    message.push_str("\n\n");
    message.push_str(&links_block());

    SearchAnswer {
        message,
        has_training_data: !training.is_empty(),
        training_data_count: training.len(),
        official_content_count: official.len(),
    }
}
