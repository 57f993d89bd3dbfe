use anyhow::Result;

use crate::config::KoaConfig;
use crate::knowledge::answer::truncate_chars;
use crate::knowledge::{search_with_limit, store};

/// Rank the active snippets against `query` and print them.
pub fn search(config: &KoaConfig, query: &str, limit: usize) -> Result<()> {
    anyhow::ensure!(!query.trim().is_empty(), "query must not be empty");

    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let snippets = store::list_active_snippets(&conn)?;
    let results = search_with_limit(query, &snippets, limit);

    if results.is_empty() {
        println!("No results found ({} active snippets searched).", snippets.len());
        return Ok(());
    }

    println!("Found {} result(s) in {} snippets\n", results.len(), snippets.len());

    for (i, result) in results.iter().enumerate() {
        let s = &result.snippet;
        let tag = if s.is_user_training() { " [training]" } else { "" };
        println!("  {}. {} ({}){} score: {}", i + 1, s.title, s.section, tag, result.score);
        println!("     rules: {}", result.matched.join(", "));
        println!("     {}", truncate_chars(&s.body, 120));
        println!();
    }

    Ok(())
}
