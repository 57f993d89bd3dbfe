use anyhow::Result;
use chrono::Utc;

use crate::config::KoaConfig;
use crate::knowledge::seed;

/// Replace the official knowledge and daily posts, keeping user training.
pub fn seed(config: &KoaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut conn = crate::db::open_database(&db_path)?;

    let report = seed::reseed(&mut conn, Utc::now())?;

    println!("Knowledge reseeded");
    println!("{}", "=".repeat(40));
    println!("  Snippets removed:    {}", report.snippets.removed);
    println!("  Snippets inserted:   {}", report.snippets.inserted);
    println!("  Official posts:      {}", report.official_posts);
    println!(
        "  Daily posts:         {} (replaced {})",
        report.daily_posts.inserted, report.daily_posts.removed
    );
    Ok(())
}
