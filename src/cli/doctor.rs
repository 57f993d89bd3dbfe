//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::KoaConfig;
use crate::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &KoaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `koa seed` or `koa serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    println!("Koa Health Report");
    println!("=================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Clients:         {}", report.client_count);
    println!("  Active snippets: {}", report.active_snippet_count);
    println!("  Posts:           {}", report.post_count);
    println!();
    println!(
        "Completion API:    {}",
        if config.completion.api_key.is_some() { "key configured" } else { "OPENAI_API_KEY not set" }
    );
    println!(
        "Training capture:  {}",
        if config.training.secret_code.is_some() { "enabled" } else { "disabled" }
    );
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Stop the server and restore from a backup of {}", db_path.display());
        println!("  2. Or move the file aside and run `koa seed` to start fresh");
    }

    if report.active_snippet_count == 0 {
        println!();
        println!("No active knowledge. Run `koa seed` to load the official set.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
