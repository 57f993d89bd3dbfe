use anyhow::Result;
use chrono::Utc;

use crate::config::KoaConfig;
use crate::quota::{self, QuotaPolicy};

/// List active clients with their current window and lifetime usage.
pub fn clients(config: &KoaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let policy = QuotaPolicy::default();
    let clients = quota::list_active_clients(&conn)?;
    let stats = quota::client_statistics(&clients, Utc::now(), &policy);

    println!("Client Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total clients:       {}", stats.total_clients);
    println!("  Active today:        {}", stats.active_today);
    println!("  Total messages:      {}", stats.total_messages);
    println!("  Daily limit:         {}", stats.daily_limit);
    println!();

    if clients.is_empty() {
        return Ok(());
    }

    println!("{:<38} {:>7} {:>9}  {}", "Client", "Today", "Lifetime", "Window start");
    for c in &clients {
        println!(
            "{:<38} {:>7} {:>9}  {}",
            c.client_id,
            c.message_count,
            c.total_messages,
            c.window_start.format("%Y-%m-%d %H:%M UTC")
        );
    }

    Ok(())
}
