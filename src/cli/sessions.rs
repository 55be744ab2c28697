//! Sessions command implementation

use anyhow::Result;
use chrono::{Local, TimeZone};

use ptydeck::config::Config;
use ptydeck::session::SessionMap;

/// List the terminal → conversation assignments
pub fn sessions_command(config: &Config, json: bool) -> Result<()> {
    let map = SessionMap::in_dir(&config.data_dir(), config.settings.session_map.max_entries);
    let entries = map.entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sessions recorded in {}.", map.path().display());
        return Ok(());
    }

    println!("{:<32} {:<38} {:<17} CWD", "TERMINAL", "CONVERSATION", "UPDATED");
    println!("{}", "-".repeat(110));

    for (id, entry) in &entries {
        let updated = entry
            .updated_at
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("{:<32} {:<38} {:<17} {}", id, entry.uuid, updated, entry.cwd);
    }

    Ok(())
}
