use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

use ticketdesk::app::App;
use ticketdesk::config::AppConfig;
use ticketdesk::db::Database;

pub const STORE_FILE: &str = "store.db";

pub fn run(dir: &Path, config: AppConfig, now: DateTime<Utc>) -> Result<()> {
    let store_path = dir.join(STORE_FILE);
    if store_path.exists() {
        println!("Already initialized at {}", dir.display());
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let db = Database::open(&store_path).context("Failed to create store")?;
    let app = App::start(db, config, now)?;
    println!("Created {}", dir.display());

    if app.is_first_run() {
        println!(
            "Loaded {} demo tickets and {} users.",
            app.storage().tickets().len(),
            app.storage().users().len()
        );
        println!("Log in with: ticketdesk login admin@firma.de --password admin123");
    }
    Ok(())
}
