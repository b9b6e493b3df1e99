use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;

use super::require_admin;

pub fn run<S: KeyValueStore>(app: &mut App<S>, input: &Path, now: DateTime<Utc>) -> Result<()> {
    require_admin(app, "import data")?;
    let json = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let (_, mut ctx) = app.parts(now);
    let report = ctx.storage.import_all(&json, ctx.notices, now)?;

    match report.tickets {
        Some(count) => println!("Imported {} tickets", count),
        None => println!("No tickets in import"),
    }
    if report.settings {
        println!("Imported settings");
    }
    Ok(())
}
