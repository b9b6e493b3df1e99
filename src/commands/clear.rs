use anyhow::Result;
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::ui::Confirm;

use super::require_admin;

pub fn run<S: KeyValueStore>(
    app: &mut App<S>,
    force: bool,
    prompt: &mut dyn Confirm,
    now: DateTime<Utc>,
) -> Result<()> {
    require_admin(app, "clear data")?;
    if !force
        && !prompt.confirm("Delete ALL tickets, users and settings? This cannot be undone.")
    {
        println!("Cancelled.");
        return Ok(());
    }

    let (_, mut ctx) = app.parts(now);
    ctx.storage.clear_all(now)?;
    println!("All data cleared. Default users restored.");
    Ok(())
}
