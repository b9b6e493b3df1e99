use anyhow::Result;
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::tickets;

pub fn set<S: KeyValueStore>(app: &mut App<S>, id: i64, status: &str, now: DateTime<Utc>) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    tickets::update_status(&mut ctx, auth, id, status)?;
    println!("Ticket #{} is now {}", id, status);
    Ok(())
}

pub fn assign<S: KeyValueStore>(
    app: &mut App<S>,
    id: i64,
    assignee: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    tickets::assign_ticket(&mut ctx, auth, id, assignee)?;
    if assignee.trim().is_empty() {
        println!("Unassigned ticket #{}", id);
    } else {
        println!("Assigned ticket #{} to {}", id, assignee.trim());
    }
    Ok(())
}
