use anyhow::Result;
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::tickets::{self, NewTicket};

pub fn run<S: KeyValueStore>(app: &mut App<S>, new: NewTicket, now: DateTime<Utc>) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    let id = tickets::create_ticket(&mut ctx, auth, new)?;
    println!("Created ticket #{}", id);
    Ok(())
}
