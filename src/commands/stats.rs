use anyhow::Result;

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::tickets;

use super::require_login;

pub fn run<S: KeyValueStore>(app: &App<S>) -> Result<()> {
    require_login(app, "view tickets")?;
    let stats = tickets::ticket_stats(app.storage().tickets());

    println!("Total:       {}", stats.total);
    println!("Open:        {}", stats.open);
    println!("In Progress: {}", stats.in_progress);
    println!("Resolved:    {}", stats.resolved);
    println!("Closed:      {}", stats.closed);
    if stats.critical > 0 {
        println!("Critical:    {}", stats.critical);
    }
    Ok(())
}
