use anyhow::Result;

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;

pub fn run<S: KeyValueStore>(app: &App<S>) -> Result<()> {
    let info = app.storage().storage_info()?;

    println!("Version: {}", app.storage().version());
    println!("Total:   {} KB", info.total_kb);
    println!("Tickets: {} KB ({} tickets)", info.tickets_kb, info.tickets_count);
    println!("Users:   {} KB ({} users)", info.users_kb, info.users_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn test_info_logged_out() {
        let app = setup_test_app();
        run(&app).unwrap();
    }
}
