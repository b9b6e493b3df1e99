use anyhow::{bail, Result};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::models::{validate_priority, validate_status, Ticket};
use ticketdesk::tickets::{self, TicketFilter};

use super::{require_login, truncate};

pub fn run<S: KeyValueStore>(app: &App<S>, filter: &TicketFilter) -> Result<()> {
    require_login(app, "view tickets")?;
    if let Some(status) = &filter.status {
        if !validate_status(status) {
            bail!("Unknown status '{}'", status);
        }
    }
    if let Some(priority) = &filter.priority {
        if !validate_priority(priority) {
            bail!("Unknown priority '{}'", priority);
        }
    }

    let found = tickets::list_tickets(app.storage().tickets(), filter);
    if found.is_empty() {
        println!("No tickets found.");
        return Ok(());
    }

    for ticket in found {
        println!("{}", format_row(ticket));
    }
    Ok(())
}

fn format_row(ticket: &Ticket) -> String {
    let status_display = format!("[{}]", ticket.status);
    let assignee = if ticket.assignee.is_empty() {
        "-"
    } else {
        ticket.assignee.as_str()
    };
    format!(
        "#{:<4} {:13} {:<30} {:8} {:<16} {}",
        ticket.id,
        status_display,
        truncate(&ticket.customer_name, 30),
        ticket.priority,
        truncate(assignee, 16),
        ticket.created_at.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn test_list_requires_login() {
        let app = setup_test_app();
        assert!(run(&app, &TicketFilter::default()).is_err());
    }

    #[test]
    fn test_list_as_guest() {
        let app = setup_as_guest();
        run(&app, &TicketFilter::default()).unwrap();
    }

    #[test]
    fn test_list_rejects_unknown_status() {
        let app = setup_as_user();
        let filter = TicketFilter {
            status: Some("Done".to_string()),
            ..TicketFilter::default()
        };
        assert!(run(&app, &filter).is_err());
    }

    #[test]
    fn test_list_rejects_unknown_priority() {
        let app = setup_as_user();
        let filter = TicketFilter {
            priority: Some("urgent".to_string()),
            ..TicketFilter::default()
        };
        assert!(run(&app, &filter).is_err());
    }

    #[test]
    fn test_format_row_unassigned() {
        let app = setup_as_user();
        let ticket = app
            .storage()
            .tickets()
            .iter()
            .find(|t| t.assignee.is_empty())
            .unwrap();
        let row = format_row(ticket);
        assert!(row.starts_with(&format!("#{:<4}", ticket.id)));
        assert!(row.contains(" - "));
    }
}
