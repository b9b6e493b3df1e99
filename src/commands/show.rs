use anyhow::Result;

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::tickets;

use super::require_login;

pub fn run<S: KeyValueStore>(app: &App<S>, id: i64) -> Result<()> {
    require_login(app, "view tickets")?;
    let ticket = tickets::get_ticket(app.storage(), id)?;

    println!("Ticket #{}: {}", ticket.id, ticket.customer_name);
    println!("Status: {}", ticket.status);
    println!("Priority: {}", ticket.priority);
    if !ticket.company.is_empty() {
        println!("Company: {}", ticket.company);
    }
    if !ticket.customer_email.is_empty() {
        println!("Email: {}", ticket.customer_email);
    }
    if !ticket.phone.is_empty() {
        println!("Phone: {}", ticket.phone);
    }
    println!(
        "Group: {}{}",
        ticket.group,
        if ticket.category.is_empty() {
            String::new()
        } else {
            format!(" / {}", ticket.category)
        }
    );
    if ticket.assignee.is_empty() {
        println!("Assignee: (unassigned)");
    } else {
        println!("Assignee: {}", ticket.assignee);
    }
    println!(
        "Created: {} by {}",
        ticket.created_at.format("%Y-%m-%d %H:%M:%S"),
        ticket.created_by
    );

    if !ticket.description.is_empty() {
        println!("\nDescription:");
        for line in ticket.description.lines() {
            println!("  {}", line);
        }
    }

    if !ticket.comments.is_empty() {
        println!("\nComments:");
        for comment in &ticket.comments {
            println!(
                "  [{}] {}: {}",
                comment.date.format("%Y-%m-%d %H:%M"),
                comment.author,
                comment.text
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn test_show_existing() {
        let app = setup_as_guest();
        run(&app, 1).unwrap();
    }

    #[test]
    fn test_show_missing() {
        let app = setup_as_user();
        let err = run(&app, 99).unwrap_err();
        assert!(err.to_string().contains("Ticket #99 not found"));
    }

    #[test]
    fn test_show_requires_login() {
        let app = setup_test_app();
        assert!(run(&app, 1).is_err());
    }
}
