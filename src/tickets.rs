//! Ticket operations on top of [`Storage`].
//!
//! Every write checks the session's role, mutates the in-memory list and
//! saves the whole list back.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::auth::{is_valid_email, Auth};
use crate::context::Ctx;
use crate::kv::KeyValueStore;
use crate::models::{
    validate_priority, validate_status, Comment, Role, Ticket, DEFAULT_PRIORITY, DEFAULT_STATUS,
    VALID_PRIORITIES, VALID_STATUSES,
};
use crate::storage::{validate_ticket_structure, Storage};
use crate::ui::Level;

const DEMO_TICKETS: &str = include_str!("../resources/demo_tickets.json");

const EDITORS: [Role; 2] = [Role::Admin, Role::User];

#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub customer_name: String,
    pub company: String,
    pub phone: String,
    pub customer_email: String,
    pub assignee: String,
    pub group: String,
    pub category: String,
    pub priority: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    /// Case-insensitive match on customer, company, description.
    pub search: Option<String>,
}

impl TicketFilter {
    fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(status) = &self.status {
            if ticket.status != *status {
                return false;
            }
        }
        if let Some(priority) = &self.priority {
            if ticket.priority != *priority {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if !ticket.assignee.eq_ignore_ascii_case(assignee) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = [&ticket.customer_name, &ticket.company, &ticket.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStats {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub closed: usize,
    pub critical: usize,
}

fn require_editor<'a, S: KeyValueStore>(
    ctx: &mut Ctx<'_, S>,
    auth: &'a Auth,
    action: &str,
) -> Result<&'a str> {
    match auth.require_any_role(&EDITORS, action) {
        Ok(session) => Ok(&session.name),
        Err(e) => {
            ctx.notices.push("No permission for this action", Level::Error);
            Err(e)
        }
    }
}

fn find_mut<'a, S: KeyValueStore>(storage: &'a mut Storage<S>, id: i64) -> Result<&'a mut Ticket> {
    match storage.tickets_mut().iter_mut().find(|t| t.id == id) {
        Some(t) => Ok(t),
        None => bail!("Ticket #{} not found", id),
    }
}

pub fn create_ticket<S: KeyValueStore>(
    ctx: &mut Ctx<'_, S>,
    auth: &Auth,
    new: NewTicket,
) -> Result<i64> {
    let creator = require_editor(ctx, auth, "create tickets")?.to_string();

    if new.customer_name.trim().is_empty() || new.description.trim().is_empty() {
        ctx.notices
            .push("Customer name and description are required", Level::Error);
        bail!("Customer name and description are required");
    }
    let customer_email = new.customer_email.trim().to_lowercase();
    if !customer_email.is_empty() && !is_valid_email(&customer_email) {
        ctx.notices.push("Invalid customer email address", Level::Error);
        bail!("Invalid customer email '{}'", customer_email);
    }
    let priority = new.priority.unwrap_or_else(|| DEFAULT_PRIORITY.to_string());
    if !validate_priority(&priority) {
        bail!(
            "Invalid priority '{}'. Must be one of: {}",
            priority,
            VALID_PRIORITIES.join(", ")
        );
    }

    let or_default = |value: String, default: &str| {
        let value = value.trim().to_string();
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    };

    let id = ctx.storage.allocate_ticket_id()?;
    let ticket = Ticket {
        id,
        customer_name: new.customer_name.trim().to_string(),
        company: or_default(new.company, "Unknown"),
        phone: new.phone.trim().to_string(),
        customer_email,
        assignee: new.assignee.trim().to_string(),
        group: or_default(new.group, "Software"),
        category: new.category.trim().to_string(),
        priority,
        description: new.description.trim().to_string(),
        status: DEFAULT_STATUS.to_string(),
        created_by: creator,
        created_at: ctx.now,
        comments: Vec::new(),
    };
    ctx.storage.tickets_mut().push(ticket);
    if let Err(e) = ctx.storage.save_tickets(ctx.notices, ctx.now) {
        ctx.storage.tickets_mut().retain(|t| t.id != id);
        ctx.storage.release_ticket_id(id);
        return Err(e);
    }

    info!(id, "ticket created");
    ctx.notices
        .push(format!("Ticket #{} created", id), Level::Success);
    Ok(id)
}

/// Matching tickets, newest id first.
pub fn list_tickets<'a>(tickets: &'a [Ticket], filter: &TicketFilter) -> Vec<&'a Ticket> {
    let mut found: Vec<&Ticket> = tickets.iter().filter(|t| filter.matches(t)).collect();
    found.sort_by(|a, b| b.id.cmp(&a.id));
    found
}

pub fn get_ticket<S: KeyValueStore>(storage: &Storage<S>, id: i64) -> Result<&Ticket> {
    storage
        .tickets()
        .iter()
        .find(|t| t.id == id)
        .with_context(|| format!("Ticket #{} not found", id))
}

pub fn update_status<S: KeyValueStore>(
    ctx: &mut Ctx<'_, S>,
    auth: &Auth,
    id: i64,
    status: &str,
) -> Result<()> {
    require_editor(ctx, auth, "change tickets")?;
    if !validate_status(status) {
        bail!(
            "Invalid status '{}'. Must be one of: {}",
            status,
            VALID_STATUSES.join(", ")
        );
    }

    let ticket = find_mut(ctx.storage, id)?;
    let previous = std::mem::replace(&mut ticket.status, status.to_string());
    if let Err(e) = ctx.storage.save_tickets(ctx.notices, ctx.now) {
        if let Ok(ticket) = find_mut(ctx.storage, id) {
            ticket.status = previous;
        }
        return Err(e);
    }

    info!(id, from = %previous, to = status, "ticket status changed");
    ctx.notices
        .push(format!("Ticket #{} is now {}", id, status), Level::Success);
    Ok(())
}

pub fn assign_ticket<S: KeyValueStore>(
    ctx: &mut Ctx<'_, S>,
    auth: &Auth,
    id: i64,
    assignee: &str,
) -> Result<()> {
    require_editor(ctx, auth, "assign tickets")?;
    let assignee = assignee.trim();

    let ticket = find_mut(ctx.storage, id)?;
    let previous = std::mem::replace(&mut ticket.assignee, assignee.to_string());
    if let Err(e) = ctx.storage.save_tickets(ctx.notices, ctx.now) {
        if let Ok(ticket) = find_mut(ctx.storage, id) {
            ticket.assignee = previous;
        }
        return Err(e);
    }

    info!(id, assignee, "ticket assigned");
    let message = if assignee.is_empty() {
        format!("Ticket #{} unassigned", id)
    } else {
        format!("Ticket #{} assigned to {}", id, assignee)
    };
    ctx.notices.push(message, Level::Success);
    Ok(())
}

pub fn add_comment<S: KeyValueStore>(
    ctx: &mut Ctx<'_, S>,
    auth: &Auth,
    id: i64,
    text: &str,
) -> Result<()> {
    let author = require_editor(ctx, auth, "comment on tickets")?.to_string();
    let text = text.trim();
    if text.is_empty() {
        bail!("Comment text must not be empty");
    }

    let now = ctx.now;
    find_mut(ctx.storage, id)?.comments.push(Comment {
        author,
        date: now,
        text: text.to_string(),
    });
    if let Err(e) = ctx.storage.save_tickets(ctx.notices, ctx.now) {
        if let Ok(ticket) = find_mut(ctx.storage, id) {
            ticket.comments.pop();
        }
        return Err(e);
    }

    info!(id, "comment added");
    ctx.notices
        .push(format!("Comment added to ticket #{}", id), Level::Success);
    Ok(())
}

pub fn delete_ticket<S: KeyValueStore>(ctx: &mut Ctx<'_, S>, auth: &Auth, id: i64) -> Result<Ticket> {
    if let Err(e) = auth.require_any_role(&[Role::Admin], "delete tickets") {
        ctx.notices
            .push("Only administrators can delete tickets", Level::Error);
        return Err(e);
    }

    let Some(pos) = ctx.storage.tickets().iter().position(|t| t.id == id) else {
        bail!("Ticket #{} not found", id);
    };
    let removed = ctx.storage.tickets_mut().remove(pos);
    if let Err(e) = ctx.storage.save_tickets(ctx.notices, ctx.now) {
        let tickets = ctx.storage.tickets_mut();
        tickets.insert(pos.min(tickets.len()), removed);
        return Err(e);
    }

    info!(id, "ticket deleted");
    ctx.notices
        .push(format!("Ticket #{} deleted", id), Level::Success);
    Ok(removed)
}

pub fn ticket_stats(tickets: &[Ticket]) -> TicketStats {
    let mut stats = TicketStats {
        total: tickets.len(),
        ..TicketStats::default()
    };
    for ticket in tickets {
        match ticket.status.as_str() {
            "Open" => stats.open += 1,
            "In Progress" => stats.in_progress += 1,
            "Resolved" => stats.resolved += 1,
            "Closed" => stats.closed += 1,
            _ => {}
        }
        if ticket.priority == "Critical" {
            stats.critical += 1;
        }
    }
    stats
}

/// Seed the embedded demo tickets. Does nothing if tickets already exist.
pub fn add_demo_tickets<S: KeyValueStore>(ctx: &mut Ctx<'_, S>) -> Result<usize> {
    if !ctx.storage.tickets().is_empty() {
        return Ok(0);
    }

    let records: Vec<Value> =
        serde_json::from_str(DEMO_TICKETS).context("Embedded demo tickets are invalid")?;
    let count = records.len();
    for (age, record) in records.iter().rev().enumerate() {
        let created_at = ctx.now - Duration::hours(3 * age as i64);
        let mut ticket = validate_ticket_structure(record, created_at);
        ticket.id = ctx.storage.allocate_ticket_id()?;
        ctx.storage.tickets_mut().push(ticket);
    }
    ctx.storage.save_tickets(ctx.notices, ctx.now)?;

    info!(count, "demo tickets added");
    Ok(count)
}
