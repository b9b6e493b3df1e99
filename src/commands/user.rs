use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::models::Role;
use ticketdesk::ui::Confirm;

use super::{require_admin, truncate};

pub fn list<S: KeyValueStore>(app: &App<S>) -> Result<()> {
    require_admin(app, "manage users")?;

    for user in app.storage().users() {
        let last_login = user
            .last_login
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<24} {:<28} {:6} {}",
            truncate(&user.name, 24),
            truncate(&user.email, 28),
            user.role.as_str(),
            last_login
        );
    }
    Ok(())
}

pub fn create<S: KeyValueStore>(
    app: &mut App<S>,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(role) = Role::parse(&role.to_lowercase()) else {
        bail!("Unknown role '{}'. Must be one of: admin, user, guest", role);
    };

    let (auth, mut ctx) = app.parts(now);
    auth.create_user(&mut ctx, name, email, password, role)?;
    println!("Created user {} ({})", email.trim().to_lowercase(), role);
    Ok(())
}

pub fn delete<S: KeyValueStore>(
    app: &mut App<S>,
    email: &str,
    force: bool,
    prompt: &mut dyn Confirm,
    now: DateTime<Utc>,
) -> Result<()> {
    require_admin(app, "manage users")?;
    if !force && !prompt.confirm(&format!("Delete user {}?", email)) {
        println!("Cancelled.");
        return Ok(());
    }

    let (auth, mut ctx) = app.parts(now);
    let removed = auth.delete_user(&mut ctx, email)?;
    println!("Deleted user {} <{}>", removed.name, removed.email);
    Ok(())
}
