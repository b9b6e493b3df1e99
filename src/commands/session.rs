use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;

pub fn login<S: KeyValueStore>(
    app: &mut App<S>,
    email: &str,
    password: &str,
    remember: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    let outcome = auth.login(&mut ctx, email, password, remember)?;
    if !outcome.is_success() {
        bail!("Invalid email or password");
    }

    if let Some(session) = auth.current_user() {
        println!("Logged in as {} <{}> ({})", session.name, session.email, session.role);
    }
    if !remember {
        println!("Session not remembered; later commands will run logged out.");
    }
    Ok(())
}

pub fn quick_login<S: KeyValueStore>(
    app: &mut App<S>,
    email: &str,
    remember: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    auth.quick_login(&mut ctx, email)?;

    if remember {
        if let Some(user) = ctx.storage.find_user(email).cloned() {
            auth.save_remember_token(ctx.storage, &user, now);
        }
    } else {
        auth.forget_remember_token(ctx.storage);
    }
    if let Some(session) = auth.current_user() {
        println!("Logged in as {} <{}> ({})", session.name, session.email, session.role);
    }
    Ok(())
}

pub fn logout<S: KeyValueStore>(app: &mut App<S>, now: DateTime<Utc>) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    let email = auth.current_user().map(|s| s.email.clone());
    auth.logout(&mut ctx, email.is_some());

    match email {
        Some(email) => println!("Logged out {}", email),
        None => println!("Not logged in."),
    }
    Ok(())
}

pub fn whoami<S: KeyValueStore>(app: &App<S>) -> Result<()> {
    match app.auth().current_user() {
        Some(session) => {
            println!("{} <{}>", session.name, session.email);
            println!("Role: {}", session.role);
            println!(
                "Session expires: {}",
                session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        None => println!("Not logged in."),
    }
    Ok(())
}
