pub mod clear;
pub mod comment;
pub mod create;
pub mod delete;
pub mod export;
pub mod health;
pub mod import;
pub mod info;
pub mod init;
pub mod list;
pub mod session;
pub mod shell;
pub mod show;
pub mod stats;
pub mod status;
pub mod user;
pub mod view;

use anyhow::Result;
use ticketdesk::app::App;
use ticketdesk::auth::Session;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::models::Role;

/// Any logged-in user, guests included.
pub(crate) fn require_login<S: KeyValueStore>(app: &App<S>, action: &str) -> Result<Session> {
    Ok(app.auth().require_any_role(&Role::ALL, action)?.clone())
}

pub(crate) fn require_admin<S: KeyValueStore>(app: &App<S>, action: &str) -> Result<Session> {
    Ok(app.auth().require_any_role(&[Role::Admin], action)?.clone())
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};
    use ticketdesk::app::App;
    use ticketdesk::config::AppConfig;
    use ticketdesk::kv::MemoryStore;

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    /// Fresh app with demo data, nobody logged in.
    pub fn setup_test_app() -> App<MemoryStore> {
        App::start(MemoryStore::new(), AppConfig::default(), t0()).unwrap()
    }

    pub fn login_as(app: &mut App<MemoryStore>, email: &str, password: &str) {
        let (auth, mut ctx) = app.parts(t0());
        assert!(auth
            .login(&mut ctx, email, password, false)
            .unwrap()
            .is_success());
    }

    pub fn setup_as_admin() -> App<MemoryStore> {
        let mut app = setup_test_app();
        login_as(&mut app, "admin@firma.de", "admin123");
        app
    }

    pub fn setup_as_user() -> App<MemoryStore> {
        let mut app = setup_test_app();
        login_as(&mut app, "max@firma.de", "user123");
        app
    }

    pub fn setup_as_guest() -> App<MemoryStore> {
        let mut app = setup_test_app();
        login_as(&mut app, "gast@demo.de", "guest123");
        app
    }

    pub fn yes(_: &str) -> bool {
        true
    }

    pub fn no(_: &str) -> bool {
        false
    }
}
