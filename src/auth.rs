//! Session state machine.
//!
//! A session is either anonymous or authenticated. Logging in arms two
//! timers on the shared scheduler, a warning shortly before the timeout and
//! the timeout itself, and schedules the handoff to the main screen.
//! Logging out cancels all of them and schedules the way back.

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::{LoginGuardConfig, SessionConfig};
use crate::context::Ctx;
use crate::error::StoreError;
use crate::kv::KeyValueStore;
use crate::models::{RememberToken, Role, User, RESERVED_ADMIN_EMAIL};
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::storage::{keys, Storage};
use crate::ui::{Confirm, Level};

pub const MIN_PASSWORD_LEN: usize = 6;

/// `^[^\s@]+@[^\s@]+\.[^\s@]+$`
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn remember_hash(user: &User) -> String {
    STANDARD.encode(format!("{}{}", user.email, user.password))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub login_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The main screen has not been shown yet.
    pub handoff_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success { warned: bool },
    Rejected { warned: bool },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }

    /// A brute-force warning was raised during the attempt.
    pub fn warned(&self) -> bool {
        match self {
            LoginOutcome::Success { warned } | LoginOutcome::Rejected { warned } => *warned,
        }
    }
}

type FailedLog = BTreeMap<String, Vec<i64>>;

#[derive(Debug)]
pub struct Auth {
    session_config: SessionConfig,
    guard: LoginGuardConfig,
    session: Option<Session>,
    warning_timer: Option<TaskHandle>,
    expiry_timer: Option<TaskHandle>,
    handoff: Option<TaskHandle>,
}

impl Auth {
    pub fn new(session_config: SessionConfig, guard: LoginGuardConfig) -> Self {
        Auth {
            session_config,
            guard,
            session: None,
            warning_timer: None,
            expiry_timer: None,
            handoff: None,
        }
    }

    pub fn current_user(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.has_any_role(&[role])
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.session
            .as_ref()
            .map(|s| roles.contains(&s.role))
            .unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// The current session, if its role is one of `roles`.
    pub fn require_any_role(&self, roles: &[Role], action: &str) -> Result<&Session> {
        match &self.session {
            None => bail!("Not logged in. Run 'ticketdesk login' first"),
            Some(s) if roles.contains(&s.role) => Ok(s),
            Some(s) => bail!("Permission denied: role '{}' cannot {}", s.role, action),
        }
    }

    pub fn timers(&self) -> (Option<TaskHandle>, Option<TaskHandle>) {
        (self.warning_timer, self.expiry_timer)
    }

    // ==================== Login / logout ====================

    pub fn login<S: KeyValueStore>(
        &mut self,
        ctx: &mut Ctx<'_, S>,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<LoginOutcome> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            ctx.notices.push("Please enter email and password!", Level::Error);
            bail!("Email and password are required");
        }
        if !is_valid_email(&email) {
            ctx.notices.push("Invalid email address!", Level::Error);
            bail!("Invalid email address '{}'", email);
        }

        let mut warned = false;
        if self.recent_failures(ctx.storage, &email, ctx.now) >= self.guard.warn_threshold {
            self.brute_force_warning(ctx, &email);
            warned = true;
        }

        let user = match ctx.storage.find_user(&email) {
            Some(u) if u.password == password => u.clone(),
            found => {
                if found.is_none() {
                    info!(email = %email, "login attempt for unknown email");
                } else {
                    info!(email = %email, "wrong password");
                }
                ctx.notices.push("Invalid email or password!", Level::Error);
                let recent = self.track_failed_login(ctx.storage, &email, ctx.now);
                if recent >= self.guard.warn_threshold && !warned {
                    self.brute_force_warning(ctx, &email);
                    warned = true;
                }
                return Ok(LoginOutcome::Rejected { warned });
            }
        };

        if let Some(stored) = ctx.storage.find_user_mut(&user.email) {
            stored.last_login = Some(ctx.now);
        }
        if let Err(e) = ctx.storage.save_users(ctx.notices, ctx.now) {
            warn!(error = %e, "could not record last login");
        }

        info!(email = %user.email, role = %user.role, "login successful");
        ctx.notices.push(format!("Welcome {}!", user.name), Level::Success);

        if remember {
            self.save_remember_token(ctx.storage, &user, ctx.now);
        } else {
            self.forget_remember_token(ctx.storage);
        }
        self.enter_session(ctx, &user);
        self.clear_failed_logins(ctx.storage, &user.email);

        Ok(LoginOutcome::Success { warned })
    }

    /// Demo login by exact email, no password.
    pub fn quick_login<S: KeyValueStore>(&mut self, ctx: &mut Ctx<'_, S>, email: &str) -> Result<()> {
        let Some(user) = ctx.storage.users().iter().find(|u| u.email == email).cloned() else {
            ctx.notices
                .push(format!("Quick login for {} failed", email), Level::Error);
            bail!("User {} not found", email);
        };

        info!(email = %user.email, "quick login");
        ctx.notices.push(
            format!("Logged in as {} (quick login)", user.name),
            Level::Success,
        );
        self.enter_session(ctx, &user);
        self.clear_failed_logins(ctx.storage, &user.email);
        Ok(())
    }

    fn enter_session<S: KeyValueStore>(&mut self, ctx: &mut Ctx<'_, S>, user: &User) {
        if let Some(handle) = self.handoff.take() {
            ctx.scheduler.cancel(handle);
        }
        self.session = Some(Session {
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            login_at: ctx.now,
            expires_at: ctx.now + self.session_config.timeout(),
            handoff_pending: true,
        });
        self.arm_timers(ctx.scheduler, ctx.now);
        self.handoff = Some(ctx.scheduler.schedule_after(
            ctx.now,
            Duration::milliseconds(self.session_config.login_handoff_ms),
            Task::ShowMainApp,
        ));
        info!(email = %user.email, name = %user.name, "session started");
    }

    /// Called when the login handoff has run.
    pub fn complete_handoff(&mut self) {
        self.handoff = None;
        if let Some(session) = self.session.as_mut() {
            session.handoff_pending = false;
        }
    }

    pub fn logout<S: KeyValueStore>(&mut self, ctx: &mut Ctx<'_, S>, show_message: bool) {
        if show_message {
            ctx.notices.push("Logged out", Level::Info);
        }

        let email = self.session.take().map(|s| s.email);
        self.cancel_timers(ctx.scheduler);
        if let Some(handle) = self.handoff.take() {
            ctx.scheduler.cancel(handle);
        }
        self.forget_remember_token(ctx.storage);

        let delay = if show_message {
            self.session_config.logout_handoff_ms
        } else {
            0
        };
        self.handoff = Some(ctx.scheduler.schedule_after(
            ctx.now,
            Duration::milliseconds(delay),
            Task::ShowLoginScreen,
        ));
        info!(email = email.as_deref().unwrap_or(""), "logged out");
    }

    // ==================== Session timers ====================

    fn cancel_timers(&mut self, scheduler: &mut Scheduler<Task>) {
        if let Some(handle) = self.warning_timer.take() {
            scheduler.cancel(handle);
        }
        if let Some(handle) = self.expiry_timer.take() {
            scheduler.cancel(handle);
        }
    }

    fn arm_timers(&mut self, scheduler: &mut Scheduler<Task>, now: DateTime<Utc>) {
        self.cancel_timers(scheduler);
        self.warning_timer = Some(scheduler.schedule_after(
            now,
            self.session_config.warning_after(),
            Task::SessionWarning,
        ));
        self.expiry_timer = Some(scheduler.schedule_after(
            now,
            self.session_config.timeout(),
            Task::SessionExpired,
        ));
        if let Some(session) = self.session.as_mut() {
            session.expires_at = now + self.session_config.timeout();
        }
        debug!(expires_at = %(now + self.session_config.timeout()), "session timers armed");
    }

    /// Restart the full session window from now.
    pub fn extend_session<S: KeyValueStore>(&mut self, ctx: &mut Ctx<'_, S>) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        self.arm_timers(ctx.scheduler, ctx.now);
        ctx.notices.push("Session extended", Level::Success);
        info!("session extended");
        true
    }

    /// The warning timer fired. Returns true if the session was extended.
    pub fn on_warning<S: KeyValueStore>(
        &mut self,
        ctx: &mut Ctx<'_, S>,
        prompt: &mut dyn Confirm,
    ) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let message = format!(
            "Your session expires in {} minutes.\n\nDo you want to extend the session?",
            self.session_config.warning_minutes
        );
        if prompt.confirm(&message) {
            self.extend_session(ctx)
        } else {
            debug!("session extension declined");
            false
        }
    }

    pub fn on_expired<S: KeyValueStore>(&mut self, ctx: &mut Ctx<'_, S>) {
        if !self.is_authenticated() {
            return;
        }
        info!("session timeout reached");
        ctx.notices
            .push("Session expired, logged out automatically", Level::Info);
        self.logout(ctx, false);
    }

    // ==================== Remember me ====================

    pub fn save_remember_token<S: KeyValueStore>(
        &self,
        storage: &mut Storage<S>,
        user: &User,
        now: DateTime<Utc>,
    ) {
        let token = RememberToken {
            email: user.email.clone(),
            expires: now + self.session_config.remember_for(),
            hash: remember_hash(user),
        };
        let result = serde_json::to_string(&token)
            .map_err(StoreError::from)
            .and_then(|json| storage.write_key(keys::REMEMBER_TOKEN, &json));
        match result {
            Ok(()) => debug!(email = %user.email, "remember-me token saved"),
            Err(e) => warn!(error = %e, "could not save remember-me token"),
        }
    }

    /// Drop any stored token, so the next process starts logged out.
    pub fn forget_remember_token<S: KeyValueStore>(&self, storage: &mut Storage<S>) {
        if let Err(e) = storage.remove_key(keys::REMEMBER_TOKEN) {
            warn!(error = %e, "could not remove remember-me token");
        }
    }

    /// Log in from a stored remember-me token. Any invalid token is deleted.
    pub fn check_remember_token<S: KeyValueStore>(&mut self, ctx: &mut Ctx<'_, S>) -> bool {
        if self.is_authenticated() {
            return false;
        }
        let raw = match ctx.storage.read_key(keys::REMEMBER_TOKEN) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "could not read remember-me token");
                return false;
            }
        };

        let user = match self.validate_remember_token(ctx.storage, &raw, ctx.now) {
            Ok(user) => user,
            Err(reason) => {
                info!(reason, "remember-me token rejected");
                if let Err(e) = ctx.storage.remove_key(keys::REMEMBER_TOKEN) {
                    warn!(error = %e, "could not remove remember-me token");
                }
                return false;
            }
        };

        info!(email = %user.email, "automatic login via remember-me");
        self.enter_session(ctx, &user);
        true
    }

    fn validate_remember_token<S: KeyValueStore>(
        &self,
        storage: &Storage<S>,
        raw: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<User, &'static str> {
        let token: RememberToken = serde_json::from_str(raw).map_err(|_| "unparseable")?;
        if now > token.expires {
            return Err("expired");
        }
        let user = storage.find_user(&token.email).ok_or("unknown user")?;
        if token.hash != remember_hash(user) {
            return Err("hash mismatch");
        }
        Ok(user.clone())
    }

    // ==================== Failed logins ====================

    fn read_failed_log<S: KeyValueStore>(storage: &Storage<S>) -> FailedLog {
        match storage.read_key(keys::FAILED_LOGINS) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "failed-login log unreadable, starting fresh");
                FailedLog::new()
            }),
            Ok(None) => FailedLog::new(),
            Err(e) => {
                warn!(error = %e, "could not read failed-login log");
                FailedLog::new()
            }
        }
    }

    fn write_failed_log<S: KeyValueStore>(storage: &mut Storage<S>, log: &FailedLog) {
        let result = serde_json::to_string(log)
            .map_err(StoreError::from)
            .and_then(|json| storage.write_key(keys::FAILED_LOGINS, &json));
        if let Err(e) = result {
            warn!(error = %e, "could not write failed-login log");
        }
    }

    /// Failures for `email` inside the guard window.
    pub fn recent_failures<S: KeyValueStore>(
        &self,
        storage: &Storage<S>,
        email: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let window_ms = Duration::minutes(self.guard.window_minutes).num_milliseconds();
        let now_ms = now.timestamp_millis();
        Self::read_failed_log(storage)
            .get(email)
            .map(|times| times.iter().filter(|t| now_ms - **t < window_ms).count())
            .unwrap_or(0)
    }

    pub fn failed_attempts<S: KeyValueStore>(&self, storage: &Storage<S>, email: &str) -> Vec<i64> {
        Self::read_failed_log(storage)
            .remove(email)
            .unwrap_or_default()
    }

    /// Append a failure and return the count inside the window.
    fn track_failed_login<S: KeyValueStore>(
        &self,
        storage: &mut Storage<S>,
        email: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let mut log = Self::read_failed_log(storage);
        let times = log.entry(email.to_string()).or_default();
        times.push(now.timestamp_millis());
        if times.len() > self.guard.log_cap {
            let excess = times.len() - self.guard.log_cap;
            times.drain(..excess);
        }
        Self::write_failed_log(storage, &log);
        self.recent_failures(storage, email, now)
    }

    fn clear_failed_logins<S: KeyValueStore>(&self, storage: &mut Storage<S>, email: &str) {
        let mut log = Self::read_failed_log(storage);
        if log.remove(email).is_some() {
            Self::write_failed_log(storage, &log);
        }
    }

    fn brute_force_warning<S: KeyValueStore>(&self, ctx: &mut Ctx<'_, S>, email: &str) {
        warn!(email = %email, "many failed login attempts");
        ctx.notices.push(
            "Too many failed attempts. Please try again later.",
            Level::Warning,
        );
    }

    // ==================== User management ====================

    pub fn create_user<S: KeyValueStore>(
        &self,
        ctx: &mut Ctx<'_, S>,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<()> {
        let creator = match self.require_any_role(&[Role::Admin], "manage users") {
            Ok(s) => s.email.clone(),
            Err(e) => {
                ctx.notices.push("Only administrators can manage users", Level::Error);
                return Err(e);
            }
        };

        let name = name.trim();
        let email = email.trim().to_lowercase();
        if name.is_empty() || email.is_empty() || password.is_empty() {
            ctx.notices.push("Please fill in all fields.", Level::Error);
            bail!("Name, email and password are required");
        }
        if !is_valid_email(&email) {
            ctx.notices.push("Invalid email address.", Level::Error);
            bail!("Invalid email address '{}'", email);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            ctx.notices.push(
                format!("Password must be at least {} characters long.", MIN_PASSWORD_LEN),
                Level::Error,
            );
            bail!("Password must be at least {} characters", MIN_PASSWORD_LEN);
        }
        if ctx.storage.find_user(&email).is_some() {
            ctx.notices
                .push("A user with this email already exists.", Level::Error);
            bail!("User {} already exists", email);
        }

        ctx.storage.users_mut().push(User {
            name: name.to_string(),
            email: email.clone(),
            password: password.to_string(),
            role,
            created_at: ctx.now,
            last_login: None,
            created_by: Some(creator),
        });
        if let Err(e) = ctx.storage.save_users(ctx.notices, ctx.now) {
            ctx.storage.users_mut().pop();
            return Err(e);
        }

        info!(email = %email, role = %role, "user created");
        ctx.notices
            .push(format!("User \"{}\" created.", name), Level::Success);
        Ok(())
    }

    pub fn delete_user<S: KeyValueStore>(&self, ctx: &mut Ctx<'_, S>, email: &str) -> Result<User> {
        let current = match self.require_any_role(&[Role::Admin], "manage users") {
            Ok(s) => s.email.clone(),
            Err(e) => {
                ctx.notices.push("Only administrators can manage users", Level::Error);
                return Err(e);
            }
        };

        let Some(pos) = ctx
            .storage
            .users()
            .iter()
            .position(|u| u.email.eq_ignore_ascii_case(email))
        else {
            ctx.notices.push("User not found", Level::Error);
            bail!("User {} not found", email);
        };

        let target = &ctx.storage.users()[pos];
        if target.email.eq_ignore_ascii_case(RESERVED_ADMIN_EMAIL) {
            ctx.notices
                .push("The main administrator cannot be deleted.", Level::Error);
            bail!("The main administrator cannot be deleted");
        }
        if target.email.eq_ignore_ascii_case(&current) {
            ctx.notices.push("You cannot delete yourself.", Level::Error);
            bail!("You cannot delete your own account");
        }

        let removed = ctx.storage.users_mut().remove(pos);
        if let Err(e) = ctx.storage.save_users(ctx.notices, ctx.now) {
            ctx.storage.users_mut().insert(pos, removed);
            return Err(e);
        }

        info!(email = %removed.email, "user deleted");
        ctx.notices
            .push(format!("User \"{}\" deleted.", removed.name), Level::Success);
        Ok(removed)
    }

    #[cfg(test)]
    pub(crate) fn set_session_for_test(
        &mut self,
        email: &str,
        name: &str,
        role: Role,
        now: DateTime<Utc>,
    ) {
        self.session = Some(Session {
            email: email.to_string(),
            name: name.to_string(),
            role,
            login_at: now,
            expires_at: now + self.session_config.timeout(),
            handoff_pending: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageConfig, UiConfig};
    use crate::kv::MemoryStore;
    use crate::storage::create_default_users;
    use crate::ui::NotificationQueue;
    use chrono::TimeZone;
    use proptest::prelude::*;

    struct Harness {
        storage: Storage<MemoryStore>,
        notices: NotificationQueue,
        scheduler: Scheduler<Task>,
        auth: Auth,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn new() -> Self {
            let config = AppConfig::default();
            let mut storage = Storage::new(MemoryStore::new(), StorageConfig::default());
            *storage.users_mut() = create_default_users(t0());
            Harness {
                storage,
                notices: NotificationQueue::new(UiConfig::default()),
                scheduler: Scheduler::new(),
                auth: Auth::new(config.session, config.guard),
                now: t0(),
            }
        }

        fn ctx(&mut self) -> (&mut Auth, Ctx<'_, MemoryStore>) {
            (
                &mut self.auth,
                Ctx {
                    storage: &mut self.storage,
                    notices: &mut self.notices,
                    scheduler: &mut self.scheduler,
                    now: self.now,
                },
            )
        }

        fn login(&mut self, email: &str, password: &str) -> Result<LoginOutcome> {
            let (auth, mut ctx) = self.ctx();
            auth.login(&mut ctx, email, password, false)
        }

        fn warnings(&self) -> usize {
            self.notices
                .pending()
                .filter(|n| n.message.starts_with("Too many failed"))
                .count()
        }

        fn timer_due(&self) -> (DateTime<Utc>, DateTime<Utc>) {
            let (warning, expiry) = self.auth.timers();
            (
                self.scheduler.due_time(warning.unwrap()).unwrap(),
                self.scheduler.due_time(expiry.unwrap()).unwrap(),
            )
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    // ==================== Email validation ====================

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("admin@firma.de"));
        assert!(is_valid_email("a.b@c.d.e"));
        assert!(!is_valid_email("admin@firma"));
        assert!(!is_valid_email("admin@.de"));
        assert!(!is_valid_email("admin@firma."));
        assert!(!is_valid_email("@firma.de"));
        assert!(!is_valid_email("a@b@c.de"));
        assert!(!is_valid_email("ad min@firma.de"));
    }

    // ==================== Login ====================

    #[test]
    fn test_admin_login_yields_admin_role() {
        let mut h = Harness::new();
        let outcome = h.login("  Admin@Firma.DE ", "admin123").unwrap();
        assert_eq!(outcome, LoginOutcome::Success { warned: false });
        assert!(h.auth.is_admin());
        assert_eq!(h.auth.current_user().unwrap().role, Role::Admin);
        assert!(h.auth.current_user().unwrap().handoff_pending);
        assert_eq!(
            h.storage.find_user("admin@firma.de").unwrap().last_login,
            Some(t0())
        );
        assert!(h.notices.pending().any(|n| n.message == "Welcome Administrator!"));
    }

    #[test]
    fn test_wrong_password_stays_anonymous() {
        let mut h = Harness::new();
        let outcome = h.login("admin@firma.de", "wrong").unwrap();
        assert_eq!(outcome, LoginOutcome::Rejected { warned: false });
        assert!(!h.auth.is_authenticated());
        assert!(!h.auth.is_admin());
        assert_eq!(h.auth.failed_attempts(&h.storage, "admin@firma.de").len(), 1);
    }

    #[test]
    fn test_password_is_case_sensitive() {
        let mut h = Harness::new();
        assert!(!h.login("max@firma.de", "USER123").unwrap().is_success());
    }

    #[test]
    fn test_validation_errors_do_not_touch_log() {
        let mut h = Harness::new();
        assert!(h.login("", "x").is_err());
        assert!(h.login("not-an-email", "x").is_err());
        assert!(h.auth.failed_attempts(&h.storage, "not-an-email").is_empty());
    }

    #[test]
    fn test_brute_force_warning_is_soft() {
        let mut h = Harness::new();
        for i in 0..4 {
            h.now = t0() + Duration::minutes(i);
            assert!(!h.login("max@firma.de", "nope").unwrap().warned());
        }
        // Fifth failure reaches the threshold
        h.now = t0() + Duration::minutes(4);
        assert!(h.login("max@firma.de", "nope").unwrap().warned());
        assert_eq!(h.warnings(), 1);

        // Next attempt warns up front and still succeeds
        h.now = t0() + Duration::minutes(5);
        let outcome = h.login("max@firma.de", "user123").unwrap();
        assert_eq!(outcome, LoginOutcome::Success { warned: true });
        assert_eq!(h.warnings(), 2);
        assert!(h.auth.failed_attempts(&h.storage, "max@firma.de").is_empty());
    }

    #[test]
    fn test_failures_outside_window_do_not_warn() {
        let mut h = Harness::new();
        for i in 0..5 {
            h.now = t0() + Duration::minutes(i * 4);
            h.login("max@firma.de", "nope").unwrap();
        }
        // Failures at 0,4,8,12,16 min; at 16 only four are inside 15 minutes
        assert_eq!(h.warnings(), 0);
    }

    #[test]
    fn test_failed_log_is_capped() {
        let mut h = Harness::new();
        for i in 0..13 {
            h.now = t0() + Duration::seconds(i);
            h.login("gast@demo.de", "bad").unwrap();
        }
        let log = h.auth.failed_attempts(&h.storage, "gast@demo.de");
        assert_eq!(log.len(), 10);
        assert_eq!(log[0], (t0() + Duration::seconds(3)).timestamp_millis());
    }

    #[test]
    fn test_login_schedules_handoff_and_timers() {
        let mut h = Harness::new();
        h.login("max@firma.de", "user123").unwrap();
        let (warning, expiry) = h.timer_due();
        assert_eq!(warning, t0() + Duration::minutes(55));
        assert_eq!(expiry, t0() + Duration::minutes(60));

        let (_, due, task) = h.scheduler.pop_due(t0() + Duration::seconds(1)).unwrap();
        assert_eq!(task, Task::ShowMainApp);
        assert_eq!(due, t0() + Duration::milliseconds(800));
    }

    #[test]
    fn test_quick_login_requires_exact_email() {
        let mut h = Harness::new();
        {
            let (auth, mut ctx) = h.ctx();
            assert!(auth.quick_login(&mut ctx, "GAST@demo.de").is_err());
            auth.quick_login(&mut ctx, "gast@demo.de").unwrap();
        }
        assert!(h.auth.has_role(Role::Guest));
        assert!(!h.auth.has_any_role(&[Role::Admin, Role::User]));
    }

    // ==================== Session timers ====================

    #[test]
    fn test_extension_rearms_from_now() {
        let mut h = Harness::new();
        h.login("max@firma.de", "user123").unwrap();
        let (old_warning, old_expiry) = h.auth.timers();

        h.now = t0() + Duration::minutes(40);
        let (auth, mut ctx) = h.ctx();
        assert!(auth.extend_session(&mut ctx));

        let (warning, expiry) = h.timer_due();
        assert_eq!(warning, t0() + Duration::minutes(95));
        assert_eq!(expiry, t0() + Duration::minutes(100));
        assert!(!h.scheduler.is_pending(old_warning.unwrap()));
        assert!(!h.scheduler.is_pending(old_expiry.unwrap()));
        assert_eq!(
            h.auth.current_user().unwrap().expires_at,
            t0() + Duration::minutes(100)
        );
    }

    #[test]
    fn test_warning_accepted_extends() {
        let mut h = Harness::new();
        h.login("max@firma.de", "user123").unwrap();
        h.now = t0() + Duration::minutes(55);
        let mut asked = String::new();
        let mut prompt = |msg: &str| {
            asked = msg.to_string();
            true
        };
        let (auth, mut ctx) = h.ctx();
        assert!(auth.on_warning(&mut ctx, &mut prompt));
        assert!(asked.contains("5 minutes"));
        assert_eq!(h.timer_due().1, t0() + Duration::minutes(115));
    }

    #[test]
    fn test_warning_declined_keeps_expiry() {
        let mut h = Harness::new();
        h.login("max@firma.de", "user123").unwrap();
        h.now = t0() + Duration::minutes(55);
        let (auth, mut ctx) = h.ctx();
        assert!(!auth.on_warning(&mut ctx, &mut |_: &str| false));
        let (_, expiry) = h.auth.timers();
        assert_eq!(
            h.scheduler.due_time(expiry.unwrap()),
            Some(t0() + Duration::minutes(60))
        );
    }

    #[test]
    fn test_expiry_logs_out_silently() {
        let mut h = Harness::new();
        h.login("max@firma.de", "user123").unwrap();
        h.now = t0() + Duration::minutes(60);
        {
            let (auth, mut ctx) = h.ctx();
            auth.on_expired(&mut ctx);
        }
        assert!(!h.auth.is_authenticated());
        assert!(h.notices.pending().any(|n| n.message.contains("Session expired")));
        assert!(!h.notices.pending().any(|n| n.message == "Logged out"));
        assert_eq!(h.scheduler.next_due(), Some(h.now));
    }

    #[test]
    fn test_logout_cancels_everything() {
        let mut h = Harness::new();
        {
            let (auth, mut ctx) = h.ctx();
            auth.login(&mut ctx, "max@firma.de", "user123", true).unwrap();
        }
        assert!(h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().is_some());
        {
            let (auth, mut ctx) = h.ctx();
            auth.logout(&mut ctx, true);
        }
        assert!(!h.auth.is_authenticated());
        assert_eq!(h.auth.timers(), (None, None));
        assert!(h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().is_none());
        let tasks: Vec<&Task> = h.scheduler.pending().map(|(_, t)| t).collect();
        assert_eq!(tasks, vec![&Task::ShowLoginScreen]);
        assert_eq!(h.scheduler.next_due(), Some(t0() + Duration::seconds(1)));
    }

    // ==================== Remember me ====================

    fn remember_and_reset(h: &mut Harness) {
        {
            let (auth, mut ctx) = h.ctx();
            auth.login(&mut ctx, "max@firma.de", "user123", true).unwrap();
        }
        let config = AppConfig::default();
        h.auth = Auth::new(config.session, config.guard);
        h.scheduler = Scheduler::new();
    }

    #[test]
    fn test_remember_token_logs_in() {
        let mut h = Harness::new();
        remember_and_reset(&mut h);
        h.now = t0() + Duration::days(6);
        let (auth, mut ctx) = h.ctx();
        assert!(auth.check_remember_token(&mut ctx));
        assert_eq!(h.auth.current_user().unwrap().email, "max@firma.de");
    }

    #[test]
    fn test_remember_token_hash_is_base64_of_credentials() {
        let mut h = Harness::new();
        remember_and_reset(&mut h);
        let raw = h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().unwrap();
        let token: RememberToken = serde_json::from_str(&raw).unwrap();
        assert_eq!(token.hash, STANDARD.encode("max@firma.deuser123"));
        assert_eq!(token.expires, t0() + Duration::days(7));
    }

    #[test]
    fn test_expired_token_is_deleted() {
        let mut h = Harness::new();
        remember_and_reset(&mut h);
        h.now = t0() + Duration::days(8);
        let (auth, mut ctx) = h.ctx();
        assert!(!auth.check_remember_token(&mut ctx));
        assert!(h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_token_rejected_after_password_change() {
        let mut h = Harness::new();
        remember_and_reset(&mut h);
        h.storage.find_user_mut("max@firma.de").unwrap().password = "changed!".into();
        let (auth, mut ctx) = h.ctx();
        assert!(!auth.check_remember_token(&mut ctx));
        assert!(!h.auth.is_authenticated());
        assert!(h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_token_for_unknown_user_or_garbage_is_deleted() {
        let mut h = Harness::new();
        remember_and_reset(&mut h);
        h.storage.users_mut().retain(|u| u.email != "max@firma.de");
        {
            let (auth, mut ctx) = h.ctx();
            assert!(!auth.check_remember_token(&mut ctx));
        }
        assert!(h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().is_none());

        h.storage.write_key(keys::REMEMBER_TOKEN, "garbage").unwrap();
        let (auth, mut ctx) = h.ctx();
        assert!(!auth.check_remember_token(&mut ctx));
        assert!(h.storage.read_key(keys::REMEMBER_TOKEN).unwrap().is_none());
    }

    // ==================== User management ====================

    fn as_admin(h: &mut Harness) {
        h.auth
            .set_session_for_test("admin@firma.de", "Administrator", Role::Admin, t0());
    }

    #[test]
    fn test_delete_reserved_admin_fails() {
        let mut h = Harness::new();
        h.auth.set_session_for_test("boss@firma.de", "Boss", Role::Admin, t0());
        let (auth, mut ctx) = h.ctx();
        let err = auth.delete_user(&mut ctx, "admin@firma.de").unwrap_err();
        assert!(err.to_string().contains("main administrator"));
        assert_eq!(h.storage.users().len(), 3);
    }

    #[test]
    fn test_delete_self_fails() {
        let mut h = Harness::new();
        {
            let (auth, mut ctx) = h.ctx();
            auth.set_session_for_test("max@firma.de", "Max", Role::Admin, t0());
            assert!(auth.delete_user(&mut ctx, "MAX@firma.de").is_err());
        }
        assert!(h.storage.find_user("max@firma.de").is_some());
    }

    #[test]
    fn test_delete_other_removes_exactly_one() {
        let mut h = Harness::new();
        as_admin(&mut h);
        {
            let (auth, mut ctx) = h.ctx();
            let removed = auth.delete_user(&mut ctx, "gast@demo.de").unwrap();
            assert_eq!(removed.name, "Gast Demo");
            assert!(auth.delete_user(&mut ctx, "gast@demo.de").is_err());
        }
        let emails: Vec<&str> = h.storage.users().iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["admin@firma.de", "max@firma.de"]);
    }

    #[test]
    fn test_non_admin_cannot_manage_users() {
        let mut h = Harness::new();
        h.login("max@firma.de", "user123").unwrap();
        let (auth, mut ctx) = h.ctx();
        assert!(auth.delete_user(&mut ctx, "gast@demo.de").is_err());
        assert!(auth
            .create_user(&mut ctx, "New", "new@firma.de", "secret1", Role::User)
            .is_err());
        assert_eq!(h.storage.users().len(), 3);
    }

    #[test]
    fn test_create_user_validation() {
        let mut h = Harness::new();
        as_admin(&mut h);
        let (auth, mut ctx) = h.ctx();
        assert!(auth.create_user(&mut ctx, "", "x@y.de", "secret1", Role::User).is_err());
        assert!(auth.create_user(&mut ctx, "X", "bad", "secret1", Role::User).is_err());
        assert!(auth.create_user(&mut ctx, "X", "x@y.de", "short", Role::User).is_err());
        assert!(auth
            .create_user(&mut ctx, "X", "MAX@firma.de", "secret1", Role::User)
            .is_err());
        assert_eq!(ctx.storage.users().len(), 3);

        auth.create_user(&mut ctx, " Erika ", "Erika@Firma.de", "secret1", Role::Guest)
            .unwrap();
        let erika = ctx.storage.find_user("erika@firma.de").unwrap();
        assert_eq!(erika.name, "Erika");
        assert_eq!(erika.email, "erika@firma.de");
        assert_eq!(erika.created_by.as_deref(), Some("admin@firma.de"));
    }

    #[test]
    fn test_unauthenticated_fails_every_check() {
        let h = Harness::new();
        for role in Role::ALL {
            assert!(!h.auth.has_role(role));
        }
        assert!(!h.auth.has_any_role(&Role::ALL));
        assert!(h.auth.require_any_role(&Role::ALL, "look").is_err());
    }

    // ==================== Property-Based Tests ====================

    proptest! {
        #[test]
        fn prop_mismatch_appends_one_entry(password in "[a-z0-9]{1,12}") {
            prop_assume!(password != "user123");
            let mut h = Harness::new();
            let before = h.auth.failed_attempts(&h.storage, "max@firma.de").len();
            let outcome = h.login("MAX@firma.de", &password).unwrap();
            prop_assert!(!outcome.is_success());
            prop_assert!(!h.auth.is_authenticated());
            prop_assert_eq!(h.auth.failed_attempts(&h.storage, "max@firma.de").len(), before + 1);
        }

        #[test]
        fn prop_email_case_is_ignored(mask in proptest::collection::vec(any::<bool>(), 14)) {
            let email: String = "admin@firma.de"
                .chars()
                .zip(mask)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                .collect();
            let mut h = Harness::new();
            prop_assert!(h.login(&email, "admin123").unwrap().is_success());
            prop_assert!(h.auth.is_admin());
        }
    }
}
