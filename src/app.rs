//! Composition root.
//!
//! [`App`] owns every module and the scheduler. Startup initializes the
//! modules in load order, checks their dependencies, verifies the critical
//! systems and schedules the recurring work. After that the owner drives
//! the app by calling [`App::tick`] with the current time.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::auth::Auth;
use crate::config::AppConfig;
use crate::context::Ctx;
use crate::kv::KeyValueStore;
use crate::scheduler::{Scheduler, Task};
use crate::storage::{keys, Storage, StorageInfo};
use crate::tickets;
use crate::ui::{Confirm, Level, Tab, Ui};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Storage,
    Auth,
    Ui,
    Tickets,
}

impl Module {
    pub const LOAD_ORDER: [Module; 4] = [Module::Storage, Module::Auth, Module::Ui, Module::Tickets];

    pub fn dependencies(&self) -> &'static [Module] {
        match self {
            Module::Storage => &[],
            Module::Auth => &[Module::Storage],
            Module::Ui => &[Module::Storage, Module::Auth],
            Module::Tickets => &[Module::Storage, Module::Auth],
        }
    }

    /// A critical module that fails to load aborts startup.
    pub fn is_critical(&self) -> bool {
        matches!(self, Module::Storage | Module::Auth)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Storage => "storage",
            Module::Auth => "auth",
            Module::Ui => "ui",
            Module::Tickets => "tickets",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ModuleStatus {
    Loaded { load_time_ms: u128 },
    Error { error: String },
}

impl ModuleStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModuleStatus::Loaded { .. })
    }
}

/// Fails if any dependency of `module` is not loaded.
pub fn check_dependencies(module: Module, modules: &BTreeMap<Module, ModuleStatus>) -> Result<()> {
    for dep in module.dependencies() {
        if !modules.get(dep).is_some_and(ModuleStatus::is_loaded) {
            bail!("Dependency {} not available for {}", dep, module);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub modules: BTreeMap<Module, bool>,
    pub storage_available: bool,
    pub usage: Option<StorageInfo>,
    pub tickets: usize,
    pub users: usize,
    pub uptime_secs: i64,
    pub errors: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.storage_available && self.modules.values().all(|ok| *ok)
    }
}

pub struct App<S> {
    config: AppConfig,
    storage: Storage<S>,
    auth: Auth,
    ui: Ui,
    scheduler: Scheduler<Task>,
    modules: BTreeMap<Module, ModuleStatus>,
    errors: Vec<String>,
    started_at: DateTime<Utc>,
    first_run: bool,
}

impl<S: KeyValueStore> App<S> {
    pub fn start(store: S, config: AppConfig, now: DateTime<Utc>) -> Result<Self> {
        config.validate()?;
        info!(version = %config.storage.version, "starting ticketdesk");

        let mut app = App {
            storage: Storage::new(store, config.storage.clone()),
            auth: Auth::new(config.session.clone(), config.guard.clone()),
            ui: Ui::new(config.ui.clone()),
            scheduler: Scheduler::new(),
            modules: BTreeMap::new(),
            errors: Vec::new(),
            started_at: now,
            first_run: false,
            config,
        };

        app.initialize_modules(now)?;
        app.verify_critical_systems()?;
        app.initialize_features(now);
        let health = app.health_check(now);
        debug!(healthy = health.is_healthy(), "initial health check");

        info!(
            modules = app.modules.len(),
            errors = app.errors.len(),
            first_run = app.first_run,
            "ticketdesk started"
        );
        Ok(app)
    }

    fn initialize_modules(&mut self, now: DateTime<Utc>) -> Result<()> {
        for module in Module::LOAD_ORDER {
            let started = Instant::now();
            let result = check_dependencies(module, &self.modules)
                .and_then(|()| self.initialize_module(module, now));

            match result {
                Ok(()) => {
                    let load_time_ms = started.elapsed().as_millis();
                    debug!(module = module.as_str(), load_time_ms, "module loaded");
                    self.modules.insert(module, ModuleStatus::Loaded { load_time_ms });
                }
                Err(e) => {
                    self.modules.insert(
                        module,
                        ModuleStatus::Error {
                            error: format!("{:#}", e),
                        },
                    );
                    if module.is_critical() {
                        error!(module = module.as_str(), error = %e, "critical module failed");
                        return Err(e.context(format!("Critical module {} could not be loaded", module)));
                    }
                    warn!(module = module.as_str(), error = %e, "module failed, continuing");
                    self.errors.push(format!("{}: {:#}", module, e));
                }
            }
        }
        Ok(())
    }

    fn initialize_module(&mut self, module: Module, now: DateTime<Utc>) -> Result<()> {
        match module {
            Module::Storage => self.storage.initialize(&mut self.ui.notifications, now),
            Module::Auth => {
                self.scheduler.schedule_after(
                    now,
                    Duration::milliseconds(self.config.session.remember_check_delay_ms),
                    Task::RememberMeCheck,
                );
                Ok(())
            }
            Module::Ui => {
                let theme = self.ui.load_saved_theme(&self.storage);
                debug!(theme, "ui ready");
                Ok(())
            }
            Module::Tickets => {
                let stats = tickets::ticket_stats(self.storage.tickets());
                debug!(total = stats.total, open = stats.open, "tickets ready");
                Ok(())
            }
        }
    }

    fn verify_critical_systems(&mut self) -> Result<()> {
        self.storage
            .check_availability()
            .context("Storage failed the critical systems check")?;
        for module in Module::LOAD_ORDER.iter().filter(|m| m.is_critical()) {
            if !self.modules.get(module).is_some_and(ModuleStatus::is_loaded) {
                bail!("Critical module {} is not loaded", module);
            }
        }
        Ok(())
    }

    fn initialize_features(&mut self, now: DateTime<Utc>) {
        if self.storage.settings().auto_save {
            self.scheduler.schedule_after(
                now,
                Duration::seconds(self.config.intervals.auto_save_secs),
                Task::AutoSave,
            );
            debug!(interval_secs = self.config.intervals.auto_save_secs, "auto-save enabled");
        }

        if let Err(e) = self.initialize_demo_data(now) {
            warn!(error = %e, "demo data could not be initialized");
        }

        self.scheduler.schedule_after(
            now,
            Duration::seconds(self.config.intervals.health_check_secs),
            Task::HealthCheck,
        );
    }

    fn initialize_demo_data(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.storage.read_key(keys::INITIALIZED)?.is_some() {
            return Ok(());
        }
        self.first_run = true;
        info!("first run detected, adding demo data");

        let (_, mut ctx) = self.parts(now);
        tickets::add_demo_tickets(&mut ctx)?;

        self.storage.write_key(keys::INITIALIZED, "true")?;
        self.storage.write_key(keys::FIRST_RUN, &now.to_rfc3339())?;
        self.scheduler.schedule_after(
            now,
            Duration::milliseconds(self.config.intervals.welcome_delay_ms),
            Task::WelcomeNotice,
        );
        Ok(())
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage<S> {
        &self.storage
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn ui(&self) -> &Ui {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut Ui {
        &mut self.ui
    }

    pub fn scheduler(&self) -> &Scheduler<Task> {
        &self.scheduler
    }

    pub fn modules(&self) -> &BTreeMap<Module, ModuleStatus> {
        &self.modules
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    pub fn into_store(self) -> S {
        self.storage.into_store()
    }

    /// Auth plus the state its operations need, borrowed together.
    pub fn parts(&mut self, now: DateTime<Utc>) -> (&mut Auth, Ctx<'_, S>) {
        (
            &mut self.auth,
            Ctx {
                storage: &mut self.storage,
                notices: &mut self.ui.notifications,
                scheduler: &mut self.scheduler,
                now,
            },
        )
    }

    pub fn show_tab(&mut self, tab: Tab) -> Result<()> {
        self.ui.show_tab(tab, &self.auth, &mut self.storage)
    }

    pub fn switch_theme(&mut self, theme: &str) -> Result<()> {
        self.ui.switch_theme(theme, &mut self.storage)
    }

    // ==================== Event loop ====================

    /// Run every task due at or before `now`, in due order. Returns the
    /// number of tasks run.
    pub fn tick(&mut self, now: DateTime<Utc>, prompt: &mut dyn Confirm) -> usize {
        let mut ran = 0;
        loop {
            while let Some((_, due, task)) = self.scheduler.pop_due(now) {
                self.dispatch(task, due, prompt);
                ran += 1;
            }
            if !self.ui.notifications.needs_drain() {
                break;
            }
            self.ui.notifications.start_drain(&mut self.scheduler, now);
        }
        ran
    }

    fn dispatch(&mut self, task: Task, due: DateTime<Utc>, prompt: &mut dyn Confirm) {
        debug!(?task, due = %due, "running task");
        match task {
            Task::ShowMainApp => {
                self.auth.complete_handoff();
                if self.auth.is_authenticated() {
                    self.ui.show_main_app();
                    self.ui.restore_last_tab(&self.auth, &mut self.storage);
                }
            }
            Task::ShowLoginScreen => {
                self.auth.complete_handoff();
                self.ui.show_login_screen();
            }
            Task::SessionWarning => {
                let (auth, mut ctx) = self.parts(due);
                auth.on_warning(&mut ctx, prompt);
            }
            Task::SessionExpired => {
                let (auth, mut ctx) = self.parts(due);
                auth.on_expired(&mut ctx);
            }
            Task::DrainNotifications => {
                self.ui.notifications.drain_step(&mut self.scheduler, due);
            }
            Task::DismissNotification(id) => {
                self.ui.notifications.expire(id);
            }
            Task::RememberMeCheck => {
                let (auth, mut ctx) = self.parts(due);
                if !auth.is_authenticated() {
                    auth.check_remember_token(&mut ctx);
                }
            }
            Task::AutoSave => {
                match self.save_all(due) {
                    Ok(()) => debug!("auto-save done"),
                    Err(e) => error!(error = %e, "auto-save failed"),
                }
                self.scheduler.schedule_after(
                    due,
                    Duration::seconds(self.config.intervals.auto_save_secs),
                    Task::AutoSave,
                );
            }
            Task::HealthCheck => {
                let report = self.health_check(due);
                if report.is_healthy() {
                    debug!(tickets = report.tickets, users = report.users, "health check passed");
                } else {
                    warn!(
                        storage_available = report.storage_available,
                        errors = report.errors,
                        "health check found problems"
                    );
                }
                self.scheduler.schedule_after(
                    due,
                    Duration::seconds(self.config.intervals.health_check_secs),
                    Task::HealthCheck,
                );
            }
            Task::WelcomeNotice => {
                self.ui.notifications.push_with_duration(
                    "Welcome to ticketdesk!\nDemo data has been loaded.",
                    Level::Success,
                    Duration::milliseconds(self.config.intervals.welcome_duration_ms),
                );
            }
        }
    }

    fn save_all(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.storage.save_tickets(&mut self.ui.notifications, now)?;
        self.storage.save_users(&mut self.ui.notifications, now)?;
        Ok(())
    }

    pub fn health_check(&mut self, now: DateTime<Utc>) -> HealthReport {
        let storage_available = match self.storage.check_availability() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "storage unavailable during health check");
                false
            }
        };
        let usage = match self.storage.storage_info() {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "could not measure storage usage");
                None
            }
        };
        HealthReport {
            timestamp: now,
            modules: self
                .modules
                .iter()
                .map(|(module, status)| (*module, status.is_loaded()))
                .collect(),
            storage_available,
            usage,
            tickets: self.storage.tickets().len(),
            users: self.storage.users().len(),
            uptime_secs: (now - self.started_at).num_seconds(),
            errors: self.errors.len(),
        }
    }

    /// Final save before the process exits.
    pub fn shutdown(&mut self, now: DateTime<Utc>) -> Result<()> {
        info!("shutting down, saving state");
        self.save_all(now).context("Final save failed")
    }
}
