//! UI state: notification queue, tab navigation, screens, modals, theme.
//!
//! Nothing here renders. The CLI reads this state and prints it.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::auth::Auth;
use crate::config::UiConfig;
use crate::kv::KeyValueStore;
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::storage::{keys, Storage};

const VALID_THEMES: [&str; 2] = ["light", "dark"];

/// Answers a yes/no question put to the user, e.g. the session warning.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
    Info,
    Warning,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Info => "info",
            Level::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub level: Level,
    pub duration: Duration,
    /// Long-lived notifications can be closed by hand.
    pub closable: bool,
}

#[derive(Debug)]
struct Shown {
    notification: Notification,
    shown_at: DateTime<Utc>,
    dismiss: TaskHandle,
}

/// FIFO notification queue.
///
/// Notifications are shown one per drain step, with a fixed interval between
/// steps. At most `max_visible_notifications` are on screen; showing one more
/// evicts the oldest. Each shown notification dismisses itself after its own
/// duration.
#[derive(Debug)]
pub struct NotificationQueue {
    config: UiConfig,
    pending: VecDeque<Notification>,
    visible: VecDeque<Shown>,
    draining: bool,
    next_id: u64,
}

impl NotificationQueue {
    pub fn new(config: UiConfig) -> Self {
        NotificationQueue {
            config,
            pending: VecDeque::new(),
            visible: VecDeque::new(),
            draining: false,
            next_id: 1,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, level: Level) -> u64 {
        let duration = Duration::milliseconds(self.config.notification_duration_ms);
        self.push_with_duration(message, level, duration)
    }

    pub fn push_with_duration(
        &mut self,
        message: impl Into<String>,
        level: Level,
        duration: Duration,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let notification = Notification {
            id,
            message: message.into(),
            level,
            closable: duration > Duration::milliseconds(self.config.closable_threshold_ms),
            duration,
        };
        debug!(id, level = level.as_str(), message = %notification.message, "notification queued");
        self.pending.push_back(notification);
        id
    }

    /// True when notifications are waiting and no drain is in progress.
    pub fn needs_drain(&self) -> bool {
        !self.draining && !self.pending.is_empty()
    }

    pub fn start_drain(&mut self, scheduler: &mut Scheduler<Task>, now: DateTime<Utc>) {
        if self.needs_drain() {
            self.draining = true;
            scheduler.schedule_at(now, Task::DrainNotifications);
        }
    }

    /// One drain step: show the next pending notification, if any, and
    /// schedule the following step.
    pub fn drain_step(
        &mut self,
        scheduler: &mut Scheduler<Task>,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let Some(notification) = self.pending.pop_front() else {
            self.draining = false;
            return None;
        };

        if self.visible.len() >= self.config.max_visible_notifications {
            if let Some(oldest) = self.visible.pop_front() {
                scheduler.cancel(oldest.dismiss);
                debug!(id = oldest.notification.id, "evicted oldest notification");
            }
        }

        let dismiss = scheduler.schedule_after(
            now,
            notification.duration,
            Task::DismissNotification(notification.id),
        );
        self.visible.push_back(Shown {
            notification: notification.clone(),
            shown_at: now,
            dismiss,
        });
        scheduler.schedule_after(
            now,
            Duration::milliseconds(self.config.notification_interval_ms),
            Task::DrainNotifications,
        );

        info!(
            id = notification.id,
            level = notification.level.as_str(),
            message = %notification.message,
            "notification shown"
        );
        Some(notification)
    }

    /// Called when a notification's own timer fires.
    pub fn expire(&mut self, id: u64) -> bool {
        let before = self.visible.len();
        self.visible.retain(|s| s.notification.id != id);
        before != self.visible.len()
    }

    /// Manual close. Only closable notifications can be dismissed this way.
    pub fn dismiss(&mut self, scheduler: &mut Scheduler<Task>, id: u64) -> bool {
        let Some(pos) = self
            .visible
            .iter()
            .position(|s| s.notification.id == id && s.notification.closable)
        else {
            return false;
        };
        if let Some(shown) = self.visible.remove(pos) {
            scheduler.cancel(shown.dismiss);
        }
        true
    }

    pub fn visible(&self) -> impl Iterator<Item = &Notification> {
        self.visible.iter().map(|s| &s.notification)
    }

    pub fn shown_at(&self, id: u64) -> Option<DateTime<Utc>> {
        self.visible
            .iter()
            .find(|s| s.notification.id == id)
            .map(|s| s.shown_at)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Notification> {
        self.pending.iter()
    }

    /// Remove everything still waiting, for front ends that print
    /// notifications directly instead of animating them.
    pub fn take_pending(&mut self) -> Vec<Notification> {
        self.pending.drain(..).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Dashboard,
    Tickets,
    Create,
    Admin,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Dashboard => "dashboard",
            Tab::Tickets => "tickets",
            Tab::Create => "create",
            Tab::Admin => "admin",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dashboard" => Ok(Tab::Dashboard),
            "tickets" => Ok(Tab::Tickets),
            "create" => Ok(Tab::Create),
            "admin" => Ok(Tab::Admin),
            other => bail!(
                "Unknown tab '{}'. Must be one of: dashboard, tickets, create, admin",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    MainApp,
}

#[derive(Debug)]
pub struct Ui {
    pub notifications: NotificationQueue,
    current_tab: Tab,
    screen: Screen,
    active_modals: BTreeSet<String>,
    theme: String,
}

impl Ui {
    pub fn new(config: UiConfig) -> Self {
        Ui {
            notifications: NotificationQueue::new(config),
            current_tab: Tab::Dashboard,
            screen: Screen::Login,
            active_modals: BTreeSet::new(),
            theme: "light".to_string(),
        }
    }

    pub fn current_tab(&self) -> Tab {
        self.current_tab
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    /// Switch tabs. The admin tab needs admin rights; a denied switch leaves
    /// the current tab untouched.
    pub fn show_tab<S: KeyValueStore>(
        &mut self,
        tab: Tab,
        auth: &Auth,
        storage: &mut Storage<S>,
    ) -> Result<()> {
        if tab == Tab::Admin && !auth.is_admin() {
            self.notifications
                .push("No permission for the admin area", Level::Error);
            bail!("No permission for the admin area");
        }

        self.current_tab = tab;
        if let Err(e) = storage.write_key(keys::CURRENT_TAB, tab.as_str()) {
            warn!(error = %e, "could not persist current tab");
        }
        debug!(tab = tab.as_str(), "switched tab");
        Ok(())
    }

    /// Return to the last persisted tab, if it differs from the current one
    /// and is still permitted.
    pub fn restore_last_tab<S: KeyValueStore>(
        &mut self,
        auth: &Auth,
        storage: &mut Storage<S>,
    ) -> Option<Tab> {
        let saved = storage.read_key(keys::CURRENT_TAB).ok().flatten()?;
        let tab = saved.parse::<Tab>().ok()?;
        if tab == self.current_tab {
            return None;
        }
        self.show_tab(tab, auth, storage).ok()?;
        Some(tab)
    }

    pub fn show_main_app(&mut self) {
        self.screen = Screen::MainApp;
        self.current_tab = Tab::Dashboard;
    }

    pub fn show_login_screen(&mut self) {
        self.screen = Screen::Login;
        self.close_all_modals();
    }

    /// Returns false if the modal was already open.
    pub fn open_modal(&mut self, id: &str) -> bool {
        self.active_modals.insert(id.to_string())
    }

    pub fn close_modal(&mut self, id: &str) -> bool {
        self.active_modals.remove(id)
    }

    pub fn close_all_modals(&mut self) -> usize {
        let count = self.active_modals.len();
        self.active_modals.clear();
        count
    }

    pub fn active_modals(&self) -> impl Iterator<Item = &str> {
        self.active_modals.iter().map(String::as_str)
    }

    /// Background scrolling is locked while any modal is open.
    pub fn scroll_locked(&self) -> bool {
        !self.active_modals.is_empty()
    }

    pub fn switch_theme<S: KeyValueStore>(
        &mut self,
        theme: &str,
        storage: &mut Storage<S>,
    ) -> Result<()> {
        if !VALID_THEMES.contains(&theme) {
            bail!(
                "Invalid theme '{}'. Must be one of: {}",
                theme,
                VALID_THEMES.join(", ")
            );
        }
        storage.write_key(keys::THEME, theme)?;
        self.theme = theme.to_string();
        let label = if theme == "dark" { "Dark" } else { "Light" };
        self.notifications
            .push(format!("Theme switched: {}", label), Level::Info);
        Ok(())
    }

    pub fn load_saved_theme<S: KeyValueStore>(&mut self, storage: &Storage<S>) -> &str {
        match storage.read_key(keys::THEME) {
            Ok(Some(theme)) if VALID_THEMES.contains(&theme.as_str()) => self.theme = theme,
            Ok(_) => self.theme = "light".to_string(),
            Err(e) => warn!(error = %e, "could not load theme"),
        }
        &self.theme
    }
}
