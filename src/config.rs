//! Application configuration.
//!
//! Every setting has a default matching the stock behavior, so an
//! [`AppConfig::default()`] is a complete, working configuration. The CLI
//! overrides selected fields from flags and environment variables.

use anyhow::{bail, Result};
use chrono::Duration;

pub const APP_VERSION: &str = "1.0.0";

/// One week.
pub const MAX_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub guard: LoginGuardConfig,
    pub ui: UiConfig,
    pub intervals: IntervalConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Version tag written with every blob. A mismatch on load triggers
    /// migration.
    pub version: String,
    /// Tickets kept by the quota cleanup.
    pub cleanup_retain: usize,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout_minutes: i64,
    /// The warning fires this many minutes before the timeout.
    pub warning_minutes: i64,
    pub remember_days: i64,
    pub login_handoff_ms: i64,
    pub logout_handoff_ms: i64,
    pub remember_check_delay_ms: i64,
}

#[derive(Debug, Clone)]
pub struct LoginGuardConfig {
    /// Failures kept per email.
    pub log_cap: usize,
    pub window_minutes: i64,
    pub warn_threshold: usize,
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub notification_duration_ms: i64,
    pub notification_interval_ms: i64,
    pub max_visible_notifications: usize,
    /// Notifications lasting longer than this get a close button.
    pub closable_threshold_ms: i64,
}

#[derive(Debug, Clone)]
pub struct IntervalConfig {
    pub auto_save_secs: i64,
    pub health_check_secs: i64,
    pub welcome_delay_ms: i64,
    pub welcome_duration_ms: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            version: APP_VERSION.to_string(),
            cleanup_retain: 50,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timeout_minutes: 60,
            warning_minutes: 5,
            remember_days: 7,
            login_handoff_ms: 800,
            logout_handoff_ms: 1000,
            remember_check_delay_ms: 500,
        }
    }
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        LoginGuardConfig {
            log_cap: 10,
            window_minutes: 15,
            warn_threshold: 5,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            notification_duration_ms: 3000,
            notification_interval_ms: 500,
            max_visible_notifications: 3,
            closable_threshold_ms: 5000,
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        IntervalConfig {
            auto_save_secs: 60,
            health_check_secs: 300,
            welcome_delay_ms: 2000,
            welcome_duration_ms: 5000,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::minutes(self.timeout_minutes)
    }

    pub fn warning_after(&self) -> Duration {
        Duration::minutes(self.timeout_minutes - self.warning_minutes)
    }

    pub fn remember_for(&self) -> Duration {
        Duration::days(self.remember_days)
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        if s.timeout_minutes <= 0 || s.timeout_minutes > MAX_TIMEOUT_MINUTES {
            bail!(
                "Session timeout must be between 1 and {} minutes (got {})",
                MAX_TIMEOUT_MINUTES,
                s.timeout_minutes
            );
        }
        if s.warning_minutes < 0 || s.warning_minutes >= s.timeout_minutes {
            bail!(
                "Session warning ({} min) must be shorter than the timeout ({} min)",
                s.warning_minutes,
                s.timeout_minutes
            );
        }
        if self.ui.max_visible_notifications == 0 {
            bail!("At least one notification must be visible");
        }
        if self.storage.cleanup_retain == 0 {
            bail!("Cleanup must retain at least one ticket");
        }
        if self.guard.log_cap < self.guard.warn_threshold {
            bail!(
                "Failed-login log cap ({}) is below the warning threshold ({})",
                self.guard.log_cap,
                self.guard.warn_threshold
            );
        }
        Ok(())
    }
}
