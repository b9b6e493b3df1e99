//! Canonical application data and its persistence.
//!
//! [`Storage`] owns the ticket list, the user list, the settings and the
//! ticket counter. Every mutation is written back through the `save_*`
//! methods, which serialize the in-memory state as JSON into the key-value
//! store. Loading is fail-soft: a missing or corrupt entry is replaced by
//! validated defaults and reported through a notification, never surfaced
//! as a malformed record.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;
use crate::models::{
    validate_priority, validate_status, Comment, Role, Settings, Ticket, User, DEFAULT_PRIORITY,
    DEFAULT_STATUS,
};
use crate::ui::{Level, NotificationQueue};

pub mod keys {
    pub const NAMESPACE: &str = "ticketSystem";

    pub const TICKETS: &str = "ticketSystemTickets";
    pub const USERS: &str = "ticketSystemSiteUsers";
    pub const COUNTER: &str = "ticketSystemCounter";
    pub const SETTINGS: &str = "ticketSystemSettings";
    pub const VERSION: &str = "ticketSystemVersion";

    pub const REMEMBER_TOKEN: &str = "ticketSystemRememberToken";
    pub const FAILED_LOGINS: &str = "ticketSystemFailedLogins";
    pub const CURRENT_TAB: &str = "ticketSystemCurrentTab";
    pub const THEME: &str = "ticketSystemTheme";
    pub const INITIALIZED: &str = "ticketSystemInitialized";
    pub const FIRST_RUN: &str = "ticketSystemFirstRun";

    pub const PROBE: &str = "ticketSystemTest";

    /// Keys removed by a full reset.
    pub const CORE: [&str; 5] = [TICKETS, USERS, COUNTER, SETTINGS, VERSION];

    /// Keys that survive the quota cleanup.
    pub const KNOWN: [&str; 11] = [
        TICKETS,
        USERS,
        COUNTER,
        SETTINGS,
        VERSION,
        REMEMBER_TOKEN,
        FAILED_LOGINS,
        CURRENT_TAB,
        THEME,
        INITIALIZED,
        FIRST_RUN,
    ];
}

pub const PROTECTED_PASSWORD: &str = "[PROTECTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Read from the store; the count of records loaded.
    Loaded(usize),
    /// Nothing stored yet; defaults in place.
    Defaulted,
    /// Stored data was unreadable; defaults in place.
    Recovered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub tickets_removed: usize,
    pub keys_removed: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub tickets: Option<usize>,
    pub settings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub total_kb: u64,
    pub tickets_kb: u64,
    pub users_kb: u64,
    pub tickets_count: usize,
    pub users_count: usize,
}

#[derive(Serialize)]
struct TicketsBlob<'a> {
    tickets: &'a [Ticket],
    counter: i64,
    timestamp: DateTime<Utc>,
    version: &'a str,
}

#[derive(Serialize)]
struct UsersBlob<'a> {
    users: &'a [User],
    timestamp: DateTime<Utc>,
    version: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportData<'a> {
    tickets: &'a [Ticket],
    users: Vec<User>,
    settings: &'a Settings,
    version: &'a str,
    export_date: DateTime<Utc>,
}

struct StoredRecords {
    records: Vec<Value>,
    version: Option<String>,
    counter: Option<i64>,
}

pub struct Storage<S> {
    kv: S,
    config: StorageConfig,
    tickets: Vec<Ticket>,
    users: Vec<User>,
    settings: Settings,
    ticket_counter: i64,
}

impl<S: KeyValueStore> Storage<S> {
    pub fn new(kv: S, config: StorageConfig) -> Self {
        Storage {
            kv,
            config,
            tickets: Vec::new(),
            users: Vec::new(),
            settings: Settings::default(),
            ticket_counter: 1,
        }
    }

    pub fn into_store(self) -> S {
        self.kv
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    // Raw key access for the auxiliary entries owned by auth and ui
    pub fn read_key(&self, key: &str) -> StoreResult<Option<String>> {
        self.kv.get(key)
    }

    pub fn write_key(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.kv.set(key, value)
    }

    pub fn remove_key(&mut self, key: &str) -> StoreResult<()> {
        self.kv.remove(key)
    }

    /// Probe write and removal. Fails when the store cannot be used at all.
    pub fn check_availability(&mut self) -> StoreResult<()> {
        self.kv.set(keys::PROBE, "test")?;
        self.kv.remove(keys::PROBE)
    }

    pub fn initialize(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> Result<()> {
        info!("initializing storage");

        if let Err(e) = self.check_availability() {
            error!(error = %e, "storage not available");
            notices.push("Local storage not available!", Level::Error);
            return Err(anyhow!(e).context("Local storage not available"));
        }

        let version = self.config.version.clone();
        self.kv
            .set(keys::VERSION, &version)
            .context("Failed to write version marker")?;

        self.load_settings(notices, now);
        self.load_users(notices, now);
        self.load_tickets(notices, now);

        match self.storage_info() {
            Ok(usage) => info!(
                total_kb = usage.total_kb,
                tickets = usage.tickets_count,
                users = usage.users_count,
                "storage initialized"
            ),
            Err(e) => warn!(error = %e, "storage initialized, usage unknown"),
        }
        Ok(())
    }

    // Tickets

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn tickets_mut(&mut self) -> &mut Vec<Ticket> {
        &mut self.tickets
    }

    pub fn ticket_counter(&self) -> i64 {
        self.ticket_counter
    }

    /// Hand out the next ticket id. Fails once the id space is used up.
    pub fn allocate_ticket_id(&mut self) -> Result<i64> {
        let id = self.ticket_counter.max(self.highest_ticket_id().saturating_add(1));
        let Some(next) = id.checked_add(1) else {
            bail!("No ticket ids left to allocate");
        };
        self.ticket_counter = next;
        Ok(id)
    }

    /// Undo the most recent [`Storage::allocate_ticket_id`] after a failed save.
    pub fn release_ticket_id(&mut self, id: i64) {
        if self.ticket_counter == id.saturating_add(1) {
            self.ticket_counter = id;
        }
    }

    pub fn highest_ticket_id(&self) -> i64 {
        self.tickets.iter().map(|t| t.id).max().unwrap_or(0)
    }

    pub fn load_tickets(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> LoadOutcome {
        let raw = match self.kv.get(keys::TICKETS) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "failed to read tickets");
                return self.reset_tickets(notices);
            }
        };

        let mut stored_counter = None;
        let outcome = match raw {
            None => {
                info!("no saved tickets found");
                self.tickets = Vec::new();
                LoadOutcome::Defaulted
            }
            Some(raw) => match parse_records(&raw, "tickets") {
                Ok(stored) => {
                    self.tickets = if self.needs_migration(stored.version.as_deref()) {
                        info!(
                            from = stored.version.as_deref().unwrap_or(""),
                            to = %self.config.version,
                            "migrating tickets"
                        );
                        migrate_tickets(stored.records, now)
                    } else {
                        stored
                            .records
                            .iter()
                            .map(|r| validate_ticket_structure(r, now))
                            .collect()
                    };
                    stored_counter = stored.counter;
                    LoadOutcome::Loaded(self.tickets.len())
                }
                Err(e) => {
                    error!(error = %e, "failed to parse saved tickets");
                    return self.reset_tickets(notices);
                }
            },
        };

        let mirrored = self
            .kv
            .get(keys::COUNTER)
            .ok()
            .flatten()
            .and_then(|s| s.trim().parse::<i64>().ok());
        let persisted = mirrored.or(stored_counter).unwrap_or(1);
        self.ticket_counter = persisted.max(self.highest_ticket_id().saturating_add(1));

        info!(
            tickets = self.tickets.len(),
            counter = self.ticket_counter,
            "tickets loaded"
        );
        outcome
    }

    fn reset_tickets(&mut self, notices: &mut NotificationQueue) -> LoadOutcome {
        self.tickets = Vec::new();
        self.ticket_counter = 1;
        notices.push("Tickets could not be loaded", Level::Error);
        LoadOutcome::Recovered
    }

    fn write_tickets(&mut self, now: DateTime<Utc>) -> StoreResult<()> {
        let blob = TicketsBlob {
            tickets: &self.tickets,
            counter: self.ticket_counter,
            timestamp: now,
            version: &self.config.version,
        };
        let json = serde_json::to_string(&blob)?;
        self.kv.set(keys::TICKETS, &json)?;
        self.kv.set(keys::COUNTER, &self.ticket_counter.to_string())
    }

    /// Persist all tickets. A quota failure triggers one cleanup and one
    /// retry.
    pub fn save_tickets(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> Result<()> {
        match self.write_tickets(now) {
            Ok(()) => {
                debug!(
                    tickets = self.tickets.len(),
                    counter = self.ticket_counter,
                    "tickets saved"
                );
                Ok(())
            }
            Err(e) if e.is_quota_exceeded() => {
                warn!(error = %e, "storage full, cleaning up before retry");
                notices.push("Storage full! Removing older data...", Level::Warning);
                self.cleanup_old_data();
                self.write_tickets(now).map_err(|e| {
                    error!(error = %e, "saving tickets failed after cleanup");
                    notices.push("Tickets could not be saved", Level::Error);
                    anyhow!(e).context("Failed to save tickets after cleanup")
                })
            }
            Err(e) => {
                error!(error = %e, "failed to save tickets");
                notices.push("Tickets could not be saved", Level::Error);
                Err(anyhow!(e).context("Failed to save tickets"))
            }
        }
    }

    // Users

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut Vec<User> {
        &mut self.users
    }

    /// Case-insensitive lookup by email.
    pub fn find_user(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn find_user_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn load_users(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> LoadOutcome {
        let raw = match self.kv.get(keys::USERS) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "failed to read users");
                return self.reset_users(notices, now);
            }
        };

        match raw {
            None => {
                info!("no saved users found, creating defaults");
                self.users = create_default_users(now);
                if let Err(e) = self.save_users(notices, now) {
                    warn!(error = %e, "could not persist default users");
                }
                LoadOutcome::Defaulted
            }
            Some(raw) => match parse_records(&raw, "users") {
                Ok(stored) => {
                    self.users = if self.needs_migration(stored.version.as_deref()) {
                        info!(
                            from = stored.version.as_deref().unwrap_or(""),
                            to = %self.config.version,
                            "migrating users"
                        );
                        migrate_users(stored.records, now)
                    } else {
                        stored
                            .records
                            .iter()
                            .map(|r| validate_user_structure(r, now))
                            .collect()
                    };
                    info!(users = self.users.len(), "users loaded");
                    LoadOutcome::Loaded(self.users.len())
                }
                Err(e) => {
                    error!(error = %e, "failed to parse saved users");
                    self.reset_users(notices, now)
                }
            },
        }
    }

    fn reset_users(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> LoadOutcome {
        self.users = create_default_users(now);
        notices.push("Default users were created", Level::Info);
        LoadOutcome::Recovered
    }

    pub fn save_users(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> Result<()> {
        let blob = UsersBlob {
            users: &self.users,
            timestamp: now,
            version: &self.config.version,
        };
        let result = serde_json::to_string(&blob)
            .map_err(StoreError::from)
            .and_then(|json| self.kv.set(keys::USERS, &json));

        match result {
            Ok(()) => {
                debug!(users = self.users.len(), "users saved");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to save users");
                notices.push("Users could not be saved", Level::Error);
                Err(anyhow!(e).context("Failed to save users"))
            }
        }
    }

    // Settings

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn load_settings(&mut self, notices: &mut NotificationQueue, now: DateTime<Utc>) -> LoadOutcome {
        let raw = match self.kv.get(keys::SETTINGS) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "failed to read settings");
                self.settings = Settings::default();
                notices.push("Settings could not be loaded, using defaults", Level::Warning);
                return LoadOutcome::Recovered;
            }
        };

        match raw {
            None => {
                self.settings = Settings::default();
                if let Err(e) = self.save_settings(Map::new(), now) {
                    warn!(error = %e, "could not persist default settings");
                }
                info!("default settings created");
                LoadOutcome::Defaulted
            }
            Some(raw) => match serde_json::from_str::<Settings>(&raw) {
                Ok(mut settings) => {
                    strip_blob_metadata(&mut settings);
                    self.settings = settings;
                    debug!(theme = %self.settings.theme, "settings loaded");
                    LoadOutcome::Loaded(1)
                }
                Err(e) => {
                    error!(error = %e, "failed to parse settings");
                    self.settings = Settings::default();
                    notices.push("Settings could not be loaded, using defaults", Level::Warning);
                    LoadOutcome::Recovered
                }
            },
        }
    }

    /// Merge `patch` into the current settings and persist the result.
    pub fn save_settings(&mut self, patch: Map<String, Value>, now: DateTime<Utc>) -> Result<()> {
        let mut merged = match serde_json::to_value(&self.settings)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(patch);

        let mut settings: Settings = serde_json::from_value(Value::Object(merged.clone()))
            .context("Invalid settings value")?;
        strip_blob_metadata(&mut settings);

        merged.insert("timestamp".to_string(), Value::String(now.to_rfc3339()));
        merged.insert(
            "version".to_string(),
            Value::String(self.config.version.clone()),
        );
        let json = serde_json::to_string(&Value::Object(merged))?;
        self.kv
            .set(keys::SETTINGS, &json)
            .context("Failed to save settings")?;

        self.settings = settings;
        debug!("settings saved");
        Ok(())
    }

    // Maintenance

    fn needs_migration(&self, stored_version: Option<&str>) -> bool {
        matches!(stored_version, Some(v) if v != self.config.version)
    }

    /// Free space after a quota failure: keep only the newest tickets and
    /// drop namespaced keys nobody owns.
    pub fn cleanup_old_data(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let retain = self.config.cleanup_retain;

        if self.tickets.len() > retain {
            self.tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            report.tickets_removed = self.tickets.len() - retain;
            self.tickets.truncate(retain);
            info!(kept = retain, removed = report.tickets_removed, "old tickets cleaned up");
        }

        match self.kv.keys() {
            Ok(all) => {
                for key in all {
                    if key.contains(keys::NAMESPACE) && !keys::KNOWN.contains(&key.as_str()) {
                        match self.kv.remove(&key) {
                            Ok(()) => {
                                info!(key = %key, "removed stale key");
                                report.keys_removed.push(key);
                            }
                            Err(e) => warn!(key = %key, error = %e, "could not remove stale key"),
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "could not list keys during cleanup"),
        }

        report
    }

    /// Everything as pretty JSON, passwords redacted.
    pub fn export_all(&self, now: DateTime<Utc>) -> Result<String> {
        let users = self
            .users
            .iter()
            .map(|u| User {
                password: PROTECTED_PASSWORD.to_string(),
                ..u.clone()
            })
            .collect();
        let data = ExportData {
            tickets: &self.tickets,
            users,
            settings: &self.settings,
            version: &self.config.version,
            export_date: now,
        };
        serde_json::to_string_pretty(&data).context("Failed to export data")
    }

    /// Import tickets and settings from an export. Users are never imported.
    pub fn import_all(
        &mut self,
        json: &str,
        notices: &mut NotificationQueue,
        now: DateTime<Utc>,
    ) -> Result<ImportReport> {
        let result = self.import_inner(json, notices, now);
        match &result {
            Ok(report) => {
                info!(tickets = ?report.tickets, settings = report.settings, "data imported");
                notices.push("Data imported successfully!", Level::Success);
            }
            Err(e) => {
                error!(error = %e, "data import failed");
                notices.push("Data import failed!", Level::Error);
            }
        }
        result
    }

    fn import_inner(
        &mut self,
        json: &str,
        notices: &mut NotificationQueue,
        now: DateTime<Utc>,
    ) -> Result<ImportReport> {
        let data: Value = serde_json::from_str(json).context("Import is not valid JSON")?;
        let Value::Object(mut data) = data else {
            bail!("Import must be a JSON object");
        };
        let mut report = ImportReport::default();

        if let Some(tickets) = data.remove("tickets") {
            let Value::Array(records) = tickets else {
                bail!("'tickets' must be an array");
            };
            self.tickets = records
                .iter()
                .map(|r| validate_ticket_structure(r, now))
                .collect();
            self.ticket_counter = self.highest_ticket_id().saturating_add(1);
            self.save_tickets(notices, now)?;
            report.tickets = Some(self.tickets.len());
        }

        if let Some(settings) = data.remove("settings") {
            let Value::Object(patch) = settings else {
                bail!("'settings' must be an object");
            };
            self.save_settings(patch, now)?;
            report.settings = true;
        }

        Ok(report)
    }

    pub fn storage_info(&self) -> StoreResult<StorageInfo> {
        let entry_size = |key: &str| -> StoreResult<usize> {
            Ok(self.kv.get(key)?.map(|v| v.len()).unwrap_or(0))
        };
        Ok(StorageInfo {
            total_kb: to_kb(self.kv.total_bytes()?),
            tickets_kb: to_kb(entry_size(keys::TICKETS)?),
            users_kb: to_kb(entry_size(keys::USERS)?),
            tickets_count: self.tickets.len(),
            users_count: self.users.len(),
        })
    }

    /// Remove all core entries and reset in-memory state. The default users
    /// are back in memory afterwards, so a later save cannot persist an
    /// empty user list.
    pub fn clear_all(&mut self, now: DateTime<Utc>) -> Result<()> {
        for key in keys::CORE {
            self.kv
                .remove(key)
                .with_context(|| format!("Failed to remove {}", key))?;
        }
        self.tickets.clear();
        self.users = create_default_users(now);
        self.ticket_counter = 1;
        self.settings = Settings::default();
        info!("all data cleared");
        Ok(())
    }
}

fn to_kb(bytes: usize) -> u64 {
    (bytes as f64 / 1024.0).round() as u64
}

fn strip_blob_metadata(settings: &mut Settings) {
    settings.extra.remove("timestamp");
    settings.extra.remove("version");
}

/// Accepts `{<field>: [...], version, counter}` or a bare array.
fn parse_records(raw: &str, field: &str) -> Result<StoredRecords> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Array(records) => Ok(StoredRecords {
            records,
            version: None,
            counter: None,
        }),
        Value::Object(mut map) => {
            let records = match map.remove(field) {
                Some(Value::Array(records)) => records,
                Some(_) => bail!("'{}' is not an array", field),
                None => bail!("missing '{}'", field),
            };
            Ok(StoredRecords {
                records,
                version: map.get("version").and_then(Value::as_str).map(String::from),
                counter: map.get("counter").and_then(Value::as_i64),
            })
        }
        _ => bail!("unexpected JSON shape for {}", field),
    }
}

/// Parse RFC 3339, or the legacy `DD.MM.YYYY, HH:MM:SS` form (read as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%d.%m.%Y, %H:%M:%S", "%d.%m.%Y %H:%M:%S", "%d.%m.%Y, %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%d.%m.%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn text_or(record: &Value, field: &str, default: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn timestamp_or(record: &Value, field: &str, default: DateTime<Utc>) -> DateTime<Utc> {
    record
        .get(field)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or(default)
}

fn normalize_status(status: &str) -> &str {
    match status {
        "Offen" => "Open",
        "In Bearbeitung" => "In Progress",
        "Gelöst" => "Resolved",
        "Geschlossen" => "Closed",
        s if validate_status(s) => s,
        _ => DEFAULT_STATUS,
    }
}

fn normalize_priority(priority: &str) -> &str {
    match priority {
        "Niedrig" => "Low",
        "Hoch" => "High",
        "Kritisch" => "Critical",
        p if validate_priority(p) => p,
        _ => DEFAULT_PRIORITY,
    }
}

/// Fill every missing ticket field with its default. Never fails.
pub fn validate_ticket_structure(record: &Value, now: DateTime<Utc>) -> Ticket {
    let comments = match record.get("comments") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|c| Comment {
                author: text_or(c, "author", "System"),
                date: timestamp_or(c, "date", now),
                text: text_or(c, "text", ""),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ticket {
        id: record
            .get("id")
            .and_then(Value::as_i64)
            .filter(|id| *id > 0 && *id < i64::MAX)
            .unwrap_or_else(|| now.timestamp_millis()),
        customer_name: text_or(record, "customerName", "Unknown"),
        company: text_or(record, "company", "Unknown"),
        phone: text_or(record, "phone", ""),
        customer_email: text_or(record, "customerEmail", ""),
        assignee: text_or(record, "assignee", ""),
        group: text_or(record, "group", "Software"),
        category: text_or(record, "category", ""),
        priority: normalize_priority(&text_or(record, "priority", DEFAULT_PRIORITY)).to_string(),
        description: text_or(record, "description", "No description"),
        status: normalize_status(&text_or(record, "status", DEFAULT_STATUS)).to_string(),
        created_by: text_or(record, "createdBy", "System"),
        created_at: timestamp_or(record, "createdAt", now),
        comments,
    }
}

/// Fill every missing user field with its default and clamp the role.
pub fn validate_user_structure(record: &Value, now: DateTime<Utc>) -> User {
    User {
        name: text_or(record, "name", "Unknown"),
        email: text_or(record, "email", "unknown@example.com"),
        password: text_or(record, "password", "changeme"),
        role: record
            .get("role")
            .and_then(Value::as_str)
            .and_then(Role::parse)
            .unwrap_or_default(),
        created_at: timestamp_or(record, "createdAt", now),
        last_login: record
            .get("lastLogin")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        created_by: record
            .get("createdBy")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
    }
}

fn backfill(record: &mut Value, field: &str, default: Value) {
    if let Value::Object(map) = record {
        let missing = match map.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing {
            map.insert(field.to_string(), default);
        }
    }
}

/// Bring tickets written by another version up to the current shape.
pub fn migrate_tickets(records: Vec<Value>, now: DateTime<Utc>) -> Vec<Ticket> {
    records
        .into_iter()
        .map(|mut record| {
            backfill(&mut record, "category", Value::String(String::new()));
            backfill(&mut record, "assignee", Value::String(String::new()));
            if !matches!(record.get("comments"), Some(Value::Array(_))) {
                if let Value::Object(map) = &mut record {
                    map.insert("comments".to_string(), Value::Array(Vec::new()));
                }
            }
            validate_ticket_structure(&record, now)
        })
        .collect()
}

/// Bring users written by another version up to the current shape.
pub fn migrate_users(records: Vec<Value>, now: DateTime<Utc>) -> Vec<User> {
    records
        .into_iter()
        .map(|mut record| {
            backfill(&mut record, "createdAt", Value::String(now.to_rfc3339()));
            backfill(&mut record, "role", Value::String(Role::User.as_str().to_string()));
            validate_user_structure(&record, now)
        })
        .collect()
}

pub fn create_default_users(now: DateTime<Utc>) -> Vec<User> {
    let user = |name: &str, email: &str, password: &str, role: Role| User {
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        role,
        created_at: now,
        last_login: None,
        created_by: None,
    };
    vec![
        user("Administrator", "admin@firma.de", "admin123", Role::Admin),
        user("Max Schmidt", "max@firma.de", "user123", Role::User),
        user("Gast Demo", "gast@demo.de", "guest123", Role::Guest),
    ]
}
