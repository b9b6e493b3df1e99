use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const VALID_STATUSES: [&str; 4] = ["Open", "In Progress", "Resolved", "Closed"];
pub const VALID_PRIORITIES: [&str; 4] = ["Low", "Normal", "High", "Critical"];

pub const DEFAULT_STATUS: &str = "Open";
pub const DEFAULT_PRIORITY: &str = "Normal";

/// Email of the built-in administrator. This account can never be deleted.
pub const RESERVED_ADMIN_EMAIL: &str = "admin@firma.de";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub customer_name: String,
    pub company: String,
    pub phone: String,
    pub customer_email: String,
    pub assignee: String,
    pub group: String,
    pub category: String,
    pub priority: String,
    pub description: String,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub date: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
    Guest,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Guest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            "guest" => Some(Role::Guest),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Flat settings bag. Unknown keys survive a load/save cycle in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: String,
    pub language: String,
    pub auto_save: bool,
    pub notifications: bool,
    pub compact_view: bool,
    pub debug_mode: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            theme: "light".to_string(),
            language: "de".to_string(),
            auto_save: true,
            notifications: true,
            compact_view: false,
            debug_mode: false,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberToken {
    pub email: String,
    pub expires: DateTime<Utc>,
    pub hash: String,
}

pub fn validate_status(status: &str) -> bool {
    VALID_STATUSES.contains(&status)
}

pub fn validate_priority(priority: &str) -> bool {
    VALID_PRIORITIES.contains(&priority)
}
