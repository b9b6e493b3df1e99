use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;

const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed key-value store.
pub struct Database {
    conn: Connection,
    quota: Option<usize>,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let db = Database { conn, quota: None };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn, quota: None };
        db.init_schema()?;
        Ok(db)
    }

    /// Limit the total size of stored keys and values, in bytes.
    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    fn init_schema(&self) -> StoreResult<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL
                );
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        Ok(())
    }

    fn used_bytes_excluding(&self, key: &str) -> StoreResult<usize> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv WHERE key != ?1",
            [key],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as usize)
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        if let Some(limit) = self.quota {
            let needed = self.used_bytes_excluding(key)? + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn total_bytes(&self) -> StoreResult<usize> {
        self.used_bytes_excluding("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    #[test]
    fn test_set_and_get() {
        let (mut db, _dir) = setup_test_db();
        db.set("ticketSystemTheme", "dark").unwrap();
        assert_eq!(db.get("ticketSystemTheme").unwrap(), Some("dark".to_string()));
        assert_eq!(db.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let (mut db, _dir) = setup_test_db();
        db.set("k", "one").unwrap();
        db.set("k", "two").unwrap();
        assert_eq!(db.get("k").unwrap(), Some("two".to_string()));
        assert_eq!(db.keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_remove() {
        let (mut db, _dir) = setup_test_db();
        db.set("k", "v").unwrap();
        db.remove("k").unwrap();
        assert_eq!(db.get("k").unwrap(), None);
        // Removing a missing key is not an error
        db.remove("k").unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        {
            let mut db = Database::open(&db_path).unwrap();
            db.set("ticketSystemCounter", "42").unwrap();
        }
        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.get("ticketSystemCounter").unwrap(), Some("42".to_string()));
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let (db, _dir) = setup_test_db();
        let mut db = db.with_quota(Some(16));
        db.set("a", "12345").unwrap();
        let err = db.set("b", "1234567890123").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(db.get("b").unwrap(), None);
        assert_eq!(db.total_bytes().unwrap(), 6);
    }

    #[test]
    fn test_total_bytes_counts_utf8() {
        let mut db = Database::open_in_memory().unwrap();
        db.set("k", "äö").unwrap();
        assert_eq!(db.total_bytes().unwrap(), 1 + 4);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_value(key in "[a-zA-Z]{1,20}", value in "\\PC{0,200}") {
            let mut db = Database::open_in_memory().unwrap();
            db.set(&key, &value).unwrap();
            prop_assert_eq!(db.get(&key).unwrap(), Some(value));
        }
    }
}
