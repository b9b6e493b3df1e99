use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;

use super::require_admin;

pub fn run<S: KeyValueStore>(app: &App<S>, output: Option<&Path>, now: DateTime<Utc>) -> Result<()> {
    require_admin(app, "export data")?;
    let json = app.storage().export_all(now)?;

    match output {
        Some(path) => {
            fs::write(path, &json).context("Failed to write export file")?;
            eprintln!(
                "Exported {} tickets and {} users to {}",
                app.storage().tickets().len(),
                app.storage().users().len(),
                path.display()
            );
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn test_export_to_file_redacts_passwords() {
        let app = setup_as_admin();
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.json");
        run(&app, Some(&path), t0()).unwrap();

        let data: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(data["tickets"].as_array().unwrap().len(), 4);
        for user in data["users"].as_array().unwrap() {
            assert_eq!(user["password"], "[PROTECTED]");
        }
    }

    #[test]
    fn test_export_requires_admin() {
        let app = setup_as_user();
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.json");
        assert!(run(&app, Some(&path), t0()).is_err());
        assert!(!path.exists());
    }
}
