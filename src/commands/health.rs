use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use ticketdesk::app::{App, HealthReport};
use ticketdesk::kv::KeyValueStore;

pub fn run<S: KeyValueStore>(app: &mut App<S>, json: bool, now: DateTime<Utc>) -> Result<()> {
    let report = app.health_check(now);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_healthy() {
        bail!("Health check failed");
    }
    Ok(())
}

fn print_report(report: &HealthReport) {
    println!("Checked: {}", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    for (module, ok) in &report.modules {
        println!("  {:<8} {}", module.as_str(), if *ok { "ok" } else { "FAILED" });
    }
    println!(
        "Storage: {}",
        if report.storage_available {
            "available"
        } else {
            "UNAVAILABLE"
        }
    );
    if let Some(usage) = &report.usage {
        println!("Usage:   {} KB", usage.total_kb);
    }
    println!("Tickets: {}", report.tickets);
    println!("Users:   {}", report.users);
    if report.errors > 0 {
        println!("Errors:  {}", report.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn test_health_text() {
        let mut app = setup_test_app();
        run(&mut app, false, t0()).unwrap();
    }

    #[test]
    fn test_health_json() {
        let mut app = setup_test_app();
        run(&mut app, true, t0()).unwrap();
    }
}
