use anyhow::Result;

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::storage::keys;
use ticketdesk::ui::Tab;

use super::require_login;

pub fn tab<S: KeyValueStore>(app: &mut App<S>, name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        let saved = app
            .storage()
            .read_key(keys::CURRENT_TAB)?
            .and_then(|s| s.parse::<Tab>().ok())
            .unwrap_or(app.ui().current_tab());
        println!("{}", saved);
        return Ok(());
    };

    require_login(app, "switch tabs")?;
    let tab: Tab = name.parse()?;
    app.show_tab(tab)?;
    println!("Switched to {}", tab);
    Ok(())
}

pub fn theme<S: KeyValueStore>(app: &mut App<S>, name: Option<&str>) -> Result<()> {
    match name {
        None => println!("{}", app.ui().theme()),
        Some(name) => {
            app.switch_theme(name)?;
            println!("Theme switched to {}", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn test_tab_switch_persists() {
        let mut app = setup_as_user();
        tab(&mut app, Some("tickets")).unwrap();
        assert_eq!(app.ui().current_tab(), Tab::Tickets);
        assert_eq!(
            app.storage().read_key(keys::CURRENT_TAB).unwrap().as_deref(),
            Some("tickets")
        );
    }

    #[test]
    fn test_admin_tab_denied_for_user() {
        let mut app = setup_as_user();
        assert!(tab(&mut app, Some("admin")).is_err());
        assert_eq!(app.ui().current_tab(), Tab::Dashboard);
    }

    #[test]
    fn test_admin_tab_for_admin() {
        let mut app = setup_as_admin();
        tab(&mut app, Some("admin")).unwrap();
        assert_eq!(app.ui().current_tab(), Tab::Admin);
    }

    #[test]
    fn test_unknown_tab() {
        let mut app = setup_as_admin();
        assert!(tab(&mut app, Some("reports")).is_err());
    }

    #[test]
    fn test_tab_requires_login() {
        let mut app = setup_test_app();
        assert!(tab(&mut app, Some("tickets")).is_err());
        tab(&mut app, None).unwrap();
    }

    #[test]
    fn test_theme_switch() {
        let mut app = setup_test_app();
        theme(&mut app, Some("dark")).unwrap();
        assert_eq!(app.ui().theme(), "dark");
        assert_eq!(
            app.storage().read_key(keys::THEME).unwrap().as_deref(),
            Some("dark")
        );
        assert!(theme(&mut app, Some("blue")).is_err());
        assert_eq!(app.ui().theme(), "dark");
    }
}
