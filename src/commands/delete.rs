use anyhow::Result;
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::tickets;
use ticketdesk::ui::Confirm;

pub fn run<S: KeyValueStore>(
    app: &mut App<S>,
    id: i64,
    force: bool,
    prompt: &mut dyn Confirm,
    now: DateTime<Utc>,
) -> Result<()> {
    let customer = tickets::get_ticket(app.storage(), id)?.customer_name.clone();

    // Non-admins go straight to the permission error instead of a prompt.
    if app.auth().is_admin()
        && !force
        && !prompt.confirm(&format!("Delete ticket #{} \"{}\"?", id, customer))
    {
        println!("Cancelled.");
        return Ok(());
    }

    let (auth, mut ctx) = app.parts(now);
    tickets::delete_ticket(&mut ctx, auth, id)?;
    println!("Deleted ticket #{}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;
    use proptest::prelude::*;

    // ==================== Unit Tests ====================

    #[test]
    fn test_delete_force() {
        let mut app = setup_as_admin();
        run(&mut app, 2, true, &mut no, t0()).unwrap();
        assert!(tickets::get_ticket(app.storage(), 2).is_err());
        assert_eq!(app.storage().tickets().len(), 3);
    }

    #[test]
    fn test_delete_confirmed() {
        let mut app = setup_as_admin();
        run(&mut app, 2, false, &mut yes, t0()).unwrap();
        assert_eq!(app.storage().tickets().len(), 3);
    }

    #[test]
    fn test_delete_cancelled() {
        let mut app = setup_as_admin();
        run(&mut app, 2, false, &mut no, t0()).unwrap();
        assert_eq!(app.storage().tickets().len(), 4);
    }

    #[test]
    fn test_delete_missing() {
        let mut app = setup_as_admin();
        let err = run(&mut app, 99, true, &mut yes, t0()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_delete_user_denied_without_prompt() {
        let mut app = setup_as_user();
        let mut asked = false;
        let mut prompt = |_: &str| {
            asked = true;
            true
        };
        assert!(run(&mut app, 2, false, &mut prompt, t0()).is_err());
        assert!(!asked);
        assert_eq!(app.storage().tickets().len(), 4);
    }

    #[test]
    fn test_delete_keeps_counter() {
        let mut app = setup_as_admin();
        run(&mut app, 4, true, &mut no, t0()).unwrap();
        assert_eq!(app.storage().ticket_counter(), 5);
    }

    // ==================== Property-Based Tests ====================

    proptest! {
        #[test]
        fn prop_delete_nonexistent_fails(id in 5i64..10000) {
            let mut app = setup_as_admin();
            prop_assert!(run(&mut app, id, true, &mut no, t0()).is_err());
            prop_assert_eq!(app.storage().tickets().len(), 4);
        }
    }
}
