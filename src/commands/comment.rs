use anyhow::Result;
use chrono::{DateTime, Utc};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::tickets;

pub fn run<S: KeyValueStore>(app: &mut App<S>, id: i64, text: &str, now: DateTime<Utc>) -> Result<()> {
    let (auth, mut ctx) = app.parts(now);
    tickets::add_comment(&mut ctx, auth, id, text)?;
    println!("Added comment to ticket #{}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;
    use ticketdesk::tickets::get_ticket;

    #[test]
    fn test_add_comment() {
        let mut app = setup_as_user();
        let before = get_ticket(app.storage(), 3).unwrap().comments.len();
        run(&mut app, 3, "Called the customer back", t0()).unwrap();

        let ticket = get_ticket(app.storage(), 3).unwrap();
        assert_eq!(ticket.comments.len(), before + 1);
        let comment = ticket.comments.last().unwrap();
        assert_eq!(comment.author, "Max Schmidt");
        assert_eq!(comment.text, "Called the customer back");
        assert_eq!(comment.date, t0());
    }

    #[test]
    fn test_empty_comment_rejected() {
        let mut app = setup_as_user();
        assert!(run(&mut app, 3, "   ", t0()).is_err());
    }

    #[test]
    fn test_comment_guest_denied() {
        let mut app = setup_as_guest();
        assert!(run(&mut app, 3, "hello", t0()).is_err());
    }
}
