//! Interactive shell.
//!
//! Keeps one `App` alive so the scheduler actually runs: session warnings,
//! expiry, auto-save and notification timeouts all fire between commands.
//! SIGINT and SIGTERM end the loop and trigger the final save.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use ticketdesk::app::App;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::ui::Confirm;

use crate::{dispatch, Commands};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "ticketdesk", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

/// Answers confirmations with the next line typed into the shell.
struct ChannelPrompt<'a> {
    lines: &'a Receiver<String>,
    shutdown: &'a AtomicBool,
}

impl Confirm for ChannelPrompt<'_> {
    fn confirm(&mut self, message: &str) -> bool {
        print!("\n{} [y/N] ", message);
        if io::stdout().flush().is_err() {
            return false;
        }
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return false;
            }
            match self.lines.recv_timeout(POLL_INTERVAL) {
                Ok(answer) => return answer.trim().eq_ignore_ascii_case("y"),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

pub fn run<S: KeyValueStore>(app: &mut App<S>) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let lines = spawn_reader();
    let mut prompt = ChannelPrompt {
        lines: &lines,
        shutdown: &shutdown,
    };
    let mut last_printed = 0;

    println!("ticketdesk shell. Type 'help' for commands, 'exit' to quit.");
    print_prompt(app);

    while !shutdown.load(Ordering::Relaxed) {
        app.tick(Utc::now(), &mut prompt);
        if print_notifications(app, &mut last_printed) {
            print_prompt(app);
        }

        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if !handle_line(app, &line, &mut prompt, Utc::now()) {
                    break;
                }
                app.tick(Utc::now(), &mut prompt);
                print_notifications(app, &mut last_printed);
                print_prompt(app);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("stdin closed");
                break;
            }
        }
    }

    info!(signalled = shutdown.load(Ordering::Relaxed), "leaving shell");
    app.shutdown(Utc::now())?;
    println!("\nState saved.");
    Ok(())
}

fn spawn_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_prompt<S: KeyValueStore>(app: &App<S>) {
    match app.auth().current_user() {
        Some(session) => print!("ticketdesk({})> ", session.email),
        None => print!("ticketdesk> "),
    }
    // Nothing useful to do if the terminal is gone.
    let _ = io::stdout().flush();
}

/// Print notifications that became visible since the last call.
fn print_notifications<S: KeyValueStore>(app: &App<S>, last_printed: &mut u64) -> bool {
    let mut any = false;
    for notice in app.ui().notifications.visible() {
        if notice.id <= *last_printed {
            continue;
        }
        if !any {
            println!();
        }
        any = true;
        for line in notice.message.lines() {
            println!("[{}] {}", notice.level.as_str(), line);
        }
        *last_printed = notice.id;
    }
    any
}

/// Run one shell line. Returns false when the shell should exit.
fn handle_line<S: KeyValueStore>(
    app: &mut App<S>,
    line: &str,
    prompt: &mut dyn Confirm,
    now: DateTime<Utc>,
) -> bool {
    let words = match split_words(line) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("Error: {}", e);
            return true;
        }
    };
    match words.first().map(String::as_str) {
        None => return true,
        Some("exit") | Some("quit") => return false,
        _ => {}
    }

    match ShellLine::try_parse_from(&words) {
        Ok(ShellLine {
            command: Commands::Init | Commands::Shell,
        }) => eprintln!("Not available inside the shell."),
        Ok(ShellLine { command }) => {
            if let Err(e) = dispatch(app, command, prompt, now) {
                eprintln!("Error: {:#}", e);
            }
        }
        Err(e) => {
            let _ = e.print();
        }
    }
    true
}

/// Split on whitespace, honoring single and double quotes.
fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        bail!("Unterminated quote");
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;
    use proptest::prelude::*;
    use ticketdesk::tickets::get_ticket;

    // ==================== Unit Tests ====================

    #[test]
    fn test_split_plain() {
        assert_eq!(split_words("status 3  Resolved").unwrap(), vec!["status", "3", "Resolved"]);
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_words(r#"status 3 "In Progress""#).unwrap(),
            vec!["status", "3", "In Progress"]
        );
        assert_eq!(
            split_words("comment 1 'it''s fine'").unwrap(),
            vec!["comment", "1", "its fine"]
        );
    }

    #[test]
    fn test_split_empty_quotes_kept() {
        assert_eq!(split_words(r#"assign 2 """#).unwrap(), vec!["assign", "2", ""]);
    }

    #[test]
    fn test_split_unterminated() {
        assert!(split_words(r#"comment 1 "oops"#).is_err());
    }

    #[test]
    fn test_exit_and_blank_lines() {
        let mut app = setup_test_app();
        assert!(!handle_line(&mut app, "exit", &mut no, t0()));
        assert!(!handle_line(&mut app, "  quit ", &mut no, t0()));
        assert!(handle_line(&mut app, "   ", &mut no, t0()));
    }

    #[test]
    fn test_command_runs_against_app() {
        let mut app = setup_as_user();
        assert!(handle_line(&mut app, r#"status 1 "In Progress""#, &mut no, t0()));
        assert_eq!(get_ticket(app.storage(), 1).unwrap().status, "In Progress");
    }

    #[test]
    fn test_login_inside_shell() {
        let mut app = setup_test_app();
        assert!(handle_line(
            &mut app,
            "login max@firma.de --password user123 --no-remember",
            &mut no,
            t0()
        ));
        assert!(app.auth().is_authenticated());
    }

    #[test]
    fn test_nested_shell_refused() {
        let mut app = setup_test_app();
        assert!(handle_line(&mut app, "shell", &mut no, t0()));
        assert!(handle_line(&mut app, "init", &mut no, t0()));
    }

    #[test]
    fn test_bad_command_keeps_shell_open() {
        let mut app = setup_test_app();
        assert!(handle_line(&mut app, "frobnicate", &mut no, t0()));
        assert!(handle_line(&mut app, "show not-a-number", &mut no, t0()));
    }

    #[test]
    fn test_delete_uses_prompt() {
        let mut app = setup_as_admin();
        assert!(handle_line(&mut app, "delete 2", &mut no, t0()));
        assert_eq!(app.storage().tickets().len(), 4);
        assert!(handle_line(&mut app, "delete 2", &mut yes, t0()));
        assert_eq!(app.storage().tickets().len(), 3);
    }

    #[test]
    fn test_print_notifications_only_new() {
        let mut app = setup_test_app();
        app.ui_mut().notifications.push("first", ticketdesk::ui::Level::Info);
        app.tick(t0() + chrono::Duration::seconds(3), &mut no);

        let mut last = 0;
        assert!(print_notifications(&app, &mut last));
        assert!(last > 0);
        assert!(!print_notifications(&app, &mut last));
    }

    // ==================== Property-Based Tests ====================

    proptest! {
        #[test]
        fn prop_split_plain_words(words in proptest::collection::vec("[a-zA-Z0-9@.#-]{1,12}", 0..8)) {
            let line = words.join(" ");
            prop_assert_eq!(split_words(&line).unwrap(), words);
        }

        #[test]
        fn prop_split_never_panics(line in "\\PC{0,60}") {
            let _ = split_words(&line);
        }
    }
}
