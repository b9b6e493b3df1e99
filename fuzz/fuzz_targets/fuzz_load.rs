#![no_main]

//! Fuzz target for the load path.
//!
//! Arbitrary strings are planted under the persisted keys before startup.
//! Loading must never panic, and whatever survives must be a well-formed
//! record set: valid statuses, valid priorities and a counter above every id.

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use ticketdesk::config::StorageConfig;
use ticketdesk::kv::{KeyValueStore, MemoryStore};
use ticketdesk::models::{validate_priority, validate_status};
use ticketdesk::storage::{keys, Storage};
use ticketdesk::ui::NotificationQueue;

#[derive(Arbitrary, Debug)]
struct LoadInput {
    tickets: Option<String>,
    users: Option<String>,
    settings: Option<String>,
    counter: Option<String>,
}

fuzz_target!(|input: LoadInput| {
    let mut store = MemoryStore::new();
    let planted = [
        (keys::TICKETS, &input.tickets),
        (keys::USERS, &input.users),
        (keys::SETTINGS, &input.settings),
        (keys::COUNTER, &input.counter),
    ];
    for (key, value) in planted {
        if let Some(value) = value {
            if store.set(key, value).is_err() {
                return;
            }
        }
    }

    let now = match Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single() {
        Some(t) => t,
        None => return,
    };
    let mut storage = Storage::new(store, StorageConfig::default());
    let mut notices = NotificationQueue::new(Default::default());
    if storage.initialize(&mut notices, now).is_err() {
        return;
    }

    for ticket in storage.tickets() {
        assert!(validate_status(&ticket.status), "bad status {:?}", ticket.status);
        assert!(validate_priority(&ticket.priority), "bad priority {:?}", ticket.priority);
        assert!(storage.ticket_counter() > ticket.id);
    }
    assert!(!storage.users().is_empty() || input.users.is_some());

    // Whatever was loaded must survive a save and a reload.
    if storage.save_tickets(&mut notices, now).is_ok() {
        let count = storage.tickets().len();
        let mut reloaded = Storage::new(storage.into_store(), StorageConfig::default());
        reloaded.load_tickets(&mut notices, now);
        assert_eq!(reloaded.tickets().len(), count);
    }
});
