#![no_main]

//! Fuzz target for importing exported data.
//!
//! Import must never panic, and whether it succeeds or fails halfway the
//! ticket counter must stay above every ticket id.

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use ticketdesk::config::StorageConfig;
use ticketdesk::kv::MemoryStore;
use ticketdesk::storage::Storage;
use ticketdesk::ui::NotificationQueue;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Some(now) = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single() else {
        return;
    };

    let mut storage = Storage::new(MemoryStore::new(), StorageConfig::default());
    let mut notices = NotificationQueue::new(Default::default());
    if storage.initialize(&mut notices, now).is_err() {
        return;
    }

    let _ = storage.import_all(json, &mut notices, now);
    let highest = storage.highest_ticket_id();
    assert!(storage.ticket_counter() > highest);
    assert!(storage.users().len() == 3, "users must never be imported");
});
