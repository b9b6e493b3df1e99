//! Local-first support ticket tracker.
//!
//! The library holds the whole application: a key-value persistence layer
//! ([`kv`], [`db`], [`storage`]), the session state machine ([`auth`]), UI
//! state and notifications ([`ui`]), ticket operations ([`tickets`]) and the
//! composition root ([`app`]) that wires them to a [`scheduler`]. The
//! `ticketdesk` binary is a command-line front end over [`app::App`].

pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod kv;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod tickets;
pub mod ui;
