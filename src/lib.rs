//! Storage layer for a places and lists social application.
//!
//! [`db`] holds the schema, the typed error taxonomy and one repository
//! module per entity. Every repository function takes a plain
//! `&rusqlite::Connection`, so calls compose inside a caller's
//! transaction; [`db::Database`] supplies pooled connections.

pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod slug;
