//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite store (users, chats, punishments, reports, filters, spam)

mod database;
mod models;

pub use database::{Database, now_ts};
pub use models::*;
