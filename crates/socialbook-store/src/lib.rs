//! # socialbook-store
//!
//! Durable storage for SocialBook, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed operations for every
//! collection: users, posts, direct messages, groups, stories,
//! notifications and friend requests. Records with a built-in expiry are
//! filtered on read and physically removed by the `purge_*` / `prune_*`
//! helpers that the server's retention task drives.

pub mod conversations;
pub mod database;
pub mod friends;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod stories;
pub mod users;

mod error;
mod sql;

pub use conversations::materialize_conversations;
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
