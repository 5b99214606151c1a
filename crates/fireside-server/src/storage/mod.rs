//! `SQLite` storage for the Fireside gateway.
//!
//! Only the `server_config` key-value store lives here; it backs tunnel
//! credentials, the cached public URL, and server-wide settings.

mod db;
mod models;
mod queries;

pub use db::{Database, DatabaseError};
pub use models::{TunnelCredentials, keys};
