//! Fireside Gateway Library
//!
//! Core functionality for the Fireside gateway:
//! - `SQLite` config store for tunnel credentials and server settings
//! - Tunnel providers (quick, named, disabled) and their orchestrator
//! - HTTP admin surface with loopback guard and pause switch

pub mod server;
pub mod storage;
pub mod tunnel;
