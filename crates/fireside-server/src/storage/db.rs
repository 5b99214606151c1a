//! Database connection and initialization.

pub use fireside_core::db::DatabaseError;

fireside_core::define_database!(Database, "Database migrations complete");
