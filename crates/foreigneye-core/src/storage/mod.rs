//! SQLite store of record
//!
//! ```ignore
//! let db = Database::new(DatabaseConfig::from_settings(&config.database)).await?;
//! let writer = LedgerWriter::new(db.pool().clone(), graph);
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
