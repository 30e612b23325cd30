//! Database module for scheduling data storage.
//!
//! This module provides SQLite-based persistent storage for:
//! - Tuner cards, channels, channel groups and tuning details
//! - The program guide and per-program recording status
//! - Schedules, canceled occurrences and schedule rules
//! - The conflict set, existing recordings and known series

mod card;
mod channel;
mod conflict;
mod program;
mod recording;
mod rule;
mod schedule;
mod schema;

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;

use tunersched_protocol::{ProtocolError, ProviderError};

/// Shared handle used by the evaluator and the provider adapter.
pub type DatabaseHandle = Arc<tokio::sync::Mutex<Database>>;

/// Database error types.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    Invalid(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

impl From<DatabaseError> for ProviderError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Invalid(p) => ProviderError::Invalid(p),
            other => ProviderError::Backend(other.to_string()),
        }
    }
}

/// Wrap a model decoding error so it can be returned from a row mapper.
pub(crate) fn conversion_error(column: usize, e: ProtocolError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Integer, Box::new(e))
}

/// Main database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.initialize_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.initialize_schema()?;

        Ok(db)
    }

    /// Wrap into the shared async handle.
    pub fn into_handle(self) -> DatabaseHandle {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(schema::SCHEMA_SQL)?;
        self.apply_migrations()?;
        Ok(())
    }

    /// Add a column to a table if it doesn't exist.
    fn add_column_if_not_exists(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let column_exists = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .any(|name| name == column);

        if !column_exists {
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_type);
            self.conn.execute(&sql, [])?;
            log::info!("Migration: Added column {} to table {}", column, table);
        }

        Ok(())
    }

    fn apply_migrations(&self) -> Result<()> {
        // Migration 001: per-program recording status flags
        self.add_column_if_not_exists("programs", "recording_status", "INTEGER DEFAULT 0")?;

        // Migration 002: track when a schedule was last modified by the evaluator
        self.add_column_if_not_exists("schedules", "updated_at", "INTEGER")?;

        Ok(())
    }

    /// Get the underlying connection (for advanced queries).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
