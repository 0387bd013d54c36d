pub mod error;
pub mod ids;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{error, info};

pub use error::{Error, Result};
pub use ids::{IdGenerator, IdSource};

/// SQLite-backed store. All access goes through one connection, so every
/// write transaction is serialized behind the mutex and opened with
/// `BEGIN IMMEDIATE`, which also stands in for row-level locks.
pub struct Database {
    conn: Mutex<Connection>,
    ids: Box<dyn IdSource>,
}

impl Database {
    pub fn open(path: &Path, ids: impl IdSource + 'static) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn, ids)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory(ids: impl IdSource + 'static) -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?, ids)
    }

    fn init(conn: Connection, ids: impl IdSource + 'static) -> anyhow::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: Box::new(ids),
        })
    }

    /// Allocate a fresh identifier from the configured id source.
    pub fn next_id(&self) -> u64 {
        self.ids.next_id()
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            error!("DB lock poisoned: {}", e);
            Error::Store
        })?;
        f(&conn)
    }

    /// Run `f` inside one write transaction. Any error returned by `f`
    /// drops the transaction, which rolls back every statement it ran.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| {
            error!("DB lock poisoned: {}", e);
            Error::Store
        })?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
