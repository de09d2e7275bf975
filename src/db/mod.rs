//! Database connection and repositories
//!
//! The ledger lives in SQLite and is used as a single serial session, so the
//! pool is capped at one connection.

pub mod ledger;
pub mod migrations;
pub mod sqlite_helpers;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

pub use ledger::{EpisodeRecord, Ledger, LedgerRecord, MovieRecord, TransformationRecord};
pub use migrations::{Migration, MigrationLedger};

use crate::error::LedgerError;

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the SQLite database at `url`.
    ///
    /// `sqlite::memory:` works too; the single connection is kept alive for
    /// the life of the pool so the in-memory database is not lost.
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        if let Some(parent) = options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        info!(url = %url, "Connected to ledger database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.pool.clone())
    }

    pub fn migrations(&self) -> MigrationLedger {
        MigrationLedger::new(self.pool.clone())
    }

    /// Bring the schema up to date
    pub async fn migrate(&self) -> Result<Vec<String>, LedgerError> {
        self.migrations().install().await
    }
}
