//! Ledger schema migrations
//!
//! Each unit is keyed by a timestamp-prefixed path, so sorting paths gives
//! chronological order. Applied units are tracked in the `migrations` table
//! with the same upsert/soft-delete discipline as the transformation ledger:
//! uninstalling a unit soft-deletes its row and installing it again
//! re-activates that row.

use std::collections::BTreeSet;

use sqlx::SqlitePool;
use tracing::{debug, info};

use super::sqlite_helpers::now_iso8601;
use crate::error::LedgerError;

/// A schema change unit. Both directions must be safe to re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub path: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

const CREATE_TRANSFORMATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transformations (
    from_name TEXT NOT NULL,
    to_name TEXT NOT NULL,
    inserted TEXT NOT NULL,
    deleted TEXT,
    PRIMARY KEY (from_name, to_name),
    CHECK (from_name <> to_name)
);
CREATE INDEX IF NOT EXISTS idx_transformations_active ON transformations(deleted);
"#;

const CREATE_MOVIE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS movie_records (
    from_name TEXT NOT NULL,
    to_name TEXT NOT NULL,
    title TEXT NOT NULL,
    year INTEGER NOT NULL,
    PRIMARY KEY (from_name, to_name),
    FOREIGN KEY (from_name, to_name) REFERENCES transformations(from_name, to_name)
);
"#;

const CREATE_EPISODE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS episode_records (
    from_name TEXT NOT NULL,
    to_name TEXT NOT NULL,
    series TEXT NOT NULL,
    season INTEGER NOT NULL,
    episode INTEGER NOT NULL,
    title TEXT NOT NULL,
    date_aired TEXT,
    PRIMARY KEY (from_name, to_name),
    FOREIGN KEY (from_name, to_name) REFERENCES transformations(from_name, to_name)
);
"#;

/// Built-in units, in any order; they are sorted by path before use
pub const LEDGER_MIGRATIONS: &[Migration] = &[
    Migration {
        path: "20240611093000_create_transformations",
        up: CREATE_TRANSFORMATIONS,
        down: "DROP INDEX IF EXISTS idx_transformations_active; DROP TABLE IF EXISTS transformations;",
    },
    Migration {
        path: "20240611093100_create_movie_records",
        up: CREATE_MOVIE_RECORDS,
        down: "DROP TABLE IF EXISTS movie_records;",
    },
    Migration {
        path: "20240611093200_create_episode_records",
        up: CREATE_EPISODE_RECORDS,
        down: "DROP TABLE IF EXISTS episode_records;",
    },
];

pub struct MigrationLedger {
    pool: SqlitePool,
    units: Vec<Migration>,
}

impl MigrationLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_units(pool, LEDGER_MIGRATIONS.to_vec())
    }

    pub fn with_units(pool: SqlitePool, mut units: Vec<Migration>) -> Self {
        units.sort_by(|a, b| a.path.cmp(b.path));
        Self { pool, units }
    }

    async fn ensure_table(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                path TEXT PRIMARY KEY NOT NULL,
                inserted TEXT NOT NULL,
                deleted TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Active unit paths in ascending order
    pub async fn installed(&self) -> Result<Vec<String>, LedgerError> {
        self.ensure_table().await?;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM migrations WHERE deleted IS NULL ORDER BY path ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(path,)| path).collect())
    }

    pub async fn exists(&self, path: &str) -> Result<bool, LedgerError> {
        Ok(self.installed().await?.iter().any(|p| p == path))
    }

    /// Apply every unit that is not active yet, in ascending path order.
    /// Returns the paths that were applied.
    pub async fn install(&self) -> Result<Vec<String>, LedgerError> {
        let active: BTreeSet<String> = self.installed().await?.into_iter().collect();
        let mut applied = Vec::new();

        for unit in self.units.iter().filter(|u| !active.contains(u.path)) {
            debug!(path = unit.path, "Installing migration");

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(unit.up)
                .execute(&mut *tx)
                .await
                .map_err(|source| LedgerError::Migration {
                    path: unit.path.to_string(),
                    source,
                })?;
            sqlx::query(
                r#"
                INSERT INTO migrations (path, inserted, deleted)
                VALUES (?, ?, NULL)
                ON CONFLICT(path) DO UPDATE SET
                    inserted = excluded.inserted,
                    deleted = NULL
                WHERE migrations.deleted IS NOT NULL
                "#,
            )
            .bind(unit.path)
            .bind(now_iso8601())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            applied.push(unit.path.to_string());
        }

        if !applied.is_empty() {
            info!(count = applied.len(), "Ledger migrations installed");
        }
        Ok(applied)
    }

    /// Revert every active unit in descending path order.
    /// Returns the paths that were reverted.
    pub async fn uninstall(&self) -> Result<Vec<String>, LedgerError> {
        let active: BTreeSet<String> = self.installed().await?.into_iter().collect();
        let mut reverted = Vec::new();

        for unit in self.units.iter().rev().filter(|u| active.contains(u.path)) {
            debug!(path = unit.path, "Uninstalling migration");

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(unit.down)
                .execute(&mut *tx)
                .await
                .map_err(|source| LedgerError::Migration {
                    path: unit.path.to_string(),
                    source,
                })?;
            sqlx::query("UPDATE migrations SET deleted = ? WHERE path = ? AND deleted IS NULL")
                .bind(now_iso8601())
                .bind(unit.path)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            reverted.push(unit.path.to_string());
        }

        if !reverted.is_empty() {
            info!(count = reverted.len(), "Ledger migrations uninstalled");
        }
        Ok(reverted)
    }
}
