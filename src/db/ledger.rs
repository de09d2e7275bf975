//! Transformation ledger
//!
//! Durable record of every `from_name -> to_name` transformation the pipeline
//! performed. Rows are never hard-deleted: `soft_delete` stamps `deleted`, and
//! a later `upsert` of the same pair re-activates the row. That makes re-runs
//! over the same payload idempotent.
//!
//! Movie and episode satellites hang off the same key and only exist while
//! the base row is active.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::sqlite_helpers::{date_to_str, now_iso8601, str_to_date_opt, str_to_datetime, str_to_datetime_opt};
use crate::error::LedgerError;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRecord {
    pub from_name: String,
    pub to_name: String,
    pub inserted: DateTime<Utc>,
    pub deleted: Option<DateTime<Utc>>,
}

impl TransformationRecord {
    pub fn is_active(&self) -> bool {
        self.deleted.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub title: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub series: String,
    pub season: u32,
    pub episode: u32,
    pub title: String,
    pub date_aired: Option<NaiveDate>,
}

/// Kind-specific attributes stored next to the base row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    Movie(MovieRecord),
    Episode(EpisodeRecord),
}

type TransformationRow = (String, String, String, Option<String>);

fn row_to_record(row: TransformationRow) -> Result<TransformationRecord, LedgerError> {
    let (from_name, to_name, inserted, deleted) = row;
    Ok(TransformationRecord {
        from_name,
        to_name,
        inserted: str_to_datetime(&inserted)?,
        deleted: str_to_datetime_opt(deleted.as_deref())?,
    })
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a transformation, re-activating a soft-deleted row if present.
    /// An already active row is left untouched.
    pub async fn upsert(&self, from_name: &str, to_name: &str) -> Result<(), LedgerError> {
        self.upsert_record(from_name, to_name, None).await
    }

    pub async fn upsert_movie(
        &self,
        from_name: &str,
        to_name: &str,
        movie: &MovieRecord,
    ) -> Result<(), LedgerError> {
        self.upsert_record(from_name, to_name, Some(&LedgerRecord::Movie(movie.clone())))
            .await
    }

    pub async fn upsert_episode(
        &self,
        from_name: &str,
        to_name: &str,
        episode: &EpisodeRecord,
    ) -> Result<(), LedgerError> {
        self.upsert_record(from_name, to_name, Some(&LedgerRecord::Episode(episode.clone())))
            .await
    }

    /// Base row plus optional satellite, in one transaction
    pub async fn upsert_record(
        &self,
        from_name: &str,
        to_name: &str,
        record: Option<&LedgerRecord>,
    ) -> Result<(), LedgerError> {
        if from_name == to_name {
            return Err(LedgerError::SameName(from_name.to_string()));
        }

        let mut tx = self.pool.begin().await?;
        upsert_base(&mut *tx, from_name, to_name).await?;
        match record {
            Some(LedgerRecord::Movie(movie)) => {
                upsert_movie_satellite(&mut *tx, from_name, to_name, movie).await?
            }
            Some(LedgerRecord::Episode(episode)) => {
                upsert_episode_satellite(&mut *tx, from_name, to_name, episode).await?
            }
            None => {}
        }
        tx.commit().await?;

        debug!(from = %from_name, to = %to_name, "Ledger entry recorded");
        Ok(())
    }

    /// Mark an active row deleted and drop its satellites.
    /// Returns false when there was no active row.
    pub async fn soft_delete(&self, from_name: &str, to_name: &str) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE transformations SET deleted = ? WHERE from_name = ? AND to_name = ? AND deleted IS NULL",
        )
        .bind(now_iso8601())
        .bind(from_name)
        .bind(to_name)
        .execute(&mut *tx)
        .await?;

        for table in ["movie_records", "episode_records"] {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE from_name = ? AND to_name = ?",
                table
            ))
            .bind(from_name)
            .bind(to_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        debug!(from = %from_name, to = %to_name, deleted = deleted, "Ledger entry soft-deleted");
        Ok(deleted)
    }

    /// True only for an active row
    pub async fn exists(&self, from_name: &str, to_name: &str) -> Result<bool, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM transformations WHERE from_name = ? AND to_name = ? AND deleted IS NULL",
        )
        .bind(from_name)
        .bind(to_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// The row for a pair, active or not
    pub async fn get(
        &self,
        from_name: &str,
        to_name: &str,
    ) -> Result<Option<TransformationRecord>, LedgerError> {
        let row: Option<TransformationRow> = sqlx::query_as(
            "SELECT from_name, to_name, inserted, deleted FROM transformations WHERE from_name = ? AND to_name = ?",
        )
        .bind(from_name)
        .bind(to_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_record).transpose()
    }

    pub async fn list_active(&self) -> Result<Vec<TransformationRecord>, LedgerError> {
        let rows: Vec<TransformationRow> = sqlx::query_as(
            r#"
            SELECT from_name, to_name, inserted, deleted
            FROM transformations
            WHERE deleted IS NULL
            ORDER BY inserted ASC, from_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub async fn movie(
        &self,
        from_name: &str,
        to_name: &str,
    ) -> Result<Option<MovieRecord>, LedgerError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT title, year FROM movie_records WHERE from_name = ? AND to_name = ?")
                .bind(from_name)
                .bind(to_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(title, year)| MovieRecord {
            title,
            year: year as i32,
        }))
    }

    pub async fn episode(
        &self,
        from_name: &str,
        to_name: &str,
    ) -> Result<Option<EpisodeRecord>, LedgerError> {
        let row: Option<(String, i64, i64, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT series, season, episode, title, date_aired
            FROM episode_records
            WHERE from_name = ? AND to_name = ?
            "#,
        )
        .bind(from_name)
        .bind(to_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(series, season, episode, title, date_aired)| {
            Ok(EpisodeRecord {
                series,
                season: season as u32,
                episode: episode as u32,
                title,
                date_aired: str_to_date_opt(date_aired.as_deref())?,
            })
        })
        .transpose()
    }
}

async fn upsert_base(
    conn: &mut SqliteConnection,
    from_name: &str,
    to_name: &str,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO transformations (from_name, to_name, inserted, deleted)
        VALUES (?, ?, ?, NULL)
        ON CONFLICT(from_name, to_name) DO UPDATE SET
            inserted = excluded.inserted,
            deleted = NULL
        WHERE transformations.deleted IS NOT NULL
        "#,
    )
    .bind(from_name)
    .bind(to_name)
    .bind(now_iso8601())
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_movie_satellite(
    conn: &mut SqliteConnection,
    from_name: &str,
    to_name: &str,
    movie: &MovieRecord,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO movie_records (from_name, to_name, title, year)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(from_name, to_name) DO UPDATE SET
            title = excluded.title,
            year = excluded.year
        "#,
    )
    .bind(from_name)
    .bind(to_name)
    .bind(&movie.title)
    .bind(movie.year)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_episode_satellite(
    conn: &mut SqliteConnection,
    from_name: &str,
    to_name: &str,
    episode: &EpisodeRecord,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO episode_records (from_name, to_name, series, season, episode, title, date_aired)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(from_name, to_name) DO UPDATE SET
            series = excluded.series,
            season = excluded.season,
            episode = excluded.episode,
            title = excluded.title,
            date_aired = excluded.date_aired
        "#,
    )
    .bind(from_name)
    .bind(to_name)
    .bind(&episode.series)
    .bind(episode.season as i64)
    .bind(episode.episode as i64)
    .bind(&episode.title)
    .bind(episode.date_aired.map(date_to_str))
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    async fn ledger() -> Ledger {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrations().install().await.unwrap();
        db.ledger()
    }

    fn equalizer() -> MovieRecord {
        MovieRecord {
            title: "The Equalizer 2".to_string(),
            year: 2018,
        }
    }

    #[tokio::test]
    async fn test_upsert_soft_delete_upsert() {
        let ledger = ledger().await;

        ledger.upsert("a", "b").await.unwrap();
        assert!(ledger.exists("a", "b").await.unwrap());

        assert!(ledger.soft_delete("a", "b").await.unwrap());
        assert!(!ledger.exists("a", "b").await.unwrap());
        let history = ledger.get("a", "b").await.unwrap().unwrap();
        assert!(!history.is_active());

        ledger.upsert("a", "b").await.unwrap();
        assert!(ledger.exists("a", "b").await.unwrap());
        let record = ledger.get("a", "b").await.unwrap().unwrap();
        assert!(record.is_active());
        assert!(record.inserted >= history.inserted);
    }

    #[tokio::test]
    async fn test_upsert_active_row_is_unchanged() {
        let ledger = ledger().await;
        ledger.upsert("a", "b").await.unwrap();
        let first = ledger.get("a", "b").await.unwrap().unwrap();

        ledger.upsert("a", "b").await.unwrap();
        let second = ledger.get("a", "b").await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_name_rejected() {
        let ledger = ledger().await;
        let err = ledger.upsert("a", "a").await.unwrap_err();
        assert_matches!(err, LedgerError::SameName(name) if name == "a");
    }

    #[tokio::test]
    async fn test_soft_delete_missing_row() {
        let ledger = ledger().await;
        assert!(!ledger.soft_delete("x", "y").await.unwrap());
        assert!(ledger.get("x", "y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_movie_satellite_lifecycle() {
        let ledger = ledger().await;
        ledger.upsert_movie("in.mkv", "out.mp4", &equalizer()).await.unwrap();
        assert_eq!(ledger.movie("in.mkv", "out.mp4").await.unwrap(), Some(equalizer()));

        ledger.soft_delete("in.mkv", "out.mp4").await.unwrap();
        assert_eq!(ledger.movie("in.mkv", "out.mp4").await.unwrap(), None);

        ledger.upsert_movie("in.mkv", "out.mp4", &equalizer()).await.unwrap();
        assert_eq!(ledger.movie("in.mkv", "out.mp4").await.unwrap(), Some(equalizer()));
    }

    #[tokio::test]
    async fn test_episode_satellite() {
        let ledger = ledger().await;
        let episode = EpisodeRecord {
            series: "The Daily Show".to_string(),
            season: 31,
            episode: 2,
            title: "Stephen J. Dubner".to_string(),
            date_aired: NaiveDate::from_ymd_opt(2026, 1, 7),
        };
        ledger.upsert_episode("in.mkv", "out.mp4", &episode).await.unwrap();
        assert_eq!(ledger.episode("in.mkv", "out.mp4").await.unwrap(), Some(episode));
    }

    #[tokio::test]
    async fn test_list_active_excludes_deleted() {
        let ledger = ledger().await;
        ledger.upsert("a", "b").await.unwrap();
        ledger.upsert("c", "d").await.unwrap();
        ledger.soft_delete("a", "b").await.unwrap();

        let active = ledger.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].from_name, "c");
    }

    #[tokio::test]
    async fn test_missing_schema_is_a_storage_error() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let err = db.ledger().upsert("a", "b").await.unwrap_err();
        assert_matches!(err, LedgerError::Database(_));
    }
}
