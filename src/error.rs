//! Error taxonomy for the ingest pipeline
//!
//! Per-file errors are caught at the orchestrator boundary and turned into a
//! skip (classification) or a copy into the failed location (everything else).
//! Storage and normalization errors are fatal for the whole run.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Which lookup strategy failed to find an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeLookup {
    ByDate,
    ByNumber,
    ByTitle,
}

impl std::fmt::Display for EpisodeLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EpisodeLookup::ByDate => "by air date",
            EpisodeLookup::ByNumber => "by season/episode number",
            EpisodeLookup::ByTitle => "by episode title",
        };
        f.write_str(s)
    }
}

/// Failures while resolving a parsed name against the metadata services
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no movie found for '{title}'")]
    MovieNotFound { title: String },

    #[error("movie '{title}' has no release year")]
    MissingYear { title: String },

    #[error("no series found for '{title}'")]
    SeriesNotFound { title: String },

    #[error("no episode of '{series}' found {lookup}")]
    EpisodeNotFound { series: String, lookup: EpisodeLookup },

    #[error("metadata service request failed: {0:#}")]
    Service(anyhow::Error),
}

/// Failures reported by the transcoder collaborator
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("conversion of '{path}' failed: {message}")]
    Convert { path: PathBuf, message: String },

    #[error("probe of '{path}' failed: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Ledger storage failures
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("refusing to record '{0}' as a transformation onto itself")]
    SameName(String),

    #[error("migration '{path}' failed: {source}")]
    Migration {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid timestamp '{0}' in ledger")]
    Timestamp(String),
}

/// Raised when the normalization rule set never reaches a fixed point
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("normalization of '{input}' did not settle after {passes} passes (last value '{last}')")]
    Diverged {
        input: String,
        last: String,
        passes: usize,
    },
}

/// Everything that can end a single file's trip through the pipeline
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("no resource variant matches '{}'", .0.display())]
    ClassificationNotFound(PathBuf),

    #[error("could not extract {what} from '{name}'")]
    Matching { name: String, what: &'static str },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("duration {actual:.1}s of '{}' is below the minimum of {minimum}s", path.display())]
    DurationTooShort {
        path: PathBuf,
        actual: f64,
        minimum: u64,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' resolves to '{}', already filed from '{}'", path.display(), target.display(), claimed_by.display())]
    DuplicateTarget {
        path: PathBuf,
        target: PathBuf,
        claimed_by: PathBuf,
    },

    #[error("archive extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error("tag read failed: {0:#}")]
    Tags(anyhow::Error),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Storage(#[from] LedgerError),
}

impl ProcessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProcessError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn matching(name: impl Into<String>, what: &'static str) -> Self {
        ProcessError::Matching {
            name: name.into(),
            what,
        }
    }

    /// Errors that invalidate the run for every file, not just the current one
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProcessError::Storage(_) | ProcessError::Normalize(_))
    }

    /// Skips are not failures: the file is left where it is
    pub fn is_skip(&self) -> bool {
        matches!(self, ProcessError::ClassificationNotFound(_))
    }
}

/// Convenience for parsing air dates out of service payloads
pub(crate) fn parse_air_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let skip = ProcessError::ClassificationNotFound(PathBuf::from("a.xyz"));
        assert!(skip.is_skip());
        assert!(!skip.is_fatal());

        let storage = ProcessError::Storage(LedgerError::SameName("a".into()));
        assert!(storage.is_fatal());

        let duration = ProcessError::DurationTooShort {
            path: PathBuf::from("sample.mkv"),
            actual: 12.0,
            minimum: 300,
        };
        assert!(!duration.is_fatal());
        assert!(!duration.is_skip());
    }

    #[test]
    fn test_parse_air_date() {
        assert_eq!(parse_air_date("2026-01-07"), NaiveDate::from_ymd_opt(2026, 1, 7));
        assert_eq!(parse_air_date("not a date"), None);
    }
}
