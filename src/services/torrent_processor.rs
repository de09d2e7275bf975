//! Completed-torrent processing
//!
//! Single entry point for filing a finished download into the library:
//! - Enumerate every file below the download path (depth-first, by name)
//! - Classify each file and file it through its resource variant
//! - Record `(original, final)` pairs in the ledger
//! - Copy anything that fails into the failed location
//!
//! Enumeration and draining overlap: the walk runs on a blocking thread and
//! feeds a channel that a fixed worker pool drains.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::db::Ledger;
use crate::error::ProcessError;
use crate::media::organizer::copy_unique;
use crate::media::{ProcessOutcome, Resource, ResourceContext, TargetClaims};
use crate::services::classifier::ResourceClassifier;
use crate::services::job_queue::WorkerPool;

/// Run phases, logged at each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    Enumerating,
    Draining,
    Done,
}

/// Per-run totals; `created + skipped + failed` equals the files enumerated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.created + self.skipped + self.failed
    }
}

#[derive(Default)]
struct RunCounters {
    created: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl RunCounters {
    fn summary(&self) -> RunSummary {
        RunSummary {
            created: self.created.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Created,
    Skipped,
    Failed,
}

/// Files every file of a completed download into the library
#[derive(Clone)]
pub struct TorrentOrchestrator {
    ctx: ResourceContext,
    classifier: Arc<ResourceClassifier>,
    ledger: Ledger,
}

impl TorrentOrchestrator {
    pub fn new(ctx: ResourceContext, classifier: Arc<ResourceClassifier>, ledger: Ledger) -> Self {
        Self {
            ctx,
            classifier,
            ledger,
        }
    }

    /// Process every file below `path`.
    ///
    /// Per-file failures are counted and never fail the run. A storage or
    /// normalization error cancels the remaining workers and is returned.
    pub async fn process(&self, id: &str, name: &str, path: &Path) -> Result<RunSummary, ProcessError> {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, torrent_id = %id, torrent_name = %name, path = %path.display(), state = ?RunState::Start, "Processing torrent");

        tokio::fs::metadata(path)
            .await
            .map_err(|e| ProcessError::io(path, e))?;

        let (tx, rx) = flume::unbounded::<PathBuf>();
        let root = path.to_path_buf();

        info!(run_id = %run_id, state = ?RunState::Enumerating, "Enumerating files");
        let enumerator = tokio::task::spawn_blocking(move || enumerate(&root, tx));

        info!(run_id = %run_id, state = ?RunState::Draining, "Draining files");
        let counters = Arc::new(RunCounters::default());
        let pool = WorkerPool::new("torrent-files", self.ctx.config.concurrency);
        let mut worker = self.clone();
        worker.ctx.claims = TargetClaims::default();
        let worker_counters = counters.clone();

        let drained = pool
            .drain(rx, move |file: PathBuf| {
                let worker = worker.clone();
                let counters = worker_counters.clone();
                async move {
                    match worker.handle_file(&file).await? {
                        FileOutcome::Created => counters.created.fetch_add(1, Ordering::SeqCst),
                        FileOutcome::Skipped => counters.skipped.fetch_add(1, Ordering::SeqCst),
                        FileOutcome::Failed => counters.failed.fetch_add(1, Ordering::SeqCst),
                    };
                    Ok::<(), ProcessError>(())
                }
            })
            .await;

        // the walk stops on its own once the receivers are gone
        let enumerated = match enumerator.await {
            Ok(count) => count,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Enumeration task failed");
                0
            }
        };

        if let Err(e) = drained {
            error!(run_id = %run_id, torrent_id = %id, error = %e, "Run aborted");
            return Err(e);
        }

        let summary = counters.summary();
        info!(
            run_id = %run_id,
            torrent_id = %id,
            torrent_name = %name,
            state = ?RunState::Done,
            enumerated,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            "Torrent processed"
        );
        Ok(summary)
    }

    /// Classify, file and record one file. Only fatal errors escape.
    async fn handle_file(&self, file: &Path) -> Result<FileOutcome, ProcessError> {
        let result = match self.classifier.classify(file) {
            Ok(resource) => self.file_resource(&resource).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                info!(path = %file.display(), target = %outcome.final_path.display(), "created");
                Ok(FileOutcome::Created)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) if e.is_skip() => {
                info!(path = %file.display(), reason = %e, "skipped");
                Ok(FileOutcome::Skipped)
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "failed");
                self.copy_to_failed(file).await;
                Ok(FileOutcome::Failed)
            }
        }
    }

    async fn file_resource(&self, resource: &Resource) -> Result<ProcessOutcome, ProcessError> {
        let outcome = resource.process(&self.ctx).await?;

        let from = resource.source_path.to_string_lossy();
        let to = outcome.final_path.to_string_lossy();
        let tracked = resource.kind.is_typed() || self.ctx.config.track_untyped;

        if tracked && from != to {
            self.ledger
                .upsert_record(&from, &to, outcome.record.as_ref())
                .await?;
        } else {
            debug!(path = %from, kind = %resource.kind, "No ledger entry for resource");
        }

        Ok(outcome)
    }

    /// Copy the original, unmodified, into the failed location.
    /// A name already present there gets a numbered copy instead.
    async fn copy_to_failed(&self, file: &Path) {
        let failed = &self.ctx.config.failed_path;
        match copy_unique(file, failed).await {
            Ok(target) => debug!(path = %file.display(), target = %target.display(), "Copied to failed location"),
            Err(e) => {
                error!(path = %file.display(), failed = %failed.display(), error = %e, "Could not copy file to failed location")
            }
        }
    }
}

/// Depth-first walk sorted by file name, sending every regular file.
/// Returns how many files were sent.
fn enumerate(root: &Path, tx: flume::Sender<PathBuf>) -> usize {
    let mut sent = 0usize;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if tx.send(entry.into_path()).is_err() {
            debug!(root = %root.display(), "Receivers gone, stopping enumeration");
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_is_depth_first_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b").join("inner")).unwrap();
        std::fs::write(dir.path().join("c.txt"), b"").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::write(dir.path().join("b").join("z.txt"), b"").unwrap();
        std::fs::write(dir.path().join("b").join("inner").join("y.txt"), b"").unwrap();

        let (tx, rx) = flume::unbounded();
        let sent = enumerate(dir.path(), tx);
        let names: Vec<PathBuf> = rx
            .drain()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(sent, 4);
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b/inner/y.txt"),
                PathBuf::from("b/z.txt"),
                PathBuf::from("c.txt"),
            ]
        );
    }

    #[test]
    fn test_enumerate_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mkv");
        std::fs::write(&file, b"").unwrap();

        let (tx, rx) = flume::unbounded();
        assert_eq!(enumerate(&file, tx), 1);
        assert_eq!(rx.recv().unwrap(), file);
    }

    #[test]
    fn test_enumerate_stops_when_receiver_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();

        let (tx, rx) = flume::unbounded::<PathBuf>();
        drop(rx);
        assert_eq!(enumerate(dir.path(), tx), 0);
    }

    #[test]
    fn test_summary_total() {
        let summary = RunSummary {
            created: 2,
            skipped: 3,
            failed: 1,
        };
        assert_eq!(summary.total(), 6);
    }
}
