//! Fixed-size worker pool draining a shared queue
//!
//! N tokio tasks pull from one `flume` receiver until it is closed and empty.
//! The first handler error cancels every other worker and is returned to the
//! caller; panics in a worker are propagated.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A named pool of `workers` concurrent tasks
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    workers: usize,
}

impl WorkerPool {
    pub fn new(name: &str, workers: usize) -> Self {
        Self {
            name: name.to_string(),
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `handler` on every item until the channel is closed and empty and
    /// all workers have returned. Returns the number of items handled.
    ///
    /// An `Err` from the handler aborts the remaining workers; items still in
    /// the channel are left unprocessed.
    pub async fn drain<T, E, F, Fut>(&self, receiver: flume::Receiver<T>, handler: F) -> Result<usize, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut set = JoinSet::new();

        for worker in 0..self.workers {
            let rx = receiver.clone();
            let handler = handler.clone();
            let name = self.name.clone();

            set.spawn(async move {
                let mut handled = 0usize;
                while let Ok(item) = rx.recv_async().await {
                    handler(item).await?;
                    handled += 1;
                }
                debug!(pool = %name, worker, handled, "Worker finished");
                Ok::<usize, E>(handled)
            });
        }
        // workers hold the only receivers now
        drop(receiver);

        info!(pool = %self.name, workers = self.workers, "Worker pool started");

        let mut total = 0usize;
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(handled)) => total += handled,
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        warn!(pool = %self.name, "Worker failed, cancelling remaining workers");
                        set.abort_all();
                        first_error = Some(e);
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(pool = %self.name, handled = total, "Worker pool drained");
                Ok(total)
            }
        }
    }
}
