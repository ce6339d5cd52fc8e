//! Busy indicator and single-flight refresh scheduling.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Reference-counted busy overlay: visible while any holder is active.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    count: Arc<AtomicUsize>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Saturates at zero.
    pub fn hide(&self) {
        let _ = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn is_visible(&self) -> bool {
        self.pending() > 0
    }

    pub fn pending(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Show the loader until the guard is dropped.
    pub fn guard(&self) -> LoaderGuard {
        self.show();
        LoaderGuard {
            loader: self.clone(),
        }
    }
}

pub struct LoaderGuard {
    loader: Loader,
}

impl Drop for LoaderGuard {
    fn drop(&mut self) {
        self.loader.hide();
    }
}

/// Runs one job at a time; bursts of triggers collapse into a single run,
/// and triggers that arrive mid-run produce exactly one follow-up.
pub struct RefreshQueue {
    tx: mpsc::UnboundedSender<()>,
    worker: JoinHandle<()>,
}

impl RefreshQueue {
    pub fn spawn<F, Fut>(debounce: Duration, loader: Loader, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let worker = tokio::spawn(async move {
            let mut pending = false;
            loop {
                if !pending && rx.recv().await.is_none() {
                    break;
                }

                let mut closed = false;
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    }
                }

                debug!("Refresh started");
                {
                    let _busy = loader.guard();
                    job().await;
                }
                debug!("Refresh finished");

                pending = false;
                while rx.try_recv().is_ok() {
                    pending = true;
                }
                if closed {
                    break;
                }
            }
        });

        Self { tx, worker }
    }

    /// Request a refresh. Returns false once the worker has stopped.
    pub fn trigger(&self) -> bool {
        self.tx.send(()).is_ok()
    }

    /// Close the queue and wait for the in-flight run to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("Refresh worker ended abnormally: {}", e);
        }
    }
}
