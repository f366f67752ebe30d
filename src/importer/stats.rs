use crate::error::IndexError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Running totals of an indexing run, fed by scheduler callbacks.
#[derive(Debug, Default)]
pub struct ImportProgress {
    indexed: AtomicUsize,
    deleted: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub indexed: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ImportProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_progress(&self, indexed: usize, deleted: usize) {
        self.indexed.fetch_add(indexed, Ordering::Relaxed);
        self.deleted.fetch_add(deleted, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            indexed: self.indexed.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.indexed.store(0, Ordering::Relaxed);
        self.deleted.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    /// Callback suitable for `Importer::on_progress`.
    pub fn progress_callback(self: &Arc<Self>) -> impl Fn(usize, usize) + Send + Sync + 'static {
        let progress = Arc::clone(self);
        move |indexed, deleted| progress.record_progress(indexed, deleted)
    }

    /// Callback suitable for `Importer::on_failure`; logs and counts.
    pub fn failure_callback(
        self: &Arc<Self>,
        index: &str,
    ) -> impl Fn(&IndexError) + Send + Sync + 'static {
        let progress = Arc::clone(self);
        let index = index.to_string();
        move |err| {
            progress.record_failure();
            log::error!("{}: work unit failed: {}", index, err);
        }
    }
}
