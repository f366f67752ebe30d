use super::builder::{BulkBatch, BulkBuilder};
use super::cursor::BatchCursor;
use super::definition::IndexDefinition;
use super::scheduler::{Scheduler, WorkerPool};
use crate::config::{IndexerConfig, prefixed_index_name};
use crate::error::IndexError;
use crate::search::{DocumentSink, ScrollBatches};
use crate::source::{RecordKey, RecordSource};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Lifecycle of an importer's `import` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Per-importer settings, usually derived from [`IndexerConfig`].
#[derive(Debug, Clone)]
pub struct ImporterOptions {
    pub batch_size: usize,
    pub index_prefix: Option<String>,
    /// `index.refresh_interval` applied by `optimize_for_import`.
    pub import_refresh_interval: String,
}

impl ImporterOptions {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            index_prefix: config.sink.prefix.clone(),
            import_refresh_interval: config.refresh_interval.clone(),
        }
    }
}

impl Default for ImporterOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            index_prefix: None,
            import_refresh_interval: "-1".to_string(),
        }
    }
}

/// Holds an importer in `Running`; dropped before `finish`, it leaves `Failed`.
struct RunGuard<'a> {
    state: &'a Mutex<ImportState>,
}

impl RunGuard<'_> {
    fn finish(self, state: ImportState) {
        *self.state.lock() = state;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if *state == ImportState::Running {
            *state = ImportState::Failed;
        }
    }
}

/// Streams one index definition from its record source into the sink.
pub struct Importer<D, S, K>
where
    D: IndexDefinition,
    S: RecordSource<D>,
    K: DocumentSink,
{
    definition: Arc<D>,
    source: Arc<S>,
    sink: Arc<K>,
    scheduler: Scheduler,
    index_name: Arc<str>,
    options: ImporterOptions,
    state: Mutex<ImportState>,
    saved_refresh_interval: Mutex<Option<String>>,
}

impl<D, S, K> Importer<D, S, K>
where
    D: IndexDefinition,
    S: RecordSource<D>,
    K: DocumentSink,
{
    pub fn new(
        definition: D,
        source: Arc<S>,
        sink: Arc<K>,
        pool: Arc<WorkerPool>,
        options: ImporterOptions,
    ) -> Self {
        let index_name = prefixed_index_name(options.index_prefix.as_deref(), D::INDEX);
        Self {
            definition: Arc::new(definition),
            source,
            sink,
            scheduler: Scheduler::new(pool),
            index_name: Arc::from(index_name),
            options,
            state: Mutex::new(ImportState::Idle),
            saved_refresh_interval: Mutex::new(None),
        }
    }

    /// Concrete index name, prefix included.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn state(&self) -> ImportState {
        *self.state.lock()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.scheduler.on_progress(callback);
    }

    pub fn on_failure<F>(&self, callback: F)
    where
        F: Fn(&IndexError) + Send + Sync + 'static,
    {
        self.scheduler.on_failure(callback);
    }

    /// Approximate number of records, for progress display.
    pub async fn estimate(&self) -> Result<u64, IndexError> {
        self.source.count_estimate().await
    }

    /// Index every record of every scope, one unit of work per page.
    ///
    /// Returns once all submitted units resolved, also when the cursor fails;
    /// unit failures go to the failure callback.
    pub async fn import(&self) -> Result<(), IndexError> {
        let run = self.begin()?;
        let failures_before = self.scheduler.failures();

        let result = self.submit_scopes().await;
        if let Err(err) = &result {
            warn!(
                "{}: cursor failed, waiting for {} submitted units: {}",
                self.index_name,
                self.scheduler.outstanding(),
                err
            );
        }
        self.scheduler.wait_all().await;

        let state = if result.is_ok() && self.scheduler.failures() == failures_before {
            ImportState::Completed
        } else {
            ImportState::Failed
        };
        run.finish(state);
        info!("{}: import finished ({:?})", self.index_name, state);

        result
    }

    fn begin(&self) -> Result<RunGuard<'_>, IndexError> {
        let mut state = self.state.lock();
        if *state == ImportState::Running {
            return Err(IndexError::AlreadyRunning {
                index: self.index_name.to_string(),
            });
        }
        *state = ImportState::Running;
        Ok(RunGuard { state: &self.state })
    }

    async fn submit_scopes(&self) -> Result<(), IndexError> {
        for scope in D::SCOPES {
            info!("{}: importing scope {}", self.index_name, scope.name);
            let mut cursor = BatchCursor::<D, S>::new(&*self.source, scope, self.options.batch_size);

            while let Some(keys) = cursor.next_page().await? {
                self.submit_page(keys).await;
            }

            debug!(
                "{}: scope {} submitted {} pages",
                self.index_name,
                scope.name,
                cursor.pages()
            );
        }

        Ok(())
    }

    async fn submit_page(&self, keys: Vec<D::Key>) {
        let definition = Arc::clone(&self.definition);
        let source = Arc::clone(&self.source);
        let sink = Arc::clone(&self.sink);
        let index = Arc::clone(&self.index_name);

        self.scheduler
            .submit(keys, move |keys| async move {
                let batch = BulkBuilder::new(&*definition, &*source).build(&keys).await?;
                write_batch(&*sink, &index, batch).await
            })
            .await;
    }

    /// Remove documents whose record no longer exists.
    pub async fn clean_up(&self) -> Result<(), IndexError> {
        let primary_key = D::PRIMARY_KEY.ok_or_else(|| IndexError::UnknownPrimaryKey {
            table: D::TABLE.to_string(),
        })?;

        info!("{}: removing orphaned documents", self.index_name);
        let mut scroll = ScrollBatches::new(&*self.sink, &self.index_name, self.options.batch_size);
        let result = self.scan_orphans(&mut scroll, primary_key).await;
        scroll.close().await;

        self.scheduler.wait_all().await;
        result
    }

    async fn scan_orphans(
        &self,
        scroll: &mut ScrollBatches<'_, K>,
        primary_key: &'static str,
    ) -> Result<(), IndexError> {
        while let Some(ids) = scroll.next_batch().await? {
            let keys: Vec<D::Key> = ids
                .iter()
                .filter_map(|id| D::Key::from_document_id(id))
                .collect();

            let existing: HashSet<D::Key> = self
                .source
                .existing_keys(primary_key, &keys)
                .await?
                .into_iter()
                .collect();

            let orphans: Vec<String> = ids
                .into_iter()
                .filter(|id| match D::Key::from_document_id(id) {
                    Some(key) => !existing.contains(&key),
                    None => true,
                })
                .collect();

            if orphans.is_empty() {
                continue;
            }

            debug!("{}: {} orphaned documents in page", self.index_name, orphans.len());
            self.submit_deletions(orphans).await;
        }

        Ok(())
    }

    async fn submit_deletions(&self, ids: Vec<String>) {
        let sink = Arc::clone(&self.sink);
        let index = Arc::clone(&self.index_name);

        self.scheduler
            .submit(ids, move |ids| async move {
                write_batch(&*sink, &index, BulkBatch::deletions(ids)).await
            })
            .await;
    }

    /// Relax the refresh interval for bulk loading, remembering the current one.
    pub async fn optimize_for_import(&self) -> Result<(), IndexError> {
        let current = self.sink.refresh_interval(&self.index_name).await?;
        let relaxed = self.options.import_refresh_interval.as_str();

        // A previous run that never restored leaves the relaxed value behind;
        // restoring it again would keep the index from refreshing.
        let remembered = current.filter(|value| value != relaxed);
        debug!(
            "{}: refresh_interval {:?} -> {}",
            self.index_name, remembered, relaxed
        );
        *self.saved_refresh_interval.lock() = remembered;

        self.sink
            .put_refresh_interval(&self.index_name, Some(relaxed))
            .await
    }

    /// Restore the interval saved by `optimize_for_import`, or the engine default.
    pub async fn optimize_for_search(&self) -> Result<(), IndexError> {
        let saved = self.saved_refresh_interval.lock().take();
        if saved.is_none() {
            warn!(
                "{}: no saved refresh_interval, resetting to engine default",
                self.index_name
            );
        }

        self.sink
            .put_refresh_interval(&self.index_name, saved.as_deref())
            .await
    }
}

async fn write_batch<K: DocumentSink>(
    sink: &K,
    index: &str,
    batch: BulkBatch,
) -> Result<(usize, usize), IndexError> {
    if batch.is_empty() {
        return Ok((0, 0));
    }

    let total = batch.actions.len();
    let response = sink.bulk(index, &batch.actions).await?;
    response.into_result(index, total)?;
    Ok((batch.indexed, batch.deleted))
}
