//! Test doubles and fixtures.
//!
//! The in-memory record source and document sink implement the same traits
//! as the Postgres source and the Elasticsearch client, so importers run
//! unchanged against them. [`database`] provisions real Postgres databases
//! for the SQL each index declares.

pub mod database;

pub use database::{TestDatabase, TestDatabaseError};

use crate::error::IndexError;
use crate::importer::accounts::AccountRecord;
use crate::importer::definition::{Crutch, IndexDefinition, Scope};
use crate::importer::instances::InstanceRecord;
use crate::importer::statuses::StatusRecord;
use crate::importer::tags::TagRecord;
use crate::search::bulk::BulkItem;
use crate::search::{BulkAction, BulkResponse, DocumentSink, ScrollPage};
use crate::source::RecordSource;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};

fn injected(what: &str) -> IndexError {
    IndexError::Database(sqlx::Error::Protocol(format!("injected {} failure", what)))
}

struct SourceState<D: IndexDefinition> {
    records: BTreeMap<D::Key, D::Record>,
    scope_rows: HashMap<&'static str, Vec<(D::Key, D::Key)>>,
    crutch_rows: HashMap<&'static str, Vec<(D::Key, i64)>>,
    estimate: Option<u64>,
    pages_before_failure: Option<usize>,
    failing_crutches: HashSet<&'static str>,
    fail_records: bool,
    page_queries: usize,
    record_queries: usize,
    crutch_queries: HashMap<String, usize>,
    existence_queries: usize,
}

/// Record source backed by a map of records.
///
/// The first scope of the definition pages over every stored record unless
/// rows were set for it explicitly; other scopes are empty until set.
pub struct MemorySource<D: IndexDefinition> {
    state: Mutex<SourceState<D>>,
}

impl<D: IndexDefinition> MemorySource<D> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SourceState {
                records: BTreeMap::new(),
                scope_rows: HashMap::new(),
                crutch_rows: HashMap::new(),
                estimate: None,
                pages_before_failure: None,
                failing_crutches: HashSet::new(),
                fail_records: false,
                page_queries: 0,
                record_queries: 0,
                crutch_queries: HashMap::new(),
                existence_queries: 0,
            }),
        }
    }

    pub fn insert(&self, record: D::Record) {
        let key = D::record_key(&record);
        self.state.lock().records.insert(key, record);
    }

    pub fn remove(&self, key: &D::Key) -> Option<D::Record> {
        self.state.lock().records.remove(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows returned by the scope named `scope`, as `(cursor, key)`.
    pub fn set_scope_rows(&self, scope: &str, mut rows: Vec<(D::Key, D::Key)>) {
        let Some(scope) = D::SCOPES.iter().find(|s| s.name == scope) else {
            panic!("{} has no scope named {}", D::INDEX, scope);
        };
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        self.state.lock().scope_rows.insert(scope.name, rows);
    }

    pub fn set_crutch_rows(&self, crutch: &str, rows: Vec<(D::Key, i64)>) {
        let Some(crutch) = D::CRUTCHES.iter().find(|c| c.name == crutch) else {
            panic!("{} has no crutch named {}", D::INDEX, crutch);
        };
        self.state.lock().crutch_rows.insert(crutch.name, rows);
    }

    pub fn set_estimate(&self, estimate: u64) {
        self.state.lock().estimate = Some(estimate);
    }

    /// Let `pages` page queries succeed, then fail every later one.
    pub fn fail_pages_after(&self, pages: usize) {
        let mut state = self.state.lock();
        state.pages_before_failure = Some(state.page_queries + pages);
    }

    pub fn fail_crutch(&self, crutch: &str) {
        if let Some(crutch) = D::CRUTCHES.iter().find(|c| c.name == crutch) {
            self.state.lock().failing_crutches.insert(crutch.name);
        }
    }

    pub fn fail_records(&self) {
        self.state.lock().fail_records = true;
    }

    pub fn page_queries(&self) -> usize {
        self.state.lock().page_queries
    }

    pub fn record_queries(&self) -> usize {
        self.state.lock().record_queries
    }

    pub fn crutch_queries(&self, crutch: &str) -> usize {
        self.state
            .lock()
            .crutch_queries
            .get(crutch)
            .copied()
            .unwrap_or(0)
    }

    pub fn existence_queries(&self) -> usize {
        self.state.lock().existence_queries
    }
}

impl<D: IndexDefinition> Default for MemorySource<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> RecordSource<D> for MemorySource<D>
where
    D: IndexDefinition,
    D::Record: Clone,
{
    async fn fetch_page(
        &self,
        scope: &'static Scope,
        after: Option<D::Key>,
        limit: usize,
    ) -> Result<Vec<(D::Key, D::Key)>, IndexError> {
        let mut state = self.state.lock();
        state.page_queries += 1;
        if let Some(allowed) = state.pages_before_failure {
            if state.page_queries > allowed {
                return Err(injected("page"));
            }
        }

        let is_first_scope = D::SCOPES
            .first()
            .is_some_and(|first| first.name == scope.name);

        let rows: Vec<(D::Key, D::Key)> = match state.scope_rows.get(scope.name) {
            Some(rows) => rows.clone(),
            None if is_first_scope => state
                .records
                .keys()
                .map(|key| (key.clone(), key.clone()))
                .collect(),
            None => Vec::new(),
        };

        Ok(rows
            .into_iter()
            .filter(|(cursor, _)| after.as_ref().is_none_or(|after| cursor > after))
            .take(limit)
            .collect())
    }

    async fn load_records(&self, keys: &[D::Key]) -> Result<Vec<D::Record>, IndexError> {
        let mut state = self.state.lock();
        state.record_queries += 1;
        if state.fail_records {
            return Err(injected("record"));
        }

        let wanted: HashSet<&D::Key> = keys.iter().collect();
        Ok(state
            .records
            .iter()
            .filter(|(key, _)| wanted.contains(key))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn fetch_crutch(
        &self,
        crutch: &'static Crutch,
        keys: &[D::Key],
    ) -> Result<Vec<(D::Key, i64)>, IndexError> {
        let mut state = self.state.lock();
        *state.crutch_queries.entry(crutch.name.to_string()).or_default() += 1;
        if state.failing_crutches.contains(crutch.name) {
            return Err(injected(crutch.name));
        }

        let wanted: HashSet<&D::Key> = keys.iter().collect();
        Ok(state
            .crutch_rows
            .get(crutch.name)
            .map(|rows| {
                rows.iter()
                    .filter(|(key, _)| wanted.contains(key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn existing_keys(
        &self,
        _primary_key: &'static str,
        keys: &[D::Key],
    ) -> Result<Vec<D::Key>, IndexError> {
        let mut state = self.state.lock();
        state.existence_queries += 1;
        Ok(keys
            .iter()
            .filter(|key| state.records.contains_key(*key))
            .cloned()
            .collect())
    }

    async fn count_estimate(&self) -> Result<u64, IndexError> {
        let state = self.state.lock();
        Ok(state.estimate.unwrap_or(state.records.len() as u64))
    }
}

#[derive(Default)]
struct SinkState {
    indexes: HashMap<String, BTreeMap<String, Value>>,
    bulk_calls: Vec<(String, Vec<BulkAction>)>,
    rejected: HashMap<(String, String), String>,
    failing_bulks: usize,
    refresh_intervals: HashMap<String, Option<String>>,
    settings_writes: Vec<(String, Option<String>)>,
    scrolls: HashMap<String, (Vec<String>, usize)>,
    next_scroll: usize,
}

/// Document sink that keeps every index in memory.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<SinkState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, index: &str, id: &str, document: Value) {
        self.state
            .lock()
            .indexes
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .indexes
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Document ids of `index` in id order.
    pub fn document_ids(&self, index: &str) -> Vec<String> {
        self.state
            .lock()
            .indexes
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bulk_calls(&self) -> Vec<(String, Vec<BulkAction>)> {
        self.state.lock().bulk_calls.clone()
    }

    /// Answer actions on `id` with a per-item error.
    pub fn reject_document(&self, index: &str, id: &str, reason: &str) {
        self.state
            .lock()
            .rejected
            .insert((index.to_string(), id.to_string()), reason.to_string());
    }

    /// Fail the next `count` bulk requests as a whole.
    pub fn fail_next_bulks(&self, count: usize) {
        self.state.lock().failing_bulks = count;
    }

    pub fn set_refresh_interval(&self, index: &str, value: Option<&str>) {
        self.state
            .lock()
            .refresh_intervals
            .insert(index.to_string(), value.map(str::to_string));
    }

    pub fn refresh_interval_of(&self, index: &str) -> Option<String> {
        self.state
            .lock()
            .refresh_intervals
            .get(index)
            .cloned()
            .flatten()
    }

    pub fn settings_writes(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().settings_writes.clone()
    }

    /// Scroll contexts opened and not yet cleared.
    pub fn open_scrolls(&self) -> usize {
        self.state.lock().scrolls.len()
    }
}

fn take_page(remaining: &mut Vec<String>, size: usize) -> Vec<String> {
    let size = size.min(remaining.len());
    remaining.drain(..size).collect()
}

impl DocumentSink for MemorySink {
    async fn bulk(&self, index: &str, actions: &[BulkAction]) -> Result<BulkResponse, IndexError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.bulk_calls.push((index.to_string(), actions.to_vec()));

        if state.failing_bulks > 0 {
            state.failing_bulks -= 1;
            return Err(IndexError::sink_status(
                StatusCode::SERVICE_UNAVAILABLE,
                "injected bulk failure".to_string(),
            ));
        }

        let documents = state.indexes.entry(index.to_string()).or_default();
        let mut response = BulkResponse::default();

        for action in actions {
            let rejection = state
                .rejected
                .get(&(index.to_string(), action.id().to_string()));

            let item = match (rejection, action) {
                (Some(reason), _) => BulkItem {
                    id: Some(action.id().to_string()),
                    status: 400,
                    error: Some(json!({ "type": "injected", "reason": reason })),
                },
                (None, BulkAction::Index { id, document }) => {
                    let status = if documents.insert(id.clone(), document.clone()).is_some() {
                        200
                    } else {
                        201
                    };
                    BulkItem {
                        id: Some(id.clone()),
                        status,
                        error: None,
                    }
                }
                (None, BulkAction::Delete { id }) => BulkItem {
                    id: Some(id.clone()),
                    status: if documents.remove(id).is_some() { 200 } else { 404 },
                    error: None,
                },
            };

            response.errors |= item.status >= 300;
            response
                .items
                .push(HashMap::from([(action.kind().to_string(), item)]));
        }

        Ok(response)
    }

    async fn refresh_interval(&self, index: &str) -> Result<Option<String>, IndexError> {
        Ok(self.refresh_interval_of(index))
    }

    async fn put_refresh_interval(&self, index: &str, value: Option<&str>) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        let value = value.map(str::to_string);
        state
            .settings_writes
            .push((index.to_string(), value.clone()));
        state.refresh_intervals.insert(index.to_string(), value);
        Ok(())
    }

    async fn open_scroll(&self, index: &str, batch_size: usize) -> Result<ScrollPage, IndexError> {
        let mut state = self.state.lock();
        let mut remaining: Vec<String> = state
            .indexes
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();

        state.next_scroll += 1;
        let scroll_id = format!("scroll-{}", state.next_scroll);
        let ids = take_page(&mut remaining, batch_size);
        state
            .scrolls
            .insert(scroll_id.clone(), (remaining, batch_size));

        Ok(ScrollPage {
            scroll_id: Some(scroll_id),
            ids,
        })
    }

    async fn continue_scroll(&self, scroll_id: &str) -> Result<ScrollPage, IndexError> {
        let mut state = self.state.lock();
        let Some((remaining, size)) = state.scrolls.get_mut(scroll_id) else {
            return Err(IndexError::sink_status(
                StatusCode::NOT_FOUND,
                format!("no search context found for id [{}]", scroll_id),
            ));
        };
        let size = *size;

        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            ids: take_page(remaining, size),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), IndexError> {
        self.state.lock().scrolls.remove(scroll_id);
        Ok(())
    }
}

fn fixture_time() -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(1_704_067_200, 0)
        .unwrap_or_default()
        .naive_utc()
}

pub fn tag(id: i64, name: &str) -> TagRecord {
    TagRecord {
        id,
        name: name.to_string(),
        display_name: None,
        listable: Some(true),
        reviewed_at: None,
        last_status_at: None,
        created_at: fixture_time(),
    }
}

/// Approved local account when `domain` is `None`, remote otherwise.
pub fn account(id: i64, domain: Option<&str>) -> AccountRecord {
    AccountRecord {
        id,
        username: format!("alice{}", id),
        domain: domain.map(str::to_string),
        display_name: format!("Alice {}", id),
        note: String::new(),
        actor_type: Some("Person".to_string()),
        discoverable: None,
        suspended_at: None,
        moved_to_account_id: None,
        approved: domain.is_none().then_some(true),
        followers_count: 0,
        following_count: 0,
        last_status_at: None,
        created_at: fixture_time(),
    }
}

/// Public, local, plain-text status.
pub fn status(id: i64, account_id: i64) -> StatusRecord {
    StatusRecord {
        id,
        account_id,
        text: "hello".to_string(),
        spoiler_text: String::new(),
        language: Some("en".to_string()),
        sensitive: false,
        visibility: 0,
        reply: false,
        reblog_of_id: None,
        deleted_at: None,
        created_at: fixture_time(),
        local: true,
        account_indexable: true,
        has_poll: false,
        tags: Vec::new(),
        media_types: Vec::new(),
        card_type: None,
    }
}

pub fn instance(domain: &str, accounts_count: i64) -> InstanceRecord {
    InstanceRecord {
        domain: domain.to_string(),
        accounts_count,
        blocked: false,
    }
}
