//! Read side of the pipeline: the database as the importers see it.

pub mod postgres;

pub use postgres::PgSource;

use crate::error::IndexError;
use crate::importer::definition::{Crutch, IndexDefinition, Scope};
use sqlx::Postgres;
use sqlx::postgres::PgHasArrayType;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;

/// Primary key types a record can be addressed by, both in SQL and as a
/// search document id.
pub trait RecordKey:
    Clone
    + Ord
    + Hash
    + Display
    + Debug
    + Send
    + Sync
    + Unpin
    + 'static
    + sqlx::Type<Postgres>
    + for<'q> sqlx::Encode<'q, Postgres>
    + for<'r> sqlx::Decode<'r, Postgres>
    + PgHasArrayType
{
    /// Parse a document id read back from the index. `None` marks a
    /// document that can never match a row.
    fn from_document_id(id: &str) -> Option<Self>;
}

impl RecordKey for i64 {
    fn from_document_id(id: &str) -> Option<Self> {
        id.parse().ok()
    }
}

impl RecordKey for String {
    fn from_document_id(id: &str) -> Option<Self> {
        Some(id.to_string())
    }
}

/// Source of truth for one index definition.
pub trait RecordSource<D: IndexDefinition>: Send + Sync + 'static {
    /// Up to `limit` `(cursor, record_key)` rows of `scope` with a cursor
    /// strictly greater than `after`.
    fn fetch_page(
        &self,
        scope: &'static Scope,
        after: Option<D::Key>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(D::Key, D::Key)>, IndexError>> + Send;

    /// Full records for `keys` in one query. Missing rows are simply absent.
    fn load_records(
        &self,
        keys: &[D::Key],
    ) -> impl Future<Output = Result<Vec<D::Record>, IndexError>> + Send;

    /// One aggregate query answering `crutch` for every key of a page.
    fn fetch_crutch(
        &self,
        crutch: &'static Crutch,
        keys: &[D::Key],
    ) -> impl Future<Output = Result<Vec<(D::Key, i64)>, IndexError>> + Send;

    /// The subset of `keys` that still exists, looked up by `primary_key`.
    fn existing_keys(
        &self,
        primary_key: &'static str,
        keys: &[D::Key],
    ) -> impl Future<Output = Result<Vec<D::Key>, IndexError>> + Send;

    /// Planner row estimate for the backing table.
    fn count_estimate(&self) -> impl Future<Output = Result<u64, IndexError>> + Send;
}
