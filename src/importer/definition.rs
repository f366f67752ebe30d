use super::crutch::Crutches;
use crate::source::RecordKey;
use serde::Serialize;

/// A keyset-paginated selection over the database.
///
/// `sql` binds `$1` to the last cursor value of the previous page (NULL for
/// the first page) and `$2` to the page size, and returns `(cursor,
/// record_key)` rows ordered by cursor. Most scopes page over the record
/// key itself; the statuses scopes page over join tables and project the
/// status id.
#[derive(Debug)]
pub struct Scope {
    pub name: &'static str,
    pub sql: &'static str,
}

/// A batch lookup that replaces one query per record with one per page.
///
/// `sql` binds `$1` to the array of record keys and returns `(record_key,
/// value)` rows.
#[derive(Debug)]
pub struct Crutch {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Everything that differs between indexes: where records come from, which
/// lookups a page needs, when a record stops belonging to the index and
/// what its document looks like.
pub trait IndexDefinition: Send + Sync + 'static {
    type Key: RecordKey;
    type Record: Send + Sync + 'static;
    type Document: Serialize;

    /// Logical index name, before the configured prefix.
    const INDEX: &'static str;
    /// Table (or view) backing the index.
    const TABLE: &'static str;
    /// Column that document ids map to. Reconciliation cannot run without it.
    const PRIMARY_KEY: Option<&'static str>;
    /// Extra condition a row must meet to count as existing during reconciliation.
    const EXISTENCE_FILTER: Option<&'static str> = None;
    /// Loads full records for the key array bound to `$1`, without scope filters.
    const RECORDS_SQL: &'static str;
    const SCOPES: &'static [Scope];
    const CRUTCHES: &'static [Crutch] = &[];

    fn record_key(record: &Self::Record) -> Self::Key;

    fn is_indexable(&self, record: &Self::Record, crutches: &Crutches<Self::Key>) -> bool;

    fn build_document(
        &self,
        record: &Self::Record,
        crutches: &Crutches<Self::Key>,
    ) -> Self::Document;
}
