use super::crutch::Crutches;
use super::definition::{IndexDefinition, Scope};
use super::statuses::{STATUS_RECORDS_SQL, StatusRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PublicStatusDocument {
    pub id: i64,
    pub account_id: i64,
    pub text: String,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub properties: Vec<&'static str>,
    pub created_at: DateTime<Utc>,
}

/// Public posts of accounts that opted into full-text search.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublicStatuses;

impl IndexDefinition for PublicStatuses {
    type Key = i64;
    type Record = StatusRecord;
    type Document = PublicStatusDocument;

    const INDEX: &'static str = "public_statuses";
    const TABLE: &'static str = "statuses";
    const PRIMARY_KEY: Option<&'static str> = Some("id");
    const EXISTENCE_FILTER: Option<&'static str> =
        Some("deleted_at IS NULL AND reblog_of_id IS NULL AND visibility = 0");
    const RECORDS_SQL: &'static str = STATUS_RECORDS_SQL;
    const SCOPES: &'static [Scope] = &[Scope {
        name: "indexable",
        sql: "SELECT s.id, s.id FROM statuses s \
              JOIN accounts a ON a.id = s.account_id \
              WHERE ($1::bigint IS NULL OR s.id > $1) \
              AND s.deleted_at IS NULL AND s.reblog_of_id IS NULL \
              AND s.visibility = 0 AND a.indexable \
              ORDER BY s.id LIMIT $2",
    }];

    fn record_key(record: &StatusRecord) -> i64 {
        record.id
    }

    /// Re-check the scope conditions; the record may have changed since
    /// the page was read.
    fn is_indexable(&self, record: &StatusRecord, _crutches: &Crutches<i64>) -> bool {
        !record.is_deleted() && !record.is_reblog() && record.is_public() && record.account_indexable
    }

    fn build_document(&self, record: &StatusRecord, _crutches: &Crutches<i64>) -> PublicStatusDocument {
        PublicStatusDocument {
            id: record.id,
            account_id: record.account_id,
            text: record.searchable_text(),
            tags: record.tags.clone(),
            language: record.language.clone(),
            properties: record.searchable_properties(),
            created_at: record.created_at.and_utc(),
        }
    }
}
