use super::crutch::Crutches;
use super::definition::{Crutch, IndexDefinition, Scope};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub listable: Option<bool>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub last_status_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl TagRecord {
    /// Tags are listable unless a moderator explicitly unlisted them.
    pub fn is_listable(&self) -> bool {
        self.listable != Some(false)
    }
}

#[derive(Debug, Serialize)]
pub struct TagDocument {
    pub name: String,
    pub reviewed: bool,
    pub usage: i64,
    pub last_status_at: DateTime<Utc>,
}

/// Hashtags for autocompletion, weighted by recent usage.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tags;

impl IndexDefinition for Tags {
    type Key = i64;
    type Record = TagRecord;
    type Document = TagDocument;

    const INDEX: &'static str = "tags";
    const TABLE: &'static str = "tags";
    const PRIMARY_KEY: Option<&'static str> = Some("id");
    const EXISTENCE_FILTER: Option<&'static str> = Some("listable IS DISTINCT FROM FALSE");
    const RECORDS_SQL: &'static str = "SELECT id, name, display_name, listable, reviewed_at, \
         last_status_at, created_at FROM tags WHERE id = ANY($1)";
    const SCOPES: &'static [Scope] = &[Scope {
        name: "listable",
        sql: "SELECT id, id FROM tags \
              WHERE ($1::bigint IS NULL OR id > $1) AND listable IS DISTINCT FROM FALSE \
              ORDER BY id LIMIT $2",
    }];
    const CRUTCHES: &'static [Crutch] = &[Crutch {
        name: "usage",
        sql: "SELECT st.tag_id, COUNT(DISTINCT s.account_id)::bigint FROM statuses_tags st \
              JOIN statuses s ON s.id = st.status_id \
              WHERE st.tag_id = ANY($1) AND s.deleted_at IS NULL \
              AND s.created_at >= now() - interval '7 days' \
              GROUP BY st.tag_id",
    }];

    fn record_key(record: &TagRecord) -> i64 {
        record.id
    }

    fn is_indexable(&self, record: &TagRecord, _crutches: &Crutches<i64>) -> bool {
        record.is_listable()
    }

    fn build_document(&self, record: &TagRecord, crutches: &Crutches<i64>) -> TagDocument {
        TagDocument {
            name: record
                .display_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| record.name.clone()),
            reviewed: record.reviewed_at.is_some(),
            usage: crutches.first("usage", &record.id).unwrap_or(0),
            last_status_at: record.last_status_at.unwrap_or(record.created_at).and_utc(),
        }
    }
}
