use super::crutch::Crutches;
use super::definition::{Crutch, IndexDefinition, Scope};
use crate::text::{html_to_text, join_paragraphs};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// Columns shared by the statuses and public statuses indexes.
pub const STATUS_RECORDS_SQL: &str = "SELECT s.id, s.account_id, s.text, s.spoiler_text, \
     s.language, s.sensitive, s.visibility, s.in_reply_to_id IS NOT NULL AS reply, \
     s.reblog_of_id, s.deleted_at, s.created_at, \
     (COALESCE(s.local, FALSE) OR s.uri IS NULL) AS local, \
     COALESCE(a.indexable, FALSE) AS account_indexable, \
     s.poll_id IS NOT NULL AS has_poll, \
     COALESCE((SELECT array_agg(t.name::text) FROM statuses_tags st \
         JOIN tags t ON t.id = st.tag_id WHERE st.status_id = s.id), '{}') AS tags, \
     COALESCE((SELECT array_agg(m.type) FROM media_attachments m \
         WHERE m.status_id = s.id), '{}') AS media_types, \
     (SELECT pc.type FROM preview_cards_statuses pcs \
         JOIN preview_cards pc ON pc.id = pcs.preview_card_id \
         WHERE pcs.status_id = s.id LIMIT 1) AS card_type \
     FROM statuses s JOIN accounts a ON a.id = s.account_id \
     WHERE s.id = ANY($1)";

pub const VISIBILITY_PUBLIC: i32 = 0;

const MEDIA_IMAGE: i32 = 0;
const MEDIA_GIFV: i32 = 1;
const MEDIA_VIDEO: i32 = 2;
const MEDIA_AUDIO: i32 = 4;
const CARD_VIDEO: i32 = 2;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusRecord {
    pub id: i64,
    pub account_id: i64,
    pub text: String,
    pub spoiler_text: String,
    pub language: Option<String>,
    pub sensitive: bool,
    pub visibility: i32,
    pub reply: bool,
    pub reblog_of_id: Option<i64>,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub local: bool,
    pub account_indexable: bool,
    pub has_poll: bool,
    pub tags: Vec<String>,
    pub media_types: Vec<i32>,
    pub card_type: Option<i32>,
}

impl StatusRecord {
    pub fn is_reblog(&self) -> bool {
        self.reblog_of_id.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == VISIBILITY_PUBLIC
    }

    pub fn searchable_text(&self) -> String {
        let content = html_to_text(&self.text);
        join_paragraphs([self.spoiler_text.as_str(), content.as_str()])
    }

    pub fn searchable_properties(&self) -> Vec<&'static str> {
        let has = |kind: i32| self.media_types.contains(&kind);
        let mut properties = Vec::new();

        if has(MEDIA_IMAGE) {
            properties.push("image");
        }
        if has(MEDIA_VIDEO) || has(MEDIA_GIFV) {
            properties.push("video");
        }
        if has(MEDIA_AUDIO) {
            properties.push("audio");
        }
        if !self.media_types.is_empty() {
            properties.push("media");
        }
        if self.has_poll {
            properties.push("poll");
        }
        if self.card_type.is_some() {
            properties.push("link");
        }
        if self.card_type == Some(CARD_VIDEO) {
            properties.push("embed");
        }
        if self.sensitive {
            properties.push("sensitive");
        }
        if self.reply {
            properties.push("reply");
        }

        properties
    }

    /// Local accounts allowed to find this status: the local author plus
    /// every local account that interacted with it.
    pub fn searchable_by(&self, crutches: &Crutches<i64>) -> Vec<i64> {
        let mut ids = Vec::new();
        if self.local {
            ids.push(self.account_id);
        }
        for crutch in Statuses::CRUTCHES {
            ids.extend_from_slice(crutches.get(crutch.name, &self.id));
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Serialize)]
pub struct StatusDocument {
    pub id: i64,
    pub account_id: i64,
    pub text: String,
    pub tags: Vec<String>,
    pub searchable_by: Vec<i64>,
    pub language: Option<String>,
    pub properties: Vec<&'static str>,
    pub created_at: DateTime<Utc>,
}

/// Statuses visible to the local accounts that wrote or interacted with them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Statuses;

impl IndexDefinition for Statuses {
    type Key = i64;
    type Record = StatusRecord;
    type Document = StatusDocument;

    const INDEX: &'static str = "statuses";
    const TABLE: &'static str = "statuses";
    const PRIMARY_KEY: Option<&'static str> = Some("id");
    const EXISTENCE_FILTER: Option<&'static str> = Some("deleted_at IS NULL");
    const RECORDS_SQL: &'static str = STATUS_RECORDS_SQL;
    const SCOPES: &'static [Scope] = &[
        Scope {
            name: "local_statuses",
            sql: "SELECT s.id, COALESCE(s.reblog_of_id, s.id) FROM statuses s \
                  WHERE ($1::bigint IS NULL OR s.id > $1) \
                  AND (COALESCE(s.local, FALSE) OR s.uri IS NULL) \
                  ORDER BY s.id LIMIT $2",
        },
        Scope {
            name: "local_mentions",
            sql: "SELECT m.id, m.status_id FROM mentions m \
                  JOIN accounts a ON a.id = m.account_id \
                  WHERE ($1::bigint IS NULL OR m.id > $1) \
                  AND a.domain IS NULL AND NOT m.silent \
                  ORDER BY m.id LIMIT $2",
        },
        Scope {
            name: "local_favourites",
            sql: "SELECT f.id, f.status_id FROM favourites f \
                  JOIN accounts a ON a.id = f.account_id \
                  WHERE ($1::bigint IS NULL OR f.id > $1) AND a.domain IS NULL \
                  ORDER BY f.id LIMIT $2",
        },
        Scope {
            name: "local_votes",
            sql: "SELECT DISTINCT p.id, p.status_id FROM polls p \
                  JOIN poll_votes v ON v.poll_id = p.id \
                  JOIN accounts a ON a.id = v.account_id \
                  WHERE ($1::bigint IS NULL OR p.id > $1) \
                  AND p.status_id IS NOT NULL AND a.domain IS NULL \
                  ORDER BY p.id LIMIT $2",
        },
        Scope {
            name: "bookmarks",
            sql: "SELECT b.id, b.status_id FROM bookmarks b \
                  WHERE ($1::bigint IS NULL OR b.id > $1) \
                  ORDER BY b.id LIMIT $2",
        },
    ];
    const CRUTCHES: &'static [Crutch] = &[
        Crutch {
            name: "mentions",
            sql: "SELECT m.status_id, m.account_id FROM mentions m \
                  JOIN accounts a ON a.id = m.account_id \
                  WHERE m.status_id = ANY($1) AND a.domain IS NULL",
        },
        Crutch {
            name: "favourites",
            sql: "SELECT f.status_id, f.account_id FROM favourites f \
                  JOIN accounts a ON a.id = f.account_id \
                  WHERE f.status_id = ANY($1) AND a.domain IS NULL",
        },
        Crutch {
            name: "reblogs",
            sql: "SELECT s.reblog_of_id, s.account_id FROM statuses s \
                  JOIN accounts a ON a.id = s.account_id \
                  WHERE s.reblog_of_id = ANY($1) AND a.domain IS NULL",
        },
        Crutch {
            name: "bookmarks",
            sql: "SELECT b.status_id, b.account_id FROM bookmarks b \
                  WHERE b.status_id = ANY($1)",
        },
        Crutch {
            name: "votes",
            sql: "SELECT p.status_id, v.account_id FROM poll_votes v \
                  JOIN polls p ON p.id = v.poll_id \
                  JOIN accounts a ON a.id = v.account_id \
                  WHERE p.status_id = ANY($1) AND a.domain IS NULL",
        },
    ];

    fn record_key(record: &StatusRecord) -> i64 {
        record.id
    }

    fn is_indexable(&self, record: &StatusRecord, crutches: &Crutches<i64>) -> bool {
        !record.is_deleted() && !record.is_reblog() && !record.searchable_by(crutches).is_empty()
    }

    fn build_document(&self, record: &StatusRecord, crutches: &Crutches<i64>) -> StatusDocument {
        StatusDocument {
            id: record.id,
            account_id: record.account_id,
            text: record.searchable_text(),
            tags: record.tags.clone(),
            searchable_by: record.searchable_by(crutches),
            language: record.language.clone(),
            properties: record.searchable_properties(),
            created_at: record.created_at.and_utc(),
        }
    }
}
