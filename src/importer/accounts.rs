use super::crutch::Crutches;
use super::definition::{IndexDefinition, Scope};
use crate::text::html_to_text;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRecord {
    pub id: i64,
    pub username: String,
    pub domain: Option<String>,
    pub display_name: String,
    pub note: String,
    pub actor_type: Option<String>,
    pub discoverable: Option<bool>,
    pub suspended_at: Option<NaiveDateTime>,
    pub moved_to_account_id: Option<i64>,
    /// Sign-up approval of the local user; NULL for remote accounts.
    pub approved: Option<bool>,
    pub followers_count: i64,
    pub following_count: i64,
    pub last_status_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl AccountRecord {
    pub fn is_local(&self) -> bool {
        self.domain.is_none()
    }

    pub fn acct(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}@{}", self.username, domain),
            None => self.username.clone(),
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.actor_type.as_deref(), Some("Application" | "Service"))
    }

    pub fn is_group(&self) -> bool {
        self.actor_type.as_deref() == Some("Group")
    }

    pub fn is_searchable(&self) -> bool {
        let approved = !self.is_local() || self.approved == Some(true);
        approved && self.suspended_at.is_none() && self.moved_to_account_id.is_none()
    }

    fn properties(&self) -> Vec<&'static str> {
        let mut properties = Vec::new();
        if self.is_bot() {
            properties.push("bot");
        }
        if self.is_group() {
            properties.push("group");
        }
        if self.discoverable == Some(true) {
            properties.push("discoverable");
        }
        if self.is_local() {
            properties.push("local");
        }
        properties
    }
}

#[derive(Debug, Serialize)]
pub struct AccountDocument {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub text: String,
    pub properties: Vec<&'static str>,
    pub followers_count: i64,
    pub following_count: i64,
    pub last_status_at: DateTime<Utc>,
    pub discoverable: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Accounts;

impl IndexDefinition for Accounts {
    type Key = i64;
    type Record = AccountRecord;
    type Document = AccountDocument;

    const INDEX: &'static str = "accounts";
    const TABLE: &'static str = "accounts";
    const PRIMARY_KEY: Option<&'static str> = Some("id");
    const EXISTENCE_FILTER: Option<&'static str> =
        Some("suspended_at IS NULL AND moved_to_account_id IS NULL");
    const RECORDS_SQL: &'static str = "SELECT a.id, a.username, a.domain, a.display_name, a.note, \
         a.actor_type, a.discoverable, a.suspended_at, a.moved_to_account_id, u.approved, \
         COALESCE(s.followers_count, 0)::bigint AS followers_count, \
         COALESCE(s.following_count, 0)::bigint AS following_count, \
         s.last_status_at, a.created_at \
         FROM accounts a \
         LEFT JOIN users u ON u.account_id = a.id \
         LEFT JOIN account_stats s ON s.account_id = a.id \
         WHERE a.id = ANY($1)";
    const SCOPES: &'static [Scope] = &[Scope {
        name: "searchable",
        sql: "SELECT a.id, a.id FROM accounts a \
              LEFT JOIN users u ON u.account_id = a.id \
              WHERE ($1::bigint IS NULL OR a.id > $1) \
              AND (a.domain IS NOT NULL OR u.approved) \
              AND a.suspended_at IS NULL AND a.moved_to_account_id IS NULL \
              ORDER BY a.id LIMIT $2",
    }];

    fn record_key(record: &AccountRecord) -> i64 {
        record.id
    }

    fn is_indexable(&self, record: &AccountRecord, _crutches: &Crutches<i64>) -> bool {
        record.is_searchable()
    }

    fn build_document(&self, record: &AccountRecord, _crutches: &Crutches<i64>) -> AccountDocument {
        AccountDocument {
            id: record.id,
            username: record.acct(),
            display_name: record.display_name.clone(),
            text: html_to_text(&record.note),
            properties: record.properties(),
            followers_count: record.followers_count,
            following_count: record.following_count,
            last_status_at: record.last_status_at.unwrap_or(record.created_at).and_utc(),
            discoverable: record.discoverable == Some(true),
        }
    }
}
