use super::crutch::Crutches;
use super::definition::{IndexDefinition, Scope};
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstanceRecord {
    pub domain: String,
    pub accounts_count: i64,
    pub blocked: bool,
}

#[derive(Debug, Serialize)]
pub struct InstanceDocument {
    pub domain: String,
    pub accounts_count: i64,
}

/// Known remote domains, keyed by domain name.
#[derive(Debug, Default, Clone, Copy)]
pub struct Instances;

impl IndexDefinition for Instances {
    type Key = String;
    type Record = InstanceRecord;
    type Document = InstanceDocument;

    const INDEX: &'static str = "instances";
    const TABLE: &'static str = "instances";
    const PRIMARY_KEY: Option<&'static str> = Some("domain");
    const EXISTENCE_FILTER: Option<&'static str> =
        Some("NOT EXISTS (SELECT 1 FROM domain_blocks b WHERE b.domain = instances.domain)");
    const RECORDS_SQL: &'static str = "SELECT i.domain, i.accounts_count::bigint AS accounts_count, \
         EXISTS (SELECT 1 FROM domain_blocks b WHERE b.domain = i.domain) AS blocked \
         FROM instances i WHERE i.domain = ANY($1)";
    const SCOPES: &'static [Scope] = &[Scope {
        name: "searchable",
        sql: "SELECT i.domain, i.domain FROM instances i \
              WHERE ($1::text IS NULL OR i.domain > $1) \
              AND NOT EXISTS (SELECT 1 FROM domain_blocks b WHERE b.domain = i.domain) \
              ORDER BY i.domain LIMIT $2",
    }];

    fn record_key(record: &InstanceRecord) -> String {
        record.domain.clone()
    }

    fn is_indexable(&self, record: &InstanceRecord, _crutches: &Crutches<String>) -> bool {
        !record.blocked
    }

    fn build_document(&self, record: &InstanceRecord, _crutches: &Crutches<String>) -> InstanceDocument {
        InstanceDocument {
            domain: record.domain.clone(),
            accounts_count: record.accounts_count,
        }
    }
}
