use crate::error::IndexError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

/// One instruction in a `_bulk` request body.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Index { id: String, document: Value },
    Delete { id: String },
}

impl BulkAction {
    pub fn index(id: impl Into<String>, document: Value) -> Self {
        BulkAction::Index {
            id: id.into(),
            document,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        BulkAction::Delete { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkAction::Index { id, .. } | BulkAction::Delete { id } => id,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, BulkAction::Index { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, BulkAction::Delete { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BulkAction::Index { .. } => "index",
            BulkAction::Delete { .. } => "delete",
        }
    }
}

/// Encode actions as the newline-delimited JSON the bulk endpoint expects.
///
/// The target index travels in the URL, so action lines only carry `_id`.
pub fn encode_ndjson(actions: &[BulkAction]) -> Result<String, serde_json::Error> {
    let mut body = String::new();

    for action in actions {
        let header = json!({ action.kind(): { "_id": action.id() } });
        body.push_str(&serde_json::to_string(&header)?);
        body.push('\n');

        if let BulkAction::Index { document, .. } = action {
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }
    }

    Ok(body)
}

/// Per-action outcome reported by the bulk endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    pub action: String,
    pub id: Option<String>,
    pub status: u16,
    pub reason: String,
}

impl BulkResponse {
    /// Response the engine would send if every action succeeded.
    pub fn accepted(actions: &[BulkAction]) -> Self {
        let items = actions
            .iter()
            .map(|action| {
                let status = if action.is_index() { 201 } else { 200 };
                let item = BulkItem {
                    id: Some(action.id().to_string()),
                    status,
                    error: None,
                };
                HashMap::from([(action.kind().to_string(), item)])
            })
            .collect();

        BulkResponse {
            errors: false,
            items,
        }
    }

    /// Items that did not apply. Deleting a document that is already gone
    /// answers `404`, which leaves the index in the requested state.
    pub fn failures(&self) -> Vec<BulkItemFailure> {
        let mut failures = Vec::new();

        for entry in &self.items {
            for (action, item) in entry {
                if item.status < 300 || (action == "delete" && item.status == 404) {
                    continue;
                }

                let reason = match &item.error {
                    Some(Value::Object(map)) => map
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
                    Some(Value::String(reason)) => reason.clone(),
                    Some(other) => other.to_string(),
                    None => format!("status {}", item.status),
                };

                failures.push(BulkItemFailure {
                    action: action.clone(),
                    id: item.id.clone(),
                    status: item.status,
                    reason,
                });
            }
        }

        failures
    }

    /// Fail the whole unit when any action failed.
    pub fn into_result(self, index: &str, total: usize) -> Result<(), IndexError> {
        let failures = self.failures();
        match failures.first() {
            None => Ok(()),
            Some(first) => Err(IndexError::BulkItemsFailed {
                index: index.to_string(),
                failed: failures.len(),
                total,
                reason: match &first.id {
                    Some(id) => format!("{} {}: {}", first.action, id, first.reason),
                    None => format!("{}: {}", first.action, first.reason),
                },
            }),
        }
    }
}
