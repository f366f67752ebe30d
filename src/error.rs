use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while moving records from the database into the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("search engine HTTP error: {0}")]
    SinkHttp(#[from] reqwest::Error),
    #[error("search engine returned status {status}: {body}")]
    SinkStatus { status: StatusCode, body: String },
    #[error("{failed} of {total} bulk actions failed on index {index}: {reason}")]
    BulkItemsFailed {
        index: String,
        failed: usize,
        total: usize,
        reason: String,
    },
    #[error("invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("table {table} has no primary key")]
    UnknownPrimaryKey { table: String },
    #[error("an import into {index} is already running")]
    AlreadyRunning { index: String },
    #[error("work unit panicked")]
    WorkUnitPanicked,
    #[error("worker pool is closed")]
    PoolClosed,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexError {
    pub fn sink_status(status: StatusCode, body: String) -> Self {
        IndexError::SinkStatus { status, body }
    }

    /// Whether a re-run of the importer may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexError::Database(_)
                | IndexError::SinkHttp(_)
                | IndexError::SinkStatus { .. }
                | IndexError::BulkItemsFailed { .. }
        )
    }
}
