pub mod config;
pub mod error;
pub mod importer;
pub mod search;
pub mod source;
pub mod text;

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support;

pub use config::{IndexerConfig, SinkConfig};
pub use error::IndexError;
pub use importer::{
    ImportProgress, ImportState, Importer, ImporterOptions, IndexDefinition, WorkerPool,
};
pub use search::{DocumentSink, ElasticsearchClient};
pub use source::{PgSource, RecordKey, RecordSource};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Install the global logger once; `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();
    });
}
