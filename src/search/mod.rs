//! Search engine side of the pipeline: bulk encoding, the sink interface,
//! the HTTP client and scroll iteration.

pub mod bulk;
pub mod client;
pub mod scroll;
pub mod sink;

pub use bulk::{BulkAction, BulkItemFailure, BulkResponse};
pub use client::ElasticsearchClient;
pub use scroll::ScrollBatches;
pub use sink::{DocumentSink, ScrollPage};
