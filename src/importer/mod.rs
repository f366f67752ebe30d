//! Importers: one per search index, sharing a worker pool.
//!
//! Each importer pages through its scopes with a [`BatchCursor`], hands every
//! page to its [`Scheduler`] as a unit of work, and lets the [`BulkBuilder`]
//! turn the page into one bulk request.

pub mod accounts;
pub mod base;
pub mod builder;
pub mod crutch;
pub mod cursor;
pub mod definition;
pub mod instances;
pub mod public_statuses;
pub mod scheduler;
pub mod stats;
pub mod statuses;
pub mod tags;

pub use accounts::Accounts;
pub use base::{ImportState, Importer, ImporterOptions};
pub use builder::{BulkBatch, BulkBuilder};
pub use crutch::Crutches;
pub use cursor::BatchCursor;
pub use definition::{Crutch, IndexDefinition, Scope};
pub use instances::Instances;
pub use public_statuses::PublicStatuses;
pub use scheduler::{DEFAULT_QUEUE_FACTOR, Scheduler, WorkerPool};
pub use stats::{ImportProgress, ProgressSnapshot};
pub use statuses::Statuses;
pub use tags::Tags;

pub type AccountsImporter<S, K> = Importer<Accounts, S, K>;
pub type StatusesImporter<S, K> = Importer<Statuses, S, K>;
pub type PublicStatusesImporter<S, K> = Importer<PublicStatuses, S, K>;
pub type TagsImporter<S, K> = Importer<Tags, S, K>;
pub type InstancesImporter<S, K> = Importer<Instances, S, K>;

/// Index names in the order a full deploy processes them.
pub const INDEX_NAMES: &[&str] = &[
    Accounts::INDEX,
    Tags::INDEX,
    Statuses::INDEX,
    PublicStatuses::INDEX,
    Instances::INDEX,
];
