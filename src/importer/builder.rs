use super::crutch::Crutches;
use super::definition::IndexDefinition;
use crate::error::IndexError;
use crate::search::BulkAction;
use crate::source::RecordSource;
use log::debug;

/// Bulk actions for one page, with the counts reported as progress.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BulkBatch {
    pub actions: Vec<BulkAction>,
    pub indexed: usize,
    pub deleted: usize,
}

impl BulkBatch {
    /// Delete-only batch for document ids that no longer have a record.
    pub fn deletions(ids: Vec<String>) -> Self {
        let deleted = ids.len();
        Self {
            actions: ids.into_iter().map(BulkAction::delete).collect(),
            indexed: 0,
            deleted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Turns a page of record keys into bulk actions.
pub struct BulkBuilder<'a, D, S> {
    definition: &'a D,
    source: &'a S,
}

impl<'a, D, S> BulkBuilder<'a, D, S>
where
    D: IndexDefinition,
    S: RecordSource<D>,
{
    pub fn new(definition: &'a D, source: &'a S) -> Self {
        Self { definition, source }
    }

    /// Load the records, resolve every crutch with one query each, then
    /// emit an index action per indexable record and a delete per stale one.
    /// Keys without a record are skipped.
    pub async fn build(&self, keys: &[D::Key]) -> Result<BulkBatch, IndexError> {
        if keys.is_empty() {
            return Ok(BulkBatch::default());
        }

        let records = self.source.load_records(keys).await?;
        let crutches = self.load_crutches(keys).await?;

        let mut batch = BulkBatch {
            actions: Vec::with_capacity(records.len()),
            ..BulkBatch::default()
        };

        for record in &records {
            let id = D::record_key(record).to_string();
            if self.definition.is_indexable(record, &crutches) {
                let document = serde_json::to_value(self.definition.build_document(record, &crutches))?;
                batch.actions.push(BulkAction::index(id, document));
                batch.indexed += 1;
            } else {
                batch.actions.push(BulkAction::delete(id));
                batch.deleted += 1;
            }
        }

        debug!(
            "{}: built {} actions from {} keys ({} index, {} delete, {} missing)",
            D::INDEX,
            batch.actions.len(),
            keys.len(),
            batch.indexed,
            batch.deleted,
            keys.len().saturating_sub(records.len())
        );

        Ok(batch)
    }

    async fn load_crutches(&self, keys: &[D::Key]) -> Result<Crutches<D::Key>, IndexError> {
        let mut crutches = Crutches::new();
        for crutch in D::CRUTCHES {
            let rows = self.source.fetch_crutch(crutch, keys).await?;
            crutches.insert_rows(crutch.name, rows);
        }
        Ok(crutches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::statuses::Statuses;
    use crate::importer::tags::Tags;
    use crate::test_support::{MemorySource, status, tag};

    #[tokio::test]
    async fn indexes_listable_and_deletes_the_rest() {
        let source = MemorySource::<Tags>::new();
        source.insert(tag(1, "rust"));
        let mut hidden = tag(2, "spam");
        hidden.listable = Some(false);
        source.insert(hidden);
        source.set_crutch_rows("usage", vec![(1, 5)]);

        let batch = BulkBuilder::new(&Tags, &source)
            .build(&[1, 2, 3])
            .await
            .expect("build");

        assert_eq!(batch.indexed, 1);
        assert_eq!(batch.deleted, 1);
        assert_eq!(batch.actions.len(), 2);
        assert_eq!(batch.actions[0].id(), "1");
        assert!(batch.actions[0].is_index());
        assert_eq!(batch.actions[1], BulkAction::delete("2"));

        match &batch.actions[0] {
            BulkAction::Index { document, .. } => assert_eq!(document["usage"], 5),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn one_query_per_crutch() {
        let source = MemorySource::<Statuses>::new();
        for id in 1..=10 {
            source.insert(status(id, 100 + id));
        }

        let keys: Vec<i64> = (1..=10).collect();
        let batch = BulkBuilder::new(&Statuses, &source)
            .build(&keys)
            .await
            .expect("build");

        assert_eq!(batch.indexed, 10);
        assert_eq!(source.record_queries(), 1);
        for crutch in Statuses::CRUTCHES {
            assert_eq!(source.crutch_queries(crutch.name), 1, "{}", crutch.name);
        }
    }

    #[tokio::test]
    async fn crutch_failure_fails_the_batch() {
        let source = MemorySource::<Statuses>::new();
        source.insert(status(1, 10));
        source.fail_crutch("votes");

        let result = BulkBuilder::new(&Statuses, &source).build(&[1]).await;
        assert!(matches!(result, Err(IndexError::Database(_))));
    }

    #[tokio::test]
    async fn empty_page_touches_nothing() {
        let source = MemorySource::<Tags>::new();
        let batch = BulkBuilder::new(&Tags, &source)
            .build(&[])
            .await
            .expect("build");

        assert!(batch.is_empty());
        assert_eq!(source.record_queries(), 0);
    }

    #[test]
    fn deletions_count_every_id() {
        let batch = BulkBatch::deletions(vec!["2".into(), "4".into()]);
        assert_eq!(batch.deleted, 2);
        assert_eq!(batch.indexed, 0);
        assert!(batch.actions.iter().all(BulkAction::is_delete));
    }
}
