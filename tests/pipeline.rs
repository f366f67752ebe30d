use std::sync::Arc;

use search_indexer::importer::{
    ImportProgress, ImportState, Importer, ImporterOptions, IndexDefinition, Statuses, Tags,
    WorkerPool,
};
use search_indexer::search::BulkAction;
use search_indexer::test_support::{MemorySink, MemorySource, status, tag};

fn options(batch_size: usize) -> ImporterOptions {
    ImporterOptions {
        batch_size,
        index_prefix: None,
        import_refresh_interval: "-1".to_string(),
    }
}

fn tags_importer(
    source: &Arc<MemorySource<Tags>>,
    sink: &Arc<MemorySink>,
    progress: &Arc<ImportProgress>,
) -> Importer<Tags, MemorySource<Tags>, MemorySink> {
    let importer = Importer::new(
        Tags,
        Arc::clone(source),
        Arc::clone(sink),
        Arc::new(WorkerPool::new(2, 10)),
        options(2),
    );
    importer.on_progress(progress.progress_callback());
    importer.on_failure(progress.failure_callback("tags"));
    importer
}

#[tokio::test]
async fn pages_become_one_bulk_request_each() {
    let source = Arc::new(MemorySource::new());
    for id in 1..=4 {
        source.insert(tag(id, &format!("tag{}", id)));
    }
    // unlisted after its page was read
    let mut unlisted = tag(4, "tag4");
    unlisted.listable = Some(false);
    source.insert(unlisted);
    source.set_crutch_rows("usage", vec![(1, 3), (3, 1)]);

    let sink = Arc::new(MemorySink::new());
    sink.insert_document("tags", "4", serde_json::json!({ "name": "tag4" }));
    let progress = ImportProgress::new();
    let importer = tags_importer(&source, &sink, &progress);

    importer.import().await.expect("import");

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.indexed, 3);
    assert_eq!(snapshot.deleted, 1);
    assert_eq!(snapshot.failed, 0);
    assert_eq!(importer.state(), ImportState::Completed);

    let mut calls = sink.bulk_calls();
    assert_eq!(calls.len(), 2);
    calls.sort_by(|a, b| a.1[0].id().cmp(b.1[0].id()));
    let ids: Vec<Vec<&str>> = calls
        .iter()
        .map(|(_, actions)| actions.iter().map(BulkAction::id).collect())
        .collect();
    assert_eq!(ids, vec![vec!["1", "2"], vec!["3", "4"]]);
    assert!(calls[1].1[1].is_delete());

    assert_eq!(sink.document_ids("tags"), vec!["1", "2", "3"]);
    assert_eq!(sink.document("tags", "1").expect("doc 1")["usage"], 3);
    assert_eq!(sink.document("tags", "2").expect("doc 2")["usage"], 0);
}

#[tokio::test]
async fn reimport_without_changes_is_idempotent() {
    let source = Arc::new(MemorySource::new());
    for id in 1..=7 {
        source.insert(tag(id, "same"));
    }
    let sink = Arc::new(MemorySink::new());
    let progress = ImportProgress::new();
    let importer = tags_importer(&source, &sink, &progress);

    importer.import().await.expect("first import");
    let first: Vec<_> = sink
        .document_ids("tags")
        .into_iter()
        .map(|id| (id.clone(), sink.document("tags", &id)))
        .collect();

    progress.reset();
    importer.import().await.expect("second import");
    let second: Vec<_> = sink
        .document_ids("tags")
        .into_iter()
        .map(|id| (id.clone(), sink.document("tags", &id)))
        .collect();

    assert_eq!(first, second);
    assert_eq!(progress.snapshot().indexed, 7);
}

#[tokio::test]
async fn every_scoped_key_is_indexed_or_deleted() {
    let source = Arc::new(MemorySource::new());
    for id in 1..=25 {
        let mut record = tag(id, "t");
        record.listable = (id % 3 != 0).then_some(true).or(Some(false));
        source.insert(record);
    }
    let sink = Arc::new(MemorySink::new());
    let progress = ImportProgress::new();
    let importer = tags_importer(&source, &sink, &progress);

    importer.import().await.expect("import");

    let mut seen: Vec<String> = sink
        .bulk_calls()
        .into_iter()
        .flat_map(|(_, actions)| actions.into_iter().map(|a| a.id().to_string()))
        .collect();
    seen.sort_by_key(|id| id.parse::<i64>().unwrap_or_default());
    let expected: Vec<String> = (1..=25).map(|id| id.to_string()).collect();
    assert_eq!(seen, expected);

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.indexed + snapshot.deleted, 25);
    assert_eq!(snapshot.deleted, 8);
}

#[tokio::test]
async fn failed_pages_do_not_stop_the_rest() {
    let source = Arc::new(MemorySource::new());
    for id in 1..=6 {
        source.insert(tag(id, "t"));
    }
    let sink = Arc::new(MemorySink::new());
    sink.reject_document("tags", "3", "mapper_parsing_exception");
    let progress = ImportProgress::new();
    let importer = tags_importer(&source, &sink, &progress);

    importer.import().await.expect("cursor completes");

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.indexed, 4);
    assert_eq!(importer.state(), ImportState::Failed);
    assert_eq!(sink.document_ids("tags"), vec!["1", "2", "4", "5", "6"]);
}

#[tokio::test]
async fn unavailable_sink_reports_each_unit() {
    let source = Arc::new(MemorySource::new());
    for id in 1..=4 {
        source.insert(tag(id, "t"));
    }
    let sink = Arc::new(MemorySink::new());
    sink.fail_next_bulks(1);
    let progress = ImportProgress::new();
    let importer = tags_importer(&source, &sink, &progress);

    importer.import().await.expect("cursor completes");

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.indexed, 2);
}

#[tokio::test]
async fn statuses_are_collected_from_every_scope() {
    let source = Arc::new(MemorySource::<Statuses>::new());

    // local post by 10
    source.insert(status(1, 10));
    // remote post mentioning local 20
    let mut mentioned = status(2, 90);
    mentioned.local = false;
    source.insert(mentioned);
    // remote post favourited by local 21
    let mut favourited = status(3, 91);
    favourited.local = false;
    source.insert(favourited);
    // remote post nobody local cares about
    let mut ignored = status(4, 92);
    ignored.local = false;
    source.insert(ignored);

    source.set_scope_rows("local_statuses", vec![(1, 1)]);
    source.set_scope_rows("local_mentions", vec![(100, 2)]);
    source.set_scope_rows("local_favourites", vec![(200, 3), (201, 1)]);
    source.set_scope_rows("local_votes", vec![(300, 4)]);
    source.set_crutch_rows("mentions", vec![(2, 20)]);
    source.set_crutch_rows("favourites", vec![(3, 21), (1, 21)]);

    let sink = Arc::new(MemorySink::new());
    let progress = ImportProgress::new();
    let importer = Importer::new(
        Statuses,
        Arc::clone(&source),
        Arc::clone(&sink),
        Arc::new(WorkerPool::new(3, 10)),
        options(10),
    );
    importer.on_progress(progress.progress_callback());

    importer.import().await.expect("import");

    // status 1 appears in two scopes and is written twice
    let snapshot = progress.snapshot();
    assert_eq!(snapshot.indexed, 4);
    assert_eq!(snapshot.deleted, 1);
    assert_eq!(sink.document_ids("statuses"), vec!["1", "2", "3"]);

    let local = sink.document("statuses", "1").expect("status 1");
    assert_eq!(local["searchable_by"], serde_json::json!([10, 21]));
    let remote = sink.document("statuses", "2").expect("status 2");
    assert_eq!(remote["searchable_by"], serde_json::json!([20]));

    assert_eq!(source.page_queries(), Statuses::SCOPES.len());
}
