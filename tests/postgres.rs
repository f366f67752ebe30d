use std::sync::Arc;

use search_indexer::importer::{
    Accounts, ImportProgress, Importer, ImporterOptions, IndexDefinition, Instances,
    ProgressSnapshot, PublicStatuses, Statuses, Tags, WorkerPool,
};
use search_indexer::source::{PgSource, RecordSource};
use search_indexer::test_support::{MemorySink, TestDatabase, TestDatabaseError};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgRow;

async fn database() -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping postgres integration test: no container runtime ({err})");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

async fn import_and_clean_up<D>(
    pool: &PgPool,
    definition: D,
    sink: &Arc<MemorySink>,
    batch_size: usize,
) -> ProgressSnapshot
where
    D: IndexDefinition,
    D::Record: for<'r> sqlx::FromRow<'r, PgRow> + Unpin,
{
    let progress = ImportProgress::new();
    let importer = Importer::new(
        definition,
        Arc::new(PgSource::<D>::new(pool.clone())),
        Arc::clone(sink),
        Arc::new(WorkerPool::new(2, 2)),
        ImporterOptions {
            batch_size,
            ..ImporterOptions::default()
        },
    );
    importer.on_progress(progress.progress_callback());
    importer.on_failure(progress.failure_callback(D::INDEX));

    importer.import().await.expect("import");
    importer.clean_up().await.expect("clean up");

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.failed, 0, "{} units failed", D::INDEX);
    snapshot
}

#[tokio::test]
async fn tags_are_weighted_by_recent_usage() {
    let Some(db) = database().await else {
        return;
    };

    db.seed(
        "INSERT INTO tags (id, name, listable) VALUES
            (1, 'rust', TRUE), (2, 'spam', FALSE), (3, 'postgres', NULL);
        INSERT INTO statuses (id, account_id, local, created_at, deleted_at) VALUES
            (10, 100, TRUE, now(), NULL),
            (11, 101, TRUE, now(), NULL),
            (12, 100, TRUE, now(), NULL),
            (13, 102, TRUE, now(), now()),
            (14, 103, TRUE, now() - interval '30 days', NULL);
        INSERT INTO statuses_tags (status_id, tag_id) VALUES
            (10, 1), (11, 1), (12, 1), (12, 3), (13, 1), (14, 1);
        ANALYZE tags;",
    )
    .await
    .expect("seed tags");

    let source = PgSource::<Tags>::new(db.pool_clone());
    assert_eq!(source.count_estimate().await.expect("estimate"), 3);

    let sink = Arc::new(MemorySink::new());
    sink.insert_document("tags", "2", json!({ "name": "spam" }));
    sink.insert_document("tags", "99", json!({ "name": "deleted" }));

    let snapshot = import_and_clean_up(db.pool(), Tags, &sink, 2).await;

    assert_eq!(snapshot.indexed, 2);
    assert_eq!(snapshot.deleted, 2);
    assert_eq!(sink.document_ids("tags"), vec!["1", "3"]);
    assert_eq!(sink.document("tags", "1").expect("tag 1")["usage"], 2);
    assert_eq!(sink.document("tags", "3").expect("tag 3")["usage"], 1);

    db.close().await.expect("close database");
}

const STATUSES_FIXTURE: &str = "
    INSERT INTO accounts (id, username, domain, indexable) VALUES
        (1, 'alice', NULL, TRUE),
        (2, 'bob', NULL, FALSE),
        (3, 'carol', 'remote.example', TRUE);
    INSERT INTO statuses (id, account_id, local, uri, text, reblog_of_id, poll_id, deleted_at) VALUES
        (100, 1, TRUE, NULL, '<p>Hello <b>world</b></p>', NULL, NULL, NULL),
        (101, 3, FALSE, 'https://remote.example/101', 'mention', NULL, NULL, NULL),
        (102, 3, FALSE, 'https://remote.example/102', 'favourite', NULL, NULL, NULL),
        (103, 3, FALSE, 'https://remote.example/103', 'poll', NULL, 800, NULL),
        (104, 3, FALSE, 'https://remote.example/104', 'unseen', NULL, NULL, NULL),
        (105, 1, TRUE, NULL, '', 102, NULL, NULL),
        (106, 1, TRUE, NULL, 'gone', NULL, NULL, now());
    INSERT INTO tags (id, name) VALUES (1, 'rust');
    INSERT INTO statuses_tags (status_id, tag_id) VALUES (100, 1);
    INSERT INTO media_attachments (id, status_id, type) VALUES (1, 100, 0);
    INSERT INTO mentions (id, status_id, account_id) VALUES (500, 101, 2);
    INSERT INTO favourites (id, status_id, account_id) VALUES (600, 102, 2);
    INSERT INTO bookmarks (id, status_id, account_id) VALUES (700, 102, 1);
    INSERT INTO polls (id, status_id, account_id) VALUES (800, 103, 3);
    INSERT INTO poll_votes (id, poll_id, account_id) VALUES (900, 800, 1);";

#[tokio::test]
async fn statuses_follow_local_interactions() {
    let Some(db) = database().await else {
        return;
    };
    db.seed(STATUSES_FIXTURE).await.expect("seed statuses");

    let sink = Arc::new(MemorySink::new());
    sink.insert_document("statuses", "999", json!({}));

    let snapshot = import_and_clean_up(db.pool(), Statuses, &sink, 10).await;

    // 102 is reached through the reblog, the favourite and the bookmark
    assert_eq!(snapshot.indexed, 6);
    // 106 is deleted, 999 has no record
    assert_eq!(snapshot.deleted, 2);
    assert_eq!(
        sink.document_ids("statuses"),
        vec!["100", "101", "102", "103"]
    );

    let own = sink.document("statuses", "100").expect("status 100");
    assert_eq!(own["searchable_by"], json!([1]));
    assert_eq!(own["tags"], json!(["rust"]));
    assert_eq!(own["properties"], json!(["image", "media"]));
    let text = own["text"].as_str().expect("text");
    assert!(text.contains("Hello") && text.contains("world"));
    assert!(!text.contains('<'));

    let mentioned = sink.document("statuses", "101").expect("status 101");
    assert_eq!(mentioned["searchable_by"], json!([2]));
    let shared = sink.document("statuses", "102").expect("status 102");
    assert_eq!(shared["searchable_by"], json!([1, 2]));
    let voted = sink.document("statuses", "103").expect("status 103");
    assert_eq!(voted["searchable_by"], json!([1]));
    assert_eq!(voted["properties"], json!(["poll"]));

    db.close().await.expect("close database");
}

#[tokio::test]
async fn public_statuses_need_an_indexable_author() {
    let Some(db) = database().await else {
        return;
    };
    db.seed(STATUSES_FIXTURE).await.expect("seed statuses");
    db.seed("UPDATE statuses SET visibility = 1 WHERE id = 102")
        .await
        .expect("make 102 unlisted");

    let sink = Arc::new(MemorySink::new());
    sink.insert_document("public_statuses", "102", json!({}));

    let snapshot = import_and_clean_up(db.pool(), PublicStatuses, &sink, 10).await;

    assert_eq!(snapshot.deleted, 1);
    assert_eq!(
        sink.document_ids("public_statuses"),
        vec!["100", "101", "103", "104"]
    );
    let document = sink.document("public_statuses", "100").expect("status 100");
    assert!(document.get("searchable_by").is_none());

    db.close().await.expect("close database");
}

#[tokio::test]
async fn accounts_skip_unapproved_suspended_and_moved() {
    let Some(db) = database().await else {
        return;
    };

    db.seed(
        "INSERT INTO accounts (id, username, domain, actor_type, discoverable, suspended_at, moved_to_account_id) VALUES
            (1, 'alice', NULL, 'Person', TRUE, NULL, NULL),
            (2, 'bob', NULL, 'Person', NULL, NULL, NULL),
            (3, 'carol', 'remote.example', 'Service', NULL, NULL, NULL),
            (4, 'dave', 'remote.example', 'Person', NULL, now(), NULL),
            (5, 'erin', NULL, 'Person', NULL, NULL, 1);
        INSERT INTO users (account_id, approved) VALUES (1, TRUE), (2, FALSE), (5, TRUE);
        INSERT INTO account_stats (account_id, followers_count, following_count) VALUES (1, 5, 7);",
    )
    .await
    .expect("seed accounts");

    let sink = Arc::new(MemorySink::new());
    sink.insert_document("accounts", "4", json!({ "username": "dave@remote.example" }));

    let snapshot = import_and_clean_up(db.pool(), Accounts, &sink, 2).await;

    assert_eq!(snapshot.indexed, 2);
    assert_eq!(snapshot.deleted, 1);
    assert_eq!(sink.document_ids("accounts"), vec!["1", "3"]);

    let alice = sink.document("accounts", "1").expect("account 1");
    assert_eq!(alice["username"], "alice");
    assert_eq!(alice["followers_count"], 5);
    assert_eq!(alice["following_count"], 7);
    assert_eq!(alice["properties"], json!(["discoverable", "local"]));

    let carol = sink.document("accounts", "3").expect("account 3");
    assert_eq!(carol["username"], "carol@remote.example");
    assert_eq!(carol["properties"], json!(["bot"]));

    db.close().await.expect("close database");
}

#[tokio::test]
async fn blocked_instances_leave_the_index() {
    let Some(db) = database().await else {
        return;
    };

    db.seed(
        "INSERT INTO instances (domain, accounts_count) VALUES
            ('alive.example', 3), ('blocked.example', 7);
        INSERT INTO domain_blocks (domain) VALUES ('blocked.example');",
    )
    .await
    .expect("seed instances");

    let sink = Arc::new(MemorySink::new());
    sink.insert_document("instances", "blocked.example", json!({}));
    sink.insert_document("instances", "gone.example", json!({}));

    let snapshot = import_and_clean_up(db.pool(), Instances, &sink, 10).await;

    assert_eq!(snapshot.indexed, 1);
    assert_eq!(snapshot.deleted, 2);
    assert_eq!(sink.document_ids("instances"), vec!["alive.example"]);
    assert_eq!(
        sink.document("instances", "alive.example").expect("instance")["accounts_count"],
        3
    );

    db.close().await.expect("close database");
}
