//! Pending song reconciliation: resolution, claiming and expiry

mod helpers;

use axum::extract::Query;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use helpers::{clip, test_settings, FakeFeed};
use sbm_common::events::{EventBus, SbmEvent, SongStatus};
use sbm_studio::creation::{ApiClipFeed, ClipFeed, PendingReconciler, PendingResolver, PendingSong};
use sbm_studio::history::HistoryStore;
use sbm_studio::models::creation_record::PENDING_EXPIRED_MESSAGE;
use sbm_studio::models::SongClip;
use sbm_studio::services::SunoApiClient;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

fn setup_with_feed(feed: Arc<dyn ClipFeed>) -> (TempDir, Arc<HistoryStore>, PendingReconciler) {
    let dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryStore::load(&dir.path().join("history.json")).unwrap());
    let reconciler = PendingReconciler::new(feed, history.clone(), Duration::from_secs(3600));
    (dir, history, reconciler)
}

fn setup(feed: Arc<FakeFeed>, ttl: Duration) -> (TempDir, Arc<HistoryStore>, PendingReconciler) {
    let dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryStore::load(&dir.path().join("history.json")).unwrap());
    let reconciler = PendingReconciler::new(feed, history.clone(), ttl);
    (dir, history, reconciler)
}

#[tokio::test]
async fn test_pending_song_resolves_by_title() {
    let feed = Arc::new(FakeFeed::default());
    let (_dir, history, reconciler) = setup(feed.clone(), Duration::from_secs(3600));
    reconciler.register("alice", "Night Drive", 4, None).await;

    // Not visible yet
    let report = reconciler.refresh().await;
    assert!(report.resolved.is_empty());
    assert_eq!(report.still_pending, 1);

    feed.set(vec![clip("other", "Morning"), clip("nd-1", "night drive")]);
    let report = reconciler.refresh().await;
    assert_eq!(report.resolved, vec![("Night Drive".to_string(), "nd-1".to_string())]);
    assert_eq!(report.still_pending, 0);

    let records = history.get_all_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, SongStatus::Success);
    assert_eq!(records[0].song_id, "nd-1");
    assert_eq!(records[0].prompt_index, 4);
}

#[tokio::test]
async fn test_duplicate_titles_claim_distinct_clips() {
    let feed = Arc::new(FakeFeed::with(vec![clip("e1", "Echo"), clip("e2", "Echo")]));
    let (_dir, _history, reconciler) = setup(feed, Duration::from_secs(3600));
    reconciler.register("alice", "Echo", 0, None).await;
    reconciler.register("alice", "Echo", 1, None).await;
    reconciler.register("alice", "Echo", 2, None).await;

    let report = reconciler.refresh().await;
    let ids: HashSet<String> = report.resolved.iter().map(|(_, id)| id.clone()).collect();
    assert_eq!(ids, HashSet::from(["e1".to_string(), "e2".to_string()]));
    assert_eq!(report.still_pending, 1);

    // Claimed ids are not handed out again
    let report = reconciler.refresh().await;
    assert!(report.resolved.is_empty());
    assert_eq!(report.still_pending, 1);
}

#[tokio::test]
async fn test_expired_pending_song_is_marked_failed() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let feed = Arc::new(FakeFeed::with(vec![clip("late", "Slow Burn")]));
    let (_dir, history, reconciler) = setup(feed, Duration::ZERO);
    let reconciler = reconciler.with_events(bus);

    reconciler.register("alice", "Slow Burn", 9, None).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = reconciler.refresh().await;

    assert_eq!(report.expired, 1);
    assert!(report.resolved.is_empty());
    let records = history.get_all_records().await;
    assert_eq!(records[0].status, SongStatus::Failed);
    assert_eq!(records[0].error_message.as_deref(), Some(PENDING_EXPIRED_MESSAGE));

    match rx.try_recv().unwrap() {
        SbmEvent::SongStatusChanged { status, title, .. } => {
            assert_eq!(status, SongStatus::Failed);
            assert_eq!(title, "Slow Burn");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_drop_queue_forgets_its_pending_songs() {
    let (_dir, _history, reconciler) = setup(Arc::new(FakeFeed::default()), Duration::from_secs(3600));
    let queue_id = Uuid::new_v4();
    reconciler.register("alice", "A", 0, Some(queue_id)).await;
    reconciler.register("alice", "B", 1, Some(queue_id)).await;
    reconciler.register("bob", "C", 2, None).await;

    assert_eq!(reconciler.drop_queue(queue_id).await, 2);
    let left = reconciler.pending_songs().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].title, "C");
}

/// Resolves by prompt order: the n-th pending song gets the n-th newest clip
struct NewestFirstResolver;

impl PendingResolver for NewestFirstResolver {
    fn resolve(&self, _song: &PendingSong, candidates: &[SongClip], claimed: &HashSet<String>) -> Option<String> {
        candidates.iter().find(|c| !claimed.contains(&c.id)).map(|c| c.id.clone())
    }
}

#[tokio::test]
async fn test_resolver_is_pluggable() {
    let feed = Arc::new(FakeFeed::with(vec![clip("x9", "Renamed"), clip("x8", "Also renamed")]));
    let (_dir, _history, reconciler) = setup(feed, Duration::from_secs(3600));
    let reconciler = reconciler.with_resolver(Box::new(NewestFirstResolver));
    reconciler.register("alice", "Original title", 0, None).await;

    let report = reconciler.refresh().await;
    assert_eq!(report.resolved, vec![("Original title".to_string(), "x9".to_string())]);
}

/// Feed whose clips depend on the bearer token: each account sees only its own songs
async fn spawn_account_feed() -> String {
    async fn feed(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        let page = q.get("page").map(String::as_str).unwrap_or("0");
        let bearer = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default();
        let clips = match (bearer, page) {
            ("Bearer tok-alice", "0") => json!([{ "id": "a1", "title": "Echo" }, { "id": "a2", "title": "Echo" }]),
            ("Bearer tok-bob", "0") => json!([{ "id": "b1", "title": "Echo" }]),
            _ => json!([]),
        };
        Json(json!({ "clips": clips }))
    }

    let app = Router::new().route("/feed/v2", get(feed));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_pending_songs_resolve_only_against_their_own_account() {
    // Given: alice and bob each wait on an "Echo", and only alice's token is known
    let api = Arc::new(SunoApiClient::new(&test_settings(&spawn_account_feed().await), None).unwrap());
    api.set_account_token("alice", Some("tok-alice".to_string())).await;
    api.update_session_token(Some("tok-alice".to_string())).await;
    let (_dir, history, reconciler) = setup_with_feed(Arc::new(ApiClipFeed::new(api.clone(), 2)));
    reconciler.register("alice", "Echo", 0, None).await;
    reconciler.register("bob", "Echo", 1, None).await;

    // When: reconciling
    let report = reconciler.refresh().await;

    // Then: bob is not matched to alice's second clip
    assert_eq!(report.resolved, vec![("Echo".to_string(), "a1".to_string())]);
    assert_eq!(report.still_pending, 1);
    assert!(history.get_records_by_account("bob").await.is_empty());

    // And: once bob's own token is known, bob resolves to bob's clip
    api.set_account_token("bob", Some("tok-bob".to_string())).await;
    let report = reconciler.refresh().await;
    assert_eq!(report.resolved, vec![("Echo".to_string(), "b1".to_string())]);
    let bob = history.get_records_by_account("bob").await;
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].song_id, "b1");
}

