//! Studio API client and artifact downloader against a local axum server

mod helpers;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use helpers::test_settings;
use sbm_studio::models::SongClip;
use sbm_studio::services::{
    ApiError, ClipDownloader, ClipSource, DownloadOptions, HttpClipDownloader, RateLimitBackoff,
    SunoApiClient,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct MockState {
    /// Answer this many requests with 429 before serving
    throttle: AtomicUsize,
    requests: AtomicUsize,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: u32,
}

fn page_body(prefix: &str, page: u32) -> Value {
    if page >= 3 {
        return json!({ "clips": [] });
    }
    let clips: Vec<Value> = (0..2)
        .map(|i| {
            json!({
                "id": format!("{}-{}-{}", prefix, page, i),
                "title": format!("Track {}", i),
                "audio_url": format!("https://cdn.example/{}-{}.mp3", page, i),
                "metadata": { "tags": "lofi", "duration_formatted": "2:05" }
            })
        })
        .collect();
    json!({ "clips": clips, "num_total_results": 6 })
}

async fn feed(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> impl IntoResponse {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let throttled = state
        .throttle
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if throttled {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "detail": "slow down" })));
    }
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "login" })));
    }
    (StatusCode::OK, Json(page_body("feed", q.page)))
}

async fn profile(AxumPath(name): AxumPath<String>, Query(q): Query<PageQuery>) -> Json<Value> {
    Json(page_body(&name, q.page))
}

async fn clip_by_id(AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "not found" })));
    }
    (StatusCode::OK, Json(json!({ "id": id, "title": "" })))
}

async fn billing() -> Json<Value> {
    Json(json!({ "display_name": "alice", "email": "a@example.com", "total_credits_left": 420 }))
}

async fn audio() -> &'static [u8] {
    b"ID3fake-mp3-bytes"
}

async fn spawn_server(state: Arc<MockState>) -> String {
    let app = Router::new()
        .route("/feed/v2", get(feed))
        .route("/profiles/:name/clips", get(profile))
        .route("/clips/:id", get(clip_by_id))
        .route("/billing/info", get(billing))
        .route("/audio/:file", get(audio))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, token: Option<&str>) -> SunoApiClient {
    SunoApiClient::new(&test_settings(base_url), token.map(str::to_string))
        .unwrap()
        .with_backoff(RateLimitBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(5),
            Duration::from_millis(30),
        ))
}

#[tokio::test]
async fn test_single_429_is_retried_and_backoff_resets() {
    let state = Arc::new(MockState::default());
    state.throttle.store(1, Ordering::SeqCst);
    let api = client(&spawn_server(state.clone()).await, Some("secret"));

    let page = api.fetch_page(&ClipSource::Feed, 0).await.unwrap();

    assert_eq!(page.clips.len(), 2);
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    assert_eq!(api.backoff().current_wait(), api.backoff().base_wait());
}

#[tokio::test]
async fn test_second_429_surfaces_rate_limited() {
    let state = Arc::new(MockState::default());
    state.throttle.store(3, Ordering::SeqCst);
    let api = client(&spawn_server(state.clone()).await, Some("secret"));

    let err = api.fetch_page(&ClipSource::Feed, 0).await.unwrap_err();
    assert!(matches!(err, ApiError::RateLimited(_)));
    assert!(api.backoff().current_wait() > api.backoff().base_wait());

    // Third 429 is retried inline; the 200 after it resets the wait
    let page = api.fetch_page(&ClipSource::Feed, 0).await.unwrap();
    assert_eq!(page.clips.len(), 2);
    assert_eq!(api.backoff().current_wait(), Duration::from_millis(10));
    assert_eq!(state.requests.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_until_set() {
    let state = Arc::new(MockState::default());
    let api = client(&spawn_server(state).await, None);

    let err = api.fetch_page(&ClipSource::Feed, 0).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));

    api.update_session_token(Some("secret".to_string())).await;
    assert!(api.has_session_token().await);
    assert!(api.fetch_page(&ClipSource::Feed, 0).await.is_ok());
}

#[tokio::test]
async fn test_fetch_clips_pages_until_empty() {
    let api = client(&spawn_server(Arc::new(MockState::default())).await, None);

    let clips = api
        .fetch_clips(&ClipSource::profile("@singer"), 0, None, Duration::ZERO)
        .await;
    assert_eq!(clips.len(), 6);
    assert_eq!(clips[0].id, "singer-0-0");
    assert_eq!(clips[0].tags, "lofi");
    assert_eq!(clips[0].duration.as_deref(), Some("2:05"));

    let capped = api
        .fetch_clips(&ClipSource::profile("singer"), 1, Some(1), Duration::ZERO)
        .await;
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].id, "singer-1-0");
}

#[tokio::test]
async fn test_clip_lookups_and_user_info() {
    let api = client(&spawn_server(Arc::new(MockState::default())).await, None);

    let clip = api.fetch_clip("abc").await.unwrap();
    assert_eq!(clip.title, "Unknown");

    let ids = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
    let clips = api.fetch_clips_by_ids(&ids, Duration::ZERO).await;
    let got: Vec<&str> = clips.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(got, vec!["a", "b"]);

    let info = api.get_user_info().await.unwrap();
    assert_eq!(info.username, "alice");
    assert_eq!(info.credits, 420);
}

#[tokio::test]
async fn test_http_downloader_writes_named_file() {
    let base = spawn_server(Arc::new(MockState::default())).await;
    let dir = TempDir::new().unwrap();
    let downloader = HttpClipDownloader::new(
        reqwest::Client::new(),
        DownloadOptions {
            append_id: true,
            save_cover: false,
        },
    );
    let clip = SongClip {
        id: "c1".to_string(),
        title: "Night: Drive?".to_string(),
        audio_url: Some(format!("{}/audio/c1.mp3", base)),
        image_url: None,
        tags: String::new(),
        created_at: None,
        duration: None,
    };

    let first = downloader.download(&clip, dir.path()).await.unwrap();
    let second = downloader.download(&clip, dir.path()).await.unwrap();

    assert_eq!(first.file_name().unwrap(), "Night Drive__ID__c1.mp3");
    assert_eq!(second.file_name().unwrap(), "Night Drive__ID__c1_1.mp3");
    assert_eq!(std::fs::read(&first).unwrap(), b"ID3fake-mp3-bytes");
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "part"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_clip_without_audio_url_fails() {
    let dir = TempDir::new().unwrap();
    let downloader = HttpClipDownloader::new(reqwest::Client::new(), DownloadOptions::default());
    let clip = helpers::clip("x", "No audio");
    let clip = SongClip {
        audio_url: None,
        ..clip
    };
    assert!(downloader.download(&clip, dir.path()).await.is_err());
}
