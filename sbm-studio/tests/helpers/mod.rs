//! Shared test doubles for sbm-studio integration tests
//!
//! - `ScriptedDriver` / `ScriptedFactory`: in-memory browser automation
//! - `FakeFeed`: canned clips for pending reconciliation
//! - Builders for prompts, clips, timing and a full `AppState`

#![allow(dead_code)]

use async_trait::async_trait;
use sbm_common::events::EventBus;
use sbm_studio::automation::selectors;
use sbm_studio::automation::{AutomationDriver, AutomationError, DriverFactory, ElementRect, ElementRef};
use sbm_studio::config::StudioSettings;
use sbm_studio::creation::{
    ApiClipFeed, BatchSongCreator, ClipFeed, CreationTiming, PendingReconciler, QueueRunner,
};
use sbm_studio::history::{DownloadHistoryStore, HistoryStore};
use sbm_studio::models::{Prompt, SongClip};
use sbm_studio::queue::QueueManager;
use sbm_studio::services::{ApiError, DownloadEngine, DownloadOptions, HttpClipDownloader, SunoApiClient};
use sbm_studio::AppState;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const CREATE_URL: &str = "https://suno.com/create";

/// What the scripted browser did
#[derive(Debug, Default)]
pub struct DriverLog {
    /// Tab count of each `open_tabs` call
    pub sessions: Vec<usize>,
    pub switches: usize,
    /// `(xpath, text)` of every `set_text`
    pub texts: Vec<(String, String)>,
    pub submitted_in_tab: bool,
    pub closes: usize,
}

/// Browser double: every selector resolves unless listed in `missing`
#[derive(Default)]
pub struct ScriptedDriver {
    pub missing: HashSet<&'static str>,
    /// After clicking create, the URL becomes `<prefix><tab switch count>`
    pub song_url_prefix: Option<String>,
    /// Cancel this token on the n-th (1-based) tab switch
    pub cancel_on_switch: Option<(usize, CancellationToken)>,
    pub log: Mutex<DriverLog>,
}

impl ScriptedDriver {
    pub fn succeeding() -> Self {
        Self {
            song_url_prefix: Some("https://suno.com/song/song-".to_string()),
            ..Default::default()
        }
    }

    pub fn never_resolving() -> Self {
        Self::default()
    }

    pub fn missing(xpath: &'static str) -> Self {
        let mut driver = Self::succeeding();
        driver.missing.insert(xpath);
        driver
    }

    pub fn sessions(&self) -> Vec<usize> {
        self.log.lock().unwrap().sessions.clone()
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn open_tabs(&self, _url: &str, count: usize) -> Result<Vec<String>, AutomationError> {
        let mut log = self.log.lock().unwrap();
        log.sessions.push(count);
        let session = log.sessions.len();
        Ok((0..count).map(|i| format!("s{}-tab{}", session, i)).collect())
    }

    async fn switch_to_tab(&self, _handle: &str) -> Result<(), AutomationError> {
        let switches = {
            let mut log = self.log.lock().unwrap();
            log.switches += 1;
            log.submitted_in_tab = false;
            log.switches
        };
        if let Some((n, token)) = &self.cancel_on_switch {
            if *n == switches {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn find_element(&self, xpath: &str, _wait: Duration) -> Result<ElementRef, AutomationError> {
        if self.missing.contains(xpath) {
            return Err(AutomationError::ElementNotFound(xpath.to_string()));
        }
        Ok(ElementRef(xpath.to_string()))
    }

    async fn find_elements(&self, xpath: &str) -> Result<Vec<ElementRef>, AutomationError> {
        if self.missing.contains(xpath) {
            return Ok(Vec::new());
        }
        Ok(vec![ElementRef(xpath.to_string())])
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        if element.0 == selectors::CREATE_BUTTON {
            self.log.lock().unwrap().submitted_in_tab = true;
        }
        Ok(())
    }

    async fn set_text(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError> {
        self.log
            .lock()
            .unwrap()
            .texts
            .push((element.0.clone(), text.to_string()));
        Ok(())
    }

    async fn text(&self, _element: &ElementRef) -> Result<String, AutomationError> {
        Ok(String::new())
    }

    async fn attribute(&self, _element: &ElementRef, _name: &str) -> Result<Option<String>, AutomationError> {
        Ok(None)
    }

    async fn rect(&self, _element: &ElementRef) -> Result<ElementRect, AutomationError> {
        Ok(ElementRect {
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 10.0,
        })
    }

    async fn drag_by(&self, _element: &ElementRef, _x_offset: i64) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn execute_script(&self, _script: &str, _args: Vec<Value>) -> Result<Value, AutomationError> {
        Ok(json!({ "ok": true }))
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        let log = self.log.lock().unwrap();
        match (&self.song_url_prefix, log.submitted_in_tab) {
            (Some(prefix), true) => Ok(format!("{}{}", prefix, log.switches)),
            _ => Ok(CREATE_URL.to_string()),
        }
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Hands out the same scripted driver on every launch
pub struct ScriptedFactory {
    pub driver: Arc<ScriptedDriver>,
    pub fail_launch: bool,
    pub launches: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(driver: ScriptedDriver) -> Self {
        Self {
            driver: Arc::new(driver),
            fail_launch: false,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(ScriptedDriver::default())
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn launch(&self, _profile_dir: &Path) -> Result<Arc<dyn AutomationDriver>, AutomationError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(AutomationError::Session("chromedriver not running".to_string()));
        }
        Ok(self.driver.clone())
    }
}

/// Clip feed serving a fixed list
#[derive(Default)]
pub struct FakeFeed {
    pub clips: Mutex<Vec<SongClip>>,
}

impl FakeFeed {
    pub fn with(clips: Vec<SongClip>) -> Self {
        Self {
            clips: Mutex::new(clips),
        }
    }

    pub fn set(&self, clips: Vec<SongClip>) {
        *self.clips.lock().unwrap() = clips;
    }
}

#[async_trait]
impl ClipFeed for FakeFeed {
    async fn recent_clips(&self, _account_name: &str) -> Result<Vec<SongClip>, ApiError> {
        Ok(self.clips.lock().unwrap().clone())
    }
}

pub fn prompts(n: usize) -> Vec<Prompt> {
    (0..n)
        .map(|i| Prompt::new(format!("Song {}", i), format!("lyrics {}", i), "synthwave"))
        .collect()
}

pub fn clip(id: &str, title: &str) -> SongClip {
    SongClip {
        id: id.to_string(),
        title: title.to_string(),
        audio_url: Some(format!("https://cdn.example/{}.mp3", id)),
        image_url: None,
        tags: String::new(),
        created_at: None,
        duration: None,
    }
}

/// No pauses; `creation_timeout` bounds the submit wait
pub fn instant_timing(creation_timeout: Duration) -> CreationTiming {
    CreationTiming {
        element_wait: Duration::from_millis(10),
        creation_timeout,
        submit_delay_ms: (0, 0),
        human_delay_ms: (0, 0),
        tab_settle: Duration::ZERO,
        form_pause: Duration::ZERO,
    }
}

/// Settings pointing every remote endpoint at `base_url`, without pacing
pub fn test_settings(base_url: &str) -> StudioSettings {
    StudioSettings {
        api_base_url: base_url.to_string(),
        min_request_interval_ms: 0,
        download_delay_secs: 0,
        ..Default::default()
    }
}

/// Full application state over a temp root and a scripted browser
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub factory: Arc<ScriptedFactory>,
}

impl TestApp {
    pub fn profile_dir(&self, account: &str) -> PathBuf {
        self.state.profiles_dir.join(account)
    }

    pub fn create_profile(&self, account: &str) {
        std::fs::create_dir_all(self.profile_dir(account)).unwrap();
    }
}

pub fn test_app(driver: ScriptedDriver) -> TestApp {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let data = root.join("data");
    std::fs::create_dir_all(&data).unwrap();

    let settings = test_settings("http://127.0.0.1:9");
    let event_bus = EventBus::new(256);

    let queues = Arc::new(QueueManager::load(&data.join("queue_state.json")).unwrap());
    let history = Arc::new(HistoryStore::load(&data.join("song_creation_history.json")).unwrap());
    let downloads = Arc::new(DownloadHistoryStore::load(&data.join("download_history.json")).unwrap());
    let api = Arc::new(SunoApiClient::new(&settings, None).unwrap());

    let downloader = Arc::new(HttpClipDownloader::new(reqwest::Client::new(), DownloadOptions::default()));
    let download_engine = Arc::new(
        DownloadEngine::new(downloads.clone(), downloader, Duration::ZERO).with_events(event_bus.clone()),
    );
    let reconciler = Arc::new(
        PendingReconciler::new(
            Arc::new(ApiClipFeed::new(api.clone(), 1)),
            history.clone(),
            Duration::from_secs(3600),
        )
        .with_events(event_bus.clone()),
    );

    let factory = Arc::new(ScriptedFactory::new(driver));
    let creator = Arc::new(
        BatchSongCreator::new(
            factory.clone(),
            history.clone(),
            CREATE_URL,
            instant_timing(Duration::from_millis(50)),
        )
        .with_reconciler(reconciler.clone())
        .with_events(event_bus.clone()),
    );
    let profiles_dir = root.join("profiles");
    let runner = Arc::new(
        QueueRunner::new(queues.clone(), creator.clone(), profiles_dir.clone()).with_events(event_bus.clone()),
    );

    let state = AppState::builder()
        .settings(settings)
        .queues(queues)
        .history(history)
        .downloads(downloads)
        .api(api)
        .download_engine(download_engine)
        .creator(creator)
        .runner(runner)
        .reconciler(reconciler)
        .event_bus(event_bus)
        .profiles_dir(profiles_dir)
        .downloads_dir(root.join("downloads"))
        .build()
        .unwrap();

    TestApp { dir, state, factory }
}
