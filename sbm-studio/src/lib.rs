//! sbm-studio library interface
//!
//! Song batch manager: queue allocation over a shared prompt pool, batch
//! song creation through browser automation, pending-song reconciliation,
//! creation history, and resumable paginated downloads.

pub mod automation;
pub mod config;
pub mod creation;
pub mod error;
pub mod history;
pub mod models;
pub mod queue;
pub mod services;
pub mod transport;

pub use crate::error::{Result, StudioError};

use crate::automation::{DriverFactory, WebDriverFactory};
use crate::config::StudioSettings;
use crate::creation::{ApiClipFeed, BatchSongCreator, CreationTiming, PendingReconciler, QueueRunner};
use crate::history::{DownloadHistoryStore, HistoryStore};
use crate::queue::QueueManager;
use crate::services::{DownloadEngine, DownloadOptions, HttpClipDownloader, SunoApiClient};
use chrono::{DateTime, Utc};
use sbm_common::config::RootFolderInitializer;
use sbm_common::events::EventBus;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Feed pages read per reconciliation pass
const RECONCILE_FEED_PAGES: u32 = 2;

/// State shared by every command handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<StudioSettings>,
    pub queues: Arc<QueueManager>,
    pub history: Arc<HistoryStore>,
    pub downloads: Arc<DownloadHistoryStore>,
    pub api: Arc<SunoApiClient>,
    pub download_engine: Arc<DownloadEngine>,
    pub creator: Arc<BatchSongCreator>,
    pub runner: Arc<QueueRunner>,
    pub reconciler: Arc<PendingReconciler>,
    /// Event bus feeding progress lines to the client
    pub event_bus: EventBus,
    pub profiles_dir: PathBuf,
    pub downloads_dir: PathBuf,
    /// Cancellation tokens of running long operations
    pub operations: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Held while a browser batch or queue run is active
    pub creation_lock: Arc<Mutex<()>>,
    /// Held while a download run is active
    pub download_lock: Arc<Mutex<()>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Wire every component for production use under `root`
    pub fn bootstrap(
        root: &RootFolderInitializer,
        settings: StudioSettings,
        session_token: Option<String>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let settings = settings.normalized();

        let queues = Arc::new(QueueManager::load(&root.queue_state_path())?);
        let history = Arc::new(HistoryStore::load(&root.creation_history_path())?);
        let downloads = Arc::new(DownloadHistoryStore::load(&root.download_history_path())?);
        let api = Arc::new(SunoApiClient::new(&settings, session_token)?);

        let http_client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| StudioError::Internal(format!("HTTP client: {}", e)))?;
        let downloader = Arc::new(HttpClipDownloader::new(
            http_client,
            DownloadOptions {
                append_id: true,
                save_cover: false,
            },
        ));
        let download_engine = Arc::new(
            DownloadEngine::new(downloads.clone(), downloader, settings.download_delay())
                .with_events(event_bus.clone()),
        );

        let feed = Arc::new(ApiClipFeed::new(api.clone(), RECONCILE_FEED_PAGES));
        let reconciler = Arc::new(
            PendingReconciler::new(feed, history.clone(), settings.pending_ttl())
                .with_events(event_bus.clone()),
        );

        let factory: Arc<dyn DriverFactory> = Arc::new(WebDriverFactory::new(settings.clone())?);
        let creator = Arc::new(
            BatchSongCreator::new(
                factory,
                history.clone(),
                settings.create_url.clone(),
                CreationTiming::from_settings(&settings),
            )
            .with_reconciler(reconciler.clone())
            .with_events(event_bus.clone()),
        );
        let runner = Arc::new(
            QueueRunner::new(queues.clone(), creator.clone(), root.profiles_dir())
                .with_events(event_bus.clone()),
        );

        info!(root = %root.root_folder().display(), "Application state initialized");

        AppState::builder()
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
            .profiles_dir(root.profiles_dir())
            .downloads_dir(root.downloads_dir())
            .build()
    }
}

/// Builds an `AppState`, failing on the first missing component
#[derive(Default)]
pub struct AppStateBuilder {
    settings: Option<StudioSettings>,
    queues: Option<Arc<QueueManager>>,
    history: Option<Arc<HistoryStore>>,
    downloads: Option<Arc<DownloadHistoryStore>>,
    api: Option<Arc<SunoApiClient>>,
    download_engine: Option<Arc<DownloadEngine>>,
    creator: Option<Arc<BatchSongCreator>>,
    runner: Option<Arc<QueueRunner>>,
    reconciler: Option<Arc<PendingReconciler>>,
    event_bus: Option<EventBus>,
    profiles_dir: Option<PathBuf>,
    downloads_dir: Option<PathBuf>,
}

impl AppStateBuilder {
    pub fn settings(mut self, settings: StudioSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn queues(mut self, queues: Arc<QueueManager>) -> Self {
        self.queues = Some(queues);
        self
    }

    pub fn history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn downloads(mut self, downloads: Arc<DownloadHistoryStore>) -> Self {
        self.downloads = Some(downloads);
        self
    }

    pub fn api(mut self, api: Arc<SunoApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn download_engine(mut self, engine: Arc<DownloadEngine>) -> Self {
        self.download_engine = Some(engine);
        self
    }

    pub fn creator(mut self, creator: Arc<BatchSongCreator>) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn runner(mut self, runner: Arc<QueueRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn reconciler(mut self, reconciler: Arc<PendingReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn profiles_dir(mut self, dir: PathBuf) -> Self {
        self.profiles_dir = Some(dir);
        self
    }

    pub fn downloads_dir(mut self, dir: PathBuf) -> Self {
        self.downloads_dir = Some(dir);
        self
    }

    pub fn build(self) -> Result<AppState> {
        Ok(AppState {
            settings: Arc::new(self.settings.unwrap_or_default()),
            queues: self.queues.ok_or(StudioError::ManagerMissing("queue manager"))?,
            history: self.history.ok_or(StudioError::ManagerMissing("creation history"))?,
            downloads: self.downloads.ok_or(StudioError::ManagerMissing("download history"))?,
            api: self.api.ok_or(StudioError::ManagerMissing("API client"))?,
            download_engine: self
                .download_engine
                .ok_or(StudioError::ManagerMissing("download engine"))?,
            creator: self.creator.ok_or(StudioError::ManagerMissing("batch creator"))?,
            runner: self.runner.ok_or(StudioError::ManagerMissing("queue runner"))?,
            reconciler: self
                .reconciler
                .ok_or(StudioError::ManagerMissing("pending reconciler"))?,
            event_bus: self.event_bus.unwrap_or_else(|| EventBus::new(256)),
            profiles_dir: self
                .profiles_dir
                .ok_or(StudioError::ManagerMissing("profiles directory"))?,
            downloads_dir: self
                .downloads_dir
                .ok_or(StudioError::ManagerMissing("downloads directory"))?,
            operations: Arc::new(RwLock::new(HashMap::new())),
            creation_lock: Arc::new(Mutex::new(())),
            download_lock: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
        })
    }
}
