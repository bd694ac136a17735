//! Pending song reconciliation
//!
//! A song submitted without an observed song page stays `pending`. Each
//! refresh reads the account's recent clips and hands every pending song to a
//! `PendingResolver`; a resolved song gets a new `success` history record.
//! Songs pending longer than the TTL get a `failed` record instead.
//!
//! A clip id resolves at most one pending song per process run.

use crate::history::HistoryStore;
use crate::models::creation_record::PENDING_EXPIRED_MESSAGE;
use crate::models::{SongClip, SongCreationRecord, SongStatus};
use crate::services::{ApiError, ClipSource, SunoApiClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sbm_common::events::{EventBus, SbmEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A song waiting for its remote id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSong {
    pub id: Uuid,
    pub account_name: String,
    pub title: String,
    pub prompt_index: usize,
    pub queue_id: Option<Uuid>,
    pub registered_at: DateTime<Utc>,
}

/// Recent clips of an account, as seen by that account
#[async_trait]
pub trait ClipFeed: Send + Sync {
    async fn recent_clips(&self, account_name: &str) -> Result<Vec<SongClip>, ApiError>;
}

/// Reads the first pages of an account's own feed
///
/// Only accounts with a known token are read; the active session token may
/// belong to a different account and is never used here.
pub struct ApiClipFeed {
    client: Arc<SunoApiClient>,
    pages: u32,
}

impl ApiClipFeed {
    pub fn new(client: Arc<SunoApiClient>, pages: u32) -> Self {
        Self {
            client,
            pages: pages.max(1),
        }
    }
}

#[async_trait]
impl ClipFeed for ApiClipFeed {
    async fn recent_clips(&self, account_name: &str) -> Result<Vec<SongClip>, ApiError> {
        let Some(token) = self.client.account_token(account_name).await else {
            return Err(ApiError::Unauthorized);
        };
        let mut clips = Vec::new();
        for page in 0..self.pages {
            let result = self.client.fetch_page_as(&ClipSource::Feed, page, &token).await?;
            if result.clips.is_empty() {
                break;
            }
            clips.extend(result.clips);
        }
        Ok(clips)
    }
}

/// Strategy matching one pending song against candidate clips
pub trait PendingResolver: Send + Sync {
    /// Id of the clip that is this song, ignoring ids in `claimed`
    fn resolve(&self, song: &PendingSong, candidates: &[SongClip], claimed: &HashSet<String>) -> Option<String>;
}

/// Exact case-insensitive title equality; first unclaimed match wins
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleMatchResolver;

impl PendingResolver for TitleMatchResolver {
    fn resolve(&self, song: &PendingSong, candidates: &[SongClip], claimed: &HashSet<String>) -> Option<String> {
        let wanted = song.title.trim().to_lowercase();
        candidates
            .iter()
            .filter(|c| !claimed.contains(&c.id))
            .find(|c| c.title.trim().to_lowercase() == wanted)
            .map(|c| c.id.clone())
    }
}

/// Outcome of one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// `(title, song_id)` of each resolved song
    pub resolved: Vec<(String, String)>,
    pub expired: usize,
    pub still_pending: usize,
}

pub struct PendingReconciler {
    feed: Arc<dyn ClipFeed>,
    resolver: Box<dyn PendingResolver>,
    history: Arc<HistoryStore>,
    events: Option<EventBus>,
    ttl: Duration,
    pending: Mutex<Vec<PendingSong>>,
    claimed: Mutex<HashSet<String>>,
}

impl PendingReconciler {
    pub fn new(feed: Arc<dyn ClipFeed>, history: Arc<HistoryStore>, ttl: Duration) -> Self {
        Self {
            feed,
            resolver: Box::new(TitleMatchResolver),
            history,
            events: None,
            ttl,
            pending: Mutex::new(Vec::new()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn PendingResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn register(
        &self,
        account_name: &str,
        title: &str,
        prompt_index: usize,
        queue_id: Option<Uuid>,
    ) -> PendingSong {
        let song = PendingSong {
            id: Uuid::new_v4(),
            account_name: account_name.to_string(),
            title: title.to_string(),
            prompt_index,
            queue_id,
            registered_at: Utc::now(),
        };
        debug!(account = %account_name, title = %title, "Pending song registered");
        self.pending.lock().await.push(song.clone());
        song
    }

    pub async fn pending_songs(&self) -> Vec<PendingSong> {
        self.pending.lock().await.clone()
    }

    /// Forget the pending songs of a removed queue entry
    pub async fn drop_queue(&self, queue_id: Uuid) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|s| s.queue_id != Some(queue_id));
        let dropped = before - pending.len();
        if dropped > 0 {
            info!(queue_id = %queue_id, dropped, "Dropped pending songs of removed queue");
        }
        dropped
    }

    fn emit_status(&self, song: &PendingSong, status: SongStatus, song_id: Option<String>, message: &str) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(SbmEvent::SongStatusChanged {
                operation_id: None,
                account_name: song.account_name.clone(),
                message: message.to_string(),
                percent: 100,
                song_id,
                status,
                title: song.title.clone(),
                prompt_index: Some(song.prompt_index),
                timestamp: Utc::now(),
            });
        }
    }

    async fn record(&self, record: SongCreationRecord) {
        if let Err(e) = self.history.add_creation_record(record).await {
            warn!(error = %e, "Failed to record reconciliation result");
        }
    }

    /// Expire old pending songs, then try to resolve the rest
    pub async fn refresh(&self) -> ReconcileReport {
        let snapshot = self.pending_songs().await;
        let mut report = ReconcileReport::default();
        let mut finished: HashSet<Uuid> = HashSet::new();

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let now = Utc::now();
        let mut live: BTreeMap<String, Vec<&PendingSong>> = BTreeMap::new();
        for song in &snapshot {
            if now - song.registered_at > ttl {
                warn!(account = %song.account_name, title = %song.title, "Pending song expired");
                self.record(
                    SongCreationRecord::new(&song.account_name, &song.title, song.prompt_index, SongStatus::Failed)
                        .with_error(PENDING_EXPIRED_MESSAGE),
                )
                .await;
                self.emit_status(song, SongStatus::Failed, None, PENDING_EXPIRED_MESSAGE);
                finished.insert(song.id);
                report.expired += 1;
            } else {
                live.entry(song.account_name.clone()).or_default().push(song);
            }
        }

        for (account, songs) in live {
            let clips = match self.feed.recent_clips(&account).await {
                Ok(clips) => clips,
                Err(e) => {
                    warn!(account = %account, error = %e, "Cannot read clips for reconciliation");
                    continue;
                }
            };

            let mut claimed = self.claimed.lock().await;
            for song in songs {
                let Some(song_id) = self.resolver.resolve(song, &clips, &claimed) else {
                    continue;
                };
                claimed.insert(song_id.clone());
                info!(account = %account, title = %song.title, song_id = %song_id, "Pending song resolved");
                self.record(
                    SongCreationRecord::new(&song.account_name, &song.title, song.prompt_index, SongStatus::Success)
                        .with_song_id(song_id.clone()),
                )
                .await;
                self.emit_status(song, SongStatus::Success, Some(song_id.clone()), "Resolved pending song");
                finished.insert(song.id);
                report.resolved.push((song.title.clone(), song_id));
            }
        }

        let mut pending = self.pending.lock().await;
        pending.retain(|s| !finished.contains(&s.id));
        report.still_pending = pending.len();
        report
    }
}
