//! Paginated download engine
//!
//! Walks a remote clip collection one page at a time, skips clips already in
//! the account's dedup set, downloads the rest and records each success
//! before moving on. The page cursor is persisted after every fully
//! processed page so the next run resumes where this one stopped.

use super::file_downloader::ClipDownloader;
use super::suno_client::{ApiError, ClipSource, SunoApiClient};
use crate::history::DownloadHistoryStore;
use crate::models::{ClipPage, SongClip};
use async_trait::async_trait;
use chrono::Utc;
use sbm_common::events::{DownloadOutcome, EventBus, SbmEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A paginated remote collection
#[async_trait]
pub trait ClipPageSource: Send + Sync {
    /// Identity stored with the resume cursor (`profile:<name>` or `feed`)
    fn identity(&self) -> String;

    async fn fetch_page(&self, page: u32) -> Result<ClipPage, ApiError>;
}

/// Page source backed by the studio API client
pub struct ApiPageSource {
    client: Arc<SunoApiClient>,
    source: ClipSource,
}

impl ApiPageSource {
    pub fn new(client: Arc<SunoApiClient>, source: ClipSource) -> Self {
        Self { client, source }
    }
}

#[async_trait]
impl ClipPageSource for ApiPageSource {
    fn identity(&self) -> String {
        self.source.identity()
    }

    async fn fetch_page(&self, page: u32) -> Result<ClipPage, ApiError> {
        self.client.fetch_page(&self.source, page).await
    }
}

/// Counters for one download run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub success: usize,
    pub skipped: usize,
    /// Clips whose download or history write failed
    pub failed: usize,
    /// Pages fetched (including a final empty page)
    pub pages: u32,
    /// Page fetches that failed; a failed fetch ends the run
    #[serde(default)]
    pub page_errors: u32,
}

impl DownloadStats {
    fn processed(&self) -> usize {
        self.success + self.skipped
    }
}

/// Parameters of one paginated run
#[derive(Debug, Clone)]
pub struct PaginatedDownloadRequest {
    pub operation_id: Uuid,
    pub account_name: String,
    pub dest_dir: PathBuf,
    /// Explicit start page; `None` resumes from the stored cursor
    pub start_page: Option<u32>,
    pub max_pages: Option<u32>,
    /// Cap on `success + skipped`
    pub max_clips: Option<usize>,
}

pub struct DownloadEngine {
    history: Arc<DownloadHistoryStore>,
    downloader: Arc<dyn ClipDownloader>,
    events: Option<EventBus>,
    delay: Duration,
}

impl DownloadEngine {
    pub fn new(
        history: Arc<DownloadHistoryStore>,
        downloader: Arc<dyn ClipDownloader>,
        delay: Duration,
    ) -> Self {
        Self {
            history,
            downloader,
            events: None,
            delay,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: SbmEvent) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(event);
        }
    }

    fn emit_progress(&self, operation_id: Uuid, account: &str, clip: &SongClip, outcome: DownloadOutcome, stats: &DownloadStats) {
        self.emit(SbmEvent::DownloadProgress {
            operation_id,
            account_name: account.to_string(),
            clip_id: clip.id.clone(),
            title: clip.title.clone(),
            outcome,
            success: stats.success,
            skipped: stats.skipped,
            failed: stats.failed,
            timestamp: Utc::now(),
        });
    }

    /// Download one clip and record it; returns the outcome counted
    async fn download_one(&self, account: &str, clip: &SongClip, dest_dir: &std::path::Path) -> DownloadOutcome {
        match self.downloader.download(clip, dest_dir).await {
            Ok(path) => match self.history.record_download(account, &clip.id).await {
                Ok(_) => {
                    debug!(account = %account, clip_id = %clip.id, path = %path.display(), "Download confirmed");
                    DownloadOutcome::Success
                }
                Err(e) => {
                    warn!(account = %account, clip_id = %clip.id, error = %e, "Downloaded but history not saved");
                    DownloadOutcome::Failed
                }
            },
            Err(e) => {
                warn!(account = %account, clip_id = %clip.id, title = %clip.title, error = %e, "Download failed");
                DownloadOutcome::Failed
            }
        }
    }

    fn count(stats: &mut DownloadStats, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Success => stats.success += 1,
            DownloadOutcome::Skipped => stats.skipped += 1,
            DownloadOutcome::Failed => stats.failed += 1,
        }
    }

    /// Stream through `source` page by page
    ///
    /// A page fetch error ends the run with partial stats (counted in
    /// `page_errors`); the persisted cursor still points at that page. A page
    /// that reports no further pages ends the run and resets the cursor.
    pub async fn batch_download_paginated(
        &self,
        source: &dyn ClipPageSource,
        request: &PaginatedDownloadRequest,
    ) -> DownloadStats {
        let account = request.account_name.as_str();
        let source_id = source.identity();
        let mut page = match request.start_page {
            Some(page) => page,
            None => self.history.get_history(account).await.resume_page(&source_id),
        };
        let mut stats = DownloadStats::default();

        info!(
            account = %account,
            source = %source_id,
            start_page = page,
            max_pages = ?request.max_pages,
            max_clips = ?request.max_clips,
            "Starting paginated download"
        );

        'pages: loop {
            if request.max_pages.is_some_and(|max| stats.pages >= max) {
                info!(account = %account, pages = stats.pages, "Reached maximum pages limit");
                break;
            }
            if request.max_clips.is_some_and(|max| stats.processed() >= max) {
                info!(account = %account, processed = stats.processed(), "Reached maximum clips limit");
                break;
            }

            let result = match source.fetch_page(page).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(account = %account, source = %source_id, page, error = %e, "Page fetch failed, stopping");
                    stats.page_errors += 1;
                    break;
                }
            };
            stats.pages += 1;
            self.emit(SbmEvent::DownloadPageFetched {
                operation_id: request.operation_id,
                account_name: account.to_string(),
                page,
                clip_count: result.clips.len(),
                timestamp: Utc::now(),
            });

            if result.clips.is_empty() {
                info!(account = %account, source = %source_id, page, "Source exhausted");
                if let Err(e) = self.history.set_cursor(account, &source_id, 0).await {
                    warn!(account = %account, error = %e, "Failed to reset resume cursor");
                }
                break;
            }

            let len = result.clips.len();
            for (idx, clip) in result.clips.iter().enumerate() {
                if request.max_clips.is_some_and(|max| stats.processed() >= max) {
                    info!(account = %account, page, "Reached maximum clips limit mid-page");
                    break 'pages;
                }

                if self.history.is_downloaded(account, &clip.id).await {
                    stats.skipped += 1;
                    self.emit_progress(request.operation_id, account, clip, DownloadOutcome::Skipped, &stats);
                    continue;
                }

                let outcome = self.download_one(account, clip, &request.dest_dir).await;
                Self::count(&mut stats, outcome);
                self.emit_progress(request.operation_id, account, clip, outcome, &stats);

                if (idx + 1 < len || result.has_more) && !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
            }

            if !result.has_more {
                info!(account = %account, source = %source_id, page, "Source reports no more pages");
                if let Err(e) = self.history.set_cursor(account, &source_id, 0).await {
                    warn!(account = %account, error = %e, "Failed to reset resume cursor");
                }
                break;
            }

            page += 1;
            if let Err(e) = self.history.set_cursor(account, &source_id, page).await {
                warn!(account = %account, page, error = %e, "Failed to save resume cursor");
            }
        }

        info!(
            account = %account,
            success = stats.success,
            skipped = stats.skipped,
            failed = stats.failed,
            pages = stats.pages,
            page_errors = stats.page_errors,
            "Paginated download finished"
        );
        stats
    }

    /// Download an explicit list of clips, skipping known ones
    pub async fn batch_download(
        &self,
        operation_id: Uuid,
        account_name: &str,
        clips: &[SongClip],
        dest_dir: &std::path::Path,
    ) -> DownloadStats {
        let mut stats = DownloadStats::default();
        for (idx, clip) in clips.iter().enumerate() {
            if self.history.is_downloaded(account_name, &clip.id).await {
                stats.skipped += 1;
                self.emit_progress(operation_id, account_name, clip, DownloadOutcome::Skipped, &stats);
                continue;
            }

            let outcome = self.download_one(account_name, clip, dest_dir).await;
            Self::count(&mut stats, outcome);
            self.emit_progress(operation_id, account_name, clip, outcome, &stats);

            if idx + 1 < clips.len() && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        info!(
            account = %account_name,
            success = stats.success,
            skipped = stats.skipped,
            failed = stats.failed,
            "Batch download finished"
        );
        stats
    }
}
