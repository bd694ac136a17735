//! Batch song creation engine
//!
//! One browser driver per batch. Prompts are split into sessions by
//! `partition`; each session opens one tab per prompt and processes the tabs
//! in order. Every song makes one transition out of `waiting`, which is
//! recorded in the creation history and broadcast as a status event.
//!
//! `stop()` closes the active driver at once. Cancellation is also checked
//! at tab and session boundaries; a song interrupted mid-tab is not
//! recorded and keeps its last status.

use super::partition::partition;
use super::reconciler::PendingReconciler;
use crate::automation::form::random_delay;
use crate::automation::{AutomationDriver, DriverFactory, SongFormFiller};
use crate::config::StudioSettings;
use crate::error::{Result, StudioError};
use crate::history::HistoryStore;
use crate::models::{AdvancedOptions, Prompt, SongAttempt, SongStatus, SongTransition};
use chrono::Utc;
use sbm_common::events::{EventBus, SbmEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Title of the synthetic result recorded for a failed session
pub const SESSION_ERROR_TITLE: &str = "SESSION ERROR";

/// Timeouts and pacing of one batch
#[derive(Debug, Clone)]
pub struct CreationTiming {
    pub element_wait: Duration,
    pub creation_timeout: Duration,
    /// Random wait before clicking create, in ms
    pub submit_delay_ms: (u64, u64),
    /// Random wait before filling each tab, in ms
    pub human_delay_ms: (u64, u64),
    /// Wait after each tab is done
    pub tab_settle: Duration,
    /// Pause between form steps
    pub form_pause: Duration,
}

impl CreationTiming {
    pub fn from_settings(settings: &StudioSettings) -> Self {
        Self {
            element_wait: settings.element_wait(),
            creation_timeout: settings.song_creation_timeout(),
            submit_delay_ms: (settings.submit_delay_min_ms, settings.submit_delay_max_ms),
            human_delay_ms: (settings.human_delay_min_ms, settings.human_delay_max_ms),
            tab_settle: Duration::from_millis(settings.tab_settle_delay_ms),
            form_pause: Duration::from_millis(500),
        }
    }
}

/// One batch to create
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub operation_id: Uuid,
    pub account_name: String,
    pub profile_dir: PathBuf,
    pub prompts: Vec<Prompt>,
    /// Pool offset of `prompts[0]`
    pub start_index: usize,
    pub auto_submit: bool,
    pub advanced: AdvancedOptions,
    /// Queue entry this batch executes, if any
    pub queue_id: Option<Uuid>,
}

/// Final state of one song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongResult {
    pub title: String,
    pub prompt_index: Option<usize>,
    pub status: SongStatus,
    pub song_id: Option<String>,
    pub error: Option<String>,
}

impl SongResult {
    fn from_attempt(attempt: &SongAttempt) -> Self {
        Self {
            title: attempt.title.clone(),
            prompt_index: Some(attempt.prompt_index),
            status: attempt.status,
            song_id: attempt.song_id.clone(),
            error: attempt.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub results: Vec<SongResult>,
    pub success: usize,
    pub pending: usize,
    pub failed: usize,
    pub stopped: bool,
}

impl BatchSummary {
    fn push(&mut self, result: SongResult) {
        match result.status {
            SongStatus::Success => self.success += 1,
            SongStatus::Pending => self.pending += 1,
            SongStatus::Failed => self.failed += 1,
            SongStatus::Waiting => {}
        }
        self.results.push(result);
    }

    /// Songs that did not fail
    pub fn completed(&self) -> usize {
        self.success + self.pending
    }
}

/// Per-batch progress bookkeeping
struct BatchProgress<'r> {
    request: &'r BatchRequest,
    total: usize,
    done: usize,
}

impl BatchProgress<'_> {
    fn advance(&mut self) -> u8 {
        self.done += 1;
        percent(self.done, self.total)
    }
}

/// `round(100 * done / total)`
fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100 + total / 2) / total) as u8
}

pub struct BatchSongCreator {
    factory: Arc<dyn DriverFactory>,
    history: Arc<HistoryStore>,
    reconciler: Option<Arc<PendingReconciler>>,
    events: Option<EventBus>,
    create_url: String,
    timing: CreationTiming,
    active_driver: Mutex<Option<Arc<dyn AutomationDriver>>>,
}

impl BatchSongCreator {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        history: Arc<HistoryStore>,
        create_url: impl Into<String>,
        timing: CreationTiming,
    ) -> Self {
        Self {
            factory,
            history,
            reconciler: None,
            events: None,
            create_url: create_url.into(),
            timing,
            active_driver: Mutex::new(None),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Arc<PendingReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
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

    /// Close the active browser session, if any
    pub async fn stop(&self) {
        let driver = self.active_driver.lock().await.take();
        if let Some(driver) = driver {
            info!("Stopping batch: closing browser session");
            if let Err(e) = driver.close().await {
                warn!(error = %e, "Error while closing browser session");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active_driver.lock().await.is_some()
    }

    /// Create one song per prompt
    ///
    /// Fails as a whole only if the browser cannot be started; every other
    /// failure is a `failed` result.
    pub async fn create_songs_batch(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        if request.prompts.is_empty() {
            return Ok(summary);
        }

        let sessions = partition(request.prompts.len());
        info!(
            account = %request.account_name,
            songs = request.prompts.len(),
            sessions = sessions.len(),
            auto_submit = request.auto_submit,
            "Starting batch"
        );
        self.emit(SbmEvent::BatchStarted {
            operation_id: request.operation_id,
            account_name: request.account_name.clone(),
            total_songs: request.prompts.len(),
            session_count: sessions.len(),
            timestamp: Utc::now(),
        });

        let driver = self.factory.launch(&request.profile_dir).await.map_err(|e| {
            error!(account = %request.account_name, error = %e, "Cannot start browser");
            StudioError::Automation(e)
        })?;
        *self.active_driver.lock().await = Some(driver.clone());

        let mut progress = BatchProgress {
            request,
            total: request.prompts.len(),
            done: 0,
        };

        for (session_index, range) in sessions.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.stopped = true;
                break;
            }
            let session_len = range.len();
            let done_before = progress.done;

            if let Err(e) = self
                .run_session(driver.as_ref(), request, session_index, sessions.len(), range.clone(), &mut progress, &mut summary, cancel)
                .await
            {
                if cancel.is_cancelled() {
                    summary.stopped = true;
                    break;
                }
                error!(account = %request.account_name, session = session_index + 1, error = %e, "Session failed");
                let message = e.to_string();
                summary.push(SongResult {
                    title: SESSION_ERROR_TITLE.to_string(),
                    prompt_index: None,
                    status: SongStatus::Failed,
                    song_id: None,
                    error: Some(message.clone()),
                });
                progress.done = done_before + session_len;
                self.emit(SbmEvent::SongStatusChanged {
                    operation_id: Some(request.operation_id),
                    account_name: request.account_name.clone(),
                    message: format!("Session {}/{} failed: {}", session_index + 1, sessions.len(), message),
                    percent: percent(progress.done, progress.total),
                    song_id: None,
                    status: SongStatus::Failed,
                    title: SESSION_ERROR_TITLE.to_string(),
                    prompt_index: None,
                    timestamp: Utc::now(),
                });
            }
        }
        if cancel.is_cancelled() {
            summary.stopped = true;
        }

        // stop() may already have taken and closed the driver
        if let Some(driver) = self.active_driver.lock().await.take() {
            if let Err(e) = driver.close().await {
                warn!(error = %e, "Error closing browser after batch");
            }
        }

        info!(
            account = %request.account_name,
            success = summary.success,
            pending = summary.pending,
            failed = summary.failed,
            stopped = summary.stopped,
            "Batch finished"
        );
        self.emit(SbmEvent::BatchCompleted {
            operation_id: request.operation_id,
            account_name: request.account_name.clone(),
            success: summary.success,
            pending: summary.pending,
            failed: summary.failed,
            stopped: summary.stopped,
            timestamp: Utc::now(),
        });
        Ok(summary)
    }

    /// Open one tab per prompt of the session and process them in order
    #[allow(clippy::too_many_arguments)]
    async fn run_session(
        &self,
        driver: &dyn AutomationDriver,
        request: &BatchRequest,
        session_index: usize,
        session_count: usize,
        range: std::ops::Range<usize>,
        progress: &mut BatchProgress<'_>,
        summary: &mut BatchSummary,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), crate::automation::AutomationError> {
        let prompts = &request.prompts[range.clone()];
        let tabs = driver.open_tabs(&self.create_url, prompts.len()).await?;
        info!(
            account = %request.account_name,
            session = session_index + 1,
            session_count,
            tabs = tabs.len(),
            "Session started"
        );
        self.emit(SbmEvent::SessionStarted {
            operation_id: request.operation_id,
            account_name: request.account_name.clone(),
            session_index,
            session_count,
            tab_count: tabs.len(),
            timestamp: Utc::now(),
        });

        for (tab_index, (prompt, handle)) in prompts.iter().zip(tabs.iter()).enumerate() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let prompt_index = request.start_index + range.start + tab_index;
            let mut attempt = SongAttempt::new(&request.account_name, &prompt.title, prompt_index);

            let transition = self
                .process_tab(driver, request, prompt, handle, tab_index + 1, &mut attempt)
                .await;

            // Interrupted by stop(): leave the song unrecorded
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(transition) = transition else {
                continue;
            };

            let pct = progress.advance();
            let message = format!(
                "Session {}/{} - Song {}/{}: {}",
                session_index + 1,
                session_count,
                tab_index + 1,
                prompts.len(),
                prompt.title
            );
            self.finish_song(progress.request, &attempt, &transition, message, pct).await;
            summary.push(SongResult::from_attempt(&attempt));

            if !self.timing.tab_settle.is_zero() {
                tokio::time::sleep(self.timing.tab_settle).await;
            }
        }
        Ok(())
    }

    /// Fill and optionally submit one tab; returns the song's transition
    async fn process_tab(
        &self,
        driver: &dyn AutomationDriver,
        request: &BatchRequest,
        prompt: &Prompt,
        handle: &str,
        tab_number: usize,
        attempt: &mut SongAttempt,
    ) -> Option<SongTransition> {
        let filler = SongFormFiller::new(driver, self.timing.element_wait, tab_number)
            .with_pause(self.timing.form_pause);

        let (min, max) = self.timing.human_delay_ms;
        if max > 0 {
            tokio::time::sleep(random_delay(min, max)).await;
        }

        let filled = match driver.switch_to_tab(handle).await {
            Ok(()) => filler.fill_form(prompt, &request.advanced).await,
            Err(e) => Err(e),
        };
        if let Err(e) = filled {
            warn!(account = %request.account_name, tab = tab_number, title = %prompt.title, error = %e, "Fill form failed");
            return attempt.fill_failed();
        }

        if !request.auto_submit {
            info!(tab = tab_number, title = %prompt.title, "Ready for manual submit");
            return attempt.ready_for_manual_submit();
        }

        let (min, max) = self.timing.submit_delay_ms;
        if max > 0 {
            tokio::time::sleep(random_delay(min, max)).await;
        }
        match filler.submit(self.timing.creation_timeout).await {
            Ok(song_id) => {
                info!(tab = tab_number, title = %prompt.title, song_id = %song_id, "Song created");
                attempt.submitted(song_id)
            }
            Err(crate::automation::AutomationError::Timeout(_)) => {
                info!(tab = tab_number, title = %prompt.title, "Song pending, waiting for ID");
                attempt.submit_timed_out()
            }
            Err(e) => {
                warn!(tab = tab_number, title = %prompt.title, error = %e, "Auto-submit failed");
                attempt.submit_errored(e.to_string())
            }
        }
    }

    /// Record the transition, register pending songs, and broadcast it
    async fn finish_song(
        &self,
        request: &BatchRequest,
        attempt: &SongAttempt,
        transition: &SongTransition,
        message: String,
        pct: u8,
    ) {
        if let Err(e) = self.history.add_creation_record(attempt.to_record()).await {
            warn!(account = %request.account_name, title = %attempt.title, error = %e, "Failed to record song");
        }
        if transition.new_status == SongStatus::Pending {
            if let Some(reconciler) = &self.reconciler {
                reconciler
                    .register(&request.account_name, &attempt.title, attempt.prompt_index, request.queue_id)
                    .await;
            }
        }
        self.emit(SbmEvent::SongStatusChanged {
            operation_id: Some(request.operation_id),
            account_name: request.account_name.clone(),
            message,
            percent: pct,
            song_id: transition.song_id.clone(),
            status: transition.new_status,
            title: attempt.title.clone(),
            prompt_index: Some(attempt.prompt_index),
            timestamp: Utc::now(),
        });
    }
}
