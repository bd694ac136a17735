//! Studio API client
//!
//! Thin JSON client over the song studio's HTTP API: paginated clip
//! collections (a public profile, or the signed-in account's feed), single
//! clips, and billing info for the current account.
//!
//! Requests are spaced by a minimum interval. A 429 sleeps the current
//! backoff and is retried once inline; a second 429 is surfaced as
//! `ApiError::RateLimited`.

use super::backoff::RateLimitBackoff;
use crate::config::StudioSettings;
use crate::models::{ClipPage, SongClip, UserInfo};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// API client errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited on {0}")]
    RateLimited(String),

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unauthorized: session token missing or expired")]
    Unauthorized,
}

/// Which paginated collection to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipSource {
    /// A public profile, with or without the leading `@`
    Profile(String),
    /// The signed-in account's own feed
    Feed,
}

impl ClipSource {
    pub fn profile(name: &str) -> Self {
        ClipSource::Profile(name.trim().trim_start_matches('@').to_string())
    }

    /// Identity stored alongside the resume cursor
    pub fn identity(&self) -> String {
        match self {
            ClipSource::Profile(name) => format!("profile:{}", name),
            ClipSource::Feed => "feed".to_string(),
        }
    }

    fn endpoint(&self) -> String {
        match self {
            ClipSource::Profile(name) => format!("/profiles/{}/clips", name),
            ClipSource::Feed => "/feed/v2".to_string(),
        }
    }
}

/// Studio API client
pub struct SunoApiClient {
    http_client: reqwest::Client,
    base_url: String,
    session_token: RwLock<Option<String>>,
    /// Tokens known to belong to a named account
    account_tokens: RwLock<BTreeMap<String, String>>,
    backoff: RateLimitBackoff,
    spacing: Option<DefaultDirectRateLimiter>,
}

impl SunoApiClient {
    pub fn new(settings: &StudioSettings, session_token: Option<String>) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let spacing = Quota::with_period(Duration::from_millis(settings.min_request_interval_ms))
            .map(RateLimiter::direct);

        Ok(Self {
            http_client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            session_token: RwLock::new(session_token),
            account_tokens: RwLock::new(
                settings
                    .account_tokens
                    .iter()
                    .filter(|(_, token)| !token.trim().is_empty())
                    .map(|(account, token)| (account.clone(), token.trim().to_string()))
                    .collect(),
            ),
            backoff: RateLimitBackoff::from_secs(
                settings.rate_limit_base_secs,
                settings.rate_limit_increment_secs,
                settings.rate_limit_max_secs,
            ),
            spacing,
        })
    }

    /// Replace the backoff policy (tests use millisecond waits)
    pub fn with_backoff(mut self, backoff: RateLimitBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> &RateLimitBackoff {
        &self.backoff
    }

    /// Set or clear the bearer token used for subsequent requests
    pub async fn update_session_token(&self, token: Option<String>) {
        let token = token.filter(|t| !t.trim().is_empty());
        info!(authenticated = token.is_some(), "Session token updated");
        *self.session_token.write().await = token;
    }

    pub async fn has_session_token(&self) -> bool {
        self.session_token.read().await.is_some()
    }

    /// Set or clear the token that signs in as `account_name`
    pub async fn set_account_token(&self, account_name: &str, token: Option<String>) {
        let mut tokens = self.account_tokens.write().await;
        match token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            Some(token) => {
                tokens.insert(account_name.to_string(), token);
            }
            None => {
                tokens.remove(account_name);
            }
        }
        info!(account = %account_name, authenticated = tokens.contains_key(account_name), "Account token updated");
    }

    pub async fn account_token(&self, account_name: &str) -> Option<String> {
        self.account_tokens.read().await.get(account_name).cloned()
    }

    async fn send_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        if let Some(spacing) = &self.spacing {
            spacing.until_ready().await;
        }

        let mut request = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    /// GET `endpoint` under the active session token
    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let token = self.session_token.read().await.clone();
        self.get_json_as(endpoint, query, token.as_deref()).await
    }

    /// GET `endpoint` and decode JSON, with one inline retry on 429
    async fn get_json_as(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut response = self.send_once(&url, query, bearer).await?;
        let mut status = response.status().as_u16();

        if let Some(wait) = self.backoff.observe(status) {
            warn!(endpoint = %endpoint, wait_ms = wait.as_millis() as u64, "Rate limited (429), backing off");
            tokio::time::sleep(wait).await;
            response = self.send_once(&url, query, bearer).await?;
            status = response.status().as_u16();
            if self.backoff.observe(status).is_some() {
                warn!(endpoint = %endpoint, "Still rate limited after retry");
                return Err(ApiError::RateLimited(endpoint.to_string()));
            }
        }

        match status {
            200..=299 => {}
            401 | 403 => {
                warn!(endpoint = %endpoint, status, "API request unauthorized");
                return Err(ApiError::Unauthorized);
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                warn!(endpoint = %endpoint, status, "API request failed");
                return Err(ApiError::Status(status, snippet));
            }
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// One page of a clip collection (0-indexed)
    pub async fn fetch_page(&self, source: &ClipSource, page: u32) -> Result<ClipPage, ApiError> {
        let token = self.session_token.read().await.clone();
        self.fetch_page_with(source, page, token.as_deref()).await
    }

    /// One page of a clip collection, signed in with `token` instead of the active one
    pub async fn fetch_page_as(&self, source: &ClipSource, page: u32, token: &str) -> Result<ClipPage, ApiError> {
        self.fetch_page_with(source, page, Some(token)).await
    }

    async fn fetch_page_with(&self, source: &ClipSource, page: u32, bearer: Option<&str>) -> Result<ClipPage, ApiError> {
        let body = self
            .get_json_as(&source.endpoint(), &[("page", page.to_string())], bearer)
            .await?;
        let clips = SongClip::list_from_page(&body);
        debug!(source = %source.identity(), page, clips = clips.len(), "Fetched clip page");
        Ok(ClipPage::new(page, clips))
    }

    /// Every clip of `source` until an empty page or `max_pages`
    ///
    /// Stops at the first failing page and returns what was collected.
    pub async fn fetch_clips(
        &self,
        source: &ClipSource,
        start_page: u32,
        max_pages: Option<u32>,
        page_delay: Duration,
    ) -> Vec<SongClip> {
        let mut all = Vec::new();
        let mut page = start_page;
        let mut fetched = 0u32;

        loop {
            if max_pages.is_some_and(|max| fetched >= max) {
                info!(source = %source.identity(), max_pages = fetched, "Reached maximum pages limit");
                break;
            }
            match self.fetch_page(source, page).await {
                Ok(result) if result.clips.is_empty() => {
                    info!(source = %source.identity(), page, "No more clips");
                    break;
                }
                Ok(result) => {
                    all.extend(result.clips);
                    page += 1;
                    fetched += 1;
                }
                Err(e) => {
                    warn!(source = %source.identity(), page, error = %e, "Failed to fetch page");
                    break;
                }
            }
            if !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }
        }
        all
    }

    pub async fn fetch_clip(&self, clip_id: &str) -> Result<SongClip, ApiError> {
        let body = self.get_json(&format!("/clips/{}", clip_id), &[]).await?;
        SongClip::from_api_value(&body)
            .ok_or_else(|| ApiError::Parse(format!("clip {} has no id", clip_id)))
    }

    /// Fetch several clips by id, skipping the ones that fail
    pub async fn fetch_clips_by_ids(&self, ids: &[String], delay: Duration) -> Vec<SongClip> {
        let mut clips = Vec::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            match self.fetch_clip(id).await {
                Ok(clip) => {
                    debug!(clip_id = %id, title = %clip.title, "Fetched clip {}/{}", idx + 1, ids.len());
                    clips.push(clip);
                }
                Err(e) => warn!(clip_id = %id, error = %e, "Failed to fetch clip"),
            }
            if idx + 1 < ids.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        clips
    }

    pub async fn get_user_info(&self) -> Result<UserInfo, ApiError> {
        let body = self.get_json("/billing/info", &[]).await?;
        let info = UserInfo::from_billing_info(&body);
        info!(username = %info.username, credits = info.credits, "Fetched user info");
        Ok(info)
    }
}
