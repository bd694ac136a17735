//! Configuration for sbm-studio
//!
//! The TOML file carries the shared bootstrap keys (`root_folder`,
//! `[logging]`) plus a `[studio]` section. Every `[studio]` key has a
//! compiled default, so an absent file or section is never an error.

use sbm_common::config::{load_toml_config, TomlConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the API session token
pub const ENV_SESSION_TOKEN: &str = "SBM_SESSION_TOKEN";

/// Module name used for the default config file path
pub const MODULE_NAME: &str = "sbm-studio";

/// Whole TOML file for this module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfigFile {
    #[serde(flatten)]
    pub bootstrap: TomlConfig,

    #[serde(default)]
    pub studio: StudioSettings,
}

impl StudioConfigFile {
    pub fn load(path: &Path) -> Self {
        load_toml_config(path)
    }
}

/// `[studio]` section: URLs, timeouts, delays and browser options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioSettings {
    pub create_url: String,
    pub api_base_url: String,
    pub webdriver_url: String,

    /// API bearer token (overridden by SBM_SESSION_TOKEN)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// API tokens by account name; pending songs are matched only against
    /// the clips their own account's token can see
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub account_tokens: BTreeMap<String, String>,

    pub element_wait_secs: u64,
    pub song_creation_timeout_secs: u64,
    pub submit_delay_min_ms: u64,
    pub submit_delay_max_ms: u64,
    pub tab_settle_delay_ms: u64,
    pub human_delay_min_ms: u64,
    pub human_delay_max_ms: u64,

    pub download_delay_secs: u64,
    pub min_request_interval_ms: u64,
    pub rate_limit_base_secs: u64,
    pub rate_limit_increment_secs: u64,
    pub rate_limit_max_secs: u64,
    pub request_timeout_secs: u64,

    /// Pending songs older than this are marked failed
    pub pending_ttl_secs: u64,

    pub headless: bool,
    pub chrome_args: Vec<String>,
    pub user_agent: String,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            create_url: "https://suno.com/create".to_string(),
            api_base_url: "https://studio-api.prod.suno.com/api".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            session_token: None,
            account_tokens: BTreeMap::new(),
            element_wait_secs: 5,
            song_creation_timeout_secs: 120,
            submit_delay_min_ms: 2000,
            submit_delay_max_ms: 5000,
            tab_settle_delay_ms: 3000,
            human_delay_min_ms: 3000,
            human_delay_max_ms: 5000,
            download_delay_secs: 2,
            min_request_interval_ms: 2000,
            rate_limit_base_secs: 10,
            rate_limit_increment_secs: 5,
            rate_limit_max_secs: 60,
            request_timeout_secs: 30,
            pending_ttl_secs: 86_400,
            headless: false,
            chrome_args: default_chrome_args(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

fn default_chrome_args() -> Vec<String> {
    [
        "--disable-blink-features=AutomationControlled",
        "--disable-dev-shm-usage",
        "--no-sandbox",
        "--disable-gpu",
        "--disable-infobars",
        "--start-maximized",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl StudioSettings {
    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn song_creation_timeout(&self) -> Duration {
        Duration::from_secs(self.song_creation_timeout_secs)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_secs(self.download_delay_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Swap inverted min/max pairs so random delays are always well formed
    pub fn normalized(mut self) -> Self {
        if self.submit_delay_min_ms > self.submit_delay_max_ms {
            warn!("submit_delay_min_ms > submit_delay_max_ms, swapping");
            std::mem::swap(&mut self.submit_delay_min_ms, &mut self.submit_delay_max_ms);
        }
        if self.human_delay_min_ms > self.human_delay_max_ms {
            warn!("human_delay_min_ms > human_delay_max_ms, swapping");
            std::mem::swap(&mut self.human_delay_min_ms, &mut self.human_delay_max_ms);
        }
        if self.rate_limit_base_secs > self.rate_limit_max_secs {
            warn!("rate_limit_base_secs > rate_limit_max_secs, clamping base");
            self.rate_limit_base_secs = self.rate_limit_max_secs;
        }
        self
    }
}

/// Resolve the API session token
///
/// **Priority:** environment → TOML
pub fn resolve_session_token(settings: &StudioSettings) -> Option<String> {
    let env_token = std::env::var(ENV_SESSION_TOKEN).ok();
    if let Some(token) = env_token.filter(|t| is_valid_token(t)) {
        if settings.session_token.as_deref().is_some_and(is_valid_token) {
            warn!("Session token found in environment and TOML, using environment");
        }
        info!("Session token loaded from environment variable");
        return Some(token.trim().to_string());
    }

    if let Some(token) = settings.session_token.as_deref().filter(|t| is_valid_token(t)) {
        info!("Session token loaded from TOML config");
        return Some(token.trim().to_string());
    }

    warn!("No session token configured; API requests will be unauthenticated");
    None
}

pub fn is_valid_token(token: &str) -> bool {
    !token.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = StudioSettings::default();
        assert_eq!(settings.element_wait(), Duration::from_secs(5));
        assert_eq!(settings.song_creation_timeout(), Duration::from_secs(120));
        assert_eq!(settings.rate_limit_base_secs, 10);
        assert_eq!(settings.rate_limit_increment_secs, 5);
        assert_eq!(settings.rate_limit_max_secs, 60);
        assert!(settings
            .chrome_args
            .contains(&"--disable-blink-features=AutomationControlled".to_string()));
    }

    #[test]
    fn test_partial_studio_section_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sbm-studio.toml");
        std::fs::write(
            &path,
            "root_folder = \"/srv/sbm\"\n\n[studio]\nheadless = true\ndownload_delay_secs = 0\n",
        )
        .unwrap();

        let file = StudioConfigFile::load(&path);
        assert_eq!(file.bootstrap.root_folder.as_deref(), Some(Path::new("/srv/sbm")));
        assert!(file.studio.headless);
        assert_eq!(file.studio.download_delay_secs, 0);
        assert_eq!(file.studio.song_creation_timeout_secs, 120);
    }

    #[test]
    fn test_normalized_swaps_inverted_ranges() {
        let settings = StudioSettings {
            submit_delay_min_ms: 9000,
            submit_delay_max_ms: 1000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.submit_delay_min_ms, 1000);
        assert_eq!(settings.submit_delay_max_ms, 9000);
    }

    #[test]
    #[serial]
    fn test_env_token_beats_toml() {
        std::env::set_var(ENV_SESSION_TOKEN, "from-env");
        let settings = StudioSettings {
            session_token: Some("from-toml".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_session_token(&settings).as_deref(), Some("from-env"));

        std::env::remove_var(ENV_SESSION_TOKEN);
        assert_eq!(resolve_session_token(&settings).as_deref(), Some("from-toml"));
    }

    #[test]
    #[serial]
    fn test_blank_token_is_ignored() {
        std::env::remove_var(ENV_SESSION_TOKEN);
        let settings = StudioSettings {
            session_token: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(resolve_session_token(&settings).is_none());
    }
}
