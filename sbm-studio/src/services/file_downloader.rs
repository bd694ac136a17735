//! Clip artifact downloader
//!
//! Audio is streamed to `<name>.part` and renamed into place once the body
//! is complete, so a finished file on disk always means a finished download.

use crate::models::SongClip;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Download errors for a single clip
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Clip {0} has no audio URL")]
    MissingAudioUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes one clip's artifacts into a directory
#[async_trait]
pub trait ClipDownloader: Send + Sync {
    /// Download `clip` into `dest_dir`, returning the audio file path
    async fn download(&self, clip: &SongClip, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

/// Naming and cover options
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Append `__ID__<clip id>` to the file stem
    pub append_id: bool,
    /// Save the cover image next to the audio
    pub save_cover: bool,
}

/// reqwest-backed downloader
pub struct HttpClipDownloader {
    http_client: reqwest::Client,
    options: DownloadOptions,
}

impl HttpClipDownloader {
    pub fn new(http_client: reqwest::Client, options: DownloadOptions) -> Self {
        Self {
            http_client,
            options,
        }
    }

    async fn stream_to_file(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DownloadError::Http(format!("status {}", response.status())));
        }

        let part = part_path(target);
        let result = async {
            let mut file = tokio::fs::File::create(&part).await?;
            let mut written = 0u64;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| DownloadError::Http(e.to_string()))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, DownloadError>(written)
        }
        .await;

        match result {
            Ok(written) => {
                tokio::fs::rename(&part, target).await?;
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ClipDownloader for HttpClipDownloader {
    async fn download(&self, clip: &SongClip, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let audio_url = clip
            .audio_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DownloadError::MissingAudioUrl(clip.id.clone()))?;

        tokio::fs::create_dir_all(dest_dir).await?;

        let stem = file_stem_for(clip, self.options.append_id);
        let target = unique_path(dest_dir, &stem, "mp3");
        let bytes = self.stream_to_file(audio_url, &target).await?;
        info!(
            clip_id = %clip.id,
            title = %clip.title,
            path = %target.display(),
            bytes,
            "Clip downloaded"
        );

        if self.options.save_cover {
            if let Some(image_url) = clip.image_url.as_deref().filter(|u| !u.is_empty()) {
                let cover = target.with_extension("jpg");
                // Cover art is optional; the audio is already in place
                if let Err(e) = self.stream_to_file(image_url, &cover).await {
                    warn!(clip_id = %clip.id, error = %e, "Cover image download failed");
                } else {
                    debug!(clip_id = %clip.id, path = %cover.display(), "Cover saved");
                }
            }
        }

        Ok(target)
    }
}

/// Strip characters that are invalid in file names on common platforms
pub fn sanitize_filename(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid =
        INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F\x7F]"#).expect("filename pattern is valid"));

    let cleaned = invalid.replace_all(name, "");
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn file_stem_for(clip: &SongClip, append_id: bool) -> String {
    let title = sanitize_filename(&clip.title);
    if append_id {
        format!("{}__ID__{}", title, sanitize_filename(&clip.id))
    } else {
        title
    }
}

/// `<dir>/<stem>.<ext>`, or the first free `<stem>_<n>.<ext>`
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}
