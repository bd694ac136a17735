//! Remote services: studio API client, rate-limit backoff, artifact
//! downloads and the paginated download engine

pub mod backoff;
pub mod download_engine;
pub mod file_downloader;
pub mod suno_client;

pub use backoff::RateLimitBackoff;
pub use download_engine::{
    ApiPageSource, ClipPageSource, DownloadEngine, DownloadStats, PaginatedDownloadRequest,
};
pub use file_downloader::{ClipDownloader, DownloadError, DownloadOptions, HttpClipDownloader};
pub use suno_client::{ApiError, ClipSource, SunoApiClient};
