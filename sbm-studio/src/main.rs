//! Song batch manager (sbm-studio) - Main entry point
//!
//! Reads newline-delimited JSON commands on stdin and writes responses and
//! progress lines on stdout. Logs go to stderr (or the configured log file).

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use sbm_common::config::{RootFolderInitializer, RootFolderResolver};
use sbm_common::events::EventBus;
use sbm_studio::config::{resolve_session_token, StudioConfigFile, MODULE_NAME};
use sbm_studio::transport;
use sbm_studio::AppState;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Event bus capacity; slow progress readers drop the oldest events
const EVENT_BUS_CAPACITY: usize = 1000;

/// Command-line arguments for sbm-studio
#[derive(Parser, Debug)]
#[command(name = "sbm-studio")]
#[command(about = "Song batch manager: queued browser song creation and resumable downloads")]
#[command(version)]
struct Args {
    /// Root folder holding data, browser profiles and downloads
    #[arg(short, long, env = "SBM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to <config_dir>/sbm/sbm-studio.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides RUST_LOG and the config file
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Log filter priority: CLI → RUST_LOG → TOML → info
fn log_filter(cli: Option<&str>, toml_level: &str) -> EnvFilter {
    if let Some(level) = cli {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(toml_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing(filter: EnvFilter, log_file: Option<&Path>) -> Result<()> {
    let file = match log_file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?,
        ),
        None => None,
    };

    let stderr_layer = file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(f))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME)
        .with_cli_override(args.root_folder.clone())
        .with_config_path(args.config.clone());
    let config = match resolver.config_file_path() {
        Some(path) => StudioConfigFile::load(&path),
        None => StudioConfigFile::default(),
    };

    init_tracing(
        log_filter(args.log_level.as_deref(), &config.bootstrap.logging.level),
        config.bootstrap.logging.file.as_deref(),
    )?;

    info!("Starting sbm-studio v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolver.resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let settings = config.studio.normalized();
    let session_token = resolve_session_token(&settings);

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::bootstrap(&initializer, settings, session_token, event_bus)
        .context("Failed to initialize application state")?;

    let stdin = BufReader::new(tokio::io::stdin());
    transport::serve(state, stdin, tokio::io::stdout())
        .await
        .context("Command transport error")?;

    info!("Input closed, shutting down");
    Ok(())
}
