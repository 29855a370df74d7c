//! Audio Cache Server
//!
//! Entry point: loads configuration, sets up logging, prepares the asset
//! directory and serves HTTP until interrupted.

use anyhow::Context;
use audio_cache_server::{ServerConfig, StreamServer};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "audio_cache_server.yaml";

/// Main entry point for the audio cache server
///
/// # Usage
/// ```bash
/// # Start with default config (audio_cache_server.yaml, or built-in defaults
/// # if that file does not exist)
/// audio-cache-server
///
/// # Start with custom config
/// audio-cache-server /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::args().nth(1);
    let config = load_config(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Audio Cache Server");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Route prefix: {:?}", config.route_prefix);
    info!("  - Asset directory: {}", config.asset_dir.display());
    info!("  - Source backend: {}", config.source.backend);
    info!("  - Transcoder: {}", config.transcoder.ffmpeg_path);
    info!("  - In-flight policy: {:?}", config.inflight_policy);
    match config.fetch_timeout() {
        Some(limit) => info!("  - Fetch timeout: {:?}", limit),
        None => info!("  - Fetch timeout: disabled"),
    }
    info!("  - Search enabled: {}", config.enabled_search().is_some());

    let addr = config.socket_addr()?;
    let server = Arc::new(StreamServer::from_config(config).context("failed to build server")?);
    server
        .prepare()
        .await
        .context("failed to prepare asset directory")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tokio::select! {
        result = Arc::clone(&server).serve(listener) => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    let running = server.registry().len();
    if running > 0 {
        warn!("Exiting with {} fetches still running; their temp files are swept on next start", running);
    }
    info!("Audio Cache Server stopped");
    Ok(())
}

/// Load the configuration named on the command line, or the default file
///
/// A missing default file means built-in defaults; a missing explicit file is
/// an error.
fn load_config(path: Option<&str>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => ServerConfig::from_file(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("failed to load configuration from {}", DEFAULT_CONFIG_PATH)),
        None => Ok(ServerConfig::default()),
    }
}
