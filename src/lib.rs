//! Audio Cache Server
//!
//! An HTTP service that streams audio for a remote media identifier with
//! byte-range support, fetching and transcoding the media on first request
//! and serving it from local storage afterwards.
//!
//! # Overview
//!
//! A request for `GET /stream?id=<id>` looks the identifier up in the
//! [`AssetStore`]. On a hit the stored file is streamed directly. On a miss
//! the request tries to become the single owner of that identifier's fetch in
//! the [`JobRegistry`]; the owner runs the [`FetchPipeline`] (download raw
//! media from a [`ContentSource`], convert it with a [`Transcoder`], publish
//! atomically) and then serves the result. Concurrent requests for the same
//! identifier never start a second fetch.
//!
//! # Features
//!
//! - **Single-flight fetching**: at most one download and transcode per identifier
//! - **Atomic publication**: an asset file is either absent or complete
//! - **Range requests**: `Range: bytes=start-end` answered with 206 and `Content-Range`
//! - **Crash-safe temp files**: intermediates are removed on every failure path
//! - **Keyword search**: optional `/search` proxy returning playable identifiers
//! - **Metrics**: Prometheus text exposition on `/metrics`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use audio_cache_server::{ServerConfig, StreamServer};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_file("audio_cache_server.yaml")?;
//! let addr = config.socket_addr()?;
//!
//! let server = Arc::new(StreamServer::from_config(config)?);
//! server.prepare().await?;
//!
//! let listener = tokio::net::TcpListener::bind(addr).await?;
//! server.serve(listener).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from a YAML file:
//!
//! ```yaml
//! listen_address: "0.0.0.0:8080"
//! route_prefix: "/api"
//! asset_dir: "./audio"
//! fetch_timeout_secs: 600
//! inflight_policy: reject          # or "wait"
//! source:
//!   backend: command
//!   program: yt-dlp
//! transcoder:
//!   ffmpeg_path: ffmpeg
//! ```
//!
//! See [`ServerConfig`] for every option and its default.
//!
//! # Error Handling
//!
//! All fallible operations return [`StreamError`], which maps onto the HTTP
//! status sent to the client:
//!
//! ```rust
//! use audio_cache_server::StreamError;
//!
//! let err = StreamError::AssetNotReady("dQw4w9WgXcQ".to_string());
//! assert_eq!(err.to_http_status(), 503);
//! assert!(err.is_retryable());
//! ```

pub mod asset_store;
pub mod config;
pub mod content_source;
pub mod error;
pub mod fetch_pipeline;
pub mod job_registry;
pub mod metrics;
pub mod models;
pub mod range_parser;
pub mod response;
pub mod search;
pub mod stream_server;
pub mod transcoder;

// Re-export commonly used types
pub use asset_store::AssetStore;
pub use config::{InflightPolicy, SearchConfig, ServerConfig, SourceConfig, TranscoderConfig};
pub use content_source::{CommandContentSource, ContentSource, HttpContentSource};
pub use error::{Result, StreamError};
pub use fetch_pipeline::FetchPipeline;
pub use job_registry::{JobGuard, JobRegistry};
pub use metrics::ServiceMetrics;
pub use models::{AssetId, AssetRecord, ByteRange, ResolvedRange};
pub use range_parser::{parse_range_header, RangeParser};
pub use response::ResponseBody;
pub use search::{SearchProvider, SearchResult, YoutubeSearchProvider};
pub use stream_server::StreamServer;
pub use transcoder::{FfmpegTranscoder, Transcoder};
