//! Configuration management for the audio cache server

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to (default: "0.0.0.0:8080")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Prefix for the `/stream` and `/search` routes, e.g. "/api" (default: none)
    #[serde(default)]
    pub route_prefix: String,

    /// Directory holding published assets and in-progress temp files
    /// (default: ./audio)
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,

    /// Extension of published assets (default: "mp3")
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,

    /// Content-Type sent with every stream response (default: "audio/mp3")
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Time limit for one download + transcode run in seconds; 0 disables
    /// the limit (default: 600)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// What a request does when another request is already fetching the same
    /// asset (default: reject)
    #[serde(default)]
    pub inflight_policy: InflightPolicy,

    /// How long a waiting request may wait for someone else's fetch, in
    /// seconds (default: 120). Only used with `inflight_policy: wait`.
    #[serde(default = "default_inflight_wait")]
    pub inflight_wait_secs: u64,

    /// Reject malformed Range headers with 416 instead of ignoring them
    /// (default: false)
    #[serde(default)]
    pub strict_range_parsing: bool,

    /// Maximum log level: trace, debug, info, warn or error (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where raw media comes from
    #[serde(default)]
    pub source: SourceConfig,

    /// How raw media is converted to the published format
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    /// Keyword search proxy (optional)
    #[serde(default)]
    pub search: Option<SearchConfig>,
}

/// Behaviour for a request that finds the asset absent while another request
/// owns its fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflightPolicy {
    /// Answer immediately with 503 "not ready"
    #[default]
    Reject,
    /// Wait for the running fetch to end, then look again
    Wait,
}

/// Raw media source configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// "command" (spawn a downloader) or "http" (GET a URL) (default: command)
    #[serde(default = "default_source_backend")]
    pub backend: String,

    /// Source URL; `{id}` is replaced with the identifier
    /// (default: "https://www.youtube.com/watch?v={id}")
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Downloader program for the command backend (default: "yt-dlp")
    #[serde(default = "default_program")]
    pub program: String,

    /// Downloader arguments; `{url}` is replaced with the source URL. The
    /// program must write the media to stdout.
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,

    /// Per-request timeout for the http backend in seconds (default: 300)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: default_source_backend(),
            url_template: default_url_template(),
            program: default_program(),
            args: default_program_args(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Transcoder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary (default: "ffmpeg")
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Audio codec passed to `-c:a` (default: "libmp3lame")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Container passed to `-f` (default: "mp3")
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Extra arguments inserted before the output path, e.g. ["-b:a", "192k"]
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            audio_codec: default_audio_codec(),
            output_format: default_output_format(),
            extra_args: Vec::new(),
        }
    }
}

/// Keyword search proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Whether `/search` is served (default: true when the section exists)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key for the search provider
    pub api_key: String,

    /// Search endpoint (default: YouTube Data API v3 search)
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Maximum results per query (default: 10, valid: 1 to 50)
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("./audio")
}

fn default_audio_extension() -> String {
    "mp3".to_string()
}

fn default_content_type() -> String {
    "audio/mp3".to_string()
}

fn default_fetch_timeout() -> u64 {
    600
}

fn default_inflight_wait() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_backend() -> String {
    "command".to_string()
}

fn default_url_template() -> String {
    "https://www.youtube.com/watch?v={id}".to_string()
}

fn default_program() -> String {
    "yt-dlp".to_string()
}

fn default_program_args() -> Vec<String> {
    ["--quiet", "--no-playlist", "-f", "bestaudio", "-o", "-", "{url}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_audio_codec() -> String {
    "libmp3lame".to_string()
}

fn default_output_format() -> String {
    "mp3".to_string()
}

fn default_true() -> bool {
    true
}

fn default_search_endpoint() -> String {
    "https://www.googleapis.com/youtube/v3/search".to_string()
}

fn default_max_results() -> u32 {
    10
}

fn default_search_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            route_prefix: String::new(),
            asset_dir: default_asset_dir(),
            audio_extension: default_audio_extension(),
            content_type: default_content_type(),
            fetch_timeout_secs: default_fetch_timeout(),
            inflight_policy: InflightPolicy::default(),
            inflight_wait_secs: default_inflight_wait(),
            strict_range_parsing: false,
            log_level: default_log_level(),
            source: SourceConfig::default(),
            transcoder: TranscoderConfig::default(),
            search: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(ServerConfig)` if loading and validation succeed
    /// * `Err(StreamError::ConfigError)` if the file cannot be read or is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            StreamError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(content).map_err(|e| {
            StreamError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must be a socket address
    /// - route_prefix must be empty or start with '/' and not end with '/'
    /// - audio_extension and content_type must not be empty
    /// - log_level must be a known level
    /// - source.backend must be "command" or "http"; the command backend
    ///   needs a program, the http backend a URL template containing `{id}`
    /// - search.max_results must be between 1 and 50, api_key not empty
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if !self.route_prefix.is_empty()
            && (!self.route_prefix.starts_with('/') || self.route_prefix.ends_with('/'))
        {
            return Err(StreamError::ConfigError(format!(
                "route_prefix must start with '/' and not end with '/', got '{}'",
                self.route_prefix
            )));
        }

        if self.audio_extension.is_empty() || self.audio_extension.contains(['/', '.']) {
            return Err(StreamError::ConfigError(format!(
                "audio_extension must be a bare extension, got '{}'",
                self.audio_extension
            )));
        }

        if self.content_type.trim().is_empty() {
            return Err(StreamError::ConfigError(
                "content_type must not be empty".to_string(),
            ));
        }

        self.log_level()?;

        match self.source.backend.as_str() {
            "command" => {
                if self.source.program.trim().is_empty() {
                    return Err(StreamError::ConfigError(
                        "source.program must not be empty for the command backend".to_string(),
                    ));
                }
            }
            "http" => {
                if !self.source.url_template.contains("{id}") {
                    return Err(StreamError::ConfigError(format!(
                        "source.url_template must contain '{{id}}', got '{}'",
                        self.source.url_template
                    )));
                }
                if self.source.request_timeout_secs == 0 {
                    return Err(StreamError::ConfigError(
                        "source.request_timeout_secs must be greater than 0".to_string(),
                    ));
                }
            }
            other => {
                return Err(StreamError::ConfigError(format!(
                    "Invalid source.backend '{}', must be 'command' or 'http'",
                    other
                )));
            }
        }

        if self.transcoder.ffmpeg_path.trim().is_empty() {
            return Err(StreamError::ConfigError(
                "transcoder.ffmpeg_path must not be empty".to_string(),
            ));
        }

        if self.inflight_policy == InflightPolicy::Wait && self.inflight_wait_secs == 0 {
            return Err(StreamError::ConfigError(
                "inflight_wait_secs must be greater than 0 when inflight_policy is 'wait'"
                    .to_string(),
            ));
        }

        if let Some(search) = &self.search {
            if search.enabled && search.api_key.trim().is_empty() {
                return Err(StreamError::ConfigError(
                    "search.api_key must not be empty".to_string(),
                ));
            }
            if !(1..=50).contains(&search.max_results) {
                return Err(StreamError::ConfigError(format!(
                    "search.max_results must be between 1 and 50, got {}",
                    search.max_results
                )));
            }
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            StreamError::ConfigError(format!(
                "Invalid listen_address '{}': {}",
                self.listen_address, e
            ))
        })
    }

    /// Parsed log level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.log_level.parse().map_err(|_| {
            StreamError::ConfigError(format!("Invalid log_level '{}'", self.log_level))
        })
    }

    /// Fetch time limit, `None` when disabled
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }

    pub fn inflight_wait(&self) -> Duration {
        Duration::from_secs(self.inflight_wait_secs)
    }

    /// Search configuration if search is enabled
    pub fn enabled_search(&self) -> Option<&SearchConfig> {
        self.search.as_ref().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_address, "0.0.0.0:8080");
        assert_eq!(config.audio_extension, "mp3");
        assert_eq!(config.content_type, "audio/mp3");
        assert_eq!(config.inflight_policy, InflightPolicy::Reject);
        assert!(!config.strict_range_parsing);
        assert!(config.search.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = ServerConfig::from_yaml(
            r#"
route_prefix: "/api"
inflight_policy: wait
source:
  backend: http
  url_template: "http://mirror.local/media/{id}"
"#,
        )
        .unwrap();

        assert_eq!(config.route_prefix, "/api");
        assert_eq!(config.inflight_policy, InflightPolicy::Wait);
        assert_eq!(config.source.backend, "http");
        assert_eq!(config.source.program, "yt-dlp");
        assert_eq!(config.transcoder.audio_codec, "libmp3lame");
        assert_eq!(config.fetch_timeout_secs, 600);
    }

    #[test]
    fn test_validate_bad_listen_address() {
        let config = ServerConfig {
            listen_address: "nowhere".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_route_prefix() {
        let mut config = ServerConfig {
            route_prefix: "api".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.route_prefix = "/api/".to_string();
        assert!(config.validate().is_err());

        config.route_prefix = "/api".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_source_backend() {
        let mut config = ServerConfig::default();
        config.source.backend = "ftp".to_string();
        assert!(config.validate().is_err());

        config.source.backend = "http".to_string();
        config.source.url_template = "http://mirror.local/static".to_string();
        assert!(config.validate().is_err());

        config.source.url_template = "http://mirror.local/{id}".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let config = ServerConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(ServerConfig::default().log_level().unwrap(), tracing::Level::INFO);
    }

    #[test]
    fn test_validate_search() {
        let mut config = ServerConfig {
            search: Some(SearchConfig {
                enabled: true,
                api_key: "key".to_string(),
                endpoint: default_search_endpoint(),
                max_results: 0,
                timeout_secs: 10,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        if let Some(search) = config.search.as_mut() {
            search.max_results = 25;
        }
        assert!(config.validate().is_ok());
        assert!(config.enabled_search().is_some());
    }

    #[test]
    fn test_fetch_timeout_zero_disables() {
        let config = ServerConfig {
            fetch_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.fetch_timeout().is_none());
        assert_eq!(
            ServerConfig::default().fetch_timeout(),
            Some(Duration::from_secs(600))
        );
    }
}
