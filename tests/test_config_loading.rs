use audio_cache_server::config::{InflightPolicy, ServerConfig};
use std::io::Write;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_shipped_config() {
    let config = ServerConfig::from_file("audio_cache_server.yaml");
    assert!(config.is_ok(), "Failed to load shipped config: {:?}", config.err());

    let config = config.unwrap();
    assert_eq!(config.listen_address, "0.0.0.0:8080");
    assert_eq!(config.route_prefix, "/api");
    assert_eq!(config.inflight_policy, InflightPolicy::Reject);
    assert_eq!(config.source.program, "yt-dlp");
    assert_eq!(config.transcoder.extra_args, vec!["-b:a", "192k"]);
    // The section exists but is switched off.
    assert!(config.search.is_some());
    assert!(config.enabled_search().is_none());
}

#[test]
fn test_load_minimal_config() {
    let file = write_config(
        r#"
asset_dir: "/var/cache/audio"
"#,
    );

    let config = ServerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.asset_dir.to_str(), Some("/var/cache/audio"));
    // Check defaults are applied
    assert_eq!(config.listen_address, "0.0.0.0:8080");
    assert_eq!(config.route_prefix, "");
    assert_eq!(config.content_type, "audio/mp3");
    assert_eq!(config.source.backend, "command");
    assert_eq!(config.transcoder.ffmpeg_path, "ffmpeg");
}

#[test]
fn test_load_empty_config_uses_defaults() {
    let file = write_config("{}\n");
    let config = ServerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.fetch_timeout_secs, 600);
    assert_eq!(config.inflight_wait_secs, 120);
}

#[test]
fn test_load_invalid_config() {
    let file = write_config(
        r#"
inflight_policy: wait
inflight_wait_secs: 0
"#,
    );

    let config = ServerConfig::from_file(file.path());
    assert!(config.is_err(), "waiting for zero seconds should fail validation");
}

#[test]
fn test_load_unknown_policy() {
    let file = write_config("inflight_policy: queue\n");
    assert!(ServerConfig::from_file(file.path()).is_err());
}

#[test]
fn test_load_malformed_yaml() {
    let file = write_config("listen_address: [unclosed\n");
    assert!(ServerConfig::from_file(file.path()).is_err());
}

#[test]
fn test_load_nonexistent_file() {
    let config = ServerConfig::from_file("nonexistent.yaml");
    assert!(config.is_err(), "Should fail when file doesn't exist");
}

#[test]
fn test_search_requires_api_key() {
    let file = write_config(
        r#"
search:
  api_key: ""
"#,
    );
    assert!(ServerConfig::from_file(file.path()).is_err());
}
