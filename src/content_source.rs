//! Raw media sources
//!
//! A [`ContentSource`] streams the raw media for one identifier into a writer.
//! Two backends exist: [`CommandContentSource`] runs a downloader such as
//! `yt-dlp` that writes the media to stdout, and [`HttpContentSource`] fetches
//! it from a plain HTTP URL.

use crate::config::SourceConfig;
use crate::error::{Result, StreamError};
use crate::models::AssetId;
use async_trait::async_trait;
use reqwest::Client;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const STDERR_TAIL: usize = 512;

/// Something that can produce the raw media for an identifier
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Stream the raw media for `id` into `sink`
    ///
    /// # Returns
    /// * `Ok(bytes)` the number of bytes written
    /// * `Err(StreamError::SourceUnavailable)` if the media cannot be obtained
    /// * `Err(StreamError::StorageError)` if writing to `sink` fails
    async fn fetch(&self, id: &AssetId, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64>;
}

/// Build the source selected by configuration
pub fn from_config(config: &SourceConfig) -> Result<Arc<dyn ContentSource>> {
    match config.backend.as_str() {
        "command" => Ok(Arc::new(CommandContentSource::new(
            config.program.clone(),
            config.args.clone(),
            config.url_template.clone(),
        ))),
        "http" => Ok(Arc::new(HttpContentSource::with_timeout(
            config.url_template.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?)),
        other => Err(StreamError::ConfigError(format!(
            "Unknown source backend '{}'",
            other
        ))),
    }
}

/// Substitute `id` for `{id}` in a source URL template
fn source_url(template: &str, id: &AssetId) -> String {
    template.replace("{id}", id.as_str())
}

/// Fetches raw media with a GET request to a URL template
pub struct HttpContentSource {
    client: Client,
    url_template: String,
}

impl HttpContentSource {
    /// Create a source for `url_template`, where `{id}` is replaced per request
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url_template, Duration::from_secs(300))
    }

    pub fn with_timeout(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpContentSource {
            client,
            url_template: url_template.into(),
        })
    }

    fn url_for(&self, id: &AssetId) -> String {
        source_url(&self.url_template, id)
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(&self, id: &AssetId, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        let url = self.url_for(id);
        debug!("Downloading {} from {}", id, url);

        let mut response = self.client.get(&url).send().await.map_err(|e| {
            warn!("GET {} failed: {}", url, e);
            StreamError::SourceUnavailable(format!("request for {} failed: {}", id, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Source returned {} for {}", status, id);
            return Err(StreamError::SourceUnavailable(format!(
                "source returned {} for {}",
                status, id
            )));
        }

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            StreamError::SourceUnavailable(format!("download of {} interrupted: {}", id, e))
        })? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        if written == 0 {
            return Err(StreamError::SourceUnavailable(format!(
                "source returned no data for {}",
                id
            )));
        }

        info!("Downloaded {} bytes for {}", written, id);
        Ok(written)
    }
}

/// Runs an external downloader that writes the media to stdout
pub struct CommandContentSource {
    program: String,
    args: Vec<String>,
    url_template: String,
}

impl CommandContentSource {
    /// # Arguments
    /// * `program` - Downloader executable
    /// * `args` - Arguments; `{url}` is replaced with the source URL
    /// * `url_template` - Source URL; `{id}` is replaced with the identifier
    pub fn new(program: String, args: Vec<String>, url_template: String) -> Self {
        CommandContentSource {
            program,
            args,
            url_template,
        }
    }

    fn args_for(&self, id: &AssetId) -> Vec<String> {
        let url = source_url(&self.url_template, id);
        self.args.iter().map(|arg| arg.replace("{url}", &url)).collect()
    }
}

#[async_trait]
impl ContentSource for CommandContentSource {
    async fn fetch(&self, id: &AssetId, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        let args = self.args_for(id);
        debug!("Running {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StreamError::SourceUnavailable(format!("failed to start {}: {}", self.program, e))
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            StreamError::InternalError("downloader stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take().map(|stderr| tokio::spawn(drain(stderr)));

        let written = copy_stream(&mut stdout, sink, id).await?;
        let status = child.wait().await.map_err(|e| {
            StreamError::SourceUnavailable(format!("failed to wait for {}: {}", self.program, e))
        })?;

        let stderr = match stderr {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            warn!("{} exited with {} for {}: {}", self.program, status, id, stderr);
            return Err(StreamError::SourceUnavailable(format!(
                "{} exited with {}: {}",
                self.program, status, stderr
            )));
        }

        if written == 0 {
            return Err(StreamError::SourceUnavailable(format!(
                "{} produced no data for {}",
                self.program, id
            )));
        }

        info!("Downloaded {} bytes for {}", written, id);
        Ok(written)
    }
}

/// Copy `reader` into `sink`, blaming read errors on the source and write
/// errors on storage
async fn copy_stream<R>(
    reader: &mut R,
    sink: &mut (dyn AsyncWrite + Send + Unpin),
    id: &AssetId,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| {
            StreamError::SourceUnavailable(format!("download of {} interrupted: {}", id, e))
        })?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    sink.flush().await?;
    Ok(written)
}

/// Read a child's stderr to the end, keeping only the tail
async fn drain<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_to_end(&mut buf).await.is_err() {
        return String::new();
    }
    let text = String::from_utf8_lossy(&buf);
    let text = text.trim();
    let cut = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(i, _)| i);
    text[cut..].to_string()
}
