//! Fakes and helpers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use audio_cache_server::{
    AssetId, AssetStore, ContentSource, FetchPipeline, Result, ServerConfig, ServiceMetrics,
    StreamError, StreamServer, Transcoder,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Deterministic fake media of `len` bytes
pub fn media(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn id(raw: &str) -> AssetId {
    AssetId::parse(raw).unwrap()
}

/// Names of all entries in `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Source that writes fixed bytes, optionally after a delay, and counts calls
pub struct FakeSource {
    data: Vec<u8>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(FakeSource {
            data,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(data: Vec<u8>, delay: Duration) -> Arc<Self> {
        Arc::new(FakeSource {
            data,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch(&self, _id: &AssetId, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Write half first so a timeout leaves a partial raw file behind.
        let (head, tail) = self.data.split_at(self.data.len() / 2);
        sink.write_all(head).await?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        sink.write_all(tail).await?;
        sink.flush().await?;
        Ok(self.data.len() as u64)
    }
}

/// Source that writes some bytes and then fails
pub struct FailingSource {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FailingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(FailingSource {
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(FailingSource {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FailingSource {
    async fn fetch(&self, id: &AssetId, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sink.write_all(b"partial download").await?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(StreamError::SourceUnavailable(format!("{} is unavailable", id)))
    }
}

/// Transcoder that copies its input unchanged
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// Transcoder that leaves half-written output behind and fails
pub struct FailingTranscoder;

#[async_trait]
impl Transcoder for FailingTranscoder {
    async fn transcode(&self, _input: &Path, output: &Path) -> Result<()> {
        tokio::fs::write(output, b"half an mp3").await?;
        Err(StreamError::TranscodeFailed("codec exploded".to_string()))
    }
}

/// Transcoder that succeeds without writing anything
pub struct EmptyTranscoder;

#[async_trait]
impl Transcoder for EmptyTranscoder {
    async fn transcode(&self, _input: &Path, _output: &Path) -> Result<()> {
        Ok(())
    }
}

pub fn pipeline(
    dir: &Path,
    source: Arc<dyn ContentSource>,
    transcoder: Arc<dyn Transcoder>,
) -> FetchPipeline {
    FetchPipeline::new(AssetStore::new(dir, "mp3"), source, transcoder)
}

/// A server over `dir` with the given fakes and configuration
pub fn server(
    dir: &Path,
    config: ServerConfig,
    source: Arc<dyn ContentSource>,
    transcoder: Arc<dyn Transcoder>,
) -> StreamServer {
    let config = ServerConfig {
        asset_dir: dir.to_path_buf(),
        ..config
    };
    let pipeline = pipeline(dir, source, transcoder).with_timeout(config.fetch_timeout());
    StreamServer::new(
        Arc::new(config),
        Arc::new(pipeline),
        ServiceMetrics::new().unwrap(),
    )
}
