//! Two-stage acquisition of an asset: download, then transcode
//!
//! Every intermediate file is a [`TempPath`] that deletes itself when dropped,
//! so any early return (error, timeout, cancelled future) leaves nothing behind.
//! The only file that survives a run is the one handed to
//! [`AssetStore::publish`].

use crate::asset_store::{AssetStore, PART_SUFFIX, RAW_SUFFIX};
use crate::content_source::ContentSource;
use crate::error::{Result, StreamError};
use crate::models::AssetId;
use crate::transcoder::Transcoder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::fs;
use tracing::{debug, info, warn};

/// Downloads and transcodes one asset into an [`AssetStore`]
pub struct FetchPipeline {
    store: AssetStore,
    source: Arc<dyn ContentSource>,
    transcoder: Arc<dyn Transcoder>,
    timeout: Option<Duration>,
}

impl FetchPipeline {
    pub fn new(
        store: AssetStore,
        source: Arc<dyn ContentSource>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        FetchPipeline {
            store,
            source,
            transcoder,
            timeout: None,
        }
    }

    /// Limit each run to `timeout`; `None` runs without a limit
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Fetch, transcode and publish the asset for `id`
    ///
    /// # Returns
    /// * `Ok(path)` of the published asset
    /// * `Err(StreamError::SourceUnavailable)` if the download failed
    /// * `Err(StreamError::TranscodeFailed)` if conversion failed
    /// * `Err(StreamError::Timeout)` if the run exceeded the time limit
    /// * `Err(StreamError::StorageError)` for local filesystem failures
    ///
    /// On any error, no file exists at the asset path and no temp file remains.
    pub async fn run(&self, id: &AssetId) -> Result<PathBuf> {
        let started = Instant::now();
        info!("Fetching asset {}", id);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.stages(id)).await {
                Ok(result) => result,
                Err(_) => Err(StreamError::Timeout(format!(
                    "fetch of {} exceeded {}s",
                    id,
                    limit.as_secs()
                ))),
            },
            None => self.stages(id).await,
        };

        match &result {
            Ok(path) => info!(
                "Asset {} ready at {} after {:?}",
                id,
                path.display(),
                started.elapsed()
            ),
            Err(e) => warn!("Fetch of {} failed after {:?}: {}", id, started.elapsed(), e),
        }
        result
    }

    async fn stages(&self, id: &AssetId) -> Result<PathBuf> {
        let raw = self.download(id).await?;
        let output = self.transcode(id, &raw).await?;

        if let Err(e) = raw.close() {
            warn!("Failed to remove raw download for {}: {}", id, e);
        }

        self.store.publish(output, id).await
    }

    async fn download(&self, id: &AssetId) -> Result<TempPath> {
        let (file, path) = self.store.temp_file(id, RAW_SUFFIX).await?.into_parts();
        let mut file = fs::File::from_std(file);

        let bytes = self.source.fetch(id, &mut file).await?;
        file.sync_all().await?;
        debug!("Raw media for {} is {} bytes at {}", id, bytes, path.display());

        Ok(path)
    }

    async fn transcode(&self, id: &AssetId, raw: &TempPath) -> Result<TempPath> {
        let output = self.store.temp_file(id, PART_SUFFIX).await?.into_temp_path();

        self.transcoder.transcode(raw, &output).await?;

        let size = fs::metadata(&output).await?.len();
        if size == 0 {
            return Err(StreamError::TranscodeFailed(format!(
                "transcoder produced an empty file for {}",
                id
            )));
        }
        debug!("Transcoded {} into {} bytes", id, size);

        Ok(output)
    }
}
