//! On-disk storage of published assets
//!
//! Layout inside the asset directory:
//!
//! - `{id}.{ext}`: a published, complete asset
//! - `.{id}-XXXXXX.raw`: raw media being downloaded
//! - `.{id}-XXXXXX.part`: transcoder output not yet published
//!
//! Temp files are dot-prefixed so they can never collide with a published
//! asset name, and only [`AssetStore::publish`] renames one onto `{id}.{ext}`.

use crate::error::{Result, StreamError};
use crate::models::{AssetId, AssetRecord, ResolvedRange};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom, Take};
use tracing::{debug, info, warn};

/// Suffix of raw downloads
pub const RAW_SUFFIX: &str = ".raw";
/// Suffix of unpublished transcoder output
pub const PART_SUFFIX: &str = ".part";

/// Maps identifiers to files in a single asset directory
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
    extension: String,
}

impl AssetStore {
    /// Create a store rooted at `root` publishing files with `extension`
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        AssetStore {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the asset directory if needed
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            StreamError::StorageError(format!(
                "Failed to create asset directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    /// Canonical path of the published asset for `id`
    pub fn asset_path(&self, id: &AssetId) -> PathBuf {
        self.root.join(format!("{}.{}", id, self.extension))
    }

    /// Look up the published asset for `id`
    ///
    /// # Returns
    /// * `AssetRecord::Present` with the exact size when a file is published
    /// * `AssetRecord::Absent` when nothing is published
    /// * `Err(StreamError::StorageError)` when the stat itself fails
    pub async fn lookup(&self, id: &AssetId) -> Result<AssetRecord> {
        let path = self.asset_path(id);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(AssetRecord::Present {
                path,
                size: meta.len(),
            }),
            Ok(_) => Err(StreamError::StorageError(format!(
                "{} exists but is not a regular file",
                path.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(AssetRecord::Absent),
            Err(e) => Err(StreamError::StorageError(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Create a temp file for `id` inside the asset directory
    ///
    /// The file is removed when the returned handle (or its [`TempPath`]) is
    /// dropped, unless it is published first. Creation runs on the blocking
    /// pool.
    pub async fn temp_file(&self, id: &AssetId, suffix: &str) -> Result<NamedTempFile> {
        let root = self.root.clone();
        let prefix = format!(".{}-", id);
        let suffix = suffix.to_string();

        let created = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&root)
        })
        .await
        .map_err(|e| StreamError::InternalError(format!("temp file task failed: {}", e)))?;

        created.map_err(|e| {
            StreamError::StorageError(format!(
                "Failed to create temp file for {} in {}: {}",
                id,
                self.root.display(),
                e
            ))
        })
    }

    /// Atomically publish a finished temp file as the asset for `id`
    ///
    /// This rename is the only way a file appears at the canonical path.
    pub async fn publish(&self, temp: TempPath, id: &AssetId) -> Result<PathBuf> {
        let target = self.asset_path(id);
        let destination = target.clone();

        tokio::task::spawn_blocking(move || temp.persist(&destination))
            .await
            .map_err(|e| StreamError::InternalError(format!("publish task failed: {}", e)))?
            .map_err(|e| {
                StreamError::StorageError(format!(
                    "Failed to publish {}: {}",
                    target.display(),
                    e.error
                ))
            })?;
        debug!("Published asset {} at {}", id, target.display());
        Ok(target)
    }

    /// Open `path` positioned at `range.start`, limited to `range.length` bytes
    pub async fn open_range(&self, path: &Path, range: &ResolvedRange) -> Result<Take<fs::File>> {
        let mut file = fs::File::open(path).await.map_err(|e| {
            StreamError::StorageError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        if range.start > 0 {
            file.seek(SeekFrom::Start(range.start)).await?;
        }
        Ok(file.take(range.length))
    }

    /// Remove temp files left behind by a previous process
    ///
    /// Only dot-prefixed `.raw` and `.part` files are touched; published
    /// assets never match.
    ///
    /// # Returns
    /// The number of files removed
    pub async fn sweep_temp_files(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_temp_name(name) {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale temp file {}: {}", name, e),
            }
        }

        if removed > 0 {
            info!(
                "Removed {} stale temp files from {}",
                removed,
                self.root.display()
            );
        }
        Ok(removed)
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && (name.ends_with(RAW_SUFFIX) || name.ends_with(PART_SUFFIX))
}
