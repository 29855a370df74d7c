//! Core data models for the audio cache server

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Maximum identifier length accepted at the boundary
pub const MAX_ID_LEN: usize = 64;

/// Opaque identifier naming one streamable asset
///
/// The identifier doubles as a file name inside the asset directory, so only
/// `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Validate and wrap a raw identifier
    ///
    /// # Returns
    /// * `Ok(AssetId)` for 1 to 64 characters from `[A-Za-z0-9_-]`
    /// * `Err(StreamError::InvalidIdentifier)` otherwise
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > MAX_ID_LEN {
            return Err(StreamError::InvalidIdentifier(format!(
                "identifier must be 1 to {} characters, got {}",
                MAX_ID_LEN,
                raw.len()
            )));
        }

        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(StreamError::InvalidIdentifier(format!(
                "unexpected character {:?} in identifier",
                bad
            )));
        }

        Ok(AssetId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AssetId {
    type Error = StreamError;

    fn try_from(value: String) -> Result<Self> {
        AssetId::parse(&value)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

/// Byte interval requested by a client, before the file size is known
///
/// Either bound may be unset: an unset `start` means "from the beginning",
/// an unset `end` means "through the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte requested (inclusive)
    pub start: Option<u64>,
    /// Last byte requested (inclusive)
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        ByteRange { start, end }
    }

    /// A range with no bounds, i.e. the whole resource
    pub fn unbounded() -> Self {
        ByteRange::default()
    }

    /// Whether the client asked for a sub-range at all
    pub fn has_bounds(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Resolve this request against a file of `size` bytes
    ///
    /// # Returns
    /// * A non-partial range covering the whole file when no bound is set
    /// * A partial range with unset `start` defaulting to 0 and unset or
    ///   oversized `end` clamped to `size - 1`
    /// * `Err(StreamError::UnsatisfiableRange)` when `start >= size`
    /// * `Err(StreamError::MalformedRange)` when `end < start`; callers in
    ///   lenient mode fall back to [`ResolvedRange::full`]
    pub fn resolve(&self, size: u64) -> Result<ResolvedRange> {
        if !self.has_bounds() {
            return Ok(ResolvedRange::full(size));
        }

        let start = self.start.unwrap_or(0);
        if start >= size {
            return Err(StreamError::UnsatisfiableRange { start, size });
        }

        let last = size - 1;
        let end = self.end.map_or(last, |end| end.min(last));
        if end < start {
            return Err(StreamError::MalformedRange(format!(
                "end ({}) is before start ({})",
                end, start
            )));
        }

        Ok(ResolvedRange {
            start,
            length: end - start + 1,
            total: size,
            partial: true,
        })
    }
}

/// A byte interval resolved against a concrete file size
///
/// Invariant for partial ranges: `0 <= start <= end <= total - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// First byte served
    pub start: u64,
    /// Number of bytes served
    pub length: u64,
    /// Size of the whole file
    pub total: u64,
    /// Whether this answers a range request (206) or a plain request (200)
    pub partial: bool,
}

impl ResolvedRange {
    /// The whole file, served as a plain 200 response
    pub fn full(size: u64) -> Self {
        ResolvedRange {
            start: 0,
            length: size,
            total: size,
            partial: false,
        }
    }

    /// Last byte served (inclusive); meaningless when `length == 0`
    pub fn end(&self) -> u64 {
        (self.start + self.length).saturating_sub(1)
    }

    /// Value of the `Content-Range` header for this range
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end(), self.total)
    }
}

/// State of an asset on stable storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRecord {
    /// No published file exists for the identifier
    Absent,
    /// A complete file exists
    Present { path: PathBuf, size: u64 },
}

impl AssetRecord {
    pub fn is_present(&self) -> bool {
        matches!(self, AssetRecord::Present { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_accepts_video_ids() {
        let id = AssetId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
        assert_eq!(id.to_string(), "dQw4w9WgXcQ");
        assert!(AssetId::parse("a_b-c").is_ok());
    }

    #[test]
    fn test_asset_id_rejects_path_tricks() {
        assert!(AssetId::parse("").is_err());
        assert!(AssetId::parse("../etc/passwd").is_err());
        assert!(AssetId::parse("a/b").is_err());
        assert!(AssetId::parse("a.mp3").is_err());
        assert!(AssetId::parse(&"x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_resolve_unbounded() {
        let resolved = ByteRange::unbounded().resolve(1000).unwrap();
        assert!(!resolved.partial);
        assert_eq!(resolved.start, 0);
        assert_eq!(resolved.length, 1000);
        assert_eq!(resolved.end(), 999);
    }

    #[test]
    fn test_resolve_unbounded_empty_file() {
        let resolved = ByteRange::unbounded().resolve(0).unwrap();
        assert!(!resolved.partial);
        assert_eq!(resolved.length, 0);
    }

    #[test]
    fn test_resolve_open_end() {
        let resolved = ByteRange::new(Some(900), None).resolve(1000).unwrap();
        assert!(resolved.partial);
        assert_eq!(resolved.content_range(), "bytes 900-999/1000");
        assert_eq!(resolved.length, 100);
    }

    #[test]
    fn test_resolve_open_start() {
        let resolved = ByteRange::new(None, Some(99)).resolve(1000).unwrap();
        assert_eq!(resolved.start, 0);
        assert_eq!(resolved.content_range(), "bytes 0-99/1000");
    }

    #[test]
    fn test_resolve_clamps_end() {
        let resolved = ByteRange::new(Some(500), Some(5000)).resolve(1000).unwrap();
        assert_eq!(resolved.content_range(), "bytes 500-999/1000");
        assert_eq!(resolved.length, 500);
    }

    #[test]
    fn test_resolve_start_past_end_of_file() {
        let err = ByteRange::new(Some(1000), None).resolve(1000).unwrap_err();
        assert!(matches!(
            err,
            StreamError::UnsatisfiableRange { start: 1000, size: 1000 }
        ));
    }

    #[test]
    fn test_resolve_inverted() {
        let err = ByteRange::new(Some(50), Some(10)).resolve(1000).unwrap_err();
        assert!(matches!(err, StreamError::MalformedRange(_)));
    }
}
