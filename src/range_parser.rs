//! Range header parsing for seekable playback

use crate::error::{Result, StreamError};
use crate::models::{ByteRange, ResolvedRange};
use http::header::RANGE;
use http::HeaderMap;
use tracing::debug;

const BYTES_PREFIX: &str = "bytes=";

/// Parses `Range` request headers into [`ByteRange`] requests
///
/// Only the single-range form `bytes=<start>-<end>` is understood, where either
/// side may be empty. In lenient mode (the default) anything else means "serve
/// the whole resource". In strict mode malformed headers are reported as
/// [`StreamError::MalformedRange`].
///
/// Suffix ranges (`bytes=-500`, "the last 500 bytes") are not supported and are
/// treated as no range in both modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeParser {
    strict: bool,
}

impl RangeParser {
    /// Create a lenient parser
    pub fn new() -> Self {
        RangeParser { strict: false }
    }

    /// Create a parser that reports malformed headers as errors
    pub fn strict() -> Self {
        RangeParser { strict: true }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Parse a raw header value
    ///
    /// # Arguments
    /// * `header` - The `Range` header value, if the request carried one
    ///
    /// # Returns
    /// * `Ok(ByteRange)` with the bounds that were present
    /// * `Err(StreamError::MalformedRange)` only in strict mode
    pub fn parse(&self, header: Option<&str>) -> Result<ByteRange> {
        let Some(header) = header else {
            return Ok(ByteRange::unbounded());
        };

        match split_range(header) {
            Ok(range) => Ok(range),
            Err(reason) => {
                debug!("Ignoring Range header '{}': {}", header, reason);
                if self.strict {
                    Err(StreamError::MalformedRange(reason))
                } else {
                    Ok(ByteRange::unbounded())
                }
            }
        }
    }

    /// Extract and parse the `Range` header from a request
    pub fn extract(&self, headers: &HeaderMap) -> Result<ByteRange> {
        match headers.get(RANGE) {
            None => Ok(ByteRange::unbounded()),
            Some(value) => match value.to_str() {
                Ok(text) => self.parse(Some(text)),
                Err(_) if self.strict => Err(StreamError::MalformedRange(
                    "Range header is not valid ASCII".to_string(),
                )),
                Err(_) => Ok(ByteRange::unbounded()),
            },
        }
    }

    /// Resolve a parsed request against the actual file size
    ///
    /// An inverted range (`end < start`) is ignored in lenient mode and the
    /// whole file is served instead. A start beyond the file is always an
    /// error.
    pub fn resolve(&self, range: &ByteRange, size: u64) -> Result<ResolvedRange> {
        match range.resolve(size) {
            Err(StreamError::MalformedRange(reason)) if !self.strict => {
                debug!("Serving whole file, range {:?} ignored: {}", range, reason);
                Ok(ResolvedRange::full(size))
            }
            other => other,
        }
    }
}

/// Lenient parse of a raw header value; never fails
pub fn parse_range_header(header: Option<&str>) -> ByteRange {
    RangeParser::new()
        .parse(header)
        .unwrap_or_else(|_| ByteRange::unbounded())
}

/// Split `bytes=<start>-<end>` literally into its two components
///
/// `Err` carries the reason the header is malformed.
fn split_range(header: &str) -> std::result::Result<ByteRange, String> {
    let Some(spec) = header.trim().strip_prefix(BYTES_PREFIX) else {
        return Err("unit must be 'bytes'".to_string());
    };

    let parts: Vec<&str> = spec.split('-').collect();
    if parts.len() != 2 {
        return Err(format!("expected 'start-end', got '{}'", spec));
    }

    let start = parse_bound(parts[0])?;
    let end = parse_bound(parts[1])?;

    match (start, end) {
        (None, None) => Err("range has neither start nor end".to_string()),
        // Suffix form: "last N bytes" is not supported.
        (None, Some(_)) => Ok(ByteRange::unbounded()),
        // Ordering is checked by `resolve`, once the size is known.
        (start, end) => Ok(ByteRange::new(start, end)),
    }
}

fn parse_bound(raw: &str) -> std::result::Result<Option<u64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{}' is not a byte offset", raw));
    }
    raw.parse::<u64>()
        .map(Some)
        .map_err(|e| format!("'{}' is not a byte offset: {}", raw, e))
}
