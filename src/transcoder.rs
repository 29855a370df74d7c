//! Conversion of raw media to the published audio format

use crate::config::TranscoderConfig;
use crate::error::{Result, StreamError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Converts a raw media file into the target audio file
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write the converted form of `input` to `output`
    ///
    /// `output` may already exist (as an empty temp file) and must be
    /// overwritten. On failure the caller removes whatever was written.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Transcoder backed by the `ffmpeg` command line tool
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        FfmpegTranscoder { config }
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_owned());
        args.extend(
            ["-vn", "-c:a", self.config.audio_codec.as_str()]
                .into_iter()
                .map(OsString::from),
        );
        args.extend(self.config.extra_args.iter().map(OsString::from));
        // The temp output has no meaningful extension, so the container is explicit.
        args.push(OsString::from("-f"));
        args.push(OsString::from(&self.config.output_format));
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let args = self.args(input, output);
        debug!("Running {} {:?}", self.config.ffmpeg_path, args);

        let result = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                StreamError::TranscodeFailed(format!(
                    "failed to run {}: {}",
                    self.config.ffmpeg_path, e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(
                "{} exited with {}: {}",
                self.config.ffmpeg_path,
                result.status,
                stderr.trim()
            );
            return Err(StreamError::TranscodeFailed(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
