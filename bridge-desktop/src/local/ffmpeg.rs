//! Audio extraction with `ffprobe` and `ffmpeg`.

use bridge_traits::error::{BridgeError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

/// What `ffprobe` reports about an input file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Seconds; 0 when the container does not say.
    pub duration: f64,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

pub(crate) fn parse_media_info(json: &str) -> Result<MediaInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| BridgeError::OperationFailed(format!("Unreadable ffprobe output: {e}")))?;
    let duration = output
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = output
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio"));
    Ok(MediaInfo {
        duration,
        has_audio,
    })
}

/// Seconds of output written so far, from an `ffmpeg -progress` line.
pub(crate) fn parse_out_time(line: &str) -> Option<f64> {
    let micros = line.strip_prefix("out_time_ms=")?.trim().parse::<i64>().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

/// Converts media into the 16 kHz mono PCM WAV that whisper.cpp reads.
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl AudioExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub async fn media_info(&self, input: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BridgeError::NotAvailable(format!("Cannot run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BridgeError::OperationFailed(format!(
                "Could not read media info: {}",
                stderr.trim()
            )));
        }
        parse_media_info(&String::from_utf8_lossy(&output.stdout))
    }

    /// Writes the audio track of `input` to `output`. `on_progress` receives
    /// the finished fraction, 0.0 to 1.0, when `duration` is known.
    #[instrument(skip(self, on_progress), fields(input = ?input.file_name()))]
    pub async fn extract<F>(
        &self,
        input: &Path,
        output: &Path,
        duration: f64,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(f64) + Send,
    {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostats", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y"])
            .args(["-progress", "pipe:1"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::NotAvailable(format!("Cannot run ffmpeg: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(seconds) = parse_out_time(&line) {
                    if duration > 0.0 {
                        on_progress((seconds / duration).clamp(0.0, 1.0));
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(BridgeError::OperationFailed(format!(
                "Audio extraction failed ({status})"
            )));
        }
        on_progress(1.0);
        debug!(output = %output.display(), "Audio extracted");
        Ok(())
    }
}
