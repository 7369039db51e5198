//! whisper.cpp transcription through the `whisper-cli` binary.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    transcription::{
        ProgressCallback, TranscriptSegment, TranscriptionEngine, TranscriptionOutput,
        TranscriptionProgress, TranscriptionProviderKind, TranscriptionRequest,
        TranscriptionStage,
    },
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{AudioExtractor, LocalTools, WhisperModelStore};

/// Share of overall progress spent on audio extraction.
const EXTRACTION_SHARE: f64 = 30.0;

#[derive(Debug, Deserialize)]
struct WhisperJson {
    #[serde(default)]
    transcription: Vec<WhisperJsonSegment>,
    result: Option<WhisperJsonResult>,
}

#[derive(Debug, Deserialize)]
struct WhisperJsonSegment {
    timestamps: Option<Span<String>>,
    offsets: Option<Span<i64>>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Span<T> {
    from: T,
    to: T,
}

#[derive(Debug, Deserialize)]
struct WhisperJsonResult {
    language: Option<String>,
}

/// `HH:MM:SS,mmm` (or `.mmm`) to seconds.
fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    let (clock, fraction) = value.split_once([',', '.']).unwrap_or((value, ""));
    let mut seconds: u64 = 0;
    for part in clock.split(':') {
        seconds = seconds * 60 + part.parse::<u64>().ok()?;
    }
    let fraction = format!("{fraction:0<3}");
    let millis = seconds * 1000 + fraction.get(..3)?.parse::<u64>().ok()?;
    Some(millis as f64 / 1000.0)
}

fn segment_bounds(segment: &WhisperJsonSegment) -> (f64, f64) {
    let from_stamps = segment
        .timestamps
        .as_ref()
        .and_then(|span| Some((parse_timestamp(&span.from)?, parse_timestamp(&span.to)?)));
    from_stamps
        .or_else(|| {
            segment
                .offsets
                .as_ref()
                .map(|span| (span.from as f64 / 1000.0, span.to as f64 / 1000.0))
        })
        .unwrap_or((0.0, 0.0))
}

fn parse_whisper_json(json: &str, fallback_language: &str) -> Result<TranscriptionOutput> {
    let parsed: WhisperJson = serde_json::from_str(json)
        .map_err(|e| BridgeError::OperationFailed(format!("Unreadable whisper output: {e}")))?;

    let segments: Vec<TranscriptSegment> = parsed
        .transcription
        .iter()
        .filter_map(|segment| {
            let text = segment.text.trim();
            if text.is_empty() {
                return None;
            }
            let (start, end) = segment_bounds(segment);
            Some(TranscriptSegment {
                start,
                end,
                text: text.to_string(),
            })
        })
        .collect();

    let full_text = segments
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let duration = segments.last().map(|segment| segment.end).unwrap_or(0.0);
    let language = parsed
        .result
        .and_then(|result| result.language)
        .filter(|language| !language.is_empty())
        .unwrap_or_else(|| fallback_language.to_string());

    Ok(TranscriptionOutput {
        segments,
        full_text,
        language,
        duration,
    })
}

/// Percentage from a `whisper_print_progress_callback: progress = 42%` line.
fn parse_progress_line(line: &str) -> Option<u8> {
    let (_, rest) = line.split_once("progress =")?;
    let value = rest.trim().trim_end_matches('%').trim().parse::<f64>().ok()?;
    Some(value.clamp(0.0, 100.0) as u8)
}

fn overall(stage_share: f64, stage_fraction: f64) -> u8 {
    (stage_share + stage_fraction * (100.0 - stage_share)).round().clamp(0.0, 100.0) as u8
}

/// Runs whisper.cpp locally on audio extracted by ffmpeg.
///
/// Progress is split per job: extraction maps to 0-30%, the model run to
/// 30-100%.
#[derive(Debug, Clone)]
pub struct LocalWhisperEngine {
    tools: LocalTools,
    models: WhisperModelStore,
}

impl LocalWhisperEngine {
    /// Discovers the tools and uses the default model folder.
    pub fn new() -> Result<Self> {
        Ok(Self::with_tools(
            LocalTools::discover(),
            WhisperModelStore::default_location()?,
        ))
    }

    pub fn with_tools(tools: LocalTools, models: WhisperModelStore) -> Self {
        Self { tools, models }
    }

    pub fn models(&self) -> &WhisperModelStore {
        &self.models
    }

    fn require_tools(&self) -> Result<(&Path, AudioExtractor)> {
        let missing = |tool: &str| BridgeError::NotAvailable(format!("{tool} is not installed"));
        let whisper = self.tools.whisper.as_deref().ok_or_else(|| missing("whisper-cli"))?;
        let ffmpeg = self.tools.ffmpeg.as_deref().ok_or_else(|| missing("ffmpeg"))?;
        let ffprobe = self.tools.ffprobe.as_deref().ok_or_else(|| missing("ffprobe"))?;
        Ok((whisper, AudioExtractor::new(ffmpeg, ffprobe)))
    }

    async fn run_whisper(
        &self,
        whisper: &Path,
        model: &Path,
        audio: &Path,
        output_prefix: &Path,
        language: Option<&str>,
        progress: &ProgressCallback,
    ) -> Result<PathBuf> {
        let mut child = Command::new(whisper)
            .arg("-m")
            .arg(model)
            .arg("-f")
            .arg(audio)
            .arg("-oj")
            .arg("-of")
            .arg(output_prefix)
            .arg("-pp")
            .args(["-l", language.unwrap_or("auto")])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::NotAvailable(format!("Cannot run whisper-cli: {e}")))?;

        let mut last_line = String::new();
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                match parse_progress_line(&line) {
                    Some(percent) => progress(TranscriptionProgress {
                        stage: TranscriptionStage::Transcribing,
                        percent: overall(EXTRACTION_SHARE, f64::from(percent) / 100.0),
                    }),
                    None if !line.trim().is_empty() => last_line = line,
                    None => {}
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(BridgeError::OperationFailed(format!(
                "whisper-cli failed ({status}): {}",
                last_line.trim()
            )));
        }
        Ok(output_prefix.with_extension("json"))
    }
}

#[async_trait]
impl TranscriptionEngine for LocalWhisperEngine {
    fn kind(&self) -> TranscriptionProviderKind {
        TranscriptionProviderKind::Local
    }

    async fn is_available(&self) -> bool {
        self.tools.is_complete()
    }

    async fn installed_models(&self) -> Result<Vec<String>> {
        self.models.installed().await
    }

    #[instrument(skip(self, progress), fields(file = ?request.path.file_name(), model = %request.model))]
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        progress: ProgressCallback,
    ) -> Result<TranscriptionOutput> {
        let (whisper, extractor) = self.require_tools()?;
        if !self.models.is_installed(&request.model).await {
            return Err(BridgeError::ModelNotFound(request.model.clone()));
        }
        let model = self.models.model_path(&request.model);

        let media = extractor.media_info(&request.path).await?;
        if !media.has_audio {
            return Err(BridgeError::NoAudioStream(request.path.display().to_string()));
        }

        let workdir = tempfile::Builder::new().prefix("clip-flow-").tempdir()?;
        let audio = workdir.path().join("audio.wav");

        progress(TranscriptionProgress {
            stage: TranscriptionStage::ExtractingAudio,
            percent: 0,
        });
        let extraction_progress = progress.clone();
        extractor
            .extract(&request.path, &audio, media.duration, move |fraction| {
                extraction_progress(TranscriptionProgress {
                    stage: TranscriptionStage::ExtractingAudio,
                    percent: overall(0.0, fraction * EXTRACTION_SHARE / 100.0),
                })
            })
            .await?;

        let json_path = self
            .run_whisper(
                whisper,
                &model,
                &audio,
                &workdir.path().join("transcript"),
                request.language.as_deref(),
                &progress,
            )
            .await?;

        let raw = tokio::fs::read(&json_path).await?;
        let fallback_language = request.language.as_deref().unwrap_or("auto");
        let output = parse_whisper_json(&String::from_utf8_lossy(&raw), fallback_language)?;

        progress(TranscriptionProgress {
            stage: TranscriptionStage::Transcribing,
            percent: 100,
        });
        debug!(
            segments = output.segments.len(),
            language = %output.language,
            "Local transcription complete"
        );
        Ok(output)
    }
}
