//! Domain models for the media library
//!
//! Scanned entries ([`FileEntry`], [`FolderEntry`]) are rebuilt on every scan;
//! [`StatusRecord`] is the only per-file state that survives rescans and
//! restarts.

use crate::error::LibraryError;

use bridge_traits::{RawNode, SummaryProviderKind, TranscriptSegment, TranscriptionProviderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Status records keyed by absolute file path.
pub type StatusMap = BTreeMap<String, StatusRecord>;

// =============================================================================
// Status enums
// =============================================================================

/// Transcription lifecycle of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Pending,
    Extracting,
    Transcribing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Transcribing => "transcribing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// A job is working on the file.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Extracting | Self::Transcribing)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "extracting" => Ok(Self::Extracting),
            "transcribing" => Ok(Self::Transcribing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(LibraryError::InvalidInput {
                field: "status".to_string(),
                message: format!("unknown file status '{}'", other),
            }),
        }
    }
}

/// Summarization lifecycle of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Pending,
    Summarizing,
    Completed,
    Error,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "summarizing" => Ok(Self::Summarizing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(LibraryError::InvalidInput {
                field: "summaryStatus".to_string(),
                message: format!("unknown summary status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Transcript & Summary
// =============================================================================

/// Which provider and model produced a transcript or summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
}

impl ProviderInfo {
    pub fn transcription(kind: TranscriptionProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider: kind.as_str().to_string(),
            model: model.into(),
        }
    }

    pub fn summarization(kind: SummaryProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider: kind.as_str().to_string(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Timed segments in playback order
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
    pub language: String,
    /// Media duration in seconds
    pub duration: f64,
    #[serde(flatten)]
    pub source: ProviderInfo,
}

impl Transcript {
    /// No speech was recognized.
    pub fn is_empty(&self) -> bool {
        self.full_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub text: String,
    pub language: String,
    #[serde(flatten)]
    pub source: ProviderInfo,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// StatusRecord
// =============================================================================

/// Durable per-file processing state, persisted as camelCase JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: FileStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_status: Option<SummaryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,
}

impl StatusRecord {
    /// Drops the summary together with its status and error.
    pub fn clear_summary(&mut self) {
        self.summary = None;
        self.summary_status = None;
        self.summary_error = None;
    }

    /// Back to an untouched pending file.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_transcript_text(&self) -> bool {
        self.transcript.as_ref().is_some_and(|t| !t.is_empty())
    }
}

// =============================================================================
// Tree entries
// =============================================================================

/// A media file in the scanned tree, with its status projected onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Absolute path; the identity of the file
    pub path: String,
    pub name: String,
    pub size: u64,
    pub extension: Option<String>,
    /// Modification time in unix seconds
    pub modified: i64,
    pub status: FileStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub transcript: Option<Transcript>,
    pub summary: Option<Summary>,
    pub summary_status: Option<SummaryStatus>,
    pub summary_error: Option<String>,
}

impl FileEntry {
    pub fn from_raw(raw: &RawNode, record: Option<&StatusRecord>) -> Self {
        let mut entry = Self {
            path: raw.path.clone(),
            name: raw.name.clone(),
            size: raw.size,
            extension: raw.extension.clone(),
            modified: raw.modified,
            status: FileStatus::Pending,
            progress: 0,
            error: None,
            transcript: None,
            summary: None,
            summary_status: None,
            summary_error: None,
        };
        if let Some(record) = record {
            entry.apply_record(record);
        }
        entry
    }

    /// Overwrites every status field from `record`.
    pub fn apply_record(&mut self, record: &StatusRecord) {
        self.status = record.status;
        self.progress = record.progress;
        self.error = record.error.clone();
        self.transcript = record.transcript.clone();
        self.summary = record.summary.clone();
        self.summary_status = record.summary_status;
        self.summary_error = record.summary_error.clone();
    }

    /// Resets every status field to an untouched pending file.
    pub fn clear_record(&mut self) {
        self.apply_record(&StatusRecord::default());
    }

    pub fn record(&self) -> StatusRecord {
        StatusRecord {
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
            transcript: self.transcript.clone(),
            summary: self.summary.clone(),
            summary_status: self.summary_status,
            summary_error: self.summary_error.clone(),
        }
    }
}

/// A folder in the scanned tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    /// Absolute path; the identity of the folder
    pub path: String,
    pub name: String,
    /// Files directly inside this folder, in scan order
    pub files: Vec<FileEntry>,
    /// Subfolders, in scan order
    pub folders: Vec<FolderEntry>,
    pub expanded: bool,
}

impl FolderEntry {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            files: Vec::new(),
            folders: Vec::new(),
            expanded: true,
        }
    }

    /// No files anywhere below this folder.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.iter().all(FolderEntry::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        Transcript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 1.5,
                text: "Hello".to_string(),
            }],
            full_text: "Hello".to_string(),
            language: "en".to_string(),
            duration: 1.5,
            source: ProviderInfo::transcription(TranscriptionProviderKind::Local, "base"),
        }
    }

    #[test]
    fn test_status_record_wire_format() {
        let record = StatusRecord {
            status: FileStatus::Completed,
            progress: 100,
            transcript: Some(transcript()),
            summary_status: Some(SummaryStatus::Error),
            summary_error: Some("Rate limited".to_string()),
            ..StatusRecord::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["summaryStatus"], "error");
        assert_eq!(json["summaryError"], "Rate limited");
        assert_eq!(json["transcript"]["fullText"], "Hello");
        assert_eq!(json["transcript"]["provider"], "local");
        assert!(json.get("error").is_none());
        assert!(json.get("summary").is_none());

        let back: StatusRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_minimal_record_parses() {
        let record: StatusRecord =
            serde_json::from_str(r#"{"status":"pending","progress":0}"#).unwrap();
        assert_eq!(record, StatusRecord::default());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("transcribing".parse::<FileStatus>().unwrap(), FileStatus::Transcribing);
        assert_eq!("summarizing".parse::<SummaryStatus>().unwrap(), SummaryStatus::Summarizing);
        assert!("done".parse::<FileStatus>().is_err());
        assert!(FileStatus::Error.is_terminal());
        assert!(FileStatus::Extracting.is_in_progress());
    }

    #[test]
    fn test_clear_summary_resets_all_summary_fields() {
        let mut record = StatusRecord {
            summary_status: Some(SummaryStatus::Error),
            summary_error: Some("boom".to_string()),
            ..StatusRecord::default()
        };
        record.clear_summary();
        assert_eq!(record.summary_status, None);
        assert_eq!(record.summary_error, None);
    }

    #[test]
    fn test_file_entry_round_trips_record() {
        let raw = RawNode::file("/media/a.mp4", "a.mp4", 10, 1_700_000_000);
        let record = StatusRecord {
            status: FileStatus::Completed,
            progress: 100,
            transcript: Some(transcript()),
            ..StatusRecord::default()
        };

        let entry = FileEntry::from_raw(&raw, Some(&record));
        assert_eq!(entry.extension.as_deref(), Some("mp4"));
        assert_eq!(entry.record(), record);

        let fresh = FileEntry::from_raw(&raw, None);
        assert_eq!(fresh.status, FileStatus::Pending);
        assert_eq!(fresh.progress, 0);
    }

    #[test]
    fn test_empty_transcript_detection() {
        let mut t = transcript();
        assert!(!t.is_empty());
        t.full_text = "  ".to_string();
        assert!(t.is_empty());
    }
}
