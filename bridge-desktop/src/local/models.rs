//! whisper.cpp model files: catalog, installed listing, download, removal.
//!
//! Models live as `ggml-<id>.bin` in one folder (by default
//! `<local data>/clip-flow/models`). Downloads go to a `.bin.tmp` file that is
//! renamed once complete, so a partial download never counts as installed.

use bridge_traits::error::{BridgeError, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::app_data_dir;
use crate::providers::{build_client, network_error, status_error};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// A downloadable whisper.cpp model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhisperModel {
    pub id: &'static str,
    pub name: &'static str,
    pub size_bytes: u64,
}

pub const WHISPER_MODELS: &[WhisperModel] = &[
    WhisperModel { id: "tiny", name: "Tiny", size_bytes: 77_700_000 },
    WhisperModel { id: "base", name: "Base", size_bytes: 148_000_000 },
    WhisperModel { id: "small", name: "Small", size_bytes: 488_000_000 },
    WhisperModel { id: "medium", name: "Medium", size_bytes: 1_530_000_000 },
    WhisperModel { id: "large-v1", name: "Large v1", size_bytes: 3_090_000_000 },
    WhisperModel { id: "large-v2", name: "Large v2", size_bytes: 3_090_000_000 },
    WhisperModel { id: "large-v3", name: "Large v3", size_bytes: 3_100_000_000 },
    WhisperModel { id: "large-v3-turbo", name: "Large v3 Turbo", size_bytes: 1_620_000_000 },
];

impl WhisperModel {
    pub fn find(id: &str) -> Option<&'static WhisperModel> {
        WHISPER_MODELS.iter().find(|model| model.id == id)
    }

    pub fn file_name(&self) -> String {
        model_file_name(self.id)
    }
}

/// One catalog entry with its install state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub installed: bool,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
    pub percent: u8,
}

fn model_file_name(id: &str) -> String {
    format!("ggml-{id}.bin")
}

fn model_id(path: &Path) -> Option<String> {
    if path.extension()? != "bin" {
        return None;
    }
    let stem = path.file_stem()?.to_string_lossy();
    Some(stem.strip_prefix("ggml-").unwrap_or(&stem).to_string())
}

/// Folder of installed whisper.cpp models.
#[derive(Debug, Clone)]
pub struct WhisperModelStore {
    dir: PathBuf,
    client: Client,
    base_url: String,
}

impl WhisperModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            client: build_client(Duration::from_secs(60 * 60))?,
            base_url: MODEL_BASE_URL.to_string(),
        })
    }

    /// Store in `<local data>/clip-flow/models`.
    pub fn default_location() -> Result<Self> {
        let dir = app_data_dir()
            .ok_or_else(|| BridgeError::NotAvailable("No local data directory".to_string()))?;
        Self::new(dir.join("models"))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, id: &str) -> PathBuf {
        self.dir.join(model_file_name(id))
    }

    pub async fn is_installed(&self, id: &str) -> bool {
        fs::metadata(self.model_path(id))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Ids of the model files present, sorted. A missing folder means none.
    pub async fn installed(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut installed = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = model_id(&entry.path()) {
                installed.push(id);
            }
        }
        installed.sort();
        Ok(installed)
    }

    /// Every catalog model with its install state.
    pub async fn statuses(&self) -> Result<Vec<ModelStatus>> {
        let installed = self.installed().await?;
        Ok(WHISPER_MODELS
            .iter()
            .map(|model| {
                let is_installed = installed.iter().any(|id| id == model.id);
                ModelStatus {
                    id: model.id.to_string(),
                    name: model.name.to_string(),
                    size_bytes: model.size_bytes,
                    installed: is_installed,
                    path: is_installed
                        .then(|| self.model_path(model.id).to_string_lossy().to_string()),
                }
            })
            .collect())
    }

    /// Downloads a catalog model, reporting progress per received chunk.
    #[instrument(skip(self, on_progress))]
    pub async fn download<F>(&self, id: &str, on_progress: F) -> Result<PathBuf>
    where
        F: Fn(DownloadProgress) + Send,
    {
        let model = WhisperModel::find(id)
            .ok_or_else(|| BridgeError::ModelNotFound(id.to_string()))?;
        fs::create_dir_all(&self.dir).await?;

        let url = format!("{}/{}", self.base_url, model.file_name());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| network_error("Model download", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Model download", status, &body));
        }

        let total = response.content_length().unwrap_or(model.size_bytes).max(1);
        let target = self.model_path(id);
        let partial = target.with_extension("bin.tmp");
        let mut file = fs::File::create(&partial).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&partial).await;
                    return Err(network_error("Model download", e));
                }
            };
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_progress(DownloadProgress {
                downloaded,
                total,
                percent: (downloaded.saturating_mul(100) / total).min(100) as u8,
            });
        }
        file.flush().await?;
        drop(file);

        fs::rename(&partial, &target).await?;
        info!(model = id, bytes = downloaded, "Model downloaded");
        Ok(target)
    }

    /// Removes a model file. Removing a model that is not there is fine.
    pub async fn delete(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.model_path(id)).await {
            Ok(()) => {
                debug!(model = id, "Model deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
