//! Local transcription: `ffmpeg` audio extraction feeding `whisper.cpp`.
//!
//! All three tools run as subprocesses. They are looked up once, when the
//! engine is built; a missing tool makes the engine unavailable rather than
//! failing construction.

mod ffmpeg;
mod models;
mod whisper;

pub use ffmpeg::{AudioExtractor, MediaInfo};
pub use models::{DownloadProgress, ModelStatus, WhisperModel, WhisperModelStore, WHISPER_MODELS};
pub use whisper::LocalWhisperEngine;

use std::path::{Path, PathBuf};

/// Paths of the external tools used by the local engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTools {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub whisper: Option<PathBuf>,
}

impl LocalTools {
    /// Looks in the app's own `bin` folder, the usual package-manager
    /// prefixes, then `PATH`.
    pub fn discover() -> Self {
        let dirs = search_dirs();
        let tools = Self {
            ffmpeg: find_tool(&["ffmpeg"], &dirs),
            ffprobe: find_tool(&["ffprobe"], &dirs),
            whisper: find_tool(&["whisper-cli", "whisper-cpp"], &dirs),
        };
        tracing::debug!(?tools, "Local transcription tools discovered");
        tools
    }

    pub fn is_complete(&self) -> bool {
        self.ffmpeg.is_some() && self.ffprobe.is_some() && self.whisper.is_some()
    }
}

/// Data folder of the app, `<local data>/clip-flow`.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("clip-flow"))
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(data) = app_data_dir() {
        dirs.push(data.join("bin"));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    for prefix in ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"] {
        dirs.push(PathBuf::from(prefix));
    }
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    dirs
}

fn find_tool(names: &[&str], dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        names
            .iter()
            .map(|name| dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX)))
            .find(|candidate| candidate.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tool_prefers_earlier_dirs_and_names() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let exe = std::env::consts::EXE_SUFFIX;
        std::fs::write(second.path().join(format!("whisper-cli{exe}")), b"").unwrap();
        std::fs::write(first.path().join(format!("whisper-cpp{exe}")), b"").unwrap();

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            find_tool(&["whisper-cli", "whisper-cpp"], &dirs),
            Some(first.path().join(format!("whisper-cpp{exe}")))
        );
        assert_eq!(find_tool(&["ffmpeg"], &dirs), None);
    }

    #[test]
    fn test_tools_complete_only_with_all_three() {
        let mut tools = LocalTools {
            ffmpeg: Some("/bin/ffmpeg".into()),
            ffprobe: Some("/bin/ffprobe".into()),
            whisper: None,
        };
        assert!(!tools.is_complete());
        tools.whisper = Some("/bin/whisper-cli".into());
        assert!(tools.is_complete());
    }
}
