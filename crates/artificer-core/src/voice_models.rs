//! Discovery of Piper voice models on disk.
//!
//! Every `*.onnx` file in the models directory is a voice. A sibling
//! `*.onnx.json` file, when present and parseable, supplies the language,
//! name and quality shown to the user.

use crate::error::{ArtificerError, ArtificerResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A voice model found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceModel {
    /// Path to the `.onnx` file
    pub path: PathBuf,
    /// Name shown in voice selectors
    pub display_name: String,
    /// English language name from the metadata, if any
    pub language: Option<String>,
    /// Quality tier from the metadata, if any
    pub quality: Option<String>,
    /// Output sample rate from the metadata, if any
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    language: Option<LanguageMetadata>,
    #[serde(default)]
    audio: Option<AudioMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageMetadata {
    #[serde(default)]
    name_english: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioMetadata {
    #[serde(default)]
    sample_rate: Option<u32>,
}

impl VoiceModel {
    /// Build from a model path, reading metadata when available
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());

        let metadata = Self::read_metadata(path);
        let Some(metadata) = metadata else {
            return Self {
                path: path.to_path_buf(),
                display_name: stem,
                language: None,
                quality: None,
                sample_rate: None,
            };
        };

        let language = metadata.language.and_then(|l| l.name_english);
        let name = metadata.name.unwrap_or_else(|| stem.clone());
        let quality = metadata.quality.filter(|q| !q.is_empty());
        let language_label = language.as_deref().unwrap_or("Unknown");
        let display_name = match &quality {
            Some(quality) => format!("{language_label} - {name} ({quality})"),
            None => format!("{language_label} - {name}"),
        };

        Self {
            path: path.to_path_buf(),
            display_name,
            language,
            quality,
            sample_rate: metadata.audio.and_then(|a| a.sample_rate),
        }
    }

    fn metadata_path(path: &Path) -> PathBuf {
        let mut json = path.as_os_str().to_owned();
        json.push(".json");
        PathBuf::from(json)
    }

    fn read_metadata(path: &Path) -> Option<VoiceMetadata> {
        let json_path = Self::metadata_path(path);
        let content = std::fs::read_to_string(&json_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Ignoring unreadable voice metadata {}: {e}", json_path.display());
                None
            }
        }
    }
}

/// Scans a models directory for voices
#[derive(Debug, Clone)]
pub struct VoiceModelDiscovery {
    models_dir: PathBuf,
}

impl VoiceModelDiscovery {
    /// Discovery rooted at `models_dir`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(models_dir: P) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Directory being scanned
    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// All voices, sorted by path; empty when the directory is missing
    ///
    /// # Errors
    ///
    /// Returns an error if the directory path cannot be turned into a glob pattern
    pub fn discover(&self) -> ArtificerResult<Vec<VoiceModel>> {
        if !self.models_dir.is_dir() {
            debug!("Models directory {} does not exist", self.models_dir.display());
            return Ok(Vec::new());
        }

        let escaped = glob::Pattern::escape(&self.models_dir.to_string_lossy());
        let pattern = format!("{escaped}/*.onnx");
        let entries = glob::glob(&pattern)
            .map_err(|e| ArtificerError::file(format!("Invalid models directory pattern: {e}")))?;

        let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        paths.sort();

        let voices: Vec<VoiceModel> = paths.iter().map(|p| VoiceModel::from_path(p)).collect();
        debug!("Found {} voice model(s) in {}", voices.len(), self.models_dir.display());
        Ok(voices)
    }

    /// Find a voice by display name, file name or file stem
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if no voice matches
    pub fn find(&self, query: &str) -> ArtificerResult<VoiceModel> {
        self.discover()?
            .into_iter()
            .find(|voice| {
                voice.display_name == query
                    || voice.path.file_name().is_some_and(|n| n == query)
                    || voice.path.file_stem().is_some_and(|n| n == query)
            })
            .ok_or_else(|| {
                ArtificerError::invalid_input(format!(
                    "No voice model named '{query}' in {}",
                    self.models_dir.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"onnx").unwrap();
        path
    }

    #[test]
    fn test_display_name_from_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let model = touch(temp_dir.path(), "en_US-lessac-medium.onnx");
        std::fs::write(
            temp_dir.path().join("en_US-lessac-medium.onnx.json"),
            r#"{"language": {"name_english": "English (US)"}, "name": "lessac", "quality": "medium", "audio": {"sample_rate": 22050}}"#,
        )
        .unwrap();

        let voice = VoiceModel::from_path(&model);
        assert_eq!(voice.display_name, "English (US) - lessac (medium)");
        assert_eq!(voice.sample_rate, Some(22_050));
    }

    #[test]
    fn test_display_name_without_quality() {
        let temp_dir = TempDir::new().unwrap();
        let model = touch(temp_dir.path(), "orc.onnx");
        std::fs::write(temp_dir.path().join("orc.onnx.json"), r#"{"name": "grukk"}"#).unwrap();

        let voice = VoiceModel::from_path(&model);
        assert_eq!(voice.display_name, "Unknown - grukk");
    }

    #[test]
    fn test_falls_back_to_stem() {
        let temp_dir = TempDir::new().unwrap();
        let bare = touch(temp_dir.path(), "goblin.onnx");
        assert_eq!(VoiceModel::from_path(&bare).display_name, "goblin");

        let broken = touch(temp_dir.path(), "troll.onnx");
        std::fs::write(temp_dir.path().join("troll.onnx.json"), "{ not json").unwrap();
        assert_eq!(VoiceModel::from_path(&broken).display_name, "troll");
    }

    #[test]
    fn test_discover_only_onnx() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "b.onnx");
        touch(temp_dir.path(), "a.onnx");
        std::fs::write(temp_dir.path().join("a.onnx.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();

        let voices = VoiceModelDiscovery::new(temp_dir.path()).discover().unwrap();
        let names: Vec<_> = voices
            .iter()
            .map(|v| v.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.onnx", "b.onnx"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let voices = VoiceModelDiscovery::new("/nonexistent/voices").discover().unwrap();
        assert!(voices.is_empty());
    }

    #[test]
    fn test_find() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "dwarf.onnx");
        let discovery = VoiceModelDiscovery::new(temp_dir.path());

        assert!(discovery.find("dwarf").is_ok());
        assert!(discovery.find("dwarf.onnx").is_ok());
        assert!(matches!(
            discovery.find("elf").unwrap_err(),
            ArtificerError::InvalidInput { .. }
        ));
    }
}
