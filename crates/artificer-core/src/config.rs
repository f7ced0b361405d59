//! Application configuration stored as TOML.
//!
//! ```toml
//! [synthesizer]
//! executable = "piper"
//! models_dir = "/home/me/.local/share/artificer/models"
//! model = "en_GB-alan-medium.onnx"
//!
//! [virtual_cable]
//! capture_device = "alsa_input.platform-vb_cable.analog-mono"
//!
//! [routing]
//! poll_interval_ms = 100
//!
//! [playback]
//! volume = 0.8
//! ```

use crate::error::{ArtificerError, ArtificerResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "Artificer", "artificer")
}

fn data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External speech synthesizer
    pub synthesizer: SynthesizerConfig,
    /// Scratch and export locations
    pub paths: PathsConfig,
    /// Persisted virtual cable identifiers
    pub virtual_cable: VirtualCableConfig,
    /// Routed playback tuning
    pub routing: RoutingConfig,
    /// Local playback settings
    pub playback: PlaybackConfig,
}

/// Synthesizer process settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    /// Executable name or path
    pub executable: PathBuf,
    /// Directory scanned for `*.onnx` voice models
    pub models_dir: PathBuf,
    /// Selected model, a file name inside `models_dir` or a path
    pub model: Option<String>,
    /// espeak-ng data directory exported as `ESPEAK_DATA_PATH`
    pub espeak_data_dir: Option<PathBuf>,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("piper"),
            models_dir: data_dir().join("models"),
            model: None,
            espeak_data_dir: None,
        }
    }
}

/// File locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Scratch directory; defaults to `<exports_dir>/temp`
    pub scratch_dir: Option<PathBuf>,
    /// Where exports land when no path is given
    pub exports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            exports_dir: data_dir().join("exports"),
        }
    }
}

/// Virtual cable endpoint identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualCableConfig {
    /// Playback half the pipeline writes to; name-matched when unset
    pub playback_device: Option<String>,
    /// Capture half the voice-chat application reads from
    pub capture_device: Option<String>,
}

/// Routed playback settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Cancellation poll interval during routed playback
    pub poll_interval_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 100 }
    }
}

/// Local playback on the default output device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output gain from 0 to 1
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

impl AppConfig {
    /// Default config file location in the platform config directory
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined
    pub fn default_path() -> ArtificerResult<PathBuf> {
        project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or_else(|| ArtificerError::configuration("Failed to determine project directories"))
    }

    /// Load from the default location, falling back to defaults when absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is invalid
    pub fn load_or_default() -> ArtificerResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a config file
    ///
    /// # Errors
    ///
    /// Returns `FileError` if the file cannot be read and `ConfigurationError` if it is invalid
    pub fn load_from<P: AsRef<Path>>(path: P) -> ArtificerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArtificerError::file(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the file cannot be written
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ArtificerResult<()> {
        let path = path.as_ref();
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Write the config to the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be determined or written
    pub fn save(&self) -> ArtificerResult<()> {
        self.save_to(Self::default_path()?)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` describing the first invalid value
    pub fn validate(&self) -> ArtificerResult<()> {
        if self.synthesizer.executable.as_os_str().is_empty() {
            return Err(ArtificerError::configuration("synthesizer.executable must not be empty"));
        }
        if self.routing.poll_interval_ms == 0 {
            return Err(ArtificerError::configuration("routing.poll_interval_ms must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.playback.volume) {
            return Err(ArtificerError::configuration(format!(
                "playback.volume must be between 0 and 1, got {}",
                self.playback.volume
            )));
        }
        for (key, value) in [
            ("virtual_cable.playback_device", &self.virtual_cable.playback_device),
            ("virtual_cable.capture_device", &self.virtual_cable.capture_device),
        ] {
            if value.as_deref().is_some_and(|id| id.trim().is_empty()) {
                return Err(ArtificerError::configuration(format!("{key} must not be blank")));
            }
        }
        Ok(())
    }

    /// Scratch directory for transient WAV files
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.paths
            .scratch_dir
            .clone()
            .unwrap_or_else(|| self.paths.exports_dir.join("temp"))
    }

    /// Resolved path of the selected voice model
    #[must_use]
    pub fn model_path(&self) -> Option<PathBuf> {
        self.synthesizer.model.as_ref().map(|model| {
            let candidate = PathBuf::from(model);
            if candidate.is_absolute() || candidate.components().count() > 1 {
                candidate
            } else {
                self.synthesizer.models_dir.join(candidate)
            }
        })
    }

    /// Routed playback poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.routing.poll_interval_ms)
    }
}
