//! Error types for the Artificer rendering pipeline.

/// Result type alias for Artificer operations
pub type ArtificerResult<T> = Result<T, ArtificerError>;

/// Main error type for synthesis, effects, and device routing
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtificerError {
    /// The external speech synthesizer failed or produced no output
    #[error("Speech synthesis failed: {message}")]
    SynthesisError {
        /// Error message describing the failure
        message: String,
    },

    /// Synthesizer output could not be decoded as mono 16-bit PCM
    #[error("Could not decode synthesized audio: {message}")]
    DecodeError {
        /// Error message describing the malformed input
        message: String,
    },

    /// A numeric or filter failure inside the effects chain
    #[error("Effect processing failed: {message}")]
    EffectProcessingError {
        /// Error message describing the processing issue
        message: String,
    },

    /// The OS audio endpoints could not be listed or queried
    #[error("Could not enumerate audio devices: {message}")]
    DeviceEnumerationError {
        /// Error message describing the enumeration failure
        message: String,
    },

    /// Changing a default endpoint failed, possibly after the other side switched
    #[error("Could not switch audio devices: {message}. {}", switch_advice(.partial))]
    DeviceSwitchError {
        /// Error message describing the switch failure
        message: String,
        /// Whether one side was switched before the failure
        partial: bool,
    },

    /// Restore was requested but no original devices were captured
    #[error(
        "No saved audio devices to restore. If your microphone is still set to the virtual cable, run an emergency reset or pick your microphone in the system sound settings."
    )]
    NothingToRestore,

    /// Emergency reset found only virtual recording devices
    #[error("No real recording device found: every active input looks like a virtual device")]
    NoRealDeviceFound,

    /// No capture device identifier has been saved for the virtual cable
    #[error("Virtual cable is not configured. Select the cable's recording device in the settings first.")]
    VirtualCableNotConfigured,

    /// The virtual cable half could not be located among active endpoints
    #[error("Virtual cable {direction} device not found: {detail}. Reconfigure the virtual cable.")]
    VirtualCableNotFound {
        /// Which half of the cable was missing ("playback" or "capture")
        direction: String,
        /// The identifier or search that failed
        detail: String,
    },

    /// A device with the given identifier is not present
    #[error("Audio device '{device_id}' not found")]
    DeviceNotFound {
        /// The identifier that was not found
        device_id: String,
    },

    /// Local or routed playback could not be started or completed
    #[error("Playback error: {message}")]
    PlaybackError {
        /// Error message describing the playback issue
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    FileError {
        /// Error message describing the file operation failure
        message: String,
    },

    /// Invalid input error
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the invalid input
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A pipeline worker could not be started or stopped without reporting
    #[error("Concurrency error: {message}")]
    ConcurrencyError {
        /// Error message describing the concurrency issue
        message: String,
    },
}

fn switch_advice(partial: &bool) -> &'static str {
    if *partial {
        "Your audio devices may be half switched: retry the restore, or run an emergency reset to recover your microphone."
    } else {
        "Retry the operation, or check that the virtual cable is installed and enabled."
    }
}

impl ArtificerError {
    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::SynthesisError {
            message: message.into(),
        }
    }

    /// Create a new decode error
    #[must_use]
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::DecodeError {
            message: message.into(),
        }
    }

    /// Create a new effect processing error
    #[must_use]
    pub fn effect_processing<S: Into<String>>(message: S) -> Self {
        Self::EffectProcessingError {
            message: message.into(),
        }
    }

    /// Create a new device enumeration error
    #[must_use]
    pub fn device_enumeration<S: Into<String>>(message: S) -> Self {
        Self::DeviceEnumerationError {
            message: message.into(),
        }
    }

    /// Create a device switch error where nothing was switched
    #[must_use]
    pub fn device_switch<S: Into<String>>(message: S) -> Self {
        Self::DeviceSwitchError {
            message: message.into(),
            partial: false,
        }
    }

    /// Create a device switch error where one side already switched
    #[must_use]
    pub fn partial_device_switch<S: Into<String>>(message: S) -> Self {
        Self::DeviceSwitchError {
            message: message.into(),
            partial: true,
        }
    }

    /// Create a new virtual-cable-not-found error
    #[must_use]
    pub fn cable_not_found<D: Into<String>, S: Into<String>>(direction: D, detail: S) -> Self {
        Self::VirtualCableNotFound {
            direction: direction.into(),
            detail: detail.into(),
        }
    }

    /// Create a new device not found error
    #[must_use]
    pub fn device_not_found<S: Into<String>>(device_id: S) -> Self {
        Self::DeviceNotFound {
            device_id: device_id.into(),
        }
    }

    /// Create a new playback error
    #[must_use]
    pub fn playback<S: Into<String>>(message: S) -> Self {
        Self::PlaybackError {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::FileError {
            message: message.into(),
        }
    }

    /// Create a new invalid input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new concurrency error
    #[must_use]
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// Check if retrying the same operation may succeed
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::DeviceSwitchError { .. } | Self::DeviceEnumerationError { .. } | Self::PlaybackError { .. }
        )
    }

    /// Check if this error is due to invalid user input or settings
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::ConfigurationError { .. }
                | Self::VirtualCableNotConfigured
                | Self::VirtualCableNotFound { .. }
        )
    }

    /// Check if this error may have left the OS audio configuration modified
    #[must_use]
    pub const fn leaves_devices_modified(&self) -> bool {
        matches!(
            self,
            Self::DeviceSwitchError { partial: true, .. } | Self::NothingToRestore
        )
    }

    /// Get the error category for logging
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::SynthesisError { .. } => "synthesis",
            Self::DecodeError { .. } => "decode",
            Self::EffectProcessingError { .. } => "effects",
            Self::DeviceEnumerationError { .. } => "device_enumeration",
            Self::DeviceSwitchError { .. } => "device_switch",
            Self::NothingToRestore => "nothing_to_restore",
            Self::NoRealDeviceFound => "no_real_device",
            Self::VirtualCableNotConfigured | Self::VirtualCableNotFound { .. } => "virtual_cable",
            Self::DeviceNotFound { .. } => "device",
            Self::PlaybackError { .. } => "playback",
            Self::FileError { .. } => "file",
            Self::InvalidInput { .. } => "input",
            Self::ConfigurationError { .. } => "configuration",
            Self::ConcurrencyError { .. } => "concurrency",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for ArtificerError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<hound::Error> for ArtificerError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => Self::file(io.to_string()),
            other => Self::decode(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for ArtificerError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("Invalid config file: {err}"))
    }
}

impl From<toml::ser::Error> for ArtificerError {
    fn from(err: toml::ser::Error) -> Self {
        Self::configuration(format!("Could not serialize config: {err}"))
    }
}

impl From<serde_json::Error> for ArtificerError {
    fn from(err: serde_json::Error) -> Self {
        Self::file(format!("JSON parse error: {err}"))
    }
}
