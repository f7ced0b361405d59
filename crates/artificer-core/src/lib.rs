//! # Artificer Core
//!
//! Rendering pipeline for spoken NPC dialogue: external speech synthesis, a
//! deterministic effects chain, and routing of the result into a virtual
//! audio cable so a voice-chat application hears it as a microphone.
//!
//! ## Features
//!
//! - Threshold-gated effects chain (pitch, ring modulation, drive, filters,
//!   chorus, delay, reverb, gain) over mono 16-bit speech
//! - Preview, WAV export, and routed "Discord send" dispositions
//! - Default audio endpoint switching with capture-before-switch and
//!   unconditional restore
//! - Emergency recovery of a real microphone after a lost session
//!
//! ## Example
//!
//! ```rust,no_run
//! use artificer_core::{AudioBuffer, EffectParameters, EffectsChainBuilder};
//!
//! let raw = AudioBuffer::read_wav("line.wav")?;
//! let params = EffectParameters {
//!     pitch_semitones: -4.0,
//!     reverb_wetness: 0.4,
//!     ..EffectParameters::default()
//! };
//! let processed = EffectsChainBuilder::process(raw, &params, 0.7)?;
//! processed.write_wav("line_orc.wav")?;
//! # Ok::<(), artificer_core::ArtificerError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod audio_buffer;
pub mod config;
pub mod effect_params;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod routing;
pub mod scratch;
pub mod synthesizer;
pub mod voice_models;

// Re-export main types for convenience
pub use audio_buffer::AudioBuffer;
pub use config::{AppConfig, PathsConfig, PlaybackConfig, RoutingConfig, SynthesizerConfig, VirtualCableConfig};
pub use effect_params::EffectParameters;
pub use effects::{EffectStage, EffectsChainBuilder};
pub use error::{ArtificerError, ArtificerResult};
pub use pipeline::{
    BusyDomain, CancelToken, FileOpener, Outcome, PipelineEvent, PipelineMode, PipelineOrchestrator,
    PipelineSettings, PipelineStage, RunHandle, Submission,
};
pub use playback::{CpalPlayer, PlaybackHandle, Player, SimulatedPlayer};
pub use routing::{
    DeviceEndpoint, DeviceRoutingManager, Direction, EndpointBackend, EndpointRecord, EndpointState,
    PactlEndpoints, RouteInfo, RoutedPlayback, RoutingMode, RoutingPhase, RoutingState, SimulatedEndpoints,
};
pub use scratch::ScratchSpace;
pub use synthesizer::{PiperSynthesizer, SpeechSynthesizer, SynthesisRequest};
pub use voice_models::{VoiceModel, VoiceModelDiscovery};

/// Version information for the artificer-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sample rate of the medium-quality Piper voices (22.05 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Number of audio channels handled by the pipeline (mono)
pub const DEFAULT_CHANNELS: u16 = 1;

/// Full-scale value for 16-bit PCM normalization (2^15)
pub const PCM16_SCALE: f32 = 32_768.0;

/// Maximum text length accepted for synthesis
pub const MAX_TEXT_LENGTH: usize = 100_000;
