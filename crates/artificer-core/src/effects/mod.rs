//! Deterministic effects chain applied to synthesized speech.
//!
//! [`EffectsChainBuilder::build`] turns an [`EffectParameters`] snapshot into an
//! ordered list of [`EffectStage`] values, built fresh for every render. Ring
//! modulation is not a stage: it multiplies the raw samples directly before
//! the chain runs. Linear gain is applied last as a scalar pass.
//!
//! Stage order is fixed: pitch, distortion, highpass, lowpass, chorus, delay,
//! reverb.

pub mod delay;
pub mod distortion;
pub mod filters;
pub mod modulation;
pub mod pitch;
pub mod reverb;

use crate::audio_buffer::AudioBuffer;
use crate::effect_params::EffectParameters;
use crate::error::{ArtificerError, ArtificerResult};
use rayon::prelude::*;
use tracing::debug;

/// LFO rate of the chorus stage
pub const CHORUS_RATE_HZ: f32 = 1.0;
/// Centre delay of the chorus stage
pub const CHORUS_CENTRE_DELAY_MS: f32 = 7.0;
/// Feedback of the echo delay stage
pub const DELAY_FEEDBACK: f32 = 0.3;
/// Dry/wet mix of the echo delay stage
pub const DELAY_MIX: f32 = 0.5;

/// Convert decibels to a linear amplitude factor
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// One effect in the chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectStage {
    /// Length-preserving pitch shift
    PitchShift {
        /// Shift in semitones
        semitones: f32,
    },
    /// Hyperbolic tangent waveshaper
    Distortion {
        /// Input drive in dB
        drive_db: f32,
    },
    /// Second-order Butterworth highpass
    HighPass {
        /// Cutoff frequency in Hz
        cutoff_hz: f32,
    },
    /// Second-order Butterworth lowpass
    LowPass {
        /// Cutoff frequency in Hz
        cutoff_hz: f32,
    },
    /// LFO-modulated short delay
    Chorus {
        /// LFO rate in Hz
        rate_hz: f32,
        /// Modulation depth (0 to 1)
        depth: f32,
        /// Centre delay in milliseconds
        centre_delay_ms: f32,
        /// Feedback amount
        feedback: f32,
        /// Dry/wet mix
        mix: f32,
    },
    /// Feedback echo
    Delay {
        /// Delay time in seconds
        delay_secs: f32,
        /// Feedback amount
        feedback: f32,
        /// Dry/wet mix
        mix: f32,
    },
    /// Freeverb-style room reverb
    Reverb {
        /// Room size (0 to 1)
        room_size: f32,
        /// Wet level
        wet_level: f32,
        /// Dry level
        dry_level: f32,
    },
}

impl EffectStage {
    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PitchShift { .. } => "pitch_shift",
            Self::Distortion { .. } => "distortion",
            Self::HighPass { .. } => "highpass",
            Self::LowPass { .. } => "lowpass",
            Self::Chorus { .. } => "chorus",
            Self::Delay { .. } => "delay",
            Self::Reverb { .. } => "reverb",
        }
    }

    /// Run this stage over `samples` in place
    ///
    /// # Errors
    ///
    /// Returns `EffectProcessingError` if a filter cannot be designed for the sample rate
    pub fn apply(&self, samples: &mut Vec<f32>, sample_rate: u32) -> ArtificerResult<()> {
        match *self {
            Self::PitchShift { semitones } => {
                *samples = pitch::PitchShifter::new(sample_rate, semitones).process(samples);
            }
            Self::Distortion { drive_db } => distortion::drive(samples, drive_db),
            Self::HighPass { cutoff_hz } => filters::highpass(samples, sample_rate, cutoff_hz)?,
            Self::LowPass { cutoff_hz } => filters::lowpass(samples, sample_rate, cutoff_hz)?,
            Self::Chorus {
                rate_hz,
                depth,
                centre_delay_ms,
                feedback,
                mix,
            } => {
                modulation::Chorus::new(sample_rate, rate_hz, depth, centre_delay_ms, feedback, mix)
                    .process_block(samples);
            }
            Self::Delay {
                delay_secs,
                feedback,
                mix,
            } => delay::Delay::new(sample_rate, delay_secs, feedback, mix).process_block(samples),
            Self::Reverb {
                room_size,
                wet_level,
                dry_level,
            } => reverb::Reverb::new(sample_rate, room_size, wet_level, dry_level).process_block(samples),
        }
        Ok(())
    }
}

/// A chain built from one parameter snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EffectsChainBuilder {
    ring_mod_freq_hz: Option<f32>,
    stages: Vec<EffectStage>,
    gain: f32,
}

impl EffectsChainBuilder {
    /// Build the chain for `params`, gating each stage on its raw value
    #[must_use]
    pub fn build(params: &EffectParameters, active_room_size: f32) -> Self {
        let mut stages = Vec::with_capacity(7);

        if params.pitch_enabled() {
            stages.push(EffectStage::PitchShift {
                semitones: params.pitch_semitones,
            });
        }
        if params.distortion_enabled() {
            stages.push(EffectStage::Distortion {
                drive_db: params.distortion_drive_db,
            });
        }
        if params.highpass_enabled() {
            stages.push(EffectStage::HighPass {
                cutoff_hz: params.highpass_cutoff_hz,
            });
        }
        if params.lowpass_enabled() {
            stages.push(EffectStage::LowPass {
                cutoff_hz: params.lowpass_cutoff_hz,
            });
        }
        if params.chorus_enabled() {
            stages.push(EffectStage::Chorus {
                rate_hz: CHORUS_RATE_HZ,
                depth: params.chorus_depth,
                centre_delay_ms: CHORUS_CENTRE_DELAY_MS,
                feedback: 0.0,
                mix: params.chorus_depth,
            });
        }
        if params.delay_enabled() {
            stages.push(EffectStage::Delay {
                delay_secs: params.delay_ms / 1000.0,
                feedback: DELAY_FEEDBACK,
                mix: DELAY_MIX,
            });
        }
        if params.reverb_enabled() {
            stages.push(EffectStage::Reverb {
                room_size: active_room_size,
                wet_level: params.reverb_wetness,
                dry_level: 1.0 - params.reverb_wetness,
            });
        }

        Self {
            ring_mod_freq_hz: params.ring_mod_enabled().then_some(params.ring_mod_freq_hz),
            stages,
            gain: db_to_linear(params.volume_boost_db),
        }
    }

    /// Validate inputs, build the chain and run it
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for out-of-range parameters or room size, and
    /// `EffectProcessingError` if a stage fails or produces non-finite samples
    pub fn process(
        buffer: AudioBuffer,
        params: &EffectParameters,
        active_room_size: f32,
    ) -> ArtificerResult<AudioBuffer> {
        params.validate()?;
        if !(0.0..=1.0).contains(&active_room_size) {
            return Err(ArtificerError::invalid_input(format!(
                "Room size must be between 0 and 1, got {active_room_size}"
            )));
        }
        Self::build(params, active_room_size).apply(buffer)
    }

    /// Run the chain over `buffer`
    ///
    /// # Errors
    ///
    /// Returns `EffectProcessingError` if a stage fails or produces non-finite samples
    pub fn apply(&self, buffer: AudioBuffer) -> ArtificerResult<AudioBuffer> {
        let sample_rate = buffer.sample_rate();
        let mut samples = buffer.into_samples();
        let input_len = samples.len();

        if let Some(freq_hz) = self.ring_mod_freq_hz {
            modulation::ring_modulate(&mut samples, sample_rate, freq_hz);
        }

        for stage in &self.stages {
            debug!("Applying {} stage", stage.name());
            stage.apply(&mut samples, sample_rate)?;
        }

        let gain = self.gain;
        samples.par_iter_mut().for_each(|s| *s *= gain);

        if samples.len() != input_len {
            return Err(ArtificerError::effect_processing(format!(
                "Chain changed the sample count from {input_len} to {}",
                samples.len()
            )));
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ArtificerError::effect_processing(format!(
                "Non-finite sample at index {index}"
            )));
        }

        debug!(
            "Processed {} samples through {} stages (ring mod: {:?}, gain {:.3})",
            input_len,
            self.stages.len(),
            self.ring_mod_freq_hz,
            gain
        );
        AudioBuffer::new(samples, sample_rate)
    }

    /// Ordered stages
    #[must_use]
    pub fn stages(&self) -> &[EffectStage] {
        &self.stages
    }

    /// Ring modulator frequency when enabled
    #[must_use]
    pub const fn ring_mod_freq_hz(&self) -> Option<f32> {
        self.ring_mod_freq_hz
    }

    /// Final linear gain
    #[must_use]
    pub const fn linear_gain(&self) -> f32 {
        self.gain
    }

    /// Whether only the final gain would run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.ring_mod_freq_hz.is_none()
    }
}
