//! User-facing knobs for one render.
//!
//! [`EffectParameters`] is an immutable snapshot taken when a run starts. The
//! gate methods decide which effect stages are built and always look at the
//! raw value; the `*_label` methods exist for front ends and never feed back
//! into gating.

use crate::error::{ArtificerError, ArtificerResult};
use serde::{Deserialize, Serialize};

/// Lowpass cutoff at which the filter counts as disabled
pub const LOWPASS_OFF_HZ: f32 = 8000.0;
/// Highpass cutoff at which the filter counts as disabled
pub const HIGHPASS_OFF_HZ: f32 = 50.0;
/// Room size used when the active preset does not provide one
pub const DEFAULT_ROOM_SIZE: f32 = 0.5;

/// Every user knob that shapes a render
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParameters {
    /// Speech rate multiplier (0.5 to 2.0, 1.0 is normal)
    pub speech_rate: f32,
    /// Pitch shift in semitones (-12 to 12)
    pub pitch_semitones: f32,
    /// Distortion drive in dB (0 to 20)
    pub distortion_drive_db: f32,
    /// Ring modulator frequency in Hz (0 to 200)
    pub ring_mod_freq_hz: f32,
    /// Output gain in dB (0 to 12), always applied
    pub volume_boost_db: f32,
    /// Reverb wet level (0 to 1)
    pub reverb_wetness: f32,
    /// Chorus depth and mix (0 to 1)
    pub chorus_depth: f32,
    /// Echo delay time in milliseconds (0 to 500)
    pub delay_ms: f32,
    /// Lowpass cutoff in Hz (1000 to 8000, 8000 disables)
    pub lowpass_cutoff_hz: f32,
    /// Highpass cutoff in Hz (50 to 500, 50 disables)
    pub highpass_cutoff_hz: f32,
    /// Pause inserted between sentences by the synthesizer, in seconds (0 to 2)
    pub sentence_silence_s: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            speech_rate: 1.0,
            pitch_semitones: 0.0,
            distortion_drive_db: 0.0,
            ring_mod_freq_hz: 0.0,
            volume_boost_db: 3.0,
            reverb_wetness: 0.3,
            chorus_depth: 0.0,
            delay_ms: 0.0,
            lowpass_cutoff_hz: LOWPASS_OFF_HZ,
            highpass_cutoff_hz: HIGHPASS_OFF_HZ,
            sentence_silence_s: 0.2,
        }
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> ArtificerResult<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ArtificerError::invalid_input(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

impl EffectParameters {
    /// Parameters with every effect disabled and no gain
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            volume_boost_db: 0.0,
            reverb_wetness: 0.0,
            ..Self::default()
        }
    }

    /// Validate every knob against its domain
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first field that is non-finite or out of range
    pub fn validate(&self) -> ArtificerResult<()> {
        check_range("Speech rate", self.speech_rate, 0.5, 2.0)?;
        check_range("Pitch", self.pitch_semitones, -12.0, 12.0)?;
        check_range("Distortion drive", self.distortion_drive_db, 0.0, 20.0)?;
        check_range("Ring modulation frequency", self.ring_mod_freq_hz, 0.0, 200.0)?;
        check_range("Volume boost", self.volume_boost_db, 0.0, 12.0)?;
        check_range("Reverb wetness", self.reverb_wetness, 0.0, 1.0)?;
        check_range("Chorus depth", self.chorus_depth, 0.0, 1.0)?;
        check_range("Delay", self.delay_ms, 0.0, 500.0)?;
        check_range("Lowpass cutoff", self.lowpass_cutoff_hz, 1000.0, LOWPASS_OFF_HZ)?;
        check_range("Highpass cutoff", self.highpass_cutoff_hz, HIGHPASS_OFF_HZ, 500.0)?;
        check_range("Sentence silence", self.sentence_silence_s, 0.0, 2.0)?;
        Ok(())
    }

    /// Synthesizer length scale, the inverse of the speech rate
    #[must_use]
    pub fn length_scale(&self) -> f32 {
        1.0 / self.speech_rate
    }

    /// Whether the pitch shift stage is built
    #[must_use]
    pub fn pitch_enabled(&self) -> bool {
        self.pitch_semitones.abs() > 0.1
    }

    /// Whether the distortion stage is built
    #[must_use]
    pub fn distortion_enabled(&self) -> bool {
        self.distortion_drive_db > 0.1
    }

    /// Whether ring modulation is applied
    #[must_use]
    pub fn ring_mod_enabled(&self) -> bool {
        self.ring_mod_freq_hz > 1.0
    }

    /// Whether the reverb stage is built
    #[must_use]
    pub fn reverb_enabled(&self) -> bool {
        self.reverb_wetness > 0.05
    }

    /// Whether the chorus stage is built
    #[must_use]
    pub fn chorus_enabled(&self) -> bool {
        self.chorus_depth > 0.05
    }

    /// Whether the echo delay stage is built
    #[must_use]
    pub fn delay_enabled(&self) -> bool {
        self.delay_ms > 5.0
    }

    /// Whether the lowpass stage is built
    #[must_use]
    pub fn lowpass_enabled(&self) -> bool {
        self.lowpass_cutoff_hz < 7900.0
    }

    /// Whether the highpass stage is built
    #[must_use]
    pub fn highpass_enabled(&self) -> bool {
        self.highpass_cutoff_hz > 60.0
    }

    /// Number of gated stages that would be built, ring modulation included
    #[must_use]
    pub fn active_stage_count(&self) -> usize {
        [
            self.pitch_enabled(),
            self.ring_mod_enabled(),
            self.distortion_enabled(),
            self.highpass_enabled(),
            self.lowpass_enabled(),
            self.chorus_enabled(),
            self.delay_enabled(),
            self.reverb_enabled(),
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }

    /// Speech rate label, e.g. `"1.5x"`
    #[must_use]
    pub fn speech_rate_label(&self) -> String {
        format!("{:.1}x", self.speech_rate)
    }

    /// Pitch label in whole semitones
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pitch_label(&self) -> String {
        format!("{}", self.pitch_semitones.trunc() as i32)
    }

    /// Distortion label, `"Off"` below one whole dB
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn distortion_label(&self) -> String {
        let whole = self.distortion_drive_db.trunc() as i32;
        if whole > 0 {
            format!("{whole} dB")
        } else {
            "Off".to_string()
        }
    }

    /// Ring modulator label, `"Off"` below one whole Hz
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn ring_mod_label(&self) -> String {
        let whole = self.ring_mod_freq_hz.trunc() as i32;
        if whole > 0 {
            format!("{whole} Hz")
        } else {
            "Off".to_string()
        }
    }

    /// Volume label, e.g. `"+3 dB"`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn volume_label(&self) -> String {
        format!("+{} dB", self.volume_boost_db.trunc() as i32)
    }

    /// Reverb label as a whole percentage
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn reverb_label(&self) -> String {
        format!("{}%", (self.reverb_wetness * 100.0).trunc() as i32)
    }

    /// Chorus label, `"Off"` at or below the gate
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn chorus_label(&self) -> String {
        if self.chorus_enabled() {
            format!("{}%", (self.chorus_depth * 100.0).trunc() as i32)
        } else {
            "Off".to_string()
        }
    }

    /// Delay label, `"Off"` below one whole millisecond
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay_label(&self) -> String {
        let whole = self.delay_ms.trunc() as i32;
        if whole > 0 {
            format!("{whole}ms")
        } else {
            "Off".to_string()
        }
    }

    /// Lowpass label, `"Off"` from 7900 Hz up
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn lowpass_label(&self) -> String {
        let whole = self.lowpass_cutoff_hz.trunc() as i32;
        if whole < 7900 {
            format!("{whole}Hz")
        } else {
            "Off".to_string()
        }
    }

    /// Highpass label, `"Off"` at 60 Hz and below
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn highpass_label(&self) -> String {
        let whole = self.highpass_cutoff_hz.trunc() as i32;
        if whole > 60 {
            format!("{whole}Hz")
        } else {
            "Off".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = EffectParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.volume_boost_db, 3.0);
        assert_eq!(params.reverb_wetness, 0.3);
        assert_eq!(params.sentence_silence_s, 0.2);
    }

    #[test]
    fn test_default_gates() {
        let params = EffectParameters::default();
        assert!(params.reverb_enabled());
        assert!(!params.pitch_enabled());
        assert!(!params.lowpass_enabled());
        assert!(!params.highpass_enabled());
        assert_eq!(params.active_stage_count(), 1);
    }

    #[test]
    fn test_neutral_has_no_stages() {
        let params = EffectParameters::neutral();
        assert_eq!(params.active_stage_count(), 0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let params = EffectParameters {
            pitch_semitones: 13.0,
            ..EffectParameters::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(err, ArtificerError::InvalidInput { .. }));
        assert!(err.to_string().contains("Pitch"));

        let params = EffectParameters {
            speech_rate: f32::NAN,
            ..EffectParameters::default()
        };
        assert!(params.validate().is_err());

        let params = EffectParameters {
            lowpass_cutoff_hz: 900.0,
            ..EffectParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_length_scale_inverts_rate() {
        let params = EffectParameters {
            speech_rate: 2.0,
            ..EffectParameters::default()
        };
        assert!((params.length_scale() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_gates_use_raw_values() {
        // 0.15 displays as "0" but still crosses the pitch gate
        let params = EffectParameters {
            pitch_semitones: 0.15,
            ..EffectParameters::neutral()
        };
        assert!(params.pitch_enabled());
        assert_eq!(params.pitch_label(), "0");

        // 5.5 ms displays as "5ms" but the gate is strictly above 5
        let params = EffectParameters {
            delay_ms: 5.5,
            ..EffectParameters::neutral()
        };
        assert!(params.delay_enabled());
        assert_eq!(params.delay_label(), "5ms");
    }

    #[test]
    fn test_labels() {
        let params = EffectParameters {
            speech_rate: 1.5,
            distortion_drive_db: 6.7,
            lowpass_cutoff_hz: 7950.0,
            highpass_cutoff_hz: 120.0,
            chorus_depth: 0.05,
            ..EffectParameters::default()
        };
        assert_eq!(params.speech_rate_label(), "1.5x");
        assert_eq!(params.distortion_label(), "6 dB");
        assert_eq!(params.ring_mod_label(), "Off");
        assert_eq!(params.volume_label(), "+3 dB");
        assert_eq!(params.reverb_label(), "30%");
        assert_eq!(params.chorus_label(), "Off");
        assert_eq!(params.lowpass_label(), "Off");
        assert_eq!(params.highpass_label(), "120Hz");
    }

    #[test]
    fn test_serde_fills_missing_fields_from_default() {
        let params: EffectParameters = serde_json::from_str(r#"{"pitch_semitones": -4.0}"#).unwrap();
        assert_eq!(params.pitch_semitones, -4.0);
        assert_eq!(params.volume_boost_db, 3.0);
    }
}
