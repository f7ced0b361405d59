//! Length-preserving pitch shift.
//!
//! Two read taps sweep through a delay line at a rate set by the pitch ratio,
//! half a window apart, and are crossfaded with triangular gains that always
//! sum to one. The output has exactly as many samples as the input.

/// Sweep window of each read tap
const WINDOW_SECS: f32 = 0.04;

/// Offline delay-line pitch shifter
#[derive(Debug, Clone)]
pub struct PitchShifter {
    ratio: f32,
    window: f32,
}

impl PitchShifter {
    /// Shifter for `semitones` at `sample_rate`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(sample_rate: u32, semitones: f32) -> Self {
        Self {
            ratio: 2.0_f32.powf(semitones / 12.0),
            window: (sample_rate as f32 * WINDOW_SECS).max(2.0),
        }
    }

    /// Frequency ratio applied by this shifter
    #[must_use]
    pub const fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Shift `input`, returning a buffer of the same length
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        // Phase moves by (1 - ratio) delay samples per output sample
        let phase_step = (1.0 - self.ratio) / self.window;
        let mut phase = 0.0_f32;

        (0..input.len())
            .map(|n| {
                let phase_b = (phase + 0.5).fract();
                let out = triangle(phase) * read(input, n as f32 - phase * self.window)
                    + triangle(phase_b) * read(input, n as f32 - phase_b * self.window);

                phase = (phase + phase_step).rem_euclid(1.0);
                out
            })
            .collect()
    }
}

/// Crossfade gain, zero at the wrap point and one mid-window
fn triangle(phase: f32) -> f32 {
    1.0 - (2.0 * phase - 1.0).abs()
}

/// Linear interpolation into `input`, silent outside it
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn read(input: &[f32], position: f32) -> f32 {
    if position < 0.0 {
        return 0.0;
    }
    let index = position.floor() as usize;
    let frac = position - position.floor();
    let s0 = input.get(index).copied().unwrap_or(0.0);
    let s1 = input.get(index + 1).copied().unwrap_or(0.0);
    s0 + frac * (s1 - s0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] <= 0.0 && w[1] > 0.0) || (w[0] >= 0.0 && w[1] < 0.0))
            .count()
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_ratio() {
        assert!((PitchShifter::new(22_050, 12.0).ratio() - 2.0).abs() < 1e-6);
        assert!((PitchShifter::new(22_050, -12.0).ratio() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_length_preserved() {
        let input = sine(220.0, 22_050, 10_000);
        for semitones in [-12.0, -0.5, 0.2, 7.0, 12.0] {
            let output = PitchShifter::new(22_050, semitones).process(&input);
            assert_eq!(output.len(), input.len());
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(PitchShifter::new(22_050, 4.0).process(&[]).is_empty());
    }

    #[test]
    fn test_octave_up_doubles_crossings() {
        let input = sine(200.0, 22_050, 22_050);
        let output = PitchShifter::new(22_050, 12.0).process(&input);

        // Skip the first window where the taps are still filling
        let skip = 2_000;
        let before = zero_crossings(&input[skip..]) as f32;
        let after = zero_crossings(&output[skip..]) as f32;
        let ratio = after / before;
        assert!(ratio > 1.7 && ratio < 2.3, "crossing ratio was {ratio}");
    }

    #[test]
    fn test_output_stays_bounded() {
        let input = sine(300.0, 22_050, 5_000);
        let output = PitchShifter::new(22_050, -5.0).process(&input);
        assert!(output.iter().all(|s| s.abs() <= 0.5 + 1e-4));
    }
}
