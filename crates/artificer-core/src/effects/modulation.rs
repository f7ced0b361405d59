//! Ring modulation and chorus.

use rayon::prelude::*;
use std::f64::consts::PI;

/// Largest delay excursion of the chorus at full depth
const CHORUS_MAX_SWEEP_SECS: f64 = 0.005;

/// Multiply every sample by `sin(2π·f·t)` at the buffer's sample rate
pub fn ring_modulate(samples: &mut [f32], sample_rate: u32, freq_hz: f32) {
    let step = 2.0 * PI * f64::from(freq_hz) / f64::from(sample_rate);
    samples.par_iter_mut().enumerate().for_each(|(n, s)| {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let carrier = (step * n as f64).sin() as f32;
        *s *= carrier;
    });
}

/// Mono chorus: one LFO-modulated delay tap mixed with the dry signal
#[derive(Debug, Clone)]
pub struct Chorus {
    buffer: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
    phase: f64,
    rate: f64,
    sweep: f64,
    centre: f64,
    feedback: f32,
    mix: f32,
}

impl Chorus {
    /// Create a chorus
    ///
    /// `depth` scales the delay sweep around `centre_delay_ms`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(sample_rate: u32, rate_hz: f32, depth: f32, centre_delay_ms: f32, feedback: f32, mix: f32) -> Self {
        let sample_rate = f64::from(sample_rate);
        let centre = f64::from(centre_delay_ms) / 1000.0;
        let sweep = f64::from(depth.clamp(0.0, 1.0)) * CHORUS_MAX_SWEEP_SECS;
        let buffer_size = ((centre + sweep) * sample_rate) as usize + 3;

        Self {
            buffer: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            phase: 0.0,
            rate: f64::from(rate_hz),
            sweep,
            centre,
            feedback: feedback.clamp(0.0, 0.95),
            mix: mix.clamp(0.0, 1.0),
        }
    }

    /// Read with fractional delay (linear interpolation)
    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn read_interpolated(&self, delay_samples: f64) -> f32 {
        let len = self.buffer.len();
        let delay_int = delay_samples as usize;
        let frac = (delay_samples - delay_int as f64) as f32;

        let read_0 = (self.write_pos + len - delay_int) % len;
        let read_1 = (read_0 + len - 1) % len;

        let s0 = self.buffer[read_0];
        let s1 = self.buffer[read_1];
        s0 + frac * (s1 - s0)
    }

    /// Process one sample
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn process(&mut self, input: f32) -> f32 {
        let lfo = (2.0 * PI * self.phase).sin();
        let max_delay = (self.buffer.len() - 2) as f64;
        let delay = ((self.centre + self.sweep * lfo) * self.sample_rate).clamp(1.0, max_delay);

        let wet = self.read_interpolated(delay);
        self.buffer[self.write_pos] = input + wet * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();

        self.phase = (self.phase + self.rate / self.sample_rate) % 1.0;

        input * (1.0 - self.mix) + wet * self.mix
    }

    /// Process a block in place
    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_mod_carrier() {
        let mut samples = vec![1.0; 8];
        // Quarter-rate carrier: 0, 1, 0, -1, ...
        ring_modulate(&mut samples, 8, 2.0);
        let expected = [0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0];
        for (got, want) in samples.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }
    }

    #[test]
    fn test_ring_mod_starts_silent() {
        let mut samples = vec![0.7; 4];
        ring_modulate(&mut samples, 22_050, 100.0);
        assert_eq!(samples[0], 0.0);
    }

    #[test]
    fn test_chorus_dry_passthrough() {
        let mut chorus = Chorus::new(22_050, 1.0, 0.5, 7.0, 0.0, 0.0);
        assert!((chorus.process(0.5) - 0.5).abs() < 1e-6);
        assert!((chorus.process(-0.25) + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_chorus_wet_is_delayed() {
        let mut chorus = Chorus::new(22_050, 1.0, 0.0, 7.0, 0.0, 1.0);
        let mut samples = vec![0.0; 400];
        samples[0] = 1.0;
        chorus.process_block(&mut samples);

        // 7 ms at 22.05 kHz is about 154 samples
        let peak = samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert!((150..=158).contains(&peak), "peak at {peak}");
        assert_eq!(samples[0], 0.0);
    }

    #[test]
    fn test_chorus_is_bounded() {
        let mut chorus = Chorus::new(22_050, 1.0, 1.0, 7.0, 0.0, 0.5);
        let mut samples: Vec<f32> = (0..22_050).map(|n| (n as f32 * 0.03).sin()).collect();
        chorus.process_block(&mut samples);
        assert!(samples.iter().all(|s| s.abs() <= 1.0 + 1e-5));
    }
}
