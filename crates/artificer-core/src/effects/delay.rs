//! Feedback echo on a mono delay line.

/// Mono delay with feedback and dry/wet mix
#[derive(Debug, Clone)]
pub struct Delay {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f32,
    mix: f32,
}

impl Delay {
    /// Create a delay of `delay_secs` at `sample_rate`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(sample_rate: u32, delay_secs: f32, feedback: f32, mix: f32) -> Self {
        let delay_samples = ((f64::from(delay_secs.max(0.0)) * f64::from(sample_rate)) as usize).max(1);
        Self {
            buffer: vec![0.0; delay_samples + 1],
            write_pos: 0,
            delay_samples,
            feedback: feedback.clamp(0.0, 0.99),
            mix: mix.clamp(0.0, 1.0),
        }
    }

    /// Process one sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;
        let delayed = self.buffer[read_pos];

        self.buffer[self.write_pos] = input + delayed * self.feedback;
        self.write_pos = (self.write_pos + 1) % len;

        input * (1.0 - self.mix) + delayed * self.mix
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
    fn test_dry_passthrough() {
        let mut delay = Delay::new(22_050, 0.1, 0.3, 0.0);
        assert!((delay.process(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_echo_timing_and_feedback() {
        // 10 ms at 22.05 kHz is 220 samples
        let mut delay = Delay::new(22_050, 0.01, 0.3, 0.5);
        let mut samples = vec![0.0; 700];
        samples[0] = 1.0;
        delay.process_block(&mut samples);

        assert!((samples[0] - 0.5).abs() < 1e-6);
        assert!((samples[220] - 0.5).abs() < 1e-6);
        assert!((samples[440] - 0.15).abs() < 1e-6);
        assert!((samples[660] - 0.045).abs() < 1e-6);
        assert_eq!(samples[100], 0.0);
    }
}
