//! Mono Freeverb: parallel damped combs into series allpasses.

/// A comb filter delay line with damped feedback
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback,
            damp1: damp,
            damp2: 1.0 - damp,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;
        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    const FEEDBACK: f32 = 0.5;

    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let bufout = self.buffer[self.index];
        self.buffer[self.index] = input + bufout * Self::FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        bufout - input
    }
}

// Tunings in samples at 44.1 kHz
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];

const INPUT_GAIN: f32 = 0.03;
const DAMPING: f32 = 0.5;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;

/// Mono room reverb with separate wet and dry levels
#[derive(Debug, Clone)]
pub struct Reverb {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    wet_level: f32,
    dry_level: f32,
}

impl Reverb {
    /// Create a reverb; `room_size` in [0, 1] sets the comb feedback
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn new(sample_rate: u32, room_size: f32, wet_level: f32, dry_level: f32) -> Self {
        let scale = f64::from(sample_rate) / 44_100.0;
        let feedback = room_size.clamp(0.0, 1.0) * ROOM_SCALE + ROOM_OFFSET;

        let combs = COMB_TUNING
            .iter()
            .map(|&t| CombFilter::new((t as f64 * scale) as usize, feedback, DAMPING))
            .collect();
        let allpasses = ALLPASS_TUNING
            .iter()
            .map(|&t| AllpassFilter::new((t as f64 * scale) as usize))
            .collect();

        Self {
            combs,
            allpasses,
            wet_level,
            dry_level,
        }
    }

    /// Process one sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let scaled = input * INPUT_GAIN;
        let mut wet: f32 = self.combs.iter_mut().map(|comb| comb.process(scaled)).sum();
        for allpass in &mut self.allpasses {
            wet = allpass.process(wet);
        }
        input * self.dry_level + wet * self.wet_level
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
        let mut reverb = Reverb::new(22_050, 0.5, 0.0, 1.0);
        assert!((reverb.process(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut reverb = Reverb::new(22_050, 0.5, 0.3, 0.7);
        let mut samples = vec![0.0; 2048];
        reverb.process_block(&mut samples);
        assert!(samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_impulse_leaves_tail() {
        let mut reverb = Reverb::new(22_050, 0.5, 1.0, 0.0);
        reverb.process(1.0);
        let tail: Vec<f32> = (0..5000).map(|_| reverb.process(0.0)).collect();
        assert!(tail.iter().any(|s| s.abs() > 0.001));
    }

    #[test]
    fn test_larger_room_rings_longer() {
        let energy_after = |room_size: f32| {
            let mut reverb = Reverb::new(22_050, room_size, 1.0, 0.0);
            reverb.process(1.0);
            for _ in 0..11_025 {
                reverb.process(0.0);
            }
            (0..2205).map(|_| reverb.process(0.0).powi(2)).sum::<f32>()
        };
        assert!(energy_after(0.9) > energy_after(0.1));
    }
}
