//! Normalized mono audio passed between synthesis, effects, and disposition.

use crate::error::{ArtificerError, ArtificerResult};
use crate::PCM16_SCALE;
use std::path::Path;
use tracing::debug;

/// Owned mono samples in roughly [-1, 1] plus their sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Convert one normalized sample to 16-bit PCM
///
/// Scales by 2^15, clips to the i16 range and truncates toward zero. Clipping
/// is the only overflow policy.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantize_sample(sample: f32) -> i16 {
    (sample * PCM16_SCALE).clamp(-32_768.0, 32_767.0) as i16
}

/// Convert one 16-bit PCM sample to the normalized range
#[must_use]
pub fn normalize_sample(sample: i16) -> f32 {
    f32::from(sample) / PCM16_SCALE
}

impl AudioBuffer {
    /// Create a buffer from normalized samples
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is zero
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> ArtificerResult<Self> {
        if sample_rate == 0 {
            return Err(ArtificerError::invalid_input("Sample rate must be greater than 0"));
        }
        Ok(Self { samples, sample_rate })
    }

    /// A buffer of silence lasting `duration_secs`
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is zero or the duration is negative
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn silence(duration_secs: f32, sample_rate: u32) -> ArtificerResult<Self> {
        if !duration_secs.is_finite() || duration_secs < 0.0 {
            return Err(ArtificerError::invalid_input(format!(
                "Duration must be non-negative, got {duration_secs}"
            )));
        }
        let len = (duration_secs * sample_rate as f32).round() as usize;
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Decode 16-bit PCM samples
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is zero
    pub fn from_pcm_i16(pcm: &[i16], sample_rate: u32) -> ArtificerResult<Self> {
        Self::new(pcm.iter().copied().map(normalize_sample).collect(), sample_rate)
    }

    /// Re-quantize to 16-bit PCM
    #[must_use]
    pub fn to_pcm_i16(&self) -> Vec<i16> {
        self.samples.iter().copied().map(quantize_sample).collect()
    }

    /// Decode a mono 16-bit integer PCM WAV file
    ///
    /// # Errors
    ///
    /// Returns `FileError` if the file cannot be opened and `DecodeError` if it is
    /// not mono 16-bit integer PCM or a sample is truncated
    pub fn read_wav<P: AsRef<Path>>(path: P) -> ArtificerResult<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.channels != 1 {
            return Err(ArtificerError::decode(format!(
                "{} has {} channels, expected mono",
                path.display(),
                spec.channels
            )));
        }
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(ArtificerError::decode(format!(
                "{} is {}-bit {:?}, expected 16-bit integer PCM",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            )));
        }

        let pcm = reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ArtificerError::decode(format!("{}: {e}", path.display())))?;
        debug!(
            "Decoded {} samples at {} Hz from {}",
            pcm.len(),
            spec.sample_rate,
            path.display()
        );
        Self::from_pcm_i16(&pcm, spec.sample_rate)
    }

    /// Write as a mono 16-bit PCM WAV file at the buffer's sample rate
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> ArtificerResult<()> {
        let spec = hound::WavSpec {
            channels: crate::DEFAULT_CHANNELS,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
        for sample in self.samples.iter().copied().map(quantize_sample) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        debug!(
            "Wrote {} samples to {}",
            self.samples.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Normalized samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable access to the samples for in-place stages
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Take ownership of the samples
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Replace the samples, keeping the sample rate
    #[must_use]
    pub fn with_samples(self, samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count, always mono
    #[must_use]
    pub const fn channels(&self) -> u16 {
        crate::DEFAULT_CHANNELS
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Largest absolute sample value
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_quantize_clips() {
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(1.0), 32_767);
        assert_eq!(quantize_sample(2.5), 32_767);
        assert_eq!(quantize_sample(-1.0), -32_768);
        assert_eq!(quantize_sample(-3.0), -32_768);
        assert_eq!(quantize_sample(0.5), 16_384);
    }

    #[test]
    fn test_quantize_truncates_toward_zero() {
        assert_eq!(quantize_sample(1.9 / 32_768.0), 1);
        assert_eq!(quantize_sample(-1.9 / 32_768.0), -1);
    }

    #[test]
    fn test_pcm_normalization() {
        let buffer = AudioBuffer::from_pcm_i16(&[0, 16_384, -32_768], 22_050).unwrap();
        assert_eq!(buffer.samples(), &[0.0, 0.5, -1.0]);
        assert_eq!(buffer.to_pcm_i16(), vec![0, 16_384, -32_768]);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(AudioBuffer::new(vec![0.0], 0).is_err());
    }

    #[test]
    fn test_silence_length() {
        let buffer = AudioBuffer::silence(1.0, 22_050).unwrap();
        assert_eq!(buffer.len(), 22_050);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_wav_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("line.wav");

        let buffer = AudioBuffer::new(vec![0.0, 0.25, -0.25, 0.999], 16_000).unwrap();
        buffer.write_wav(&path).unwrap();

        let decoded = AudioBuffer::read_wav(&path).unwrap();
        assert_eq!(decoded.sample_rate(), 16_000);
        assert_eq!(decoded.len(), 4);
        for (a, b) in buffer.samples().iter().zip(decoded.samples()) {
            assert!((a - b).abs() <= 1.0 / 32_768.0);
        }
    }

    #[test]
    fn test_read_rejects_stereo() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0_i16).unwrap();
        writer.write_sample(0_i16).unwrap();
        writer.finalize().unwrap();

        let err = AudioBuffer::read_wav(&path).unwrap_err();
        assert!(matches!(err, ArtificerError::DecodeError { .. }));
    }

    #[test]
    fn test_read_rejects_float_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5_f32).unwrap();
        writer.finalize().unwrap();

        let err = AudioBuffer::read_wav(&path).unwrap_err();
        assert!(matches!(err, ArtificerError::DecodeError { .. }));
    }

    #[test]
    fn test_read_garbage_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not a riff file").unwrap();

        let err = AudioBuffer::read_wav(&path).unwrap_err();
        assert!(matches!(err, ArtificerError::DecodeError { .. }));
    }

    #[test]
    fn test_truncated_data_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cut.wav");
        AudioBuffer::new(vec![0.1; 1000], 22_050).unwrap().write_wav(&path).unwrap();

        // Header still claims 1000 samples; the last one loses a byte
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 501]).unwrap();

        let err = AudioBuffer::read_wav(&path).unwrap_err();
        assert!(matches!(err, ArtificerError::DecodeError { .. }), "{err:?}");
    }

    #[test]
    fn test_written_header_is_mono_pcm16() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("spec.wav");
        AudioBuffer::new(vec![0.0; 10], 24_000).unwrap().write_wav(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.len(), 10);
    }

    #[test]
    fn test_read_missing_file_is_file_error() {
        let err = AudioBuffer::read_wav("/nonexistent/dir/line.wav").unwrap_err();
        assert!(matches!(err, ArtificerError::FileError { .. }));
    }
}
