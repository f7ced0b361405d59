//! Butterworth highpass and lowpass stages built on `biquad`.

use crate::error::{ArtificerError, ArtificerResult};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};

/// Apply a second-order highpass in place
///
/// # Errors
///
/// Returns `EffectProcessingError` if the cutoff is not below Nyquist
pub fn highpass(samples: &mut [f32], sample_rate: u32, cutoff_hz: f32) -> ArtificerResult<()> {
    run(samples, Type::HighPass, sample_rate, cutoff_hz)
}

/// Apply a second-order lowpass in place
///
/// # Errors
///
/// Returns `EffectProcessingError` if the cutoff is not below Nyquist
pub fn lowpass(samples: &mut [f32], sample_rate: u32, cutoff_hz: f32) -> ArtificerResult<()> {
    run(samples, Type::LowPass, sample_rate, cutoff_hz)
}

#[allow(clippy::cast_precision_loss)]
fn run(samples: &mut [f32], filter: Type<f32>, sample_rate: u32, cutoff_hz: f32) -> ArtificerResult<()> {
    let fs = sample_rate as f32;
    if cutoff_hz <= 0.0 || cutoff_hz >= fs / 2.0 {
        return Err(ArtificerError::effect_processing(format!(
            "Filter cutoff {cutoff_hz} Hz must be between 0 and Nyquist ({} Hz)",
            fs / 2.0
        )));
    }

    let coeffs = Coefficients::<f32>::from_params(filter, fs.hz(), cutoff_hz.hz(), Q_BUTTERWORTH_F32)
        .map_err(|e| ArtificerError::effect_processing(format!("Could not design filter: {e:?}")))?;
    let mut stage = DirectForm2Transposed::<f32>::new(coeffs);

    for sample in samples.iter_mut() {
        *sample = stage.run(*sample);
    }
    Ok(())
}
