//! Drive stage: `tanh(gain * x)` with the gain given in dB.

use super::db_to_linear;
use rayon::prelude::*;

/// Apply the waveshaper in place
pub fn drive(samples: &mut [f32], drive_db: f32) {
    let gain = db_to_linear(drive_db);
    samples.par_iter_mut().for_each(|s| *s = (*s * gain).tanh());
}
