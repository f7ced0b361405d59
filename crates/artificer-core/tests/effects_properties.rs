//! Property tests for the effects chain and PCM conversion

use artificer_core::audio_buffer::{normalize_sample, quantize_sample};
use artificer_core::effects::db_to_linear;
use artificer_core::{AudioBuffer, EffectParameters, EffectStage, EffectsChainBuilder};
use proptest::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

const RATE: u32 = 22_050;

/// Parameters with every gated knob at or below its off boundary
fn gated_off() -> impl Strategy<Value = EffectParameters> {
    (
        -0.1f32..=0.1,
        0.0f32..=0.1,
        0.0f32..=1.0,
        0.0f32..=0.05,
        0.0f32..=0.05,
        0.0f32..=5.0,
        7900.0f32..=8000.0,
        50.0f32..=60.0,
        0.0f32..=12.0,
    )
        .prop_map(
            |(pitch, drive, ring, reverb, chorus, delay, lowpass, highpass, volume)| EffectParameters {
                pitch_semitones: pitch,
                distortion_drive_db: drive,
                ring_mod_freq_hz: ring,
                reverb_wetness: reverb,
                chorus_depth: chorus,
                delay_ms: delay,
                lowpass_cutoff_hz: lowpass,
                highpass_cutoff_hz: highpass,
                volume_boost_db: volume,
                ..EffectParameters::default()
            },
        )
}

proptest! {
    #[test]
    fn gated_off_chain_is_pure_gain(
        params in gated_off(),
        pcm in prop::collection::vec(any::<i16>(), 0..2048),
    ) {
        let input = AudioBuffer::from_pcm_i16(&pcm, RATE).unwrap();
        let chain = EffectsChainBuilder::build(&params, 0.5);
        prop_assert!(chain.is_empty());

        let output = chain.apply(input).unwrap().to_pcm_i16();
        let gain = db_to_linear(params.volume_boost_db);
        let expected: Vec<i16> = pcm
            .iter()
            .map(|&s| quantize_sample(normalize_sample(s) * gain))
            .collect();
        prop_assert_eq!(output, expected);
    }

    #[test]
    fn pitch_shift_keeps_sample_count(
        semitones in prop_oneof![-12.0f32..=-0.1, 0.1f32..=12.0],
        len in 0usize..8000,
    ) {
        let samples: Vec<f32> = (0..len).map(|i| (i as f32 * 0.03).sin() * 0.5).collect();
        let params = EffectParameters {
            pitch_semitones: semitones,
            ..EffectParameters::neutral()
        };
        let output = EffectsChainBuilder::process(AudioBuffer::new(samples, RATE).unwrap(), &params, 0.5).unwrap();
        prop_assert_eq!(output.len(), len);
    }

    #[test]
    fn pcm_round_trip_within_one_step(samples in prop::collection::vec(-1.0f32..1.0, 1..512)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        AudioBuffer::new(samples.clone(), RATE).unwrap().write_wav(&path).unwrap();

        let decoded = AudioBuffer::read_wav(&path).unwrap();
        prop_assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(decoded.samples()) {
            prop_assert!((original - restored).abs() <= 1.0 / 32_768.0);
        }
    }
}

#[test]
fn zero_volume_is_unity_gain() {
    let params = EffectParameters {
        volume_boost_db: 0.0,
        ..EffectParameters::default()
    };
    assert_eq!(EffectsChainBuilder::build(&params, 0.5).linear_gain(), 1.0);
}

#[test]
fn default_parameters_on_silence() {
    let silence = AudioBuffer::silence(1.0, RATE).unwrap();
    let params = EffectParameters::default();
    let chain = EffectsChainBuilder::build(&params, 0.5);

    assert_eq!(chain.stages().len(), 1);
    assert!(matches!(
        chain.stages()[0],
        EffectStage::Reverb { wet_level, .. } if (wet_level - 0.3).abs() < f32::EPSILON
    ));
    assert!((chain.linear_gain() - 1.413).abs() < 1e-3);

    let output = chain.apply(silence).unwrap();
    assert_eq!(output.len(), 22_050);
    assert!(output.samples().iter().all(|&s| s == 0.0));
}

#[rstest]
#[case::pitch_at_boundary(EffectParameters { pitch_semitones: 0.1, ..EffectParameters::neutral() }, 0)]
#[case::pitch_past_boundary(EffectParameters { pitch_semitones: 0.2, ..EffectParameters::neutral() }, 1)]
#[case::distortion_on(EffectParameters { distortion_drive_db: 6.0, ..EffectParameters::neutral() }, 1)]
#[case::reverb_at_boundary(EffectParameters { reverb_wetness: 0.05, ..EffectParameters::neutral() }, 0)]
#[case::chorus_on(EffectParameters { chorus_depth: 0.5, ..EffectParameters::neutral() }, 1)]
#[case::delay_at_boundary(EffectParameters { delay_ms: 5.0, ..EffectParameters::neutral() }, 0)]
#[case::delay_on(EffectParameters { delay_ms: 250.0, ..EffectParameters::neutral() }, 1)]
#[case::lowpass_at_boundary(EffectParameters { lowpass_cutoff_hz: 7900.0, ..EffectParameters::neutral() }, 0)]
#[case::lowpass_on(EffectParameters { lowpass_cutoff_hz: 3000.0, ..EffectParameters::neutral() }, 1)]
#[case::highpass_at_boundary(EffectParameters { highpass_cutoff_hz: 60.0, ..EffectParameters::neutral() }, 0)]
#[case::highpass_on(EffectParameters { highpass_cutoff_hz: 200.0, ..EffectParameters::neutral() }, 1)]
fn stage_gates(#[case] params: EffectParameters, #[case] expected_stages: usize) {
    assert_eq!(EffectsChainBuilder::build(&params, 0.5).stages().len(), expected_stages);
}

#[rstest]
#[case(1.0, false)]
#[case(1.5, true)]
#[case(120.0, true)]
fn ring_mod_gate(#[case] freq_hz: f32, #[case] enabled: bool) {
    let params = EffectParameters {
        ring_mod_freq_hz: freq_hz,
        ..EffectParameters::neutral()
    };
    assert_eq!(EffectsChainBuilder::build(&params, 0.5).ring_mod_freq_hz().is_some(), enabled);
}

#[test]
fn full_chain_is_deterministic() {
    let samples: Vec<f32> = (0..11_025).map(|i| (i as f32 * 0.02).sin() * 0.4).collect();
    let params = EffectParameters {
        pitch_semitones: -5.0,
        distortion_drive_db: 8.0,
        ring_mod_freq_hz: 40.0,
        volume_boost_db: 6.0,
        reverb_wetness: 0.5,
        chorus_depth: 0.4,
        delay_ms: 120.0,
        lowpass_cutoff_hz: 4000.0,
        highpass_cutoff_hz: 150.0,
        ..EffectParameters::default()
    };

    let first = EffectsChainBuilder::process(AudioBuffer::new(samples.clone(), RATE).unwrap(), &params, 0.8).unwrap();
    let second = EffectsChainBuilder::process(AudioBuffer::new(samples, RATE).unwrap(), &params, 0.8).unwrap();
    assert_eq!(first.len(), 11_025);
    assert_eq!(first.to_pcm_i16(), second.to_pcm_i16());
}
