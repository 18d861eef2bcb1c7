//! Integration tests for the tuner
//!
//! Synthetic microphones stand in for a guitar; the tuner reads them through
//! a running context exactly as it reads a live input.

use plectrum_core::domain::{
    AudioError, ContextHandle, PitchClass, StaticInputProvider, TunerConfig, TunerSession,
    TuningState,
};
use std::f64::consts::TAU;

const SAMPLE_RATE: u32 = 44100;

fn running_context() -> ContextHandle {
    let context = ContextHandle::new(SAMPLE_RATE);
    context.resume().unwrap();
    context
}

fn render(context: &ContextHandle, frames: usize) {
    let mut block = vec![0.0; frames * 2];
    context.render(&mut block);
}

async fn read_tone(frequency: f64, config: &TunerConfig) -> Option<TuningState> {
    let context = running_context();
    let provider = StaticInputProvider::tone(SAMPLE_RATE, frequency);
    let mut tuner = TunerSession::open(context.clone(), &provider, None, config)
        .await
        .unwrap();
    render(&context, config.analysis_size);
    tuner.tick()
}

// ============================================================================
// DETECTION TESTS
// ============================================================================

#[tokio::test]
async fn test_standard_tuning_strings() {
    let strings = [
        (82.41, PitchClass::E, 2),
        (110.0, PitchClass::A, 2),
        (146.83, PitchClass::D, 3),
        (196.0, PitchClass::G, 3),
        (246.94, PitchClass::B, 3),
        (329.63, PitchClass::E, 4),
    ];

    for (frequency, pitch_class, octave) in strings {
        let reading = read_tone(frequency, &TunerConfig::default()).await.unwrap();
        assert_eq!(reading.nearest_pitch_class, pitch_class, "string {}", frequency);
        assert_eq!(reading.octave, octave, "string {}", frequency);
        let error = (reading.detected_frequency_hz - frequency).abs() / frequency;
        assert!(error < 0.01, "detected {} for {}", reading.detected_frequency_hz, frequency);
    }
}

#[tokio::test]
async fn test_reference_pitch_shifts_offsets() {
    let config = TunerConfig {
        reference_a4: 442.0,
        ..TunerConfig::default()
    };
    let reading = read_tone(442.0, &config).await.unwrap();

    assert_eq!(reading.nearest_pitch_class, PitchClass::A);
    assert!(reading.display_offset().abs() < 5.0);
}

#[tokio::test]
async fn test_larger_window_still_detects() {
    let config = TunerConfig {
        analysis_size: 4096,
        ..TunerConfig::default()
    };
    let reading = read_tone(82.41, &config).await.unwrap();
    assert_eq!(reading.note_label(), "E2");
}

// ============================================================================
// SESSION TESTS
// ============================================================================

#[tokio::test]
async fn test_readings_follow_the_input() {
    let context = running_context();
    let mut clip: Vec<f32> = (0..4096)
        .map(|i| (0.5 * (TAU * 110.0 * i as f64 / 44100.0).sin()) as f32)
        .collect();
    clip.extend((0..4096).map(|i| (0.5 * (TAU * 146.83 * i as f64 / 44100.0).sin()) as f32));
    let provider = StaticInputProvider::clip(clip);

    let mut tuner = TunerSession::open(context.clone(), &provider, None, &TunerConfig::default())
        .await
        .unwrap();
    let mut updates = tuner.subscribe();

    render(&context, 2048);
    assert_eq!(tuner.tick().unwrap().nearest_pitch_class, PitchClass::A);
    assert!(tuner.level_percent() > 10.0);
    updates.borrow_and_update();

    render(&context, 4096);
    assert_eq!(tuner.tick().unwrap().nearest_pitch_class, PitchClass::D);
    assert!(updates.has_changed().unwrap());
}

#[tokio::test]
async fn test_sessions_can_be_reopened() {
    let context = running_context();
    let provider = StaticInputProvider::tone(SAMPLE_RATE, 196.0);

    for _ in 0..3 {
        let mut tuner = TunerSession::open(context.clone(), &provider, None, &TunerConfig::default())
            .await
            .unwrap();
        render(&context, 2048);
        assert_eq!(tuner.tick().unwrap().nearest_pitch_class, PitchClass::G);
        tuner.stop();
    }

    assert_eq!(provider.opened(), 3);
    assert_eq!(provider.live_sources(), 0);
    assert_eq!(context.lock().graph().node_count(), 1);
}

#[tokio::test]
async fn test_closed_context_is_unavailable() {
    let context = running_context();
    context.close();

    let result = TunerSession::open(
        context,
        &StaticInputProvider::tone(SAMPLE_RATE, 440.0),
        None,
        &TunerConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(AudioError::AudioEngineUnavailable(_))));
}
