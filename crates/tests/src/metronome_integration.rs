//! Integration tests for the click track
//!
//! The scheduler is driven the way the CLI drives it: one tick per timer
//! period, with the context rendering in between.

use plectrum_core::domain::{ContextHandle, MetronomeConfig, MetronomeScheduler};

const SAMPLE_RATE: u32 = 44100;
/// Frames rendered per 25 ms timer period
const PERIOD_FRAMES: usize = 1102;

fn running_context() -> ContextHandle {
    let context = ContextHandle::new(SAMPLE_RATE);
    context.resume().unwrap();
    context
}

/// Tick and render `periods` timer periods, returning the left channel
fn drive(scheduler: &mut MetronomeScheduler<ContextHandle>, periods: usize) -> Vec<f32> {
    let mut left = Vec::with_capacity(periods * PERIOD_FRAMES);
    let mut block = vec![0.0; PERIOD_FRAMES * 2];
    for _ in 0..periods {
        scheduler.tick();
        scheduler.clock().render(&mut block);
        left.extend(block.iter().step_by(2));
    }
    left
}

fn index_at(seconds: f64) -> usize {
    (seconds * SAMPLE_RATE as f64).ceil() as usize
}

fn energy(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s * s).sum()
}

fn rising_crossings(samples: &[f32]) -> usize {
    samples.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count()
}

// ============================================================================
// TIMING TESTS
// ============================================================================

#[test]
fn test_clicks_land_on_sixteenths() {
    let context = running_context();
    let mut scheduler = MetronomeScheduler::new(context, MetronomeConfig::default());
    scheduler.start();
    assert!(scheduler.is_running());

    let left = drive(&mut scheduler, 40);
    let spacing = scheduler.seconds_per_subdivision();
    assert!((spacing - 0.125).abs() < 1e-12);

    for k in 0..8 {
        let t = k as f64 * spacing;
        let onset = &left[index_at(t)..index_at(t + 0.01)];
        let gap = &left[index_at(t + 0.04)..index_at(t + 0.12)];
        assert!(energy(onset) > 1.0, "no click at {}s", t);
        assert_eq!(energy(gap), 0.0, "sound between clicks after {}s", t);
    }
}

#[test]
fn test_first_click_is_accented() {
    let context = running_context();
    let mut scheduler = MetronomeScheduler::new(context, MetronomeConfig::default());
    scheduler.start();

    let left = drive(&mut scheduler, 10);
    let accent = rising_crossings(&left[..index_at(0.02)]);
    let plain = rising_crossings(&left[index_at(0.125)..index_at(0.145)]);

    // 880 Hz against 440 Hz over 20 ms
    assert!(accent >= 15, "accent crossings {}", accent);
    assert!(plain <= 10, "plain crossings {}", plain);
}

#[test]
fn test_stop_lets_scheduled_clicks_finish() {
    let context = running_context();
    let mut scheduler = MetronomeScheduler::new(context, MetronomeConfig::default());
    scheduler.start();
    drive(&mut scheduler, 20);

    scheduler.stop();
    let tail = drive(&mut scheduler, 20);

    // Nothing past the lookahead window plus one click length
    let quiet_from = index_at(0.1 + 0.03 + 0.01);
    assert_eq!(energy(&tail[quiet_from..]), 0.0);
    assert_eq!(scheduler.clock().lock().pending_clicks(), 0);
}

#[test]
fn test_tempo_change_respaces_clicks() {
    let context = running_context();
    let config = MetronomeConfig {
        bpm: 60.0,
        subdivisions_per_beat: 1,
        ..MetronomeConfig::default()
    };
    let mut scheduler = MetronomeScheduler::new(context, config);
    scheduler.start();
    assert!((scheduler.seconds_per_subdivision() - 1.0).abs() < 1e-12);

    scheduler.set_bpm(240.0);
    assert!((scheduler.seconds_per_subdivision() - 0.25).abs() < 1e-12);

    let left = drive(&mut scheduler, 40);
    for k in 0..3 {
        let t = k as f64 * 0.25;
        assert!(energy(&left[index_at(t)..index_at(t + 0.01)]) > 1.0, "no click at {}s", t);
    }
}

#[test]
fn test_suspended_context_keeps_metronome_off() {
    let context = ContextHandle::new(SAMPLE_RATE);
    let mut scheduler = MetronomeScheduler::new(context, MetronomeConfig::default());

    scheduler.start();
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.tick(), 0);
    assert!(!scheduler.toggle());
}
