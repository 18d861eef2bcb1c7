//! Pitch detection
//!
//! Normalized autocorrelation over a fixed time-domain window, then mapping
//! of the estimated frequency onto the twelve equal-tempered pitch classes.
//!
//! The scan is `O(n²/2)` in the window length, which makes it the most
//! expensive per-frame task in the rig; keep the window at 2048 samples.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pitch class names starting at C
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Concert pitch of A4 in Hz
pub const DEFAULT_A4: f64 = 440.0;

// ============================================================================
// PITCH CLASSES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Pitch class `index` semitones above C, wrapping around the octave
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    pub fn name(&self) -> &'static str {
        NOTE_NAMES[self.index()]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frequency of C0 for a given A4 reference
fn c0(reference_a4: f64) -> f64 {
    reference_a4 * 2.0_f64.powf(-4.75)
}

/// Rounded semitone distance of `frequency` from C0
fn half_steps_from_c0(frequency: f64, reference_a4: f64) -> i64 {
    (12.0 * (frequency / c0(reference_a4)).log2()).round() as i64
}

/// Nearest equal-tempered pitch class of `frequency` (A4 = 440 Hz)
pub fn note_from_frequency(frequency: f64) -> PitchClass {
    note_from_frequency_with(frequency, DEFAULT_A4)
}

pub fn note_from_frequency_with(frequency: f64, reference_a4: f64) -> PitchClass {
    PitchClass::from_index(half_steps_from_c0(frequency, reference_a4))
}

/// Frequency of `pitch_class` in the reference octave (the one holding A4)
pub fn frequency_of(pitch_class: PitchClass, reference_a4: f64) -> f64 {
    let semitones = pitch_class.index() as f64 - PitchClass::A.index() as f64;
    reference_a4 * 2.0_f64.powf(semitones / 12.0)
}

/// Pitch difference in cents between `frequency` and `pitch_class` in the
/// reference octave.
///
/// Frequencies outside that octave yield offsets of whole octaves
/// (±1200 per octave) on top of the tuning error.
pub fn cents_off(frequency: f64, pitch_class: PitchClass, reference_a4: f64) -> f64 {
    1200.0 * (frequency / frequency_of(pitch_class, reference_a4)).log2()
}

/// Root mean square of a block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

// ============================================================================
// DETECTOR
// ============================================================================

/// Thresholds of the autocorrelation detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// RMS below which a block counts as silence
    pub silence_rms: f32,
    /// Correlation that marks the start of a good region
    pub correlation_threshold: f64,
    /// Minimum best correlation for an estimate to be reported
    pub acceptance_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            silence_rms: 0.01,
            correlation_threshold: 0.9,
            acceptance_threshold: 0.01,
        }
    }
}

/// Autocorrelation pitch detector
#[derive(Debug, Clone, Default)]
pub struct PitchDetector {
    config: DetectorConfig,
}

impl PitchDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Estimate the fundamental of `buffer` in Hz.
    ///
    /// Returns `None` for silence or when no lag correlates well enough.
    /// The first local maximum past the correlation threshold wins, which
    /// keeps the scan from locking onto a longer-lag harmonic.
    pub fn detect(&self, buffer: &[f32], sample_rate: u32) -> Option<f32> {
        let size = buffer.len();
        if size < 4 || rms(buffer) < self.config.silence_rms {
            return None;
        }

        let half = size / 2;
        let mut best_offset: Option<usize> = None;
        let mut best_correlation = 0.0_f64;
        let mut last_correlation = 1.0_f64;
        let mut found_good = false;

        for offset in 0..half {
            let mut cross = 0.0_f64;
            let mut energy_a = 0.0_f64;
            let mut energy_b = 0.0_f64;
            for i in 0..half {
                let a = buffer[i] as f64;
                let b = buffer[i + offset] as f64;
                cross += a * b;
                energy_a += a * a;
                energy_b += b * b;
            }

            let denominator = (energy_a * energy_b).sqrt();
            let correlation = if denominator > 0.0 {
                cross / denominator
            } else {
                0.0
            };

            if correlation > self.config.correlation_threshold && correlation > last_correlation {
                found_good = true;
                if correlation > best_correlation {
                    best_correlation = correlation;
                    best_offset = Some(offset);
                }
            } else if found_good {
                break;
            }
            last_correlation = correlation;
        }

        match best_offset {
            Some(offset) if offset > 0 && best_correlation > self.config.acceptance_threshold => {
                Some(sample_rate as f32 / offset as f32)
            }
            _ => None,
        }
    }
}

// ============================================================================
// TUNING STATE
// ============================================================================

/// One tuner reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningState {
    pub detected_frequency_hz: f64,
    pub nearest_pitch_class: PitchClass,
    /// Scientific octave number (A4 is octave 4)
    pub octave: i32,
    /// Unclamped cents relative to the pitch class in the reference octave
    pub offset_cents: f64,
}

impl TuningState {
    pub fn from_frequency(frequency: f64, reference_a4: f64) -> Self {
        let half_steps = half_steps_from_c0(frequency, reference_a4);
        let nearest_pitch_class = PitchClass::from_index(half_steps);
        Self {
            detected_frequency_hz: frequency,
            nearest_pitch_class,
            octave: half_steps.div_euclid(12) as i32,
            offset_cents: cents_off(frequency, nearest_pitch_class, reference_a4),
        }
    }

    /// Needle position for display: half the offset, within ±50
    pub fn display_offset(&self) -> f64 {
        (self.offset_cents / 2.0).clamp(-50.0, 50.0)
    }

    /// Note name with octave, e.g. `A4`
    pub fn note_label(&self) -> String {
        format!("{}{}", self.nearest_pitch_class, self.octave)
    }
}
