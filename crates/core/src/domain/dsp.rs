//! Digital Signal Processing effects for the guitar signal chain
//!
//! This module provides the effect processors behind every catalogue entry:
//! - 3-band equalizer (biquad-based IIR filters)
//! - Dynamic compressor
//! - Feedback delay and flanger (`delay`)
//! - Freeverb-style reverb (`reverb`)
//! - Waveshaping distortion, fuzz and overdrive (`drive`)
//! - Phaser (`modulation`)
//! - Granular pitch shifter (`pitch_shift`)
//!
//! All effects process interleaved stereo in place and never allocate in
//! the hot path.

pub mod delay;
pub mod drive;
pub mod modulation;
pub mod pitch_shift;
pub mod reverb;

pub use delay::FeedbackDelay;
pub use drive::Distortion;
pub use modulation::Phaser;
pub use pitch_shift::PitchShift;
pub use reverb::Reverb;

use crate::domain::audio::AudioError;
use std::f32::consts::PI;
use tracing::trace;

pub type Result<T> = std::result::Result<T, AudioError>;

/// Core trait for all audio effects
///
/// All effects process audio in-place on interleaved stereo f32 buffers
/// normalized to [-1.0, 1.0].
pub trait Effect: Send + Sync {
    /// Process a buffer of audio samples in-place
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Reset effect state to initial conditions
    fn reset(&mut self);

    /// Check if effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Toggle bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;

    /// Change a parameter while running.
    ///
    /// Returns `false` for unknown parameters and for parameters that only
    /// take effect when the processor is constructed.
    fn set_param(&mut self, id: &str, value: f32) -> bool;
}

/// Parameter constraints for DSP effects
///
/// These double as the slider bounds of the effect catalogue.
pub mod params {
    /// Equalizer band gain (dB)
    pub const EQ_GAIN_MIN: f32 = -20.0;
    pub const EQ_GAIN_MAX: f32 = 20.0;

    /// Compressor threshold (dB)
    pub const THRESHOLD_MIN: f32 = -60.0;
    pub const THRESHOLD_MAX: f32 = 0.0;

    /// Compressor ratio range (1:1 to 20:1)
    pub const RATIO_MIN: f32 = 1.0;
    pub const RATIO_MAX: f32 = 20.0;

    /// Attack/Release time ranges in seconds
    pub const ATTACK_MIN: f32 = 0.001;
    pub const ATTACK_MAX: f32 = 1.0;
    pub const RELEASE_MIN: f32 = 0.01;
    pub const RELEASE_MAX: f32 = 1.0;

    /// Delay line times in seconds
    pub const DELAY_MIN: f32 = 0.01;
    pub const DELAY_MAX: f32 = 1.0;
    pub const FLANGER_DELAY_MIN: f32 = 0.001;
    pub const FLANGER_DELAY_MAX: f32 = 0.02;
    pub const FEEDBACK_MAX: f32 = 0.99;

    /// Reverb decay in seconds
    pub const DECAY_MIN: f32 = 0.1;
    pub const DECAY_MAX: f32 = 10.0;

    /// Pitch shift in semitones and grain window in seconds
    pub const PITCH_MIN: f32 = -12.0;
    pub const PITCH_MAX: f32 = 12.0;
    pub const WINDOW_MIN: f32 = 0.01;
    pub const WINDOW_MAX: f32 = 0.5;

    /// Phaser LFO rate (Hz), sweep width (octaves) and base frequency (Hz)
    pub const LFO_MIN: f32 = 0.1;
    pub const LFO_MAX: f32 = 10.0;
    pub const OCTAVES_MIN: f32 = 1.0;
    pub const OCTAVES_MAX: f32 = 6.0;
    pub const BASE_FREQ_MIN: f32 = 50.0;
    pub const BASE_FREQ_MAX: f32 = 1000.0;

    /// EQ crossover points (Hz)
    pub const FREQ_LOW_SHELF: f32 = 400.0;
    pub const FREQ_HIGH_SHELF: f32 = 2500.0;
}

/// Crossfade between the dry and processed signal
#[inline]
pub(crate) fn blend(dry: f32, wet: f32, amount: f32) -> f32 {
    dry * (1.0 - amount) + wet * amount
}

// ============================================================================
// BIQUAD FILTER (Low-level IIR filter for EQ)
// ============================================================================

/// Biquad filter coefficients, normalized so that a0 = 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Intermediate RBJ cookbook terms shared by every filter shape
struct Cookbook {
    a: f32,
    cos_w0: f32,
    alpha: f32,
}

impl Cookbook {
    fn new(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        let freq = freq.clamp(10.0, sample_rate * 0.49);
        let w0 = 2.0 * PI * freq / sample_rate;
        Self {
            a: 10.0_f32.powf(gain_db / 40.0),
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q.max(0.01)),
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b: [f32; 3], a: [f32; 3]) -> Self {
        Self {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
        }
    }

    /// Low shelf: boosts or cuts frequencies below `freq`
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let Cookbook { a, cos_w0, alpha } = Cookbook::new(sample_rate, freq, gain_db, q);
        let sq = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            [
                a * ((a + 1.0) - (a - 1.0) * cos_w0 + sq),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                a * ((a + 1.0) - (a - 1.0) * cos_w0 - sq),
            ],
            [
                (a + 1.0) + (a - 1.0) * cos_w0 + sq,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                (a + 1.0) + (a - 1.0) * cos_w0 - sq,
            ],
        )
    }

    /// High shelf: boosts or cuts frequencies above `freq`
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let Cookbook { a, cos_w0, alpha } = Cookbook::new(sample_rate, freq, gain_db, q);
        let sq = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            [
                a * ((a + 1.0) + (a - 1.0) * cos_w0 + sq),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                a * ((a + 1.0) + (a - 1.0) * cos_w0 - sq),
            ],
            [
                (a + 1.0) - (a - 1.0) * cos_w0 + sq,
                2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                (a + 1.0) - (a - 1.0) * cos_w0 - sq,
            ],
        )
    }

    /// Peaking band around `freq`
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let Cookbook { a, cos_w0, alpha } = Cookbook::new(sample_rate, freq, gain_db, q);

        Self::normalized(
            [1.0 + alpha * a, -2.0 * cos_w0, 1.0 - alpha * a],
            [1.0 + alpha / a, -2.0 * cos_w0, 1.0 - alpha / a],
        )
    }
}

/// Stateful biquad filter using Direct Form I
#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Update filter coefficients; safe to call while running
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// 3-BAND EQUALIZER
// ============================================================================

/// Three-band equalizer with fixed crossovers
///
/// - Low shelf below 400 Hz
/// - Mid peaking band centred between the crossovers
/// - High shelf above 2.5 kHz
pub struct Equalizer {
    bypass: bool,
    sample_rate: f32,
    // [low, mid, high] per channel
    left: [BiquadFilter; 3],
    right: [BiquadFilter; 3],
    low_db: f32,
    mid_db: f32,
    high_db: f32,
}

impl Equalizer {
    pub fn new(sample_rate: u32, low_db: f32, mid_db: f32, high_db: f32) -> Self {
        let unity = BiquadFilter::new(BiquadCoeffs::default());
        let mut eq = Self {
            bypass: false,
            sample_rate: sample_rate as f32,
            left: [unity.clone(), unity.clone(), unity.clone()],
            right: [unity.clone(), unity.clone(), unity],
            low_db: 0.0,
            mid_db: 0.0,
            high_db: 0.0,
        };
        eq.set_gains(low_db, mid_db, high_db);
        eq
    }

    pub fn set_gains(&mut self, low_db: f32, mid_db: f32, high_db: f32) {
        self.low_db = low_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.mid_db = mid_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.high_db = high_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.update_coefficients();
    }

    pub fn gains(&self) -> (f32, f32, f32) {
        (self.low_db, self.mid_db, self.high_db)
    }

    fn update_coefficients(&mut self) {
        let sr = self.sample_rate;
        let mid_freq = (params::FREQ_LOW_SHELF * params::FREQ_HIGH_SHELF).sqrt();
        let bands = [
            BiquadCoeffs::low_shelf(sr, params::FREQ_LOW_SHELF, self.low_db, 0.707),
            BiquadCoeffs::peaking(sr, mid_freq, self.mid_db, 0.5),
            BiquadCoeffs::high_shelf(sr, params::FREQ_HIGH_SHELF, self.high_db, 0.707),
        ];

        for (i, coeffs) in bands.into_iter().enumerate() {
            self.left[i].set_coeffs(coeffs);
            self.right[i].set_coeffs(coeffs);
        }

        trace!(
            "EQ updated: L={:.1}dB, M={:.1}dB, H={:.1}dB",
            self.low_db,
            self.mid_db,
            self.high_db
        );
    }
}

impl Effect for Equalizer {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        for frame in buffer.chunks_exact_mut(2) {
            for filter in self.left.iter_mut() {
                frame[0] = filter.process_sample(frame[0]);
            }
            for filter in self.right.iter_mut() {
                frame[1] = filter.process_sample(frame[1]);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.left.iter_mut().chain(self.right.iter_mut()).for_each(BiquadFilter::reset);
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "Equalizer"
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        let (low, mid, high) = self.gains();
        match id {
            "low" => self.set_gains(value, mid, high),
            "mid" => self.set_gains(low, value, high),
            "high" => self.set_gains(low, mid, value),
            _ => return false,
        }
        true
    }
}

// ============================================================================
// DYNAMIC RANGE COMPRESSOR
// ============================================================================

/// Dynamic range compressor with a peak envelope follower per channel
pub struct Compressor {
    bypass: bool,
    sample_rate: f32,
    threshold_db: f32,
    ratio: f32,
    attack_sec: f32,
    release_sec: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: [f32; 2],
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let mut comp = Self {
            bypass: false,
            sample_rate: sample_rate as f32,
            threshold_db: -24.0,
            ratio: 12.0,
            attack_sec: 0.003,
            release_sec: 0.25,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: [0.0; 2],
        };
        comp.update_coefficients();
        comp
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db.clamp(params::THRESHOLD_MIN, params::THRESHOLD_MAX);
    }

    /// 1:1 = no compression, 20:1 = limiting
    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(params::RATIO_MIN, params::RATIO_MAX);
    }

    pub fn set_attack(&mut self, attack_sec: f32) {
        self.attack_sec = attack_sec.clamp(params::ATTACK_MIN, params::ATTACK_MAX);
        self.update_coefficients();
    }

    pub fn set_release(&mut self, release_sec: f32) {
        self.release_sec = release_sec.clamp(params::RELEASE_MIN, params::RELEASE_MAX);
        self.update_coefficients();
    }

    pub fn threshold(&self) -> f32 {
        self.threshold_db
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    fn update_coefficients(&mut self) {
        // exp(-1/(t*sr)) gives a one-pole smoother with time constant t
        self.attack_coeff = (-1.0 / (self.attack_sec * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (self.release_sec * self.sample_rate)).exp();
    }

    /// Linear gain to apply for an envelope level in dB
    #[inline]
    fn gain_for(&self, level_db: f32) -> f32 {
        if level_db <= self.threshold_db {
            return 1.0;
        }
        let reduction_db = (level_db - self.threshold_db) * (1.0 - 1.0 / self.ratio);
        10.0_f32.powf(-reduction_db / 20.0)
    }

    #[inline]
    fn follow(&self, sample: f32, envelope: f32) -> f32 {
        let level = sample.abs();
        let coeff = if level > envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        coeff * envelope + (1.0 - coeff) * level
    }

    #[inline]
    fn to_db(level: f32) -> f32 {
        if level < 1e-6 {
            -120.0
        } else {
            20.0 * level.log10()
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        for frame in buffer.chunks_exact_mut(2) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                self.envelope[ch] = self.follow(*sample, self.envelope[ch]);
                *sample *= self.gain_for(Self::to_db(self.envelope[ch]));
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.envelope = [0.0; 2];
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "Compressor"
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "threshold" => self.set_threshold(value),
            "ratio" => self.set_ratio(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            _ => return false,
        }
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_RATE: u32 = 44100;

    /// Interleaved stereo sine with identical channels
    pub(crate) fn generate_test_signal(frames: usize, frequency: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin();
                [s, s]
            })
            .collect()
    }

    pub(crate) fn generate_silence(frames: usize) -> Vec<f32> {
        vec![0.0; frames * 2]
    }

    pub(crate) fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    // -------------------------------------------------------------------------
    // Biquad Filter Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_biquad_unity() {
        let mut filter = BiquadFilter::new(BiquadCoeffs::default());
        let input = vec![0.5, 0.3, 0.7];
        let mut output = input.clone();
        filter.process(&mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_biquad_reset() {
        let coeffs = BiquadCoeffs::low_shelf(44100.0, 400.0, 6.0, 0.707);
        let mut filter = BiquadFilter::new(coeffs);

        let mut buffer = vec![0.5; 100];
        filter.process(&mut buffer);

        filter.reset();
        let mut silence = vec![0.0; 10];
        filter.process(&mut silence);
        assert!(silence.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn test_flat_shelves_are_transparent() {
        let coeffs = BiquadCoeffs::high_shelf(44100.0, 2500.0, 0.0, 0.707);
        assert!((coeffs.b0 - 1.0).abs() < 1e-5);
        assert!((coeffs.b1 - coeffs.a1).abs() < 1e-5);
        assert!((coeffs.b2 - coeffs.a2).abs() < 1e-5);
    }

    // -------------------------------------------------------------------------
    // Equalizer Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_equalizer_gain_clamping() {
        let mut eq = Equalizer::new(SAMPLE_RATE, 0.0, 0.0, 0.0);
        assert!(eq.set_param("low", 40.0));
        assert_eq!(eq.gains().0, params::EQ_GAIN_MAX);
        assert!(eq.set_param("high", -40.0));
        assert_eq!(eq.gains().2, params::EQ_GAIN_MIN);
        assert!(!eq.set_param("presence", 3.0));
    }

    #[test]
    fn test_equalizer_low_boost() {
        let mut eq = Equalizer::new(SAMPLE_RATE, 12.0, 0.0, 0.0);
        let mut signal = generate_test_signal(4096, 80.0);
        let original = peak(&signal);

        eq.process(&mut signal).unwrap();
        assert!(peak(&signal[4096..]) > original * 2.0);
    }

    #[test]
    fn test_equalizer_high_cut() {
        let mut eq = Equalizer::new(SAMPLE_RATE, 0.0, 0.0, -20.0);
        let mut signal = generate_test_signal(4096, 8000.0);

        eq.process(&mut signal).unwrap();
        assert!(peak(&signal[4096..]) < 0.3);
    }

    #[test]
    fn test_equalizer_bypass() {
        let mut eq = Equalizer::new(SAMPLE_RATE, 6.0, 6.0, 6.0);
        eq.set_bypass(true);
        let mut signal = generate_test_signal(64, 440.0);
        let original = signal.clone();
        eq.process(&mut signal).unwrap();
        assert_eq!(signal, original);
    }

    // -------------------------------------------------------------------------
    // Compressor Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_compressor_defaults() {
        let comp = Compressor::new(SAMPLE_RATE);
        assert_eq!(comp.name(), "Compressor");
        assert_eq!(comp.threshold(), -24.0);
        assert_eq!(comp.ratio(), 12.0);
    }

    #[test]
    fn test_compressor_reduction() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        let mut signal = vec![0.8; 2048];
        comp.process(&mut signal).unwrap();

        // Steady state: -1.9dB input sits ~22dB over threshold
        assert!(signal[2047] < 0.2);
    }

    #[test]
    fn test_compressor_leaves_quiet_signal() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        let mut signal = vec![0.01; 512];
        comp.process(&mut signal).unwrap();
        assert!(signal.iter().all(|s| (*s - 0.01).abs() < 1e-6));
    }

    #[test]
    fn test_compressor_param_limits() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        assert!(comp.set_param("threshold", -100.0));
        assert_eq!(comp.threshold(), params::THRESHOLD_MIN);
        assert!(comp.set_param("ratio", 50.0));
        assert_eq!(comp.ratio(), params::RATIO_MAX);
        assert!(!comp.set_param("knee", 30.0));
    }

    #[test]
    fn test_compressor_reset() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        let mut loud = vec![0.8; 512];
        comp.process(&mut loud).unwrap();
        comp.reset();

        let mut quiet = vec![0.01; 8];
        comp.process(&mut quiet).unwrap();
        assert!((quiet[0] - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        let mut eq = Equalizer::new(SAMPLE_RATE, 10.0, -5.0, 3.0);
        let mut buffer = generate_silence(256);
        comp.process(&mut buffer).unwrap();
        eq.process(&mut buffer).unwrap();
        assert_eq!(peak(&buffer), 0.0);
    }
}
