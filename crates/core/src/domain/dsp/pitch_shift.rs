//! Delay-line pitch shifter
//!
//! Two read taps sweep through a short window at a rate set by the pitch
//! ratio. Their gains follow complementary sine windows so one tap is
//! always silent when it wraps around.

use super::delay::DelayLine;
use super::{blend, params, Effect, Result};
use std::f32::consts::PI;

/// Stereo pitch shifter; `pitch`, `windowSize` and `wet` are live
pub struct PitchShift {
    bypass: bool,
    sample_rate: f32,
    semitones: f32,
    ratio: f32,
    window_secs: f32,
    wet: f32,
    phase: f32,
    lines: [DelayLine; 2],
}

impl PitchShift {
    pub fn new(sample_rate: u32, semitones: f32, window_secs: f32, wet: f32) -> Self {
        let sr = sample_rate as f32;
        let capacity = (params::WINDOW_MAX * sr).ceil() as usize + 8;
        let mut shifter = Self {
            bypass: false,
            sample_rate: sr,
            semitones: 0.0,
            ratio: 1.0,
            window_secs: window_secs.clamp(params::WINDOW_MIN, params::WINDOW_MAX),
            wet: wet.clamp(0.0, 1.0),
            phase: 0.0,
            lines: [DelayLine::new(capacity), DelayLine::new(capacity)],
        };
        shifter.set_semitones(semitones);
        shifter
    }

    pub fn set_semitones(&mut self, semitones: f32) {
        self.semitones = semitones.clamp(params::PITCH_MIN, params::PITCH_MAX);
        self.ratio = 2.0_f32.powf(self.semitones / 12.0);
    }

    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

impl Effect for PitchShift {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        let window = (self.window_secs * self.sample_rate).max(2.0);
        // A shrinking delay raises pitch
        let step = (1.0 - self.ratio) / window;

        for frame in buffer.chunks_exact_mut(2) {
            self.phase = (self.phase + step).rem_euclid(1.0);
            let other = (self.phase + 0.5) % 1.0;
            let gain_a = (PI * self.phase).sin();
            let gain_b = (PI * other).sin();

            for (sample, line) in frame.iter_mut().zip(self.lines.iter_mut()) {
                let shifted = line.read(self.phase * window + 1.0) * gain_a
                    + line.read(other * window + 1.0) * gain_b;
                line.write(*sample);
                *sample = blend(*sample, shifted, self.wet);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::clear);
        self.phase = 0.0;
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
        "Pitch Shifter"
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "pitch" => self.set_semitones(value),
            "windowSize" => self.window_secs = value.clamp(params::WINDOW_MIN, params::WINDOW_MAX),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::tests::{generate_test_signal, SAMPLE_RATE};

    /// Count rising zero crossings of the left channel
    fn rising_crossings(buffer: &[f32]) -> usize {
        let left: Vec<f32> = buffer.iter().step_by(2).copied().collect();
        left.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count()
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let mut shifter = PitchShift::new(SAMPLE_RATE, 12.0, 0.1, 1.0);
        assert!((shifter.ratio() - 2.0).abs() < 1e-5);

        let frames = SAMPLE_RATE as usize;
        let mut signal = generate_test_signal(frames, 220.0);
        shifter.process(&mut signal).unwrap();

        // Skip the first window while the delay line fills
        let crossings = rising_crossings(&signal[8820..]);
        let seconds = (frames - 4410) as f32 / SAMPLE_RATE as f32;
        let measured = crossings as f32 / seconds;
        assert!((measured - 440.0).abs() < 40.0, "measured {}", measured);
    }

    #[test]
    fn test_unison_is_a_plain_delay() {
        let mut shifter = PitchShift::new(SAMPLE_RATE, 0.0, 0.1, 1.0);
        let frames = SAMPLE_RATE as usize / 2;
        let mut signal = generate_test_signal(frames, 330.0);
        shifter.process(&mut signal).unwrap();

        let crossings = rising_crossings(&signal[SAMPLE_RATE as usize / 5..]);
        let seconds = (frames - SAMPLE_RATE as usize / 10) as f32 / SAMPLE_RATE as f32;
        assert!((crossings as f32 / seconds - 330.0).abs() < 10.0);
    }

    #[test]
    fn test_params_clamp() {
        let mut shifter = PitchShift::new(SAMPLE_RATE, 30.0, 1.0, 1.0);
        assert_eq!(shifter.semitones(), params::PITCH_MAX);
        assert!(shifter.set_param("pitch", -30.0));
        assert_eq!(shifter.semitones(), params::PITCH_MIN);
        assert!(shifter.set_param("windowSize", 0.2));
        assert!(!shifter.set_param("delayTime", 0.2));
    }
}
