//! LFO-swept allpass phaser

use super::{blend, params, Effect, Result};
use std::f32::consts::{PI, TAU};

const STAGES: usize = 4;

/// First-order allpass section in transposed form
#[derive(Debug, Clone, Copy, Default)]
struct AllpassStage {
    state: f32,
}

impl AllpassStage {
    #[inline]
    fn process(&mut self, x: f32, coeff: f32) -> f32 {
        let y = coeff * x + self.state;
        self.state = x - coeff * y;
        y
    }
}

/// Stereo phaser; the right channel's LFO runs half a cycle behind
pub struct Phaser {
    bypass: bool,
    sample_rate: f32,
    rate_hz: f32,
    octaves: f32,
    base_frequency: f32,
    wet: f32,
    lfo_phase: f32,
    stages: [[AllpassStage; STAGES]; 2],
}

impl Phaser {
    pub fn new(sample_rate: u32, rate_hz: f32, octaves: f32, base_frequency: f32, wet: f32) -> Self {
        Self {
            bypass: false,
            sample_rate: sample_rate as f32,
            rate_hz: rate_hz.clamp(params::LFO_MIN, params::LFO_MAX),
            octaves: octaves.clamp(params::OCTAVES_MIN, params::OCTAVES_MAX),
            base_frequency: base_frequency.clamp(params::BASE_FREQ_MIN, params::BASE_FREQ_MAX),
            wet: wet.clamp(0.0, 1.0),
            lfo_phase: 0.0,
            stages: [[AllpassStage::default(); STAGES]; 2],
        }
    }

    /// Allpass coefficient for an LFO value in [-1, 1]
    #[inline]
    fn coefficient(&self, lfo: f32) -> f32 {
        let sweep = self.base_frequency * 2.0_f32.powf(self.octaves * (lfo + 1.0) * 0.5);
        let freq = sweep.min(self.sample_rate * 0.45);
        let t = (PI * freq / self.sample_rate).tan();
        (t - 1.0) / (t + 1.0)
    }

    pub fn rate(&self) -> f32 {
        self.rate_hz
    }
}

impl Effect for Phaser {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        let increment = TAU * self.rate_hz / self.sample_rate;
        for frame in buffer.chunks_exact_mut(2) {
            let coeffs = [
                self.coefficient(self.lfo_phase.sin()),
                self.coefficient((self.lfo_phase + PI).sin()),
            ];

            for (ch, sample) in frame.iter_mut().enumerate() {
                let mut phased = *sample;
                for stage in self.stages[ch].iter_mut() {
                    phased = stage.process(phased, coeffs[ch]);
                }
                *sample = blend(*sample, (*sample + phased) * 0.5, self.wet);
            }

            self.lfo_phase = (self.lfo_phase + increment) % TAU;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.stages = [[AllpassStage::default(); STAGES]; 2];
        self.lfo_phase = 0.0;
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
        "Phaser"
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "frequency" => self.rate_hz = value.clamp(params::LFO_MIN, params::LFO_MAX),
            "octaves" => self.octaves = value.clamp(params::OCTAVES_MIN, params::OCTAVES_MAX),
            "baseFrequency" => {
                self.base_frequency = value.clamp(params::BASE_FREQ_MIN, params::BASE_FREQ_MAX)
            }
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::tests::{generate_test_signal, peak, SAMPLE_RATE};

    #[test]
    fn test_allpass_preserves_dc() {
        let mut stage = AllpassStage::default();
        let mut y = 0.0;
        for _ in 0..10_000 {
            y = stage.process(1.0, -0.5);
        }
        assert!((y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_phaser_notches_reduce_level() {
        let mut phaser = Phaser::new(SAMPLE_RATE, 0.5, 3.0, 350.0, 1.0);
        let mut signal = generate_test_signal(SAMPLE_RATE as usize, 1000.0);
        phaser.process(&mut signal).unwrap();

        assert!(signal.iter().all(|s| s.is_finite()));
        assert!(peak(&signal) < 1.2);
        // The left sweep passes a notch over the tone at some point
        let left: Vec<f32> = signal.iter().step_by(2).copied().collect();
        let min_block_peak = left
            .chunks(1024)
            .map(peak)
            .fold(f32::MAX, f32::min);
        assert!(min_block_peak < 0.5);
    }

    #[test]
    fn test_live_params() {
        let mut phaser = Phaser::new(SAMPLE_RATE, 0.5, 3.0, 350.0, 1.0);
        assert!(phaser.set_param("frequency", 100.0));
        assert_eq!(phaser.rate(), params::LFO_MAX);
        assert!(phaser.set_param("baseFrequency", 500.0));
        assert!(!phaser.set_param("Q", 10.0));
    }
}
