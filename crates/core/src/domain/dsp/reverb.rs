//! Freeverb-style reverb
//!
//! Eight parallel lowpass-feedback combs into four series allpasses per
//! channel. Comb feedback is derived from the decay time (RT60) when the
//! reverb is built, so `decay` cannot change on a running instance.

use super::{blend, params, Effect, Result};

/// Comb filter delay times in samples at 44.1kHz
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delay times in samples at 44.1kHz
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Right channel offset in samples
const STEREO_SPREAD: usize = 23;

const INPUT_GAIN: f32 = 0.015;
const WET_SCALE: f32 = 3.0;
const DAMPING: f32 = 0.2;
const MAX_FEEDBACK: f32 = 0.98;

struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    filter_store: f32,
}

impl Comb {
    fn new(size: usize, feedback: f32) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - DAMPING) + self.filter_store * DAMPING;
        self.buffer[self.index] = input + self.filter_store * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// One channel of the reverb tank
struct Tank {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Tank {
    fn new(sample_rate: f32, decay: f32, spread: usize) -> Self {
        let scale = sample_rate / 44100.0;
        let combs = COMB_TUNINGS
            .iter()
            .map(|&tuning| {
                let size = (tuning as f32 * scale) as usize + spread;
                // Feedback that reaches -60dB after `decay` seconds
                let feedback = 0.001_f32
                    .powf(size as f32 / (decay * sample_rate))
                    .min(MAX_FEEDBACK);
                Comb::new(size, feedback)
            })
            .collect();
        let allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|&tuning| Allpass::new((tuning as f32 * scale) as usize + spread))
            .collect();

        Self { combs, allpasses }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let input = input * INPUT_GAIN;
        let mut out: f32 = self.combs.iter_mut().map(|comb| comb.process(input)).sum();
        for allpass in self.allpasses.iter_mut() {
            out = allpass.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::reset);
        self.allpasses.iter_mut().for_each(Allpass::reset);
    }
}

/// Stereo reverb with a construction-time decay
pub struct Reverb {
    bypass: bool,
    decay: f32,
    wet: f32,
    left: Tank,
    right: Tank,
}

impl Reverb {
    pub fn new(sample_rate: u32, decay: f32, wet: f32) -> Self {
        let sr = sample_rate as f32;
        let decay = decay.clamp(params::DECAY_MIN, params::DECAY_MAX);
        let spread = (STEREO_SPREAD as f32 * sr / 44100.0) as usize;

        Self {
            bypass: false,
            decay,
            wet: wet.clamp(0.0, 1.0),
            left: Tank::new(sr, decay, 0),
            right: Tank::new(sr, decay, spread),
        }
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        for frame in buffer.chunks_exact_mut(2) {
            let mono = (frame[0] + frame[1]) * 0.5;
            let wet_l = self.left.process(mono) * WET_SCALE;
            let wet_r = self.right.process(mono) * WET_SCALE;
            frame[0] = blend(frame[0], wet_l, self.wet);
            frame[1] = blend(frame[1], wet_r, self.wet);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
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
        "Reverb"
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "wet" => {
                self.wet = value.clamp(0.0, 1.0);
                true
            }
            // decay shapes the comb feedback and is fixed at construction
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::tests::{peak, SAMPLE_RATE};

    fn tail_energy(decay: f32) -> f32 {
        let mut reverb = Reverb::new(SAMPLE_RATE, decay, 1.0);
        let mut buffer = vec![0.0; 44100 * 2];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        reverb.process(&mut buffer).unwrap();
        buffer[44100..].iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_longer_decay_rings_longer() {
        assert!(tail_energy(5.0) > tail_energy(0.2) * 10.0);
    }

    #[test]
    fn test_decay_is_construction_only() {
        let mut reverb = Reverb::new(SAMPLE_RATE, 3.0, 0.5);
        assert!(!reverb.set_param("decay", 8.0));
        assert_eq!(reverb.decay(), 3.0);
        assert!(reverb.set_param("wet", 0.2));
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = Reverb::new(SAMPLE_RATE, 3.0, 1.0);
        let mut buffer = vec![0.5; 4096];
        reverb.process(&mut buffer).unwrap();
        reverb.reset();

        let mut silence = vec![0.0; 4096];
        reverb.process(&mut silence).unwrap();
        assert_eq!(peak(&silence), 0.0);
    }

    #[test]
    fn test_output_is_stable() {
        let mut reverb = Reverb::new(SAMPLE_RATE, 10.0, 1.0);
        let mut buffer = vec![0.9; 44100 * 2];
        reverb.process(&mut buffer).unwrap();
        assert!(buffer.iter().all(|s| s.is_finite()));
        assert!(peak(&buffer) < 20.0);
    }
}
