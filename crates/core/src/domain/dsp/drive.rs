//! Waveshaping distortion
//!
//! One transfer curve serves three catalogue entries that differ only in
//! their default amount and range: `distortion`, `fuzz` and `overdrive`.

use super::{blend, Effect, Result};
use std::f32::consts::PI;

const DEG: f32 = PI / 180.0;

/// Static waveshaper with a wet/dry mix
pub struct Distortion {
    name: &'static str,
    bypass: bool,
    amount: f32,
    max_amount: f32,
    k: f32,
    wet: f32,
}

impl Distortion {
    pub fn new(name: &'static str, amount: f32, max_amount: f32, wet: f32) -> Self {
        let mut drive = Self {
            name,
            bypass: false,
            amount: 0.0,
            max_amount,
            k: 0.0,
            wet: wet.clamp(0.0, 1.0),
        };
        drive.set_amount(amount);
        drive
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(0.0, self.max_amount);
        self.k = self.amount * 100.0;
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    /// Transfer curve; input is clipped to [-1, 1] first
    #[inline]
    pub fn shape(&self, x: f32) -> f32 {
        let x = x.clamp(-1.0, 1.0);
        (3.0 + self.k) * x * 20.0 * DEG / (PI + self.k * x.abs())
    }
}

impl Effect for Distortion {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        for sample in buffer.iter_mut() {
            *sample = blend(*sample, self.shape(*sample), self.wet);
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        self.name
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "distortion" => self.set_amount(value),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_is_odd_and_bounded() {
        let drive = Distortion::new("Distortion", 0.8, 1.0, 1.0);
        for x in [0.1_f32, 0.5, 0.9, 1.0, 3.0] {
            assert!((drive.shape(x) + drive.shape(-x)).abs() < 1e-6);
            assert!(drive.shape(x).abs() <= 1.0 + 1e-4);
        }
        assert_eq!(drive.shape(0.0), 0.0);
    }

    #[test]
    fn test_more_drive_compresses_peaks() {
        let soft = Distortion::new("Overdrive", 0.1, 2.0, 1.0);
        let hard = Distortion::new("Fuzz", 2.0, 10.0, 1.0);

        // Ratio of a quiet to a loud sample grows with drive
        let soft_ratio = soft.shape(0.1) / soft.shape(1.0);
        let hard_ratio = hard.shape(0.1) / hard.shape(1.0);
        assert!(hard_ratio > soft_ratio);
    }

    #[test]
    fn test_amount_clamped_to_range() {
        let mut drive = Distortion::new("Overdrive", 5.0, 2.0, 1.0);
        assert_eq!(drive.amount(), 2.0);
        assert!(drive.set_param("distortion", -1.0));
        assert_eq!(drive.amount(), 0.0);
        assert!(!drive.set_param("oversample", 4.0));
    }

    #[test]
    fn test_dry_mix_is_identity() {
        let mut drive = Distortion::new("Distortion", 1.0, 1.0, 0.0);
        let mut buffer = vec![0.3, -0.7, 0.9, 0.0];
        let original = buffer.clone();
        drive.process(&mut buffer).unwrap();
        assert_eq!(buffer, original);
    }
}
