//! Feedback delay, shared by the `delay` and `flanger` effects

use super::{blend, params, Effect, Result};

/// Circular buffer with fractional, linearly interpolated reads
pub struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    /// A line able to hold `max_samples` of history
    pub fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(4)],
            write: 0,
        }
    }

    /// Longest usable delay in samples
    pub fn capacity(&self) -> f32 {
        (self.buffer.len() - 2) as f32
    }

    /// Sample written `delay` samples ago (1.0 = previous sample)
    #[inline]
    pub fn read(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1.0, self.capacity());
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;

        let a = self.buffer[(self.write + len - whole) % len];
        let b = self.buffer[(self.write + len - whole - 1) % len];
        a + (b - a) * frac
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write] = sample;
        self.write = (self.write + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

/// Stereo feedback delay
///
/// `delayTime` (seconds), `feedback` and `wet` are all live parameters.
pub struct FeedbackDelay {
    name: &'static str,
    bypass: bool,
    sample_rate: f32,
    min_delay: f32,
    max_delay: f32,
    delay_time: f32,
    feedback: f32,
    wet: f32,
    lines: [DelayLine; 2],
}

impl FeedbackDelay {
    /// Echo delay, 10 ms to 1 s
    pub fn echo(sample_rate: u32, delay_time: f32, feedback: f32, wet: f32) -> Self {
        Self::build(
            "Delay",
            sample_rate,
            (params::DELAY_MIN, params::DELAY_MAX),
            delay_time,
            feedback,
            wet,
        )
    }

    /// Short comb delay, 1 ms to 20 ms
    pub fn flanger(sample_rate: u32, delay_time: f32, feedback: f32, wet: f32) -> Self {
        Self::build(
            "Flanger",
            sample_rate,
            (params::FLANGER_DELAY_MIN, params::FLANGER_DELAY_MAX),
            delay_time,
            feedback,
            wet,
        )
    }

    fn build(
        name: &'static str,
        sample_rate: u32,
        (min_delay, max_delay): (f32, f32),
        delay_time: f32,
        feedback: f32,
        wet: f32,
    ) -> Self {
        let sr = sample_rate as f32;
        let max_samples = (max_delay * sr).ceil() as usize + 4;

        Self {
            name,
            bypass: false,
            sample_rate: sr,
            min_delay,
            max_delay,
            delay_time: delay_time.clamp(min_delay, max_delay),
            feedback: feedback.clamp(0.0, params::FEEDBACK_MAX),
            wet: wet.clamp(0.0, 1.0),
            lines: [DelayLine::new(max_samples), DelayLine::new(max_samples)],
        }
    }

    pub fn delay_time(&self) -> f32 {
        self.delay_time
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }
}

impl Effect for FeedbackDelay {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        let delay = self.delay_time * self.sample_rate;
        for frame in buffer.chunks_exact_mut(2) {
            for (sample, line) in frame.iter_mut().zip(self.lines.iter_mut()) {
                let delayed = line.read(delay);
                line.write(*sample + delayed * self.feedback);
                *sample = blend(*sample, delayed, self.wet);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::clear);
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
        self.name
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "delayTime" => self.delay_time = value.clamp(self.min_delay, self.max_delay),
            "feedback" => self.feedback = value.clamp(0.0, params::FEEDBACK_MAX),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::tests::SAMPLE_RATE;

    fn impulse(frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * 2];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        buffer
    }

    #[test]
    fn test_delay_line_integer_read() {
        let mut line = DelayLine::new(16);
        for i in 0..5 {
            line.write(i as f32);
        }
        assert_eq!(line.read(1.0), 4.0);
        assert_eq!(line.read(3.0), 2.0);
        assert!((line.read(1.5) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_echo_repeats_after_delay_time() {
        let mut delay = FeedbackDelay::echo(SAMPLE_RATE, 0.01, 0.5, 1.0);
        let mut buffer = impulse(2000);
        delay.process(&mut buffer).unwrap();

        let echo_frame = (0.01 * SAMPLE_RATE as f32).round() as usize;
        assert!(buffer[0].abs() < 1e-6);
        assert!((buffer[echo_frame * 2] - 1.0).abs() < 1e-3);
        // Second repeat at half level from feedback
        assert!((buffer[echo_frame * 4] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_dry_mix_passes_input() {
        let mut delay = FeedbackDelay::echo(SAMPLE_RATE, 0.25, 0.5, 0.0);
        let mut buffer = impulse(16);
        delay.process(&mut buffer).unwrap();
        assert_eq!(buffer[0], 1.0);
    }

    #[test]
    fn test_parameters_clamp() {
        let mut flanger = FeedbackDelay::flanger(SAMPLE_RATE, 0.5, 2.0, 1.0);
        assert_eq!(flanger.delay_time(), params::FLANGER_DELAY_MAX);
        assert_eq!(flanger.feedback(), params::FEEDBACK_MAX);
        assert_eq!(flanger.name(), "Flanger");

        assert!(flanger.set_param("delayTime", 0.0));
        assert_eq!(flanger.delay_time(), params::FLANGER_DELAY_MIN);
        assert!(!flanger.set_param("rate", 1.0));
    }
}
