//! Built-in graph nodes
//!
//! - `SourceNode`: feeds an [`InputSource`] into the graph (mono upmixed to stereo)
//! - `EffectNode`: runs a DSP [`Effect`] in place
//! - `GainNode` / `PanNode`: the master stage
//! - `AnalyserNode`: non-consuming tap backing [`AnalysisTap`]
//! - `DestinationNode`: the context's final sink

use crate::domain::audio::Result;
use crate::domain::dsp::Effect;
use crate::domain::graph::{AudioNode, ProcessContext, CHANNELS};
use crate::domain::source::InputSource;
use std::f32::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

// ============================================================================
// SOURCE
// ============================================================================

/// Graph node pulling mono audio from an input source
pub struct SourceNode {
    source: Box<dyn InputSource>,
    scratch: Vec<f32>,
    closed: bool,
}

impl SourceNode {
    pub fn new(source: Box<dyn InputSource>) -> Self {
        Self {
            source,
            scratch: Vec::new(),
            closed: false,
        }
    }
}

impl AudioNode for SourceNode {
    fn process(&mut self, _ctx: &ProcessContext, _input: &[f32], output: &mut [f32]) {
        let frames = output.len() / CHANNELS;
        if self.closed {
            output.fill(0.0);
            return;
        }

        self.scratch.resize(frames, 0.0);
        let read = self.source.read(&mut self.scratch[..frames]).min(frames);
        self.scratch[read..frames].fill(0.0);

        for (frame, sample) in output.chunks_exact_mut(CHANNELS).zip(&self.scratch) {
            frame.fill(*sample);
        }
    }

    fn dispose(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Closing input source {:?}", self.source.device_id());
        self.source.close()
    }

    fn name(&self) -> &str {
        "source"
    }
}

// ============================================================================
// EFFECT
// ============================================================================

/// Graph node wrapping a DSP effect
pub struct EffectNode {
    effect: Box<dyn Effect>,
}

impl EffectNode {
    pub fn new(effect: Box<dyn Effect>) -> Self {
        Self { effect }
    }
}

impl AudioNode for EffectNode {
    fn process(&mut self, _ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(input);
        if let Err(e) = self.effect.process(output) {
            trace!("{} failed to process block: {}", self.effect.name(), e);
            output.copy_from_slice(input);
        }
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        self.effect.set_param(id, value)
    }

    fn dispose(&mut self) -> Result<()> {
        self.effect.reset();
        Ok(())
    }

    fn name(&self) -> &str {
        self.effect.name()
    }
}

// ============================================================================
// MASTER STAGE
// ============================================================================

/// Linear gain stage (master volume)
pub struct GainNode {
    gain: f32,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: gain.max(0.0),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl AudioNode for GainNode {
    fn process(&mut self, _ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        for (out, sample) in output.iter_mut().zip(input) {
            *out = sample * self.gain;
        }
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "gain" => {
                self.gain = value.max(0.0);
                true
            }
            _ => false,
        }
    }

    fn name(&self) -> &str {
        "master volume"
    }
}

/// Stereo panner using the equal-power law for stereo input
pub struct PanNode {
    pan: f32,
}

impl PanNode {
    pub fn new(pan: f32) -> Self {
        Self {
            pan: pan.clamp(-1.0, 1.0),
        }
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }
}

impl AudioNode for PanNode {
    fn process(&mut self, _ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        let pan = self.pan;
        let x = if pan <= 0.0 { pan + 1.0 } else { pan };
        let gain_l = (x * FRAC_PI_2).cos();
        let gain_r = (x * FRAC_PI_2).sin();

        for (out, frame) in output
            .chunks_exact_mut(CHANNELS)
            .zip(input.chunks_exact(CHANNELS))
        {
            let (l, r) = (frame[0], frame[1]);
            if pan <= 0.0 {
                out[0] = l + r * gain_l;
                out[1] = r * gain_r;
            } else {
                out[0] = l * gain_l;
                out[1] = r + l * gain_r;
            }
        }
    }

    fn set_param(&mut self, id: &str, value: f32) -> bool {
        match id {
            "pan" => {
                self.pan = value.clamp(-1.0, 1.0);
                true
            }
            _ => false,
        }
    }

    fn name(&self) -> &str {
        "master pan"
    }
}

/// Final sink of the context; output is what reaches the speakers
pub struct DestinationNode;

impl AudioNode for DestinationNode {
    fn process(&mut self, _ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(input);
    }

    fn name(&self) -> &str {
        "destination"
    }
}

// ============================================================================
// ANALYSIS TAP
// ============================================================================

/// Rolling window of the most recent mono samples
struct TapBuffer {
    samples: Vec<f32>,
    write_pos: usize,
}

impl TapBuffer {
    fn new(size: usize) -> Self {
        Self {
            samples: vec![0.0; size.max(1)],
            write_pos: 0,
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
    }
}

/// Read-only handle to the analysis window of an [`AnalyserNode`]
#[derive(Clone)]
pub struct AnalysisTap {
    buffer: Arc<Mutex<TapBuffer>>,
}

impl AnalysisTap {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(TapBuffer::new(size))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TapBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Window length in samples
    pub fn size(&self) -> usize {
        self.lock().samples.len()
    }

    /// Copy the latest samples, oldest first. Extra space in `out` is zeroed.
    pub fn time_domain(&self, out: &mut [f32]) {
        let tap = self.lock();
        let size = tap.samples.len();
        let n = out.len().min(size);
        let start = tap.write_pos + size - n;

        for (k, slot) in out[..n].iter_mut().enumerate() {
            *slot = tap.samples[(start + k) % size];
        }
        out[n..].fill(0.0);
    }

    /// RMS level of the whole window
    pub fn rms(&self) -> f32 {
        let tap = self.lock();
        let sum: f32 = tap.samples.iter().map(|s| s * s).sum();
        (sum / tap.samples.len() as f32).sqrt()
    }

    /// VU meter reading in percent
    pub fn level_percent(&self) -> f32 {
        (self.rms() * 200.0).clamp(0.0, 100.0)
    }
}

/// Pass-through node recording its input into an [`AnalysisTap`]
pub struct AnalyserNode {
    tap: AnalysisTap,
}

impl AnalyserNode {
    pub fn new(size: usize) -> Self {
        Self {
            tap: AnalysisTap::new(size),
        }
    }

    pub fn tap(&self) -> AnalysisTap {
        self.tap.clone()
    }
}

impl AudioNode for AnalyserNode {
    fn process(&mut self, _ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        let mut tap = self.tap.lock();
        for frame in input.chunks_exact(CHANNELS) {
            tap.push((frame[0] + frame[1]) * 0.5);
        }
        drop(tap);
        output.copy_from_slice(input);
    }

    fn name(&self) -> &str {
        "analyser"
    }
}
