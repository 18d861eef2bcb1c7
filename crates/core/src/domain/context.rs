//! Audio context
//!
//! Process-wide rendering state shared by the signal chain, the tuner and
//! the metronome: the node graph with its fixed destination, the engine
//! clock, and the click voices scheduled by the metronome.
//!
//! Lifecycle is explicit: a context starts `Suspended`, is `resume`d on the
//! first user gesture, and is `close`d on teardown. Components receive a
//! [`ContextHandle`] rather than reaching for a global.

use crate::domain::audio::{AudioError, Result};
use crate::domain::graph::{AudioGraph, NodeId, ProcessContext, CHANNELS};
use crate::domain::metronome::{AudioClock, ClickEvent, ClickSink};
use crate::domain::nodes::DestinationNode;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Level a click decays to by the end of its ramp
const CLICK_FLOOR: f64 = 0.001;
/// Duration of the exponential decay ramp in seconds
const CLICK_RAMP_SECS: f64 = 0.02;

/// Lifecycle state of an [`AudioContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// A scheduled oscillator burst
#[derive(Debug, Clone, Copy)]
struct ClickVoice {
    start: f64,
    stop: f64,
    frequency: f64,
}

impl ClickVoice {
    fn from_event(event: &ClickEvent) -> Self {
        Self {
            start: event.time,
            stop: event.time + event.duration,
            frequency: event.frequency,
        }
    }

    /// Sample value at engine time `t`
    #[inline]
    fn sample_at(&self, t: f64) -> f32 {
        if t < self.start || t >= self.stop {
            return 0.0;
        }
        let elapsed = t - self.start;
        let envelope = CLICK_FLOOR.powf((elapsed / CLICK_RAMP_SECS).min(1.0));
        ((TAU * self.frequency * elapsed).sin() * envelope) as f32
    }
}

/// Owner of the render graph and the engine clock
pub struct AudioContext {
    state: ContextState,
    sample_rate: u32,
    frames_rendered: u64,
    graph: AudioGraph,
    destination: NodeId,
    clicks: Vec<ClickVoice>,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        let mut graph = AudioGraph::new();
        let destination = graph.add_node(Box::new(DestinationNode));

        Self {
            state: ContextState::Suspended,
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            graph,
            destination,
            clicks: Vec::new(),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ContextState::Running
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Engine clock in seconds; advances only while rendering
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Start (or restart) rendering
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(AudioError::AudioEngineUnavailable(
                "audio context is closed".to_string(),
            )),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.state = ContextState::Running;
                info!("Audio context running at {}Hz", self.sample_rate);
                Ok(())
            }
        }
    }

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
            debug!("Audio context suspended");
        }
    }

    /// Tear down the graph, disposing every node. Idempotent.
    pub fn close(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }

        for id in self.graph.node_ids() {
            if let Err(e) = self.graph.remove_node(id) {
                warn!("Failed to dispose {} while closing context: {}", id, e);
            }
        }
        self.clicks.clear();
        self.state = ContextState::Closed;
        info!("Audio context closed");
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    /// The node whose input reaches the speakers
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Queue a click for rendering at its scheduled time
    pub fn schedule_click(&mut self, event: &ClickEvent) {
        if self.state == ContextState::Closed {
            return;
        }
        self.clicks.push(ClickVoice::from_event(event));
    }

    /// Number of clicks not yet fully rendered
    pub fn pending_clicks(&self) -> usize {
        self.clicks.len()
    }

    /// Render interleaved stereo into `out`.
    ///
    /// Produces silence without advancing the clock unless running.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.state != ContextState::Running {
            out.fill(0.0);
            return;
        }

        let frames = out.len() / CHANNELS;
        let start = self.current_time();
        let ctx = ProcessContext {
            sample_rate: self.sample_rate,
            time: start,
        };

        self.graph.render(&ctx, frames);
        match self.graph.output(self.destination) {
            Some(rendered) => {
                // A trailing partial frame is left silent
                let (head, tail) = out.split_at_mut(rendered.len());
                head.copy_from_slice(rendered);
                tail.fill(0.0);
            }
            None => out.fill(0.0),
        }

        if !self.clicks.is_empty() {
            let rate = self.sample_rate as f64;
            for (i, frame) in out.chunks_exact_mut(CHANNELS).enumerate() {
                let t = start + i as f64 / rate;
                let click: f32 = self.clicks.iter().map(|voice| voice.sample_at(t)).sum();
                for sample in frame.iter_mut() {
                    *sample += click;
                }
            }

            let end = start + frames as f64 / rate;
            self.clicks.retain(|voice| voice.stop > end);
        }

        self.frames_rendered += frames as u64;
    }
}

/// Cheaply cloneable shared reference to an [`AudioContext`]
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<Mutex<AudioContext>>,
}

impl ContextHandle {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AudioContext::new(sample_rate))),
        }
    }

    /// Lock the context. A poisoned lock is recovered, never propagated.
    pub fn lock(&self) -> MutexGuard<'_, AudioContext> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ContextState {
        self.lock().state()
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate()
    }

    pub fn resume(&self) -> Result<()> {
        self.lock().resume()
    }

    pub fn close(&self) {
        self.lock().close()
    }

    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out)
    }
}

impl AudioClock for ContextHandle {
    fn current_time(&self) -> Option<f64> {
        let ctx = self.lock();
        ctx.is_running().then(|| ctx.current_time())
    }
}

impl ClickSink for ContextHandle {
    fn schedule(&self, event: ClickEvent) {
        self.lock().schedule_click(&event);
    }
}
