//! Tuner session
//!
//! A dedicated microphone source feeding a private analyser inside the
//! shared context. The analyser is never linked into the signal chain or
//! the destination, so tuning is silent.
//!
//! The caller drives [`TunerSession::tick`] once per repaint; each tick
//! copies the latest window, runs the detector and publishes the reading.

use crate::domain::audio::{AudioError, DeviceId, Result};
use crate::domain::context::{ContextHandle, ContextState};
use crate::domain::graph::NodeId;
use crate::domain::nodes::{AnalyserNode, AnalysisTap, SourceNode};
use crate::domain::pitch::{DetectorConfig, PitchDetector, TuningState, DEFAULT_A4};
use crate::domain::source::{InputConstraints, InputProvider, InputRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Tuner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub silence_rms: f32,
    pub correlation_threshold: f64,
    pub acceptance_threshold: f64,
    pub reference_a4: f64,
    /// Analysis window in samples, a power of two
    pub analysis_size: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        let detector = DetectorConfig::default();
        Self {
            silence_rms: detector.silence_rms,
            correlation_threshold: detector.correlation_threshold,
            acceptance_threshold: detector.acceptance_threshold,
            reference_a4: DEFAULT_A4,
            analysis_size: 2048,
        }
    }
}

impl TunerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.analysis_size.is_power_of_two() || self.analysis_size < 32 {
            return Err(AudioError::InvalidConfiguration(format!(
                "analysis size must be a power of two >= 32, got {}",
                self.analysis_size
            )));
        }
        if !(self.reference_a4.is_finite() && self.reference_a4 > 0.0) {
            return Err(AudioError::InvalidConfiguration(format!(
                "invalid reference pitch {}",
                self.reference_a4
            )));
        }
        Ok(())
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            silence_rms: self.silence_rms,
            correlation_threshold: self.correlation_threshold,
            acceptance_threshold: self.acceptance_threshold,
        }
    }
}

pub struct TunerSession {
    context: ContextHandle,
    source: NodeId,
    analyser: NodeId,
    tap: AnalysisTap,
    detector: PitchDetector,
    sample_rate: u32,
    reference_a4: f64,
    window: Vec<f32>,
    state: watch::Sender<Option<TuningState>>,
    stopped: bool,
}

impl TunerSession {
    /// Open the microphone with processing disabled and wire it to a
    /// private analyser.
    ///
    /// A refused permission surfaces as `MicrophoneAccessDenied`; every
    /// other failure as `AudioEngineUnavailable`.
    pub async fn open(
        context: ContextHandle,
        provider: &dyn InputProvider,
        device: Option<DeviceId>,
        config: &TunerConfig,
    ) -> Result<Self> {
        config.validate()?;
        if context.state() != ContextState::Running {
            return Err(AudioError::AudioEngineUnavailable(format!(
                "audio context is {:?}",
                context.state()
            )));
        }

        let request = InputRequest::new(device.clone()).with_constraints(InputConstraints::raw());
        let source = provider.open(request).await.map_err(|e| {
            warn!("Tuner could not open {:?}: {}", device, e);
            match e {
                AudioError::MicrophoneAccessDenied => AudioError::MicrophoneAccessDenied,
                other => AudioError::AudioEngineUnavailable(other.to_string()),
            }
        })?;

        let analyser = AnalyserNode::new(config.analysis_size);
        let tap = analyser.tap();

        let mut ctx = context.lock();
        let sample_rate = ctx.sample_rate();
        let graph = ctx.graph_mut();
        let source = graph.add_node(Box::new(SourceNode::new(source)));
        let analyser = graph.add_node(Box::new(analyser));
        if let Err(e) = graph.connect(source, analyser) {
            for node in [source, analyser] {
                if let Err(e) = graph.remove_node(node) {
                    warn!("Failed to release tuner node {}: {}", node, e);
                }
            }
            return Err(AudioError::AudioEngineUnavailable(e.to_string()));
        }
        drop(ctx);

        let (state, _) = watch::channel(None);
        info!("Tuner session opened on {:?}", device);

        Ok(Self {
            context,
            source,
            analyser,
            tap,
            detector: PitchDetector::new(config.detector_config()),
            sample_rate,
            reference_a4: config.reference_a4,
            window: vec![0.0; config.analysis_size],
            state,
            stopped: false,
        })
    }

    /// Run one analysis frame and return the current reading.
    ///
    /// A frame without a pitch keeps the previous reading.
    pub fn tick(&mut self) -> Option<TuningState> {
        if self.stopped {
            return self.state();
        }

        self.tap.time_domain(&mut self.window);
        if let Some(frequency) = self.detector.detect(&self.window, self.sample_rate) {
            let reading = TuningState::from_frequency(frequency as f64, self.reference_a4);
            self.state.send_replace(Some(reading));
        }
        self.state()
    }

    pub fn state(&self) -> Option<TuningState> {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TuningState>> {
        self.state.subscribe()
    }

    /// Input level of the tuner microphone, 0..=100
    pub fn level_percent(&self) -> f32 {
        self.tap.level_percent()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    /// Release the source and the analyser. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let mut ctx = self.context.lock();
        if ctx.state() == ContextState::Closed {
            debug!("Context already closed, tuner nodes are gone");
            return;
        }
        let graph = ctx.graph_mut();
        // Unlink before releasing
        let cut = graph.disconnect_all(self.source);
        debug!("Tuner source unlinked from {} nodes", cut);
        for node in [self.source, self.analyser] {
            if let Err(e) = graph.remove_node(node) {
                warn!("Failed to release tuner node {}: {}", node, e);
            }
        }
        info!("Tuner session stopped");
    }
}

impl Drop for TunerSession {
    fn drop(&mut self) {
        self.stop();
    }
}
