//! Input sources
//!
//! Any stream-producing object can feed the graph by implementing
//! [`InputSource`]; opening one (device selection, permission prompts) is the
//! job of an [`InputProvider`]. The hardware provider lives in the infra
//! crate. This module ships synthetic sources for demos and tests.

use crate::domain::audio::{AudioError, DeviceId, Result};
use async_trait::async_trait;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A mono stream of samples at the context's sample rate
pub trait InputSource: Send {
    /// Device backing this source, if any
    fn device_id(&self) -> Option<&DeviceId>;

    /// Fill `out` with the next samples; returns how many were written.
    /// Unfilled samples are treated as silence by the caller.
    fn read(&mut self, out: &mut [f32]) -> usize;

    /// Release the underlying stream. Called exactly once by the graph.
    fn close(&mut self) -> Result<()>;
}

/// Capture processing flags requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl InputConstraints {
    /// All processing disabled, as needed for pitch detection
    pub fn raw() -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }
}

impl Default for InputConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// What to open: a device (or the system default) and capture constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub device: Option<DeviceId>,
    pub constraints: InputConstraints,
}

impl InputRequest {
    pub fn new(device: Option<DeviceId>) -> Self {
        Self {
            device,
            constraints: InputConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: InputConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Grants access to input streams
#[async_trait]
pub trait InputProvider: Send + Sync {
    /// Open a stream for `request`.
    ///
    /// # Errors
    /// `MicrophoneAccessDenied` when the user refuses, `DeviceNotFound` or
    /// `DeviceUnavailable` when the device cannot be opened.
    async fn open(&self, request: InputRequest) -> Result<Box<dyn InputSource>>;
}

// ============================================================================
// SYNTHETIC SOURCES
// ============================================================================

/// Sine generator
pub struct ToneSource {
    device: Option<DeviceId>,
    phase: f64,
    increment: f64,
    amplitude: f32,
}

impl ToneSource {
    pub fn new(sample_rate: u32, frequency: f64, amplitude: f32) -> Self {
        Self {
            device: None,
            phase: 0.0,
            increment: TAU * frequency / sample_rate as f64,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    pub fn with_device(mut self, device: Option<DeviceId>) -> Self {
        self.device = device;
        self
    }
}

impl InputSource for ToneSource {
    fn device_id(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        for sample in out.iter_mut() {
            *sample = self.phase.sin() as f32 * self.amplitude;
            self.phase = (self.phase + self.increment) % TAU;
        }
        out.len()
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Loops a fixed buffer of samples
pub struct ClipSource {
    device: Option<DeviceId>,
    samples: Arc<Vec<f32>>,
    position: usize,
}

impl ClipSource {
    pub fn new(device: Option<DeviceId>, samples: Vec<f32>) -> Self {
        Self::shared(device, Arc::new(samples))
    }

    pub fn shared(device: Option<DeviceId>, samples: Arc<Vec<f32>>) -> Self {
        Self {
            device,
            samples,
            position: 0,
        }
    }
}

impl InputSource for ClipSource {
    fn device_id(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.samples.is_empty() {
            return 0;
        }
        for sample in out.iter_mut() {
            *sample = self.samples[self.position];
            self.position = (self.position + 1) % self.samples.len();
        }
        out.len()
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// STATIC PROVIDER
// ============================================================================

#[derive(Debug, Clone)]
enum Behaviour {
    Tone { sample_rate: u32, frequency: f64 },
    Clip(Arc<Vec<f32>>),
    Denied,
    Unavailable(String),
}

/// Provider handing out synthetic sources, for offline use and tests
pub struct StaticInputProvider {
    behaviour: Behaviour,
    devices: Vec<DeviceId>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl StaticInputProvider {
    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            devices: Vec::new(),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every open yields a 0.5-amplitude sine at `frequency`
    pub fn tone(sample_rate: u32, frequency: f64) -> Self {
        Self::with_behaviour(Behaviour::Tone {
            sample_rate,
            frequency,
        })
    }

    /// Every open yields a loop of `samples`
    pub fn clip(samples: Vec<f32>) -> Self {
        Self::with_behaviour(Behaviour::Clip(Arc::new(samples)))
    }

    /// Every open fails as if the user refused microphone access
    pub fn denied() -> Self {
        Self::with_behaviour(Behaviour::Denied)
    }

    /// Every open fails with `DeviceUnavailable`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::with_behaviour(Behaviour::Unavailable(reason.into()))
    }

    /// Restrict explicit device requests to `devices`
    pub fn with_devices(mut self, devices: Vec<DeviceId>) -> Self {
        self.devices = devices;
        self
    }

    /// Number of sources opened and not yet closed
    pub fn live_sources(&self) -> usize {
        self.opened
            .load(Ordering::SeqCst)
            .saturating_sub(self.closed.load(Ordering::SeqCst))
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InputProvider for StaticInputProvider {
    async fn open(&self, request: InputRequest) -> Result<Box<dyn InputSource>> {
        if let Some(device) = &request.device {
            if !self.devices.is_empty() && !self.devices.contains(device) {
                return Err(AudioError::DeviceNotFound(device.as_str().to_string()));
            }
        }

        let inner: Box<dyn InputSource> = match &self.behaviour {
            Behaviour::Tone {
                sample_rate,
                frequency,
            } => Box::new(
                ToneSource::new(*sample_rate, *frequency, 0.5).with_device(request.device.clone()),
            ),
            Behaviour::Clip(samples) => {
                Box::new(ClipSource::shared(request.device.clone(), samples.clone()))
            }
            Behaviour::Denied => return Err(AudioError::MicrophoneAccessDenied),
            Behaviour::Unavailable(reason) => {
                return Err(AudioError::DeviceUnavailable(reason.clone()))
            }
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        info!("Opened synthetic input {:?}", request.device);
        debug!("Input constraints: {:?}", request.constraints);

        Ok(Box::new(TrackedSource {
            inner,
            closed: self.closed.clone(),
        }))
    }
}

/// Counts releases so callers can verify no stream leaks
struct TrackedSource {
    inner: Box<dyn InputSource>,
    closed: Arc<AtomicUsize>,
}

impl InputSource for TrackedSource {
    fn device_id(&self) -> Option<&DeviceId> {
        self.inner.device_id()
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        self.inner.read(out)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
