//! Real-time audio engine
//!
//! Owns the output stream and the [`ContextHandle`] it renders. The context
//! runs at the output device's native rate; the output callback pulls one
//! block of interleaved stereo from the graph per period and maps it onto
//! the device's channel layout.

use super::cpal_backend::{default_config, device_name, find_device};
use super::stream::{spread_stereo, StreamThread};
use cpal::traits::DeviceTrait;
use cpal::{FromSample, SizedSample};
use plectrum_core::domain::audio::{AudioError, DeviceId, DeviceKind, Result};
use plectrum_core::domain::context::{ContextHandle, ContextState};
use plectrum_core::domain::graph::CHANNELS;
use tracing::{error, info, instrument};

struct Playback {
    context: ContextHandle,
    device: Option<DeviceId>,
    channels: u16,
}

fn build_playback<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    context: ContextHandle,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut stereo: Vec<f32> = Vec::new();
    let mut mapped: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                stereo.resize(frames * CHANNELS, 0.0);
                mapped.resize(data.len(), 0.0);

                context.render(&mut stereo);
                spread_stereo(&stereo, &mut mapped, channels);
                for (slot, sample) in data.iter_mut().zip(&mapped) {
                    *slot = T::from_sample(*sample);
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

/// Output stream plus the context feeding it
pub struct AudioEngine {
    context: ContextHandle,
    device: Option<DeviceId>,
    channels: u16,
    thread: StreamThread,
}

impl AudioEngine {
    /// Open `output` (or the default output) and start rendering a new,
    /// suspended context into it.
    #[instrument]
    pub fn start(output: Option<DeviceId>) -> Result<Self> {
        let (thread, playback) = StreamThread::spawn("plectrum-output", move || {
            let host = cpal::default_host();
            let device = find_device(&host, DeviceKind::Output, output.as_ref())?;
            let supported = default_config(&device, DeviceKind::Output)?;
            let config = supported.config();
            let context = ContextHandle::new(config.sample_rate);

            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => build_playback::<f32>(&device, &config, context.clone())?,
                cpal::SampleFormat::I16 => build_playback::<i16>(&device, &config, context.clone())?,
                cpal::SampleFormat::U16 => build_playback::<u16>(&device, &config, context.clone())?,
                cpal::SampleFormat::I32 => build_playback::<i32>(&device, &config, context.clone())?,
                format => {
                    return Err(AudioError::InvalidConfiguration(format!(
                        "Unsupported output sample format {}",
                        format
                    )))
                }
            };

            let playback = Playback {
                context,
                device: device_name(&device).map(DeviceId::new),
                channels: config.channels,
            };
            Ok((stream, playback))
        })?;

        info!(
            device = ?playback.device,
            rate = playback.context.sample_rate(),
            channels = playback.channels,
            "Audio engine started"
        );

        Ok(Self {
            context: playback.context,
            device: playback.device,
            channels: playback.channels,
            thread,
        })
    }

    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    pub fn output_device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running() && self.context.state() == ContextState::Running
    }

    /// Let the context advance. Needed once before any chain or tuner.
    pub fn resume(&self) -> Result<()> {
        if !self.thread.is_running() {
            return Err(AudioError::AudioEngineUnavailable(
                "audio engine was disposed".to_string(),
            ));
        }
        self.context.resume()
    }

    pub fn suspend(&self) {
        self.context.lock().suspend();
    }

    /// Close the context and stop the output stream. Idempotent.
    pub fn dispose(&mut self) {
        if !self.thread.is_running() {
            return;
        }
        self.context.close();
        self.thread.stop();
        info!("Audio engine disposed");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
