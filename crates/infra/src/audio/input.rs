//! Microphone capture through CPAL
//!
//! The capture callback downmixes to mono and hands blocks over a bounded
//! channel; [`CpalInputSource::read`] drains them on the render side,
//! converting to the context's rate on the way.

use super::cpal_backend::{default_config, device_name, find_device};
use super::stream::{downmix, Resampler, RingBuffer, StreamThread};
use async_trait::async_trait;
use cpal::traits::DeviceTrait;
use cpal::{FromSample, Sample, SizedSample};
use crossbeam::channel::{bounded, Receiver, Sender};
use plectrum_core::domain::audio::{AudioError, DeviceId, DeviceKind, Result};
use plectrum_core::domain::source::{InputProvider, InputRequest, InputSource};
use tracing::{debug, error, info, instrument};

/// Blocks buffered between the capture callback and the graph
const CHANNEL_BLOCKS: usize = 64;

/// Map a stream-open failure onto the error callers distinguish.
///
/// Platforms report a refused microphone permission as a generic backend
/// error, so the message is all there is to go on.
pub fn classify_open_error(message: &str) -> AudioError {
    let lower = message.to_lowercase();
    if ["permission", "denied", "not allowed", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        AudioError::MicrophoneAccessDenied
    } else {
        AudioError::DeviceUnavailable(message.to_string())
    }
}

struct Opened {
    device: Option<DeviceId>,
    sample_rate: u32,
    channels: u16,
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<f32>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
                let mut mono = Vec::with_capacity(samples.len() / channels.max(1));
                downmix(&samples, channels, &mut mono);
                // A full channel means the graph stopped reading; drop the block
                let _ = sender.try_send(mono);
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| classify_open_error(&e.to_string()))
}

/// Live microphone stream
pub struct CpalInputSource {
    device: Option<DeviceId>,
    thread: StreamThread,
    blocks: Receiver<Vec<f32>>,
    resampler: Resampler,
    ring: RingBuffer,
    scratch: Vec<f32>,
}

impl CpalInputSource {
    /// Open the device named by `request` (or the default input) and start
    /// capturing, converting to `target_rate`. Blocks until the stream runs.
    pub fn open(request: &InputRequest, target_rate: u32) -> Result<Self> {
        debug!(
            "Capture constraints {:?} are advisory on this backend",
            request.constraints
        );

        let (sender, blocks) = bounded::<Vec<f32>>(CHANNEL_BLOCKS);
        let wanted = request.device.clone();

        let (thread, opened) = StreamThread::spawn("plectrum-input", move || {
            let host = cpal::default_host();
            let device = find_device(&host, DeviceKind::Input, wanted.as_ref())?;
            let supported = default_config(&device, DeviceKind::Input)?;
            let config = supported.config();

            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => build_capture::<f32>(&device, &config, sender)?,
                cpal::SampleFormat::I16 => build_capture::<i16>(&device, &config, sender)?,
                cpal::SampleFormat::U16 => build_capture::<u16>(&device, &config, sender)?,
                cpal::SampleFormat::I32 => build_capture::<i32>(&device, &config, sender)?,
                format => {
                    return Err(AudioError::InvalidConfiguration(format!(
                        "Unsupported input sample format {}",
                        format
                    )))
                }
            };

            let opened = Opened {
                device: device_name(&device).map(DeviceId::new),
                sample_rate: config.sample_rate,
                channels: config.channels,
            };
            Ok((stream, opened))
        })?;

        info!(
            device = ?opened.device,
            rate = opened.sample_rate,
            channels = opened.channels,
            "Input stream started"
        );

        Ok(Self {
            device: opened.device,
            thread,
            blocks,
            resampler: Resampler::new(opened.sample_rate, target_rate),
            // One second of headroom at the target rate
            ring: RingBuffer::with_capacity(target_rate.max(1) as usize),
            scratch: Vec::new(),
        })
    }

    fn drain(&mut self) {
        for block in self.blocks.try_iter() {
            self.scratch.clear();
            self.scratch.reserve(self.resampler.max_output(block.len()));
            self.resampler.process(&block, &mut self.scratch);
            let written = self.ring.write(&self.scratch);
            if written < self.scratch.len() {
                debug!("Input overrun, dropped {} samples", self.scratch.len() - written);
            }
        }
    }
}

impl InputSource for CpalInputSource {
    fn device_id(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        if !self.thread.is_running() {
            return 0;
        }
        self.drain();
        self.ring.read(out)
    }

    fn close(&mut self) -> Result<()> {
        if self.thread.is_running() {
            self.thread.stop();
            self.ring.clear();
            info!(device = ?self.device, "Input stream closed");
        }
        Ok(())
    }
}

/// [`InputProvider`] opening CPAL capture streams
#[derive(Debug, Clone)]
pub struct CpalInputProvider {
    target_rate: u32,
}

impl CpalInputProvider {
    /// Provider delivering samples at `target_rate`, the context's rate
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

#[async_trait]
impl InputProvider for CpalInputProvider {
    #[instrument(skip(self), fields(rate = self.target_rate))]
    async fn open(&self, request: InputRequest) -> Result<Box<dyn InputSource>> {
        let target_rate = self.target_rate;
        let source = tokio::task::spawn_blocking(move || CpalInputSource::open(&request, target_rate))
            .await
            .map_err(|e| AudioError::OsError(e.to_string()))??;
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plectrum_core::domain::source::InputConstraints;

    #[test]
    fn test_classify_permission_errors() {
        assert!(matches!(
            classify_open_error("A backend-specific error has occurred: Permission denied"),
            AudioError::MicrophoneAccessDenied
        ));
        assert!(matches!(
            classify_open_error("Access NOT ALLOWED by user"),
            AudioError::MicrophoneAccessDenied
        ));
    }

    #[test]
    fn test_classify_other_errors() {
        match classify_open_error("The requested device is no longer available") {
            AudioError::DeviceUnavailable(msg) => assert!(msg.contains("no longer available")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_default_input() {
        let provider = CpalInputProvider::new(44100);
        let request = InputRequest::new(None).with_constraints(InputConstraints::raw());
        match provider.open(request).await {
            Ok(mut source) => {
                let mut block = vec![0.0; 256];
                assert!(source.read(&mut block) <= block.len());
                source.close().unwrap();
                assert_eq!(source.read(&mut block), 0);
            }
            Err(e) => {
                // On CI or headless systems, there might not be audio devices
                eprintln!("Skipping test: {}", e);
            }
        }
    }

    #[tokio::test]
    async fn test_open_unknown_input() {
        let provider = CpalInputProvider::new(44100);
        let request = InputRequest::new(Some(DeviceId::from("plectrum-test-no-such-mic")));
        assert!(provider.open(request).await.is_err());
    }
}
