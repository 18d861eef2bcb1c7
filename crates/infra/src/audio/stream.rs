//! Stream plumbing shared by capture and playback
//!
//! - `RingBuffer`: bounded FIFO between a stream callback and the graph
//! - `Resampler`: linear-interpolation rate conversion
//! - `StreamThread`: dedicated thread owning a `cpal::Stream`, which is not
//!   `Send` and therefore cannot live inside graph nodes directly

use crossbeam::channel::{bounded, Sender};
use plectrum_core::domain::audio::{AudioError, Result};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Ring buffer for audio data transfer
pub struct RingBuffer {
    buffer: Vec<f32>,
    capacity: usize,
    write_pos: usize,
    read_pos: usize,
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            buffer: vec![0.0; capacity],
            capacity,
            write_pos: 0,
            read_pos: 0,
        }
    }

    /// Append samples; those not fitting are dropped. Returns how many fit.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let to_write = samples.len().min(self.available_write());

        for (i, sample) in samples.iter().take(to_write).enumerate() {
            self.buffer[(self.write_pos + i) % self.capacity] = *sample;
        }

        self.write_pos = (self.write_pos + to_write) % self.capacity;
        to_write
    }

    pub fn read(&mut self, buffer: &mut [f32]) -> usize {
        let to_read = buffer.len().min(self.available_read());

        for (i, slot) in buffer.iter_mut().take(to_read).enumerate() {
            *slot = self.buffer[(self.read_pos + i) % self.capacity];
        }

        self.read_pos = (self.read_pos + to_read) % self.capacity;
        to_read
    }

    pub fn available_write(&self) -> usize {
        self.capacity - self.available_read() - 1
    }

    pub fn available_read(&self) -> usize {
        if self.read_pos > self.write_pos {
            self.capacity - (self.read_pos - self.write_pos)
        } else {
            self.write_pos - self.read_pos
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.read_pos = 0;
    }
}

/// Mono resampler using linear interpolation
///
/// Keeps the last input sample and the fractional read position across
/// blocks, so consecutive calls produce a continuous signal.
pub struct Resampler {
    step: f64,
    position: f64,
    previous: f32,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        if source_rate == target_rate {
            debug!(
                "Source and target rates match ({}Hz), bypassing resampling",
                source_rate
            );
        } else {
            info!("Creating resampler: {}Hz -> {}Hz", source_rate, target_rate);
        }

        Self {
            step: source_rate.max(1) as f64 / target_rate.max(1) as f64,
            position: 0.0,
            previous: 0.0,
        }
    }

    pub fn is_bypass(&self) -> bool {
        self.step == 1.0
    }

    /// Output/input rate ratio
    pub fn ratio(&self) -> f64 {
        self.step.recip()
    }

    /// Upper bound of output samples for `input_len` input samples
    pub fn max_output(&self, input_len: usize) -> usize {
        (input_len as f64 * self.ratio()).ceil() as usize + 1
    }

    /// Convert `input`, appending the result to `output`
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        if self.is_bypass() {
            output.extend_from_slice(input);
            return;
        }
        if input.is_empty() {
            return;
        }

        // Position 0 is the last sample of the previous block
        let len = input.len() as f64;
        while self.position < len {
            let i0 = self.position.floor() as usize;
            let frac = (self.position - i0 as f64) as f32;
            let a = if i0 == 0 { self.previous } else { input[i0 - 1] };
            let b = input[i0];
            output.push(a + frac * (b - a));
            self.position += self.step;
        }

        self.position -= len;
        self.previous = input[input.len() - 1];
    }
}

/// Average interleaved frames down to mono
pub fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    let channels = channels.max(1);
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Spread stereo frames over a device with `channels` channels.
///
/// Mono devices get the average; extra channels get silence.
pub fn spread_stereo(stereo: &[f32], out: &mut [f32], channels: usize) {
    let channels = channels.max(1);
    for (frame, pair) in out.chunks_exact_mut(channels).zip(stereo.chunks_exact(2)) {
        if channels == 1 {
            frame[0] = (pair[0] + pair[1]) * 0.5;
            continue;
        }
        frame[0] = pair[0];
        frame[1] = pair[1];
        frame[2..].fill(0.0);
    }
}

/// Thread keeping a CPAL stream alive until stopped
pub struct StreamThread {
    name: String,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Run `build` on a new thread, play the stream it returns and park
    /// until [`stop`](Self::stop).
    ///
    /// Blocks until the stream is playing or has failed; `build`'s extra
    /// value is handed back on success.
    pub fn spawn<R, F>(name: &str, build: F) -> Result<(Self, R)>
    where
        R: Send + 'static,
        F: FnOnce() -> Result<(cpal::Stream, R)> + Send + 'static,
    {
        use cpal::traits::StreamTrait;

        let (ready_tx, ready_rx) = bounded::<Result<R>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (stream, value) = match build() {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }

                if ready_tx.send(Ok(value)).is_err() {
                    return;
                }
                // Parked until stop() drops the sender
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError(format!("{} exited early", name))));

        match ready {
            Ok(value) => {
                debug!("{} running", name);
                Ok((
                    Self {
                        name: name.to_string(),
                        shutdown: Some(shutdown_tx),
                        handle: Some(handle),
                    },
                    value,
                ))
            }
            Err(e) => {
                if handle.join().is_err() {
                    warn!("{} panicked during setup", name);
                }
                Err(e)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Drop the stream and join the thread. Idempotent.
    pub fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} panicked", self.name);
            } else {
                debug!("{} stopped", self.name);
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer() {
        let mut buffer = RingBuffer::with_capacity(16);

        let input = vec![1.0, 2.0, 3.0, 4.0];
        let mut output = vec![0.0; 4];

        assert_eq!(buffer.write(&input), 4);
        assert_eq!(buffer.available_read(), 4);
        assert_eq!(buffer.read(&mut output), 4);
        assert_eq!(output, input);
    }

    #[test]
    fn test_ring_buffer_wraparound() {
        let mut buffer = RingBuffer::with_capacity(8);

        assert_eq!(buffer.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 6);

        let mut output1 = vec![0.0; 4];
        assert_eq!(buffer.read(&mut output1), 4);
        assert_eq!(output1, vec![1.0, 2.0, 3.0, 4.0]);

        // Only 5 slots are free
        assert_eq!(buffer.write(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]), 5);

        let mut output2 = vec![0.0; 10];
        assert_eq!(buffer.read(&mut output2), 7);
        assert_eq!(output2[..7], [5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_resampler_bypass() {
        let mut resampler = Resampler::new(48000, 48000);
        assert!(resampler.is_bypass());

        let mut output = Vec::new();
        resampler.process(&[1.0, 2.0, 3.0, 4.0], &mut output);
        assert_eq!(output, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_resampler_length_matches_ratio() {
        let mut resampler = Resampler::new(48000, 44100);
        let input = vec![0.5; 4800];
        let mut output = Vec::new();
        for block in input.chunks(480) {
            resampler.process(block, &mut output);
        }

        assert!((output.len() as i64 - 4410).abs() <= 1, "len {}", output.len());
        assert!(output.len() <= resampler.max_output(input.len()));
    }

    #[test]
    fn test_resampler_is_continuous_across_blocks() {
        let mut resampler = Resampler::new(22050, 44100);
        let ramp: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let mut output = Vec::new();
        for block in ramp.chunks(7) {
            resampler.process(block, &mut output);
        }

        // Upsampling a ramp by two yields half steps
        for pair in output.windows(2).skip(2) {
            assert!((pair[1] - pair[0] - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_downmix() {
        let mut mono = Vec::new();
        downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut mono);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_spread_stereo() {
        let stereo = [0.25, 0.75, 1.0, 0.0];

        let mut mono = [0.0; 2];
        spread_stereo(&stereo, &mut mono, 1);
        assert_eq!(mono, [0.5, 0.5]);

        let mut quad = [9.0; 8];
        spread_stereo(&stereo, &mut quad, 4);
        assert_eq!(quad, [0.25, 0.75, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }
}
