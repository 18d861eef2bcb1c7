//! Platform audio backend using CPAL
//!
//! CPAL abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod engine;
pub mod input;
pub mod stream;

pub use cpal_backend::CpalEnumerator;
pub use engine::AudioEngine;
pub use input::{classify_open_error, CpalInputProvider, CpalInputSource};
pub use stream::{downmix, spread_stereo, Resampler, RingBuffer, StreamThread};
