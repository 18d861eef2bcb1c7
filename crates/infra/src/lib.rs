//! Plectrum infrastructure: hardware audio through CPAL

pub mod audio;

pub use audio::{AudioEngine, CpalEnumerator, CpalInputProvider};
