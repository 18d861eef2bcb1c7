//! Audio device abstractions and the shared error taxonomy
//!
//! This module defines the core audio interfaces that are platform-agnostic.
//! Implementations for specific platforms (WASAPI, ALSA, CoreAudio) live in
//! the `infra` crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// An input device could not be opened (permission denied or device removed)
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user refused microphone access
    #[error("Microphone access denied")]
    MicrophoneAccessDenied,

    /// The requested effect kind is not part of the catalogue
    #[error("Unsupported effect type: {0}")]
    UnsupportedEffectType(String),

    /// A reorder request was not a permutation of the current chain
    #[error("Invalid reorder: {0}")]
    InvalidReorder(String),

    /// The audio engine is not running or could not be initialised
    #[error("Audio engine unavailable: {0}")]
    AudioEngineUnavailable(String),

    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for audio device or graph
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Input => "input",
            DeviceKind::Output => "output",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one hardware endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub label: String,
    pub kind: DeviceKind,
}

impl AudioDevice {
    /// Build a device snapshot, falling back to `"<kind> device"` for blank labels
    pub fn new(id: DeviceId, label: impl Into<String>, kind: DeviceKind) -> Self {
        let label = label.into();
        let label = if label.trim().is_empty() {
            format!("{} device", kind)
        } else {
            label
        };
        Self { id, label, kind }
    }
}

/// Configuration for an audio stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            buffer_size: 512,
        }
    }
}

/// Trait for enumerating available audio devices
pub trait AudioEnumerator: Send + Sync {
    /// List all available audio endpoints. A duplex device appears once per kind.
    fn devices(&self) -> Result<Vec<AudioDevice>>;

    /// Get the default input device
    fn default_input_device(&self) -> Result<AudioDevice>;

    /// Get the default output device
    fn default_output_device(&self) -> Result<AudioDevice>;

    /// Get all input devices
    fn input_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(self
            .devices()?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::Input)
            .collect())
    }

    /// Get all output devices
    fn output_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(self
            .devices()?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::Output)
            .collect())
    }

    /// Find a device by its ID
    fn device_by_id(&self, id: &DeviceId) -> Result<AudioDevice> {
        self.devices()?
            .into_iter()
            .find(|d| d.id == *id)
            .ok_or_else(|| AudioError::DeviceNotFound(id.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEnumerator(Vec<AudioDevice>);

    impl AudioEnumerator for FixedEnumerator {
        fn devices(&self) -> Result<Vec<AudioDevice>> {
            Ok(self.0.clone())
        }

        fn default_input_device(&self) -> Result<AudioDevice> {
            self.input_devices()?
                .into_iter()
                .next()
                .ok_or_else(|| AudioError::DeviceNotFound("input".to_string()))
        }

        fn default_output_device(&self) -> Result<AudioDevice> {
            self.output_devices()?
                .into_iter()
                .next()
                .ok_or_else(|| AudioError::DeviceNotFound("output".to_string()))
        }
    }

    #[test]
    fn test_device_id() {
        let id = DeviceId::new("test-device".to_string());
        assert_eq!(id.as_str(), "test-device");
        assert_eq!(id.to_string(), "test-device");
    }

    #[test]
    fn test_blank_label_falls_back_to_kind() {
        let device = AudioDevice::new(DeviceId::from("hw:1"), "  ", DeviceKind::Input);
        assert_eq!(device.label, "input device");

        let device = AudioDevice::new(DeviceId::from("hw:2"), "Scarlett 2i2", DeviceKind::Output);
        assert_eq!(device.label, "Scarlett 2i2");
    }

    #[test]
    fn test_enumerator_filters() {
        let enumerator = FixedEnumerator(vec![
            AudioDevice::new(DeviceId::from("mic"), "Mic", DeviceKind::Input),
            AudioDevice::new(DeviceId::from("spk"), "Speakers", DeviceKind::Output),
            AudioDevice::new(DeviceId::from("usb"), "Interface", DeviceKind::Input),
        ]);

        assert_eq!(enumerator.input_devices().unwrap().len(), 2);
        assert_eq!(enumerator.output_devices().unwrap().len(), 1);
        assert_eq!(
            enumerator.device_by_id(&DeviceId::from("usb")).unwrap().label,
            "Interface"
        );
        assert!(matches!(
            enumerator.device_by_id(&DeviceId::from("nope")),
            Err(AudioError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 2);
        assert_eq!(config.buffer_size, 512);
    }
}
