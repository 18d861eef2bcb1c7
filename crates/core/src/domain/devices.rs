//! Device registry
//!
//! Tracks the enumerated hardware list and the current input/output
//! selection. All three values are published through `tokio::sync::watch`
//! so UI layers can observe them without polling.

use crate::domain::audio::{AudioDevice, AudioEnumerator, DeviceId, DeviceKind, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Observable registry of audio endpoints
pub struct AudioDeviceRegistry {
    devices: watch::Sender<Vec<AudioDevice>>,
    current_input: watch::Sender<Option<DeviceId>>,
    current_output: watch::Sender<Option<DeviceId>>,
}

impl AudioDeviceRegistry {
    pub fn new() -> Self {
        let (devices, _) = watch::channel(Vec::new());
        let (current_input, _) = watch::channel(None);
        let (current_output, _) = watch::channel(None);

        Self {
            devices,
            current_input,
            current_output,
        }
    }

    /// Re-enumerate hardware and replace the published list wholesale.
    ///
    /// On failure the list is cleared and the error is returned.
    pub fn refresh(&self, enumerator: &dyn AudioEnumerator) -> Result<Vec<AudioDevice>> {
        match enumerator.devices() {
            Ok(devices) => {
                info!("Device list refreshed: {} endpoints", devices.len());
                self.devices.send_replace(devices.clone());
                Ok(devices)
            }
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                self.devices.send_replace(Vec::new());
                Err(e)
            }
        }
    }

    /// Snapshot of the current device list
    pub fn devices(&self) -> Vec<AudioDevice> {
        self.devices.borrow().clone()
    }

    pub fn input_devices(&self) -> Vec<AudioDevice> {
        self.devices_of(DeviceKind::Input)
    }

    pub fn output_devices(&self) -> Vec<AudioDevice> {
        self.devices_of(DeviceKind::Output)
    }

    fn devices_of(&self, kind: DeviceKind) -> Vec<AudioDevice> {
        self.devices
            .borrow()
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    /// Record the active input device (`None` = system default)
    pub fn select_input(&self, id: Option<DeviceId>) {
        debug!("Input device selected: {:?}", id);
        self.current_input.send_replace(id);
    }

    /// Record the preferred output device.
    ///
    /// Output routing always follows the system default; the selection is
    /// only remembered and published.
    pub fn select_output(&self, id: Option<DeviceId>) {
        info!("Output device recorded (routing follows system default): {:?}", id);
        self.current_output.send_replace(id);
    }

    pub fn current_input(&self) -> Option<DeviceId> {
        self.current_input.borrow().clone()
    }

    pub fn current_output(&self) -> Option<DeviceId> {
        self.current_output.borrow().clone()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Vec<AudioDevice>> {
        self.devices.subscribe()
    }

    pub fn subscribe_input(&self) -> watch::Receiver<Option<DeviceId>> {
        self.current_input.subscribe()
    }

    pub fn subscribe_output(&self) -> watch::Receiver<Option<DeviceId>> {
        self.current_output.subscribe()
    }
}

impl Default for AudioDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
