//! Audio device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Summary of one audio device
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let is_default = default_input_name.as_ref() == Some(&name);
                devices.push(AudioDeviceInfo {
                    name,
                    is_input: true,
                    is_output: false,
                    is_default,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                } else {
                    devices.push(AudioDeviceInfo {
                        name,
                        is_input: false,
                        is_output: true,
                        is_default,
                    });
                }
            }
        }
    }

    devices
}

/// Find an input device by name substring, falling back to the default.
pub fn find_input_device(selector: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    if let Some(pattern) = selector {
        let pattern = pattern.to_lowercase();
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if name.to_lowercase().contains(&pattern) {
                        tracing::info!("Using input device: {}", name);
                        return Ok(device);
                    }
                }
            }
        }
        tracing::warn!("No input device matching '{}', using default", pattern);
    }

    host.default_input_device()
        .ok_or_else(|| AudioError::DeviceNotFound("no default input device".into()))
}

/// Find an output device by name substring, falling back to the default.
pub fn find_output_device(selector: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    if let Some(pattern) = selector {
        let pattern = pattern.to_lowercase();
        if let Ok(devices) = host.output_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if name.to_lowercase().contains(&pattern) {
                        tracing::info!("Using output device: {}", name);
                        return Ok(device);
                    }
                }
            }
        }
        tracing::warn!("No output device matching '{}', using default", pattern);
    }

    host.default_output_device()
        .ok_or_else(|| AudioError::DeviceNotFound("no default output device".into()))
}
