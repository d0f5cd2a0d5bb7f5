//! Audio device enumeration

use cpal::traits::{DeviceTrait, HostTrait};

use crate::{Error, Result};

/// Names of the available audio devices
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// List input and output devices on the default host
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices
pub fn list_devices() -> Result<DeviceList> {
    let host = cpal::default_host();

    let inputs = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(DeviceList { inputs, outputs })
}
