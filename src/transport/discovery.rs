//! Serial port enumeration and a best-guess pick of the carousel board.
//!
//! The guess is a substring match on the port description and name. It is
//! only a convenience for pre-selecting a port and is allowed to be wrong.

use crate::error::AppResult;

/// Description substrings that suggest an Arduino-class board.
pub const DESCRIPTION_TOKENS: [&str; 3] = ["Arduino", "CH340", "USB"];

/// Device-name substring of CDC-ACM ports (`/dev/ttyACM0`).
pub const NAME_TOKEN: &str = "ACM";

/// A port as seen by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Device name passed to open (e.g. "COM3", "/dev/ttyUSB0")
    pub name: String,
    /// Human-readable description (product / manufacturer)
    pub description: String,
}

impl PortDescriptor {
    /// Descriptor from a port name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Whether this port looks like the carousel board.
    pub fn looks_like_device(&self) -> bool {
        DESCRIPTION_TOKENS
            .iter()
            .any(|token| self.description.contains(token))
            || self.name.contains(NAME_TOKEN)
    }
}

/// Name of the first port that looks like the board, if any.
pub fn detect_device(ports: &[PortDescriptor]) -> Option<String> {
    ports
        .iter()
        .find(|port| port.looks_like_device())
        .map(|port| port.name.clone())
}

/// Every serial port the OS reports.
#[cfg(feature = "instrument_serial")]
pub fn available_ports() -> AppResult<Vec<PortDescriptor>> {
    use crate::error::CarouselError;
    use serialport::SerialPortType;

    let ports = serialport::available_ports().map_err(|e| CarouselError::Io(e.into()))?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let description = match info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let parts: Vec<String> =
                        [usb.product, usb.manufacturer].into_iter().flatten().collect();
                    if parts.is_empty() {
                        "USB Serial Device".to_string()
                    } else {
                        parts.join(" - ")
                    }
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "n/a".to_string(),
            };
            PortDescriptor::new(info.port_name, description)
        })
        .collect())
}

/// Every serial port the OS reports; unavailable in this build.
#[cfg(not(feature = "instrument_serial"))]
pub fn available_ports() -> AppResult<Vec<PortDescriptor>> {
    Err(crate::error::CarouselError::SerialFeatureDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_port_wins() {
        let ports = vec![
            PortDescriptor::new("/dev/ttyS0", "n/a"),
            PortDescriptor::new("COM4", "USB-SERIAL CH340"),
            PortDescriptor::new("COM5", "Arduino Uno"),
        ];
        assert_eq!(detect_device(&ports), Some("COM4".to_string()));
    }

    #[test]
    fn test_acm_device_name_matches_without_description() {
        let ports = vec![
            PortDescriptor::new("/dev/ttyS0", "n/a"),
            PortDescriptor::new("/dev/ttyACM0", "n/a"),
        ];
        assert_eq!(detect_device(&ports), Some("/dev/ttyACM0".to_string()));
    }

    #[test]
    fn test_no_match_is_none() {
        let ports = vec![
            PortDescriptor::new("/dev/ttyS0", "n/a"),
            PortDescriptor::new("/dev/rfcomm0", "Bluetooth"),
        ];
        assert_eq!(detect_device(&ports), None);
        assert_eq!(detect_device(&[]), None);
    }
}
