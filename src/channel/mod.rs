//! Device channel abstraction
//!
//! A channel is the raw duplex byte pipe to one serial device:
//! - **Channel**: how bytes reach the OS (serialport handle, mock...)
//! - **Transport**: how bytes are buffered and pumped (handled separately)
//!
//! The buffered transport only needs `bytes_available`, `read` and `write`.
//! Configuration and pin access have default implementations so simple
//! channels can skip them.
//!
//! # Adding a new channel
//!
//! 1. Create `channel/my_channel.rs`
//! 2. Implement the `DeviceChannel` trait
//! 3. Add `pub mod my_channel;` here
//! 4. Open it with `UartContext::open_channel()`

pub mod mock;
pub mod serial;

pub use mock::MockChannel;
pub use serial::{available_ports, SerialChannel};

use crate::config::PortSettings;
use serde::Serialize;
use std::fmt;
use std::io;

/// Raw byte channel to a serial device
///
/// All calls may block for the duration of one OS operation. A returned
/// error means the device is broken; pumps stop on the first one.
pub trait DeviceChannel: Send + 'static {
    /// Number of received bytes the OS holds for us
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes, returns bytes actually read
    ///
    /// A read timeout is not an error: it reports 0 bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data`, returns bytes actually accepted by the OS
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Block until written data has left the OS output queue
    fn flush(&mut self) -> io::Result<()>;

    /// Open a second handle on the same device
    ///
    /// Each pump owns its own handle so a blocking read never holds up writes.
    fn try_clone(&self) -> io::Result<Box<dyn DeviceChannel>>;

    /// Apply frame format, baud rate and flow control
    fn configure(&mut self, settings: &PortSettings) -> io::Result<()> {
        let _ = settings;
        Ok(())
    }

    /// Drive an output pin (RTS, DTR)
    fn write_pin(&mut self, pin: Pin, high: bool) -> io::Result<()> {
        let _ = (pin, high);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "pin control not supported by this channel",
        ))
    }

    /// Sample an input pin (CTS, DSR, DCD, RI)
    fn read_pin(&mut self, pin: Pin) -> io::Result<bool> {
        let _ = pin;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "pin control not supported by this channel",
        ))
    }
}

// =============================================================================
// Pins
// =============================================================================

/// Modem control and status lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pin {
    /// Request to Send (out)
    Rts,
    /// Clear to Send (in)
    Cts,
    /// Data Set Ready (in)
    Dsr,
    /// Data Carrier Detect (in)
    Dcd,
    /// Data Terminal Ready (out)
    Dtr,
    /// Ring Indicator (in)
    Ri,
}

impl Pin {
    /// Input lines, in display order
    pub const INPUTS: [Pin; 4] = [Pin::Cts, Pin::Dsr, Pin::Dcd, Pin::Ri];

    /// Whether the host drives this line
    pub fn is_output(&self) -> bool {
        matches!(self, Pin::Rts | Pin::Dtr)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pin::Rts => "RTS",
            Pin::Cts => "CTS",
            Pin::Dsr => "DSR",
            Pin::Dcd => "DCD",
            Pin::Dtr => "DTR",
            Pin::Ri => "RI",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Device listing
// =============================================================================

/// Serial device found on the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// OS device name (e.g. `/dev/ttyUSB0`, `COM3`)
    pub name: String,
    /// "usb", "pci", "bluetooth" or "unknown"
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Currently opened through the listing context
    pub opened: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_direction() {
        assert!(Pin::Rts.is_output());
        assert!(Pin::Dtr.is_output());
        for pin in Pin::INPUTS {
            assert!(!pin.is_output(), "{} should be an input", pin);
        }
    }

    #[test]
    fn test_device_info_json_skips_missing_fields() {
        let info = DeviceInfo {
            name: "/dev/ttyS0".into(),
            kind: "unknown",
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
            opened: false,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"name":"/dev/ttyS0","kind":"unknown","opened":false}"#);
    }
}
