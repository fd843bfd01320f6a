//! Serial channel backed by the `serialport` crate
//!
//! One `SerialChannel` wraps one OS handle. `try_clone()` duplicates the
//! handle so the rx and tx pumps each block on their own descriptor.

use super::{DeviceChannel, DeviceInfo, Pin};
use crate::config::PortSettings;
use crate::error::{Result, UartError};
use serialport::{SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Channel over a native serial port
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Open `port_name` with the given settings
    ///
    /// `timeout` bounds each blocking read so pumps keep polling their run flag.
    pub fn open(port_name: &str, settings: &PortSettings, timeout: Duration) -> Result<Self> {
        let map_err = |e: serialport::Error| {
            let source = io::Error::from(e);
            if source.kind() == io::ErrorKind::PermissionDenied {
                UartError::Permission {
                    port: port_name.to_string(),
                }
            } else {
                UartError::SerialOpen {
                    port: port_name.to_string(),
                    source,
                }
            }
        };

        let port = serialport::new(port_name, settings.baud)
            .data_bits(settings.data_bits.into())
            .parity(settings.parity.into())
            .stop_bits(settings.stop_bits.into())
            .flow_control(settings.flow_control.into())
            .timeout(timeout)
            .open()
            .map_err(map_err)?;

        debug!("Opened {} ({})", port_name, settings);
        Ok(Self { port })
    }
}

impl DeviceChannel for SerialChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.port.write(data) {
            Ok(n) => Ok(n),
            // Nothing left the driver before the timeout
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn try_clone(&self) -> io::Result<Box<dyn DeviceChannel>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(SerialChannel { port }))
    }

    fn configure(&mut self, settings: &PortSettings) -> io::Result<()> {
        self.port.set_baud_rate(settings.baud)?;
        self.port.set_data_bits(settings.data_bits.into())?;
        self.port.set_parity(settings.parity.into())?;
        self.port.set_stop_bits(settings.stop_bits.into())?;
        self.port.set_flow_control(settings.flow_control.into())?;
        Ok(())
    }

    fn write_pin(&mut self, pin: Pin, high: bool) -> io::Result<()> {
        match pin {
            Pin::Rts => self.port.write_request_to_send(high)?,
            Pin::Dtr => self.port.write_data_terminal_ready(high)?,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is an input pin", pin),
                ))
            }
        }
        Ok(())
    }

    fn read_pin(&mut self, pin: Pin) -> io::Result<bool> {
        let level = match pin {
            Pin::Cts => self.port.read_clear_to_send()?,
            Pin::Dsr => self.port.read_data_set_ready()?,
            Pin::Dcd => self.port.read_carrier_detect()?,
            Pin::Ri => self.port.read_ring_indicator()?,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is an output pin", pin),
                ))
            }
        };
        Ok(level)
    }
}

/// List serial devices present on the system
pub fn available_ports() -> Result<Vec<DeviceInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| UartError::system("available_ports", io::Error::from(e)))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let mut info = DeviceInfo {
                name: p.port_name,
                kind: "unknown",
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
                opened: false,
            };
            match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    info.kind = "usb";
                    info.vid = Some(usb.vid);
                    info.pid = Some(usb.pid);
                    info.serial_number = usb.serial_number;
                    info.manufacturer = usb.manufacturer;
                    info.product = usb.product;
                }
                SerialPortType::PciPort => info.kind = "pci",
                SerialPortType::BluetoothPort => info.kind = "bluetooth",
                SerialPortType::Unknown => {}
            }
            info
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let settings = PortSettings::default();
        let result = SerialChannel::open(
            "/dev/does-not-exist-uartlink",
            &settings,
            Duration::from_millis(10),
        );
        assert!(matches!(
            result,
            Err(UartError::SerialOpen { .. }) | Err(UartError::Permission { .. })
        ));
    }
}
