//! Open serial device
//!
//! A `UartDevice` is opened through a [`UartContext`] and borrows it. It
//! runs in one of two modes, chosen by the context config:
//! - **threaded**: bytes go through a [`BufferedTransport`], `send()` and
//!   `recv()` never touch the device directly
//! - **direct**: every call is one OS operation on the channel
//!
//! Settings and pins always go through the device's own control handle.
//! Every failing public operation is recorded in the device error slot.

use crate::channel::{DeviceChannel, Pin};
use crate::config::{validate_baud, DataBits, FlowControl, Parity, PortSettings, StopBits};
use crate::context::UartContext;
use crate::error::{ErrorRecord, ErrorScope, ErrorSlot, Result, UartError};
use crate::transport::{BufferedTransport, TrafficStats};
use bytes::Bytes;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handle on one open serial device
pub struct UartDevice<'ctx> {
    ctx: &'ctx UartContext,
    name: String,
    settings: PortSettings,
    /// Handle used for settings, pins, flush and direct-mode I/O
    control: Box<dyn DeviceChannel>,
    /// `None` in direct mode
    transport: Option<BufferedTransport>,
    flush_timeout: Duration,
    errors: ErrorSlot,
    closed: bool,
}

impl<'ctx> UartDevice<'ctx> {
    /// Wrap an already configured channel; the name must be reserved
    pub(crate) fn open(
        ctx: &'ctx UartContext,
        name: &str,
        control: Box<dyn DeviceChannel>,
        settings: PortSettings,
    ) -> Result<Self> {
        let transport = if ctx.is_threaded() {
            let pump_channel = control
                .try_clone()
                .map_err(|e| UartError::system("try_clone", e))?;
            let mut transport = BufferedTransport::new(name, ctx.transport_options().clone())?;
            transport.start(pump_channel)?;
            Some(transport)
        } else {
            None
        };

        info!(
            "{}: opened ({}, {})",
            name,
            settings,
            if transport.is_some() { "threaded" } else { "direct" }
        );
        Ok(Self {
            ctx,
            name: name.to_string(),
            settings,
            control,
            transport,
            flush_timeout: ctx.flush_timeout(),
            errors: ErrorSlot::new(ErrorScope::Device),
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(UartError::Closed {
                port: self.name.clone(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Data
    // =========================================================================

    /// Send all of `data`
    ///
    /// Threaded: queued into the tx ring, all or nothing. Direct: written to
    /// the device, a short write is an error.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let result = self.send_inner(data);
        self.errors.track("send", result)
    }

    fn send_inner(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        if let Some(transport) = &self.transport {
            return transport.send(data);
        }
        if data.is_empty() {
            return Err(UartError::InvalidArgument {
                reason: "empty send buffer",
            });
        }
        let written = self
            .control
            .write(data)
            .map_err(|e| UartError::system("write", e))?;
        if written < data.len() {
            return Err(UartError::system(
                "write",
                io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("could not send all data ({} of {} bytes)", written, data.len()),
                ),
            ));
        }
        Ok(written)
    }

    /// Receive up to `buf.len()` bytes; 0 when nothing arrived
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.recv_inner(buf);
        self.errors.track("recv", result)
    }

    fn recv_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        match &self.transport {
            Some(transport) => transport.recv(buf),
            None => self
                .control
                .read(buf)
                .map_err(|e| UartError::system("read", e)),
        }
    }

    /// Receive up to `max_len` bytes into a new buffer
    ///
    /// Never allocates more than what can be delivered: the rx ring size in
    /// threaded mode, the bytes the OS holds in direct mode.
    pub fn recv_bytes(&mut self, max_len: usize) -> Result<Bytes> {
        let result = self.recv_bytes_inner(max_len);
        self.errors.track("recv_bytes", result)
    }

    fn recv_bytes_inner(&mut self, max_len: usize) -> Result<Bytes> {
        self.ensure_open()?;
        if let Some(transport) = &self.transport {
            return transport.recv_bytes(max_len);
        }
        let pending = self
            .control
            .bytes_available()
            .map_err(|e| UartError::system("bytes_available", e))?;
        let len = max_len.min(pending);
        if len == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = vec![0u8; len];
        let n = self
            .control
            .read(&mut buf)
            .map_err(|e| UartError::system("read", e))?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    /// Send a string, without terminator
    pub fn puts(&mut self, text: &str) -> Result<()> {
        let result = self.send_inner(text.as_bytes()).map(|_| ());
        self.errors.track("puts", result)
    }

    /// Send one byte
    pub fn putc(&mut self, byte: u8) -> Result<()> {
        let result = self.send_inner(&[byte]).map(|_| ());
        self.errors.track("putc", result)
    }

    /// Receive one byte, `None` when nothing arrived
    pub fn getc(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let result = self.recv_inner(&mut byte).map(|n| (n > 0).then_some(byte[0]));
        self.errors.track("getc", result)
    }

    /// Wait until queued bytes reached the device, then flush the OS queue
    pub fn flush(&mut self) -> Result<()> {
        let result = self.flush_inner();
        self.errors.track("flush", result)
    }

    fn flush_inner(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(transport) = &self.transport {
            if !transport.drain(self.flush_timeout)? {
                return Err(UartError::system(
                    "flush",
                    io::Error::new(io::ErrorKind::TimedOut, "tx buffer not drained"),
                ));
            }
        }
        self.control
            .flush()
            .map_err(|e| UartError::system("flush", e))
    }

    /// Received bytes ready for `recv()`
    pub fn bytes_available(&mut self) -> Result<usize> {
        let result = self.bytes_available_inner();
        self.errors.track("bytes_available", result)
    }

    fn bytes_available_inner(&mut self) -> Result<usize> {
        self.ensure_open()?;
        match &self.transport {
            Some(transport) => transport.bytes_available(),
            None => self
                .control
                .bytes_available()
                .map_err(|e| UartError::system("bytes_available", e)),
        }
    }

    // =========================================================================
    // Pins
    // =========================================================================

    /// Drive an output pin (RTS or DTR)
    pub fn set_pin(&mut self, pin: Pin, high: bool) -> Result<()> {
        let result = self.set_pin_inner(pin, high);
        self.errors.track("set_pin", result)
    }

    fn set_pin_inner(&mut self, pin: Pin, high: bool) -> Result<()> {
        self.ensure_open()?;
        if !pin.is_output() {
            return Err(UartError::InvalidPin {
                pin,
                access: "writable",
            });
        }
        self.control
            .write_pin(pin, high)
            .map_err(|e| UartError::system("set_pin", e))?;
        debug!("{}: {} set {}", self.name, pin, if high { "high" } else { "low" });
        Ok(())
    }

    /// Sample an input pin (CTS, DSR, DCD or RI)
    pub fn get_pin(&mut self, pin: Pin) -> Result<bool> {
        let result = self.get_pin_inner(pin);
        self.errors.track("get_pin", result)
    }

    fn get_pin_inner(&mut self, pin: Pin) -> Result<bool> {
        self.ensure_open()?;
        if pin.is_output() {
            return Err(UartError::InvalidPin {
                pin,
                access: "readable",
            });
        }
        self.control
            .read_pin(pin)
            .map_err(|e| UartError::system("get_pin", e))
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Apply a modified copy of the settings; kept only if the device accepts it
    fn reconfigure(
        &mut self,
        origin: &'static str,
        change: impl FnOnce(&mut PortSettings) -> Result<()>,
    ) -> Result<()> {
        let result = self.ensure_open().and_then(|()| {
            let mut next = self.settings.clone();
            change(&mut next)?;
            self.control
                .configure(&next)
                .map_err(|e| UartError::system(origin, e))?;
            debug!("{}: reconfigured to {}", self.name, next);
            self.settings = next;
            Ok(())
        });
        self.errors.track(origin, result)
    }

    pub fn set_baud(&mut self, baud: u32) -> Result<()> {
        self.reconfigure("set_baud", |s| {
            s.baud = validate_baud(baud)?;
            Ok(())
        })
    }

    pub fn baud(&self) -> u32 {
        self.settings.baud
    }

    pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        self.reconfigure("set_data_bits", |s| {
            s.data_bits = data_bits;
            Ok(())
        })
    }

    pub fn data_bits(&self) -> DataBits {
        self.settings.data_bits
    }

    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        self.reconfigure("set_parity", |s| {
            s.parity = parity;
            Ok(())
        })
    }

    pub fn parity(&self) -> Parity {
        self.settings.parity
    }

    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        self.reconfigure("set_stop_bits", |s| {
            s.stop_bits = stop_bits;
            Ok(())
        })
    }

    pub fn stop_bits(&self) -> StopBits {
        self.settings.stop_bits
    }

    pub fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<()> {
        self.reconfigure("set_flow_control", |s| {
            s.flow_control = flow_control;
            Ok(())
        })
    }

    pub fn flow_control(&self) -> FlowControl {
        self.settings.flow_control
    }

    /// Apply a whole option string (e.g. `7E1N`), baud rate unchanged
    pub fn set_options(&mut self, options: &str) -> Result<()> {
        self.reconfigure("set_options", |s| {
            let parsed: PortSettings = options.parse()?;
            *s = PortSettings {
                baud: s.baud,
                ..parsed
            };
            Ok(())
        })
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    // =========================================================================
    // Info
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_threaded(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Last device-scope failure
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.errors.last()
    }

    /// Pump traffic counters (threaded mode only)
    pub fn stats(&self) -> Option<Arc<TrafficStats>> {
        self.transport.as_ref().map(BufferedTransport::stats)
    }

    /// Underlying transport (threaded mode only)
    pub fn transport(&self) -> Option<&BufferedTransport> {
        self.transport.as_ref()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop the pumps, flush the OS queue and give the name back
    ///
    /// The name is released even if stopping fails. Further calls fail with
    /// `Closed`.
    pub fn close(&mut self) -> Result<()> {
        let result = self.ensure_open().and_then(|()| self.shutdown());
        self.errors.track("close", result)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.closed = true;
        let mut result = Ok(());
        if let Some(mut transport) = self.transport.take() {
            result = transport.stop();
        }
        if let Err(e) = self.control.flush() {
            warn!("{}: flush on close failed: {}", self.name, e);
        }
        self.ctx.release(&self.name);
        info!("{}: closed", self.name);
        result
    }
}

impl fmt::Debug for UartDevice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartDevice")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("threaded", &self.is_threaded())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for UartDevice<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.shutdown() {
                warn!("{}: close on drop failed: {}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::config::Config;
    use crate::error::ErrorCode;
    use std::thread;
    use std::time::Instant;

    fn context(threaded: bool) -> UartContext {
        let mut config = Config::default();
        config.transport.threaded = threaded;
        config.transport.buffer_size = 64;
        UartContext::with_config(&config).unwrap()
    }

    fn wait_for(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_direct_send_and_recv() {
        let ctx = context(false);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();
        assert!(!dev.is_threaded());
        assert!(dev.stats().is_none());

        dev.puts("AT\r\n").unwrap();
        dev.putc(b'!').unwrap();
        assert_eq!(mock.written(), b"AT\r\n!");

        mock.inject_read(b"OK");
        assert_eq!(dev.bytes_available().unwrap(), 2);
        assert_eq!(dev.getc().unwrap(), Some(b'O'));
        assert_eq!(dev.getc().unwrap(), Some(b'K'));
        assert_eq!(dev.getc().unwrap(), None);
    }

    #[test]
    fn test_recv_bytes_with_huge_limit() {
        let ctx = context(true);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();
        assert!(dev.recv_bytes(usize::MAX).unwrap().is_empty());

        mock.inject_read(b"data");
        assert!(wait_for(|| dev.bytes_available().unwrap() == 4));
        assert_eq!(&dev.recv_bytes(usize::MAX).unwrap()[..], b"data");
    }

    #[test]
    fn test_direct_recv_bytes_limited_to_pending() {
        let ctx = context(false);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();
        assert!(dev.recv_bytes(usize::MAX).unwrap().is_empty());
        assert_eq!(mock.read_calls(), 0);

        mock.inject_read(b"abcdef");
        assert_eq!(&dev.recv_bytes(usize::MAX).unwrap()[..], b"abcdef");
        mock.inject_read(b"xyz");
        assert_eq!(&dev.recv_bytes(2).unwrap()[..], b"xy");
        assert_eq!(mock.pending_read(), 1);
    }

    #[test]
    fn test_helpers_record_their_own_origin() {
        let ctx = context(false);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();

        assert!(dev.puts("").is_err());
        assert_eq!(dev.last_error().unwrap().origin, "puts");

        mock.fail_write(true);
        assert!(dev.putc(b'x').is_err());
        assert_eq!(dev.last_error().unwrap().origin, "putc");

        mock.fail_read(true);
        assert!(dev.getc().is_err());
        assert_eq!(dev.last_error().unwrap().origin, "getc");

        assert!(dev.recv_bytes(8).is_ok());
        mock.fail_available(true);
        assert!(dev.recv_bytes(8).is_err());
        assert_eq!(dev.last_error().unwrap().origin, "recv_bytes");
    }

    #[test]
    fn test_direct_short_write_is_an_error() {
        let ctx = context(false);
        let mock = MockChannel::new();
        mock.limit_writes(Some(2));
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock), PortSettings::default())
            .unwrap();

        let err = dev.send(b"hello").unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemApi);
        let record = dev.last_error().unwrap();
        assert_eq!(record.origin, "send");
        assert_eq!(record.scope, ErrorScope::Device);
    }

    #[test]
    fn test_threaded_round_trip() {
        let ctx = context(true);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();
        assert!(dev.is_threaded());

        dev.send(b"ping").unwrap();
        dev.flush().unwrap();
        assert_eq!(mock.written(), b"ping");
        assert!(mock.flushes() >= 1);

        mock.inject_read(b"pong");
        assert!(wait_for(|| dev.bytes_available().unwrap() == 4));
        assert_eq!(&dev.recv_bytes(16).unwrap()[..], b"pong");
        assert_eq!(dev.stats().unwrap().rx_bytes(), 4);
    }

    #[test]
    fn test_threaded_send_larger_than_ring() {
        let ctx = context(true);
        let mut dev = ctx
            .open_channel("mock0", Box::new(MockChannel::new()), PortSettings::default())
            .unwrap();
        let err = dev.send(&[0u8; 65]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BufferFull);
    }

    #[test]
    fn test_pin_directions() {
        let ctx = context(false);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();

        dev.set_pin(Pin::Rts, true).unwrap();
        assert!(mock.pin(Pin::Rts));
        mock.set_input(Pin::Cts, true);
        assert!(dev.get_pin(Pin::Cts).unwrap());
        assert!(!dev.get_pin(Pin::Dcd).unwrap());

        assert!(matches!(
            dev.set_pin(Pin::Cts, true),
            Err(UartError::InvalidPin { pin: Pin::Cts, .. })
        ));
        assert!(matches!(
            dev.get_pin(Pin::Dtr),
            Err(UartError::InvalidPin { pin: Pin::Dtr, .. })
        ));
    }

    #[test]
    fn test_settings_are_applied() {
        let ctx = context(false);
        let mock = MockChannel::new();
        let mut dev = ctx
            .open_channel("mock0", Box::new(mock.clone()), PortSettings::default())
            .unwrap();

        dev.set_baud(9600).unwrap();
        dev.set_parity(Parity::Even).unwrap();
        dev.set_data_bits(DataBits::Seven).unwrap();
        dev.set_stop_bits(StopBits::Two).unwrap();
        dev.set_flow_control(FlowControl::Hardware).unwrap();
        assert_eq!(dev.settings().options(), "7E2H");
        assert_eq!(mock.settings().unwrap(), *dev.settings());

        dev.set_options("8N1N").unwrap();
        assert_eq!(dev.baud(), 9600);
        assert_eq!(dev.parity(), Parity::None);
    }

    #[test]
    fn test_invalid_baud_keeps_settings() {
        let ctx = context(false);
        let mut dev = ctx
            .open_channel("mock0", Box::new(MockChannel::new()), PortSettings::default())
            .unwrap();

        let err = dev.set_baud(12_345).unwrap_err();
        assert!(matches!(err, UartError::InvalidBaud { baud: 12_345 }));
        assert_eq!(dev.baud(), crate::constants::DEFAULT_BAUD_RATE);
        assert_eq!(dev.last_error().unwrap().code, ErrorCode::InvalidBaud);
    }

    #[test]
    fn test_close_releases_name_and_rejects_io() {
        let ctx = context(true);
        let mut dev = ctx
            .open_channel("mock0", Box::new(MockChannel::new()), PortSettings::default())
            .unwrap();

        dev.close().unwrap();
        assert!(dev.is_closed());
        assert!(!ctx.is_open("mock0"));
        assert!(matches!(dev.send(b"x"), Err(UartError::Closed { .. })));
        assert!(matches!(dev.close(), Err(UartError::Closed { .. })));

        // Name can be opened again
        let _again = ctx
            .open_channel("mock0", Box::new(MockChannel::new()), PortSettings::default())
            .unwrap();
    }
}
