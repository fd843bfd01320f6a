//! Library context
//!
//! A `UartContext` replaces process-wide "initialized" state: constructing
//! it initializes the library, and every device opened through it borrows
//! it, so no device can outlive its context.
//!
//! The context also keeps the device listing and the set of names that are
//! currently open, and records context-scope failures (open, listing).

use crate::channel::{self, DeviceChannel, DeviceInfo, SerialChannel};
use crate::config::{Config, PortSettings, TransportOptions};
use crate::constants::{LIB_NAME, LIB_VERSION};
use crate::device::UartDevice;
use crate::error::{ErrorRecord, ErrorScope, ErrorSlot, Result, UartError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Default)]
struct Registry {
    known: Vec<DeviceInfo>,
    open: HashSet<String>,
}

/// Owner of library-wide state
pub struct UartContext {
    threaded: bool,
    transport: TransportOptions,
    read_timeout: Duration,
    flush_timeout: Duration,
    registry: Mutex<Registry>,
    errors: ErrorSlot,
}

impl UartContext {
    /// Initialize with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    /// Initialize from a loaded config
    ///
    /// The initial device listing is best effort: a failing OS enumeration
    /// is logged and leaves the listing empty.
    pub fn with_config(config: &Config) -> Result<Self> {
        let transport = config.transport.options()?;
        let ctx = Self {
            threaded: config.transport.threaded,
            transport,
            read_timeout: config.port.timeout(),
            flush_timeout: config.transport.flush_timeout(),
            registry: Mutex::new(Registry::default()),
            errors: ErrorSlot::new(ErrorScope::Context),
        };

        match channel::available_ports() {
            Ok(ports) => {
                debug!("{} serial device(s) found", ports.len());
                ctx.registry.lock().known = ports;
            }
            Err(e) => warn!("Device enumeration failed: {}", e),
        }
        debug!(
            "{} {} initialized ({} mode)",
            LIB_NAME,
            LIB_VERSION,
            if ctx.threaded { "threaded" } else { "direct" }
        );
        Ok(ctx)
    }

    /// Refresh and return the device listing
    ///
    /// Devices currently open through this context are flagged `opened`.
    pub fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let ports = self.errors.track("devices", channel::available_ports())?;
        let mut registry = self.registry.lock();
        registry.known = ports
            .into_iter()
            .map(|mut info| {
                info.opened = registry.open.contains(&info.name);
                info
            })
            .collect();
        Ok(registry.known.clone())
    }

    /// Open a native serial device by name
    pub fn open(&self, name: &str, settings: PortSettings) -> Result<UartDevice<'_>> {
        let result = self.reserve(name).and_then(|()| {
            let channel = SerialChannel::open(name, &settings, self.read_timeout)
                .inspect_err(|_| self.release(name))?;
            UartDevice::open(self, name, Box::new(channel), settings)
                .inspect_err(|_| self.release(name))
        });
        self.errors.track("open", result)
    }

    /// Open a device over any channel implementation
    ///
    /// `settings` are applied to the channel before any transfer starts.
    pub fn open_channel(
        &self,
        name: &str,
        mut channel: Box<dyn DeviceChannel>,
        settings: PortSettings,
    ) -> Result<UartDevice<'_>> {
        let result = self.reserve(name).and_then(|()| {
            channel
                .configure(&settings)
                .map_err(|e| UartError::system("configure", e))
                .and_then(|()| UartDevice::open(self, name, channel, settings))
                .inspect_err(|_| self.release(name))
        });
        self.errors.track("open", result)
    }

    /// Whether `name` is currently open through this context
    pub fn is_open(&self, name: &str) -> bool {
        self.registry.lock().open.contains(name)
    }

    /// Last context-scope failure
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.errors.last()
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    pub(crate) fn transport_options(&self) -> &TransportOptions {
        &self.transport
    }

    pub(crate) fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    fn reserve(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(UartError::InvalidArgument {
                reason: "empty device name",
            });
        }
        if !self.registry.lock().open.insert(name.to_string()) {
            return Err(UartError::DeviceBusy {
                port: name.to_string(),
            });
        }
        Ok(())
    }

    /// Forget an open name (device closed or open failed)
    pub(crate) fn release(&self, name: &str) {
        self.registry.lock().open.remove(name);
    }
}
