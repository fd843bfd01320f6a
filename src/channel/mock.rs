//! Mock channel for testing
//!
//! Scripted in-memory device: tests inject received bytes, inspect written
//! bytes, and switch on failures to exercise the pump fault paths. Clones
//! (including `try_clone()`) share the same state.

use super::{DeviceChannel, Pin};
use crate::config::PortSettings;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

/// Mock device channel
#[derive(Clone, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<MockChannelInner>>,
}

#[derive(Default)]
struct MockChannelInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    /// Overrides the reported byte count when set
    reported_available: Option<usize>,
    /// Upper bound of bytes accepted per write call
    write_limit: Option<usize>,
    fail_available: bool,
    fail_read: bool,
    fail_write: bool,
    read_calls: usize,
    write_calls: usize,
    flushes: usize,
    settings: Option<PortSettings>,
    pins: HashMap<Pin, bool>,
}

fn broken(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("mock device failed on {}", operation),
    )
}

impl MockChannel {
    /// Create a new mock channel with nothing to read
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Bytes not yet read by the pump
    pub fn pending_read(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }

    /// Get all written data
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Report `count` available bytes regardless of the injected data
    pub fn report_available(&self, count: Option<usize>) {
        self.inner.lock().reported_available = count;
    }

    /// Accept at most `limit` bytes per write call
    pub fn limit_writes(&self, limit: Option<usize>) {
        self.inner.lock().write_limit = limit;
    }

    pub fn fail_available(&self, fail: bool) {
        self.inner.lock().fail_available = fail;
    }

    pub fn fail_read(&self, fail: bool) {
        self.inner.lock().fail_read = fail;
    }

    pub fn fail_write(&self, fail: bool) {
        self.inner.lock().fail_write = fail;
    }

    /// Number of `read()` calls so far
    pub fn read_calls(&self) -> usize {
        self.inner.lock().read_calls
    }

    /// Number of `write()` calls so far
    pub fn write_calls(&self) -> usize {
        self.inner.lock().write_calls
    }

    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }

    /// Settings last applied through `configure()`
    pub fn settings(&self) -> Option<PortSettings> {
        self.inner.lock().settings.clone()
    }

    /// Set the level an input pin reports
    pub fn set_input(&self, pin: Pin, high: bool) {
        self.inner.lock().pins.insert(pin, high);
    }

    /// Level last driven on a pin (false if never set)
    pub fn pin(&self, pin: Pin) -> bool {
        self.inner.lock().pins.get(&pin).copied().unwrap_or(false)
    }
}

impl DeviceChannel for MockChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let inner = self.inner.lock();
        if inner.fail_available {
            return Err(broken("bytes_available"));
        }
        Ok(inner.reported_available.unwrap_or(inner.read_buffer.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        inner.read_calls += 1;
        if inner.fail_read {
            return Err(broken("read"));
        }
        let n = inner.read_buffer.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(inner.read_buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        inner.write_calls += 1;
        if inner.fail_write {
            return Err(broken("write"));
        }
        let n = inner.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        inner.write_buffer.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flushes += 1;
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn DeviceChannel>> {
        Ok(Box::new(self.clone()))
    }

    fn configure(&mut self, settings: &PortSettings) -> io::Result<()> {
        self.inner.lock().settings = Some(settings.clone());
        Ok(())
    }

    fn write_pin(&mut self, pin: Pin, high: bool) -> io::Result<()> {
        self.inner.lock().pins.insert(pin, high);
        Ok(())
    }

    fn read_pin(&mut self, pin: Pin) -> io::Result<bool> {
        Ok(self.pin(pin))
    }
}
