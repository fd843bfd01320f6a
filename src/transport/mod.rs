//! Threaded buffered transport
//!
//! Puts a pair of ring buffers and two background pumps between a device
//! channel and the caller:
//! - **rx pump**: device -> rx ring, drained by `recv()`
//! - **tx pump**: tx ring -> device, filled by `send()`
//!
//! `send()` and `recv()` never wait on the device: they only take the
//! buffer-lock of their direction, which pumps hold for one transfer at most.
//!
//! # Lifecycle
//!
//! 1. `BufferedTransport::new()` allocates the per-direction locks
//! 2. `start()` allocates both rings and launches both pumps
//! 3. `send()` / `recv()` while running
//! 4. `stop()` signals both pumps, joins them, then frees the rings
//!
//! A pump that hits a device error stops by itself and leaves a fault in its
//! lane. The facade reports it as `TransportDegraded`.
//!
//! # Example
//!
//! ```ignore
//! let mut transport = BufferedTransport::new("ttyUSB0", TransportOptions::default())?;
//! transport.start(channel)?;
//! transport.send(b"AT\r\n")?;
//! let mut buf = [0u8; 64];
//! let n = transport.recv(&mut buf)?;
//! transport.stop()?;
//! ```

mod lane;
mod pump;
pub mod ring;
pub mod stats;

pub use lane::{Direction, PumpFault, PumpState};
pub use ring::RingBuffer;
pub use stats::{TrafficSnapshot, TrafficStats};

use crate::channel::DeviceChannel;
use crate::config::TransportOptions;
use crate::error::{Result, UartError};
use bytes::Bytes;
use lane::Lane;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ring-buffered transport with background rx/tx pumps
pub struct BufferedTransport {
    /// Used for thread names and logs
    label: String,
    options: TransportOptions,
    rx: Arc<Lane>,
    tx: Arc<Lane>,
    rx_pump: Option<JoinHandle<()>>,
    tx_pump: Option<JoinHandle<()>>,
    stats: Arc<TrafficStats>,
}

impl BufferedTransport {
    /// Create a stopped transport
    pub fn new(label: impl Into<String>, options: TransportOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            label: label.into(),
            options,
            rx: Arc::new(Lane::new(Direction::Rx)),
            tx: Arc::new(Lane::new(Direction::Tx)),
            rx_pump: None,
            tx_pump: None,
            stats: Arc::new(TrafficStats::new()),
        })
    }

    /// Allocate both rings and launch both pumps on `channel`
    ///
    /// The tx pump gets a cloned handle. If either pump cannot be launched,
    /// anything already launched is stopped and joined before returning.
    pub fn start(&mut self, channel: Box<dyn DeviceChannel>) -> Result<()> {
        if self.rx_pump.is_some() || self.tx_pump.is_some() {
            return Err(UartError::AlreadyRunning);
        }

        let tx_channel = channel
            .try_clone()
            .map_err(|e| UartError::system("try_clone", e))?;

        let rx_ring = RingBuffer::new(self.options.buffer_size)?;
        let tx_ring = RingBuffer::new(self.options.buffer_size)?;
        self.rx.arm(rx_ring);
        self.tx.arm(tx_ring);

        let interval = self.options.pump_interval;
        let chunk_size = self.options.chunk_size;

        let rx_lane = self.rx.clone();
        let rx_stats = self.stats.clone();
        let rx_pump = thread::Builder::new()
            .name(format!("uart-rx:{}", self.label))
            .spawn(move || pump::run_rx(rx_lane, channel, rx_stats, interval));
        match rx_pump {
            Ok(handle) => self.rx_pump = Some(handle),
            Err(source) => {
                self.abort_start();
                return Err(UartError::PumpSpawn {
                    direction: Direction::Rx,
                    source,
                });
            }
        }

        let tx_lane = self.tx.clone();
        let tx_stats = self.stats.clone();
        let tx_pump = thread::Builder::new()
            .name(format!("uart-tx:{}", self.label))
            .spawn(move || pump::run_tx(tx_lane, tx_channel, tx_stats, interval, chunk_size));
        match tx_pump {
            Ok(handle) => self.tx_pump = Some(handle),
            Err(source) => {
                self.abort_start();
                return Err(UartError::PumpSpawn {
                    direction: Direction::Tx,
                    source,
                });
            }
        }

        info!(
            "{}: buffered transport started ({} byte rings)",
            self.label, self.options.buffer_size
        );
        Ok(())
    }

    /// Undo a partial start: signal, join whatever runs, free the rings
    fn abort_start(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("{}: cleanup after failed start: {}", self.label, e);
        }
    }

    /// Signal both pumps, wait for them, then free both rings
    ///
    /// Fails with `NotRunning` if the transport was never started or is
    /// already stopped.
    pub fn stop(&mut self) -> Result<()> {
        if self.rx_pump.is_none() && self.tx_pump.is_none() {
            return Err(UartError::NotRunning);
        }
        self.shutdown()?;
        info!("{}: buffered transport stopped", self.label);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        // Signal first: only the flag-mutexes are taken here
        self.rx.signal_stop();
        self.tx.signal_stop();

        let mut result = Ok(());
        for (direction, handle) in [
            (Direction::Rx, self.rx_pump.take()),
            (Direction::Tx, self.tx_pump.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    result = Err(UartError::PumpPanicked { direction });
                }
            }
        }

        // Pumps are gone: rings can be freed
        self.rx.release();
        self.tx.release();
        debug!("{}: rings released", self.label);
        result
    }

    /// Whether `start()` has been called without a matching `stop()`
    pub fn is_running(&self) -> bool {
        self.rx_pump.is_some() || self.tx_pump.is_some()
    }

    /// Lifecycle state of one pump
    pub fn pump_state(&self, direction: Direction) -> PumpState {
        let (lane, handle) = match direction {
            Direction::Rx => (&self.rx, &self.rx_pump),
            Direction::Tx => (&self.tx, &self.tx_pump),
        };
        match handle {
            None => PumpState::Stopped,
            Some(_) if lane.is_running() => PumpState::Running,
            Some(h) if h.is_finished() => PumpState::Stopped,
            Some(_) => PumpState::Stopping,
        }
    }

    /// Device failure that stopped a pump, if any
    pub fn fault(&self, direction: Direction) -> Option<PumpFault> {
        match direction {
            Direction::Rx => self.rx.fault(),
            Direction::Tx => self.tx.fault(),
        }
    }

    // =========================================================================
    // Facade
    // =========================================================================

    /// Queue all of `data` for transmission
    ///
    /// Success means accepted into the tx ring, not yet on the wire. Fails
    /// with `BufferFull` when the ring lacks room (nothing is queued), and
    /// with `TransportDegraded` once the tx pump has died.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        if let Some(err) = self.tx.degraded() {
            return Err(err);
        }
        self.tx.with_ring(|ring| {
            let free = ring.available_free();
            if free < data.len() {
                return Err(UartError::BufferFull {
                    requested: data.len(),
                    free,
                });
            }
            ring.write(data)
        })
    }

    /// Move up to `buf.len()` received bytes into `buf`
    ///
    /// Returns 0 when nothing has arrived. Bytes received before an rx pump
    /// failure are still delivered; after that `TransportDegraded` is returned.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.rx.with_ring(|ring| {
            let n = ring.available_used().min(buf.len());
            if n == 0 {
                return Ok(0);
            }
            ring.read(&mut buf[..n])
        })?;

        if n == 0 {
            if let Some(err) = self.rx.degraded() {
                return Err(err);
            }
        }
        Ok(n)
    }

    /// Receive up to `max_len` bytes into a new buffer
    pub fn recv_bytes(&self, max_len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; max_len.min(self.options.buffer_size)];
        let n = self.recv(&mut buf)?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    /// Received bytes waiting in the rx ring
    pub fn bytes_available(&self) -> Result<usize> {
        self.rx.with_ring(|ring| Ok(ring.available_used()))
    }

    /// Bytes queued in the tx ring, not yet handed to the device
    pub fn bytes_pending(&self) -> Result<usize> {
        self.tx.with_ring(|ring| Ok(ring.available_used()))
    }

    /// Free space in the tx ring
    pub fn send_capacity(&self) -> Result<usize> {
        self.tx.with_ring(|ring| Ok(ring.available_free()))
    }

    /// Drop everything queued in both rings
    pub fn clear(&self) -> Result<()> {
        self.rx.with_ring(|ring| {
            ring.clear();
            Ok(())
        })?;
        self.tx.with_ring(|ring| {
            ring.clear();
            Ok(())
        })
    }

    /// Wait until the tx pump has handed every queued byte to the device
    ///
    /// Returns `Ok(false)` when `timeout` expires first.
    pub fn drain(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.bytes_pending()? == 0 {
                return Ok(true);
            }
            if let Some(err) = self.tx.degraded() {
                return Err(err);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(self.options.pump_interval);
        }
    }

    /// Traffic counters of the pumps
    pub fn stats(&self) -> Arc<TrafficStats> {
        self.stats.clone()
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }
}

impl Drop for BufferedTransport {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                warn!("{}: stop on drop failed: {}", self.label, e);
            }
        }
    }
}
