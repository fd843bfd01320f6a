//! One direction of a buffered transport
//!
//! A lane pairs a ring buffer with two locks serving disjoint purposes:
//! - **buffer-lock**: guards the ring (pump vs facade access)
//! - **flag-mutex**: guards the run flag and the fault slot
//!
//! Lock order is buffer-lock then flag-mutex, never the reverse. Signaling
//! stop only takes the flag-mutex, so it never waits on device I/O.

use super::ring::RingBuffer;
use crate::error::{Result, UartError};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;
use std::io;

/// Transfer direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    /// Device to host
    Rx,
    /// Host to device
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => f.write_str("rx"),
            Direction::Tx => f.write_str("tx"),
        }
    }
}

/// Lifecycle of one pump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PumpState {
    Stopped,
    Running,
    /// Stop signaled, pump not yet exited
    Stopping,
}

/// Device failure that made a pump stop itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpFault {
    /// Channel call that failed
    pub operation: &'static str,
    pub kind: io::ErrorKind,
    pub message: String,
}

impl PumpFault {
    pub(crate) fn from_io(operation: &'static str, error: &io::Error) -> Self {
        Self {
            operation,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Write accepted fewer bytes than requested
    pub(crate) fn short_write(requested: usize, written: usize) -> Self {
        Self {
            operation: "write",
            kind: io::ErrorKind::WriteZero,
            message: format!("could not send all data ({} of {} bytes)", written, requested),
        }
    }
}

impl fmt::Display for PumpFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(): {}", self.operation, self.message)
    }
}

/// State behind the flag-mutex
#[derive(Debug, Default)]
struct RunState {
    running: bool,
    fault: Option<PumpFault>,
}

/// Ring buffer plus synchronization for one direction
pub(crate) struct Lane {
    direction: Direction,
    /// buffer-lock; `None` while the transport is stopped
    buffer: Mutex<Option<RingBuffer>>,
    /// flag-mutex
    run: Mutex<RunState>,
}

impl Lane {
    pub(crate) fn new(direction: Direction) -> Self {
        Self {
            direction,
            buffer: Mutex::new(None),
            run: Mutex::new(RunState::default()),
        }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    /// Take the buffer-lock
    pub(crate) fn lock_buffer(&self) -> MutexGuard<'_, Option<RingBuffer>> {
        self.buffer.lock()
    }

    /// Run `f` on the ring under the buffer-lock
    ///
    /// Fails with `NotRunning` once the ring has been released.
    pub(crate) fn with_ring<T>(&self, f: impl FnOnce(&mut RingBuffer) -> Result<T>) -> Result<T> {
        let mut guard = self.buffer.lock();
        match guard.as_mut() {
            Some(ring) => f(ring),
            None => Err(UartError::NotRunning),
        }
    }

    /// Install a fresh ring and raise the run flag
    pub(crate) fn arm(&self, ring: RingBuffer) {
        *self.buffer.lock() = Some(ring);
        let mut run = self.run.lock();
        run.running = true;
        run.fault = None;
    }

    /// Lower the run flag (stop signal)
    pub(crate) fn signal_stop(&self) {
        self.run.lock().running = false;
    }

    /// Lower the run flag and remember why
    pub(crate) fn halt(&self, fault: PumpFault) {
        let mut run = self.run.lock();
        run.running = false;
        run.fault = Some(fault);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.run.lock().running
    }

    pub(crate) fn fault(&self) -> Option<PumpFault> {
        self.run.lock().fault.clone()
    }

    /// Drop the ring; only after the pump has been joined
    pub(crate) fn release(&self) {
        *self.buffer.lock() = None;
    }

    /// Error to surface when this lane's pump has died
    pub(crate) fn degraded(&self) -> Option<UartError> {
        self.fault().map(|fault| UartError::TransportDegraded {
            direction: self.direction,
            fault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_missing_until_armed() {
        let lane = Lane::new(Direction::Rx);
        assert!(matches!(
            lane.with_ring(|r| Ok(r.available_used())),
            Err(UartError::NotRunning)
        ));

        lane.arm(RingBuffer::new(4).unwrap());
        assert!(lane.is_running());
        assert_eq!(lane.with_ring(|r| Ok(r.capacity())).unwrap(), 4);

        lane.signal_stop();
        assert!(!lane.is_running());
        lane.release();
        assert!(lane.with_ring(|r| Ok(r.capacity())).is_err());
    }

    #[test]
    fn test_halt_records_fault() {
        let lane = Lane::new(Direction::Tx);
        lane.arm(RingBuffer::new(4).unwrap());
        assert!(lane.degraded().is_none());

        lane.halt(PumpFault::short_write(10, 4));
        assert!(!lane.is_running());
        let err = lane.degraded().unwrap();
        assert!(matches!(
            err,
            UartError::TransportDegraded {
                direction: Direction::Tx,
                ..
            }
        ));
        assert!(err.to_string().contains("4 of 10 bytes"));

        // Re-arming clears the previous fault
        lane.arm(RingBuffer::new(4).unwrap());
        assert!(lane.fault().is_none());
    }
}
