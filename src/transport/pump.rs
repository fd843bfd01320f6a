//! Pump loops moving bytes between a device channel and a ring
//!
//! Both pumps share one loop:
//! 1. take the buffer-lock and run one transfer cycle
//! 2. on a device failure, lower the run flag with the fault and exit
//! 3. release the buffer-lock, check the run flag, sleep one interval
//!
//! Only the cycle differs per direction.

use super::lane::{Lane, PumpFault};
use super::ring::RingBuffer;
use super::stats::TrafficStats;
use crate::channel::DeviceChannel;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace};

/// One rx transfer: device -> ring
///
/// Reads only when the whole pending amount fits into the ring. Otherwise the
/// bytes stay in the OS driver until the caller drains the ring.
pub(crate) fn rx_cycle(
    ring: &mut RingBuffer,
    channel: &mut dyn DeviceChannel,
    scratch: &mut Vec<u8>,
    stats: &TrafficStats,
) -> Result<usize, PumpFault> {
    let available = channel
        .bytes_available()
        .map_err(|e| PumpFault::from_io("bytes_available", &e))?;

    if available == 0 {
        return Ok(0);
    }
    let free = ring.available_free();
    if free < available {
        trace!("rx backpressure: {} pending, {} free", available, free);
        return Ok(0);
    }

    scratch.resize(available, 0);
    let n = channel
        .read(&mut scratch[..available])
        .map_err(|e| PumpFault::from_io("read", &e))?;
    if n == 0 {
        return Ok(0);
    }

    ring.write(&scratch[..n]).map_err(|e| PumpFault {
        operation: "ring_write",
        kind: io::ErrorKind::Other,
        message: e.to_string(),
    })?;
    stats.add_rx(n);
    Ok(n)
}

/// One tx transfer: ring -> device
///
/// Bytes are peeked, written, and only then removed from the ring, so a short
/// write keeps the unwritten remainder queued.
pub(crate) fn tx_cycle(
    ring: &mut RingBuffer,
    channel: &mut dyn DeviceChannel,
    scratch: &mut [u8],
    stats: &TrafficStats,
) -> Result<usize, PumpFault> {
    let n = ring.available_used().min(scratch.len());
    if n == 0 {
        return Ok(0);
    }

    let chunk = &mut scratch[..n];
    ring.peek(chunk).map_err(|e| PumpFault {
        operation: "ring_peek",
        kind: io::ErrorKind::Other,
        message: e.to_string(),
    })?;

    let written = channel
        .write(chunk)
        .map_err(|e| PumpFault::from_io("write", &e))?
        .min(n);

    if written > 0 {
        // Cannot fail: written <= n <= used
        let _ = ring.discard(written);
        stats.add_tx(written);
    }
    if written < n {
        return Err(PumpFault::short_write(n, written));
    }
    Ok(written)
}

/// Drive `cycle` until the lane's run flag drops or the cycle faults
pub(crate) fn run<F>(lane: Arc<Lane>, interval: Duration, mut cycle: F)
where
    F: FnMut(&mut RingBuffer) -> Result<usize, PumpFault>,
{
    let direction = lane.direction();
    debug!("{} pump started", direction);

    loop {
        {
            let mut guard = lane.lock_buffer();
            let Some(ring) = guard.as_mut() else {
                break;
            };
            if let Err(fault) = cycle(ring) {
                error!("{} pump stopped: {}", direction, fault);
                // buffer-lock is held: flag-mutex comes second
                lane.halt(fault);
                break;
            }
        }

        if !lane.is_running() {
            break;
        }
        thread::sleep(interval);
    }

    debug!("{} pump exited", direction);
}

/// Receive pump body
pub(crate) fn run_rx(
    lane: Arc<Lane>,
    mut channel: Box<dyn DeviceChannel>,
    stats: Arc<TrafficStats>,
    interval: Duration,
) {
    let mut scratch = Vec::new();
    run(lane, interval, |ring| {
        rx_cycle(ring, channel.as_mut(), &mut scratch, &stats)
    });
}

/// Transmit pump body
pub(crate) fn run_tx(
    lane: Arc<Lane>,
    mut channel: Box<dyn DeviceChannel>,
    stats: Arc<TrafficStats>,
    interval: Duration,
    chunk_size: usize,
) {
    let mut scratch = vec![0u8; chunk_size];
    run(lane, interval, |ring| {
        tx_cycle(ring, channel.as_mut(), &mut scratch, &stats)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::transport::Direction;

    fn drain(ring: &mut RingBuffer) -> Vec<u8> {
        let mut out = vec![0u8; ring.available_used()];
        ring.read(&mut out).unwrap();
        out
    }

    #[test]
    fn test_rx_cycle_moves_pending_bytes() {
        let mut ring = RingBuffer::new(16).unwrap();
        let mut mock = MockChannel::new();
        let stats = TrafficStats::new();
        mock.inject_read(b"abcdef");

        let n = rx_cycle(&mut ring, &mut mock, &mut Vec::new(), &stats).unwrap();
        assert_eq!(n, 6);
        assert_eq!(drain(&mut ring), b"abcdef");
        assert_eq!(stats.rx_bytes(), 6);
    }

    #[test]
    fn test_rx_cycle_backpressure_leaves_ring_unchanged() {
        let mut ring = RingBuffer::new(10).unwrap();
        let mut mock = MockChannel::new();
        let stats = TrafficStats::new();
        mock.inject_read(&[7u8; 20]);

        let n = rx_cycle(&mut ring, &mut mock, &mut Vec::new(), &stats).unwrap();
        assert_eq!(n, 0);
        assert_eq!(ring.available_used(), 0);
        assert_eq!(mock.read_calls(), 0);
        assert_eq!(mock.pending_read(), 20);
    }

    #[test]
    fn test_rx_cycle_idle_without_data() {
        let mut ring = RingBuffer::new(10).unwrap();
        let mut mock = MockChannel::new();
        let n = rx_cycle(&mut ring, &mut mock, &mut Vec::new(), &TrafficStats::new()).unwrap();
        assert_eq!(n, 0);
        assert_eq!(mock.read_calls(), 0);
    }

    #[test]
    fn test_rx_cycle_faults() {
        let mut ring = RingBuffer::new(10).unwrap();
        let mut mock = MockChannel::new();
        mock.fail_available(true);
        let fault = rx_cycle(&mut ring, &mut mock, &mut Vec::new(), &TrafficStats::new())
            .unwrap_err();
        assert_eq!(fault.operation, "bytes_available");

        mock.fail_available(false);
        mock.inject_read(b"xy");
        mock.fail_read(true);
        let fault = rx_cycle(&mut ring, &mut mock, &mut Vec::new(), &TrafficStats::new())
            .unwrap_err();
        assert_eq!(fault.operation, "read");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_tx_cycle_writes_in_chunks() {
        let mut ring = RingBuffer::new(32).unwrap();
        let mut mock = MockChannel::new();
        let stats = TrafficStats::new();
        let data: Vec<u8> = (0..20).collect();
        ring.write(&data).unwrap();

        let mut scratch = [0u8; 8];
        assert_eq!(tx_cycle(&mut ring, &mut mock, &mut scratch, &stats).unwrap(), 8);
        assert_eq!(tx_cycle(&mut ring, &mut mock, &mut scratch, &stats).unwrap(), 8);
        assert_eq!(tx_cycle(&mut ring, &mut mock, &mut scratch, &stats).unwrap(), 4);
        assert_eq!(tx_cycle(&mut ring, &mut mock, &mut scratch, &stats).unwrap(), 0);

        assert_eq!(mock.written(), data);
        assert_eq!(mock.write_calls(), 3);
        assert_eq!(stats.tx_bytes(), 20);
    }

    #[test]
    fn test_tx_cycle_short_write_keeps_remainder() {
        let mut ring = RingBuffer::new(32).unwrap();
        let mut mock = MockChannel::new();
        mock.limit_writes(Some(3));
        ring.write(b"abcdefgh").unwrap();

        let mut scratch = [0u8; 16];
        let fault = tx_cycle(&mut ring, &mut mock, &mut scratch, &TrafficStats::new())
            .unwrap_err();
        assert_eq!(fault.kind, io::ErrorKind::WriteZero);
        assert_eq!(mock.written(), b"abc");
        assert_eq!(drain(&mut ring), b"defgh");
    }

    #[test]
    fn test_tx_cycle_failed_write_keeps_everything() {
        let mut ring = RingBuffer::new(32).unwrap();
        let mut mock = MockChannel::new();
        mock.fail_write(true);
        ring.write(b"abc").unwrap();

        let mut scratch = [0u8; 16];
        assert!(tx_cycle(&mut ring, &mut mock, &mut scratch, &TrafficStats::new()).is_err());
        assert_eq!(ring.available_used(), 3);
    }

    #[test]
    fn test_run_exits_on_fault_and_records_it() {
        let lane = Arc::new(Lane::new(Direction::Rx));
        lane.arm(RingBuffer::new(8).unwrap());
        let mock = MockChannel::new();
        mock.fail_available(true);

        // Runs on the current thread; returns once the fault stops it
        run_rx(
            lane.clone(),
            Box::new(mock),
            Arc::new(TrafficStats::new()),
            Duration::from_millis(1),
        );

        assert!(!lane.is_running());
        assert_eq!(lane.fault().unwrap().operation, "bytes_available");
    }

    #[test]
    fn test_run_exits_when_flag_lowered() {
        let lane = Arc::new(Lane::new(Direction::Tx));
        lane.arm(RingBuffer::new(8).unwrap());
        lane.signal_stop();

        let mut cycles = 0;
        run(lane.clone(), Duration::from_millis(1), |_| {
            cycles += 1;
            Ok(0)
        });
        // Flag is checked after each cycle
        assert_eq!(cycles, 1);
        assert!(lane.fault().is_none());
    }
}
