//! Library-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Library
// =============================================================================

/// Library name, used as prefix in error details
pub const LIB_NAME: &str = env!("CARGO_PKG_NAME");

/// Library version string
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Port defaults
// =============================================================================

/// Default baud rate when none is configured
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default frame format: 8 data bits, no parity, 1 stop bit, no flow control
pub const DEFAULT_PORT_OPTIONS: &str = "8N1N";

/// Read timeout of the OS handle (milliseconds)
///
/// Kept short so a pump blocked in a read returns quickly to check its run flag.
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 10;

// =============================================================================
// Buffered transport
// =============================================================================

/// Capacity of each rx/tx ring buffer (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1_048_576;

/// Maximum bytes the tx pump hands to the device in one write
pub const PUMP_CHUNK_SIZE: usize = 4096;

/// Sleep between two pump cycles (milliseconds)
pub const PUMP_INTERVAL_MS: u64 = 1;

/// Upper bound for `flush()` waiting on the tx ring to drain (milliseconds)
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// CLI
// =============================================================================

/// Config file name looked up next to the executable
pub const CONFIG_FILE_NAME: &str = "uartlink.toml";

/// Poll interval of the monitor loop (milliseconds)
pub const MONITOR_POLL_MS: u64 = 5;

/// Interval of the monitor throughput line (seconds)
pub const MONITOR_STATUS_SECS: u64 = 1;

/// Read chunk used by the monitor loop
pub const MONITOR_READ_SIZE: usize = 4096;

/// Channel capacity for stdin lines forwarded to the device
pub const CHANNEL_CAPACITY: usize = 256;
