//! Centralized error types for the library
//!
//! All library errors are represented by the `UartError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, UartError>`.
//!
//! Failing public operations also leave an [`ErrorRecord`] in the
//! [`ErrorSlot`] of their scope (context or device), so callers that only
//! keep a status can query the last failure afterwards.

use crate::channel::Pin;
use crate::constants::LIB_NAME;
use crate::transport::{Direction, PumpFault};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// All library errors
#[derive(Debug)]
pub enum UartError {
    // === Arguments ===
    /// Bad length or empty buffer handed to a buffer operation
    InvalidArgument { reason: &'static str },

    // === Ring buffer ===
    /// Write does not fit into the free space of a ring
    BufferFull { requested: usize, free: usize },
    /// Read asks for more bytes than a ring holds
    OutOfRange { requested: usize, available: usize },

    // === System ===
    /// OS call on the device failed
    SystemApi {
        operation: &'static str,
        source: std::io::Error,
    },
    /// Failed to open a serial device
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Access to the device was denied by the OS
    Permission { port: String },

    // === Lifecycle ===
    /// Operation needs a running transport
    NotRunning,
    /// Transport was started twice
    AlreadyRunning,
    /// Device was already closed
    Closed { port: String },
    /// Device is already opened through this context
    DeviceBusy { port: String },
    /// Background pump could not be launched
    PumpSpawn {
        direction: Direction,
        source: std::io::Error,
    },
    /// Background pump panicked before it was joined
    PumpPanicked { direction: Direction },
    /// A pump stopped itself after a device failure
    TransportDegraded {
        direction: Direction,
        fault: PumpFault,
    },

    // === Port settings ===
    /// Baud rate not supported on this platform
    InvalidBaud { baud: u32 },
    /// Unsupported number of data bits
    InvalidDataBits { value: String },
    /// Unsupported parity
    InvalidParity { value: String },
    /// Unsupported number of stop bits
    InvalidStopBits { value: String },
    /// Unsupported flow control mode
    InvalidFlowControl { value: String },
    /// Malformed option string
    InvalidOption { option: String, reason: String },
    /// Pin cannot be accessed in the requested direction
    InvalidPin { pin: Pin, access: &'static str },

    // === Config ===
    /// File system operation failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },
}

impl std::error::Error for UartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SystemApi { source, .. }
            | Self::SerialOpen { source, .. }
            | Self::PumpSpawn { source, .. }
            | Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for UartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { reason } => write!(f, "Invalid argument: {}", reason),
            Self::BufferFull { requested, free } => {
                write!(f, "Buffer full: {} bytes requested, {} free", requested, free)
            }
            Self::OutOfRange {
                requested,
                available,
            } => write!(
                f,
                "Out of range: {} bytes requested, {} available",
                requested, available
            ),
            Self::SystemApi { operation, source } => {
                write!(f, "System call {}() failed: {}", operation, source)
            }
            Self::SerialOpen { port, .. } => write!(f, "Cannot open serial port: {}", port),
            Self::Permission { port } => write!(f, "Permission denied: {}", port),
            Self::NotRunning => write!(f, "Transport not running"),
            Self::AlreadyRunning => write!(f, "Transport already running"),
            Self::Closed { port } => write!(f, "Device closed: {}", port),
            Self::DeviceBusy { port } => write!(f, "Device already open: {}", port),
            Self::PumpSpawn { direction, .. } => {
                write!(f, "Cannot start {} pump", direction)
            }
            Self::PumpPanicked { direction } => write!(f, "{} pump panicked", direction),
            Self::TransportDegraded { direction, fault } => {
                write!(f, "Transport degraded: {} pump stopped ({})", direction, fault)
            }
            Self::InvalidBaud { baud } => write!(f, "Invalid baud rate: {}", baud),
            Self::InvalidDataBits { value } => write!(f, "Unsupported data bits: {}", value),
            Self::InvalidParity { value } => write!(f, "Unsupported parity: {}", value),
            Self::InvalidStopBits { value } => write!(f, "Unsupported stop bits: {}", value),
            Self::InvalidFlowControl { value } => {
                write!(f, "Unsupported flow control: {}", value)
            }
            Self::InvalidOption { option, reason } => {
                write!(f, "Invalid option '{}': {}", option, reason)
            }
            Self::InvalidPin { pin, access } => write!(f, "Pin {} is not {}", pin, access),
            Self::Io { path, .. } => write!(f, "IO error: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
        }
    }
}

impl UartError {
    /// Categorical code of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::BufferFull { .. } => ErrorCode::BufferFull,
            Self::OutOfRange { .. } => ErrorCode::OutOfRange,
            Self::SystemApi { .. } | Self::SerialOpen { .. } => ErrorCode::SystemApi,
            Self::Permission { .. } => ErrorCode::Permission,
            Self::NotRunning
            | Self::AlreadyRunning
            | Self::Closed { .. }
            | Self::PumpSpawn { .. }
            | Self::PumpPanicked { .. } => ErrorCode::Lifecycle,
            Self::DeviceBusy { .. } => ErrorCode::DeviceBusy,
            Self::TransportDegraded { .. } => ErrorCode::Degraded,
            Self::InvalidBaud { .. } => ErrorCode::InvalidBaud,
            Self::InvalidDataBits { .. } => ErrorCode::InvalidDataBits,
            Self::InvalidParity { .. } => ErrorCode::InvalidParity,
            Self::InvalidStopBits { .. } => ErrorCode::InvalidStopBits,
            Self::InvalidFlowControl { .. } => ErrorCode::InvalidFlowControl,
            Self::InvalidOption { .. } => ErrorCode::InvalidOption,
            Self::InvalidPin { .. } => ErrorCode::InvalidPin,
            Self::Io { .. } | Self::ConfigValidation { .. } => ErrorCode::Config,
        }
    }

    /// Wrap an OS error from a device call
    pub(crate) fn system(operation: &'static str, source: std::io::Error) -> Self {
        Self::SystemApi { operation, source }
    }
}

/// Alias for Result with UartError
pub type Result<T> = std::result::Result<T, UartError>;

// =============================================================================
// Error codes
// =============================================================================

/// Error category, stable across error detail changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    BufferFull,
    OutOfRange,
    SystemApi,
    Permission,
    Lifecycle,
    DeviceBusy,
    Degraded,
    InvalidBaud,
    InvalidDataBits,
    InvalidParity,
    InvalidStopBits,
    InvalidFlowControl,
    InvalidOption,
    InvalidPin,
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::BufferFull => "buffer full",
            Self::OutOfRange => "out of range",
            Self::SystemApi => "system api",
            Self::Permission => "permission",
            Self::Lifecycle => "lifecycle",
            Self::DeviceBusy => "device busy",
            Self::Degraded => "transport degraded",
            Self::InvalidBaud => "invalid baud rate",
            Self::InvalidDataBits => "invalid data bits",
            Self::InvalidParity => "invalid parity",
            Self::InvalidStopBits => "invalid stop bits",
            Self::InvalidFlowControl => "invalid flow control",
            Self::InvalidOption => "invalid option",
            Self::InvalidPin => "invalid pin",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Error sink
// =============================================================================

/// Which handle an error was recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Context,
    Device,
}

/// A recorded failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub scope: ErrorScope,
    pub code: ErrorCode,
    /// Public operation that failed (e.g. "send", "open")
    pub origin: &'static str,
    /// Formatted error message
    pub detail: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] error: {}(): {}", LIB_NAME, self.origin, self.detail)
    }
}

/// Last-error slot of a context or device
#[derive(Debug)]
pub struct ErrorSlot {
    scope: ErrorScope,
    last: Mutex<Option<ErrorRecord>>,
}

impl ErrorSlot {
    pub fn new(scope: ErrorScope) -> Self {
        Self {
            scope,
            last: Mutex::new(None),
        }
    }

    /// Record a failure, replacing the previous one
    pub fn record(&self, origin: &'static str, error: &UartError) {
        let record = ErrorRecord {
            scope: self.scope,
            code: error.code(),
            origin,
            detail: error.to_string(),
        };
        debug!("{}", record);
        *self.last.lock() = Some(record);
    }

    /// Record the error of a failed result, passing the result through
    pub fn track<T>(&self, origin: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.record(origin, e);
        }
        result
    }

    /// Last recorded failure
    pub fn last(&self) -> Option<ErrorRecord> {
        self.last.lock().clone()
    }
}
