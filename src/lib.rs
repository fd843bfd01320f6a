//! uartlink - portable UART access with a threaded, ring-buffered transport
//!
//! # Architecture
//!
//! ```text
//! UartContext ──open()──> UartDevice ──> BufferedTransport ──> DeviceChannel
//!   (device list,          (settings,      (rx/tx rings,         (serialport,
//!    open names)            pins, I/O)      rx/tx pumps)          mock)
//! ```
//!
//! # Modules
//!
//! - `context` - library context, device listing and opening
//! - `device` - open device: data, settings, pins
//! - `transport` - ring buffers and background pumps
//! - `channel` - raw OS device access
//! - `config` - port settings and TOML configuration
//! - `error` - error types and last-error slots
//! - `logging` - tracing setup
//! - `constants` - shared defaults

pub mod channel;
pub mod config;
pub mod constants;
pub mod context;
pub mod device;
pub mod error;
pub mod logging;
pub mod transport;

pub use channel::{DeviceChannel, DeviceInfo, MockChannel, Pin, SerialChannel};
pub use config::{Config, DataBits, FlowControl, Parity, PortSettings, StopBits, TransportOptions};
pub use context::UartContext;
pub use device::UartDevice;
pub use error::{ErrorCode, ErrorRecord, ErrorScope, Result, UartError};
pub use transport::{
    BufferedTransport, Direction, PumpFault, PumpState, RingBuffer, TrafficSnapshot,
    TrafficStats,
};
