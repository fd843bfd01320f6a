//! Configuration management
//!
//! Two layers:
//! - **Port settings**: typed frame format (`PortSettings`), validated against
//!   the platform baud table and parsed from option strings like `8N1N`
//! - **Config file**: `uartlink.toml` stored next to the executable, holding
//!   port defaults and buffered transport tuning

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_BAUD_RATE, DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_TIMEOUT_MS,
    DEFAULT_PORT_OPTIONS, DEFAULT_SERIAL_TIMEOUT_MS, PUMP_CHUNK_SIZE, PUMP_INTERVAL_MS,
};
use crate::error::{Result, UartError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Frame format
// =============================================================================

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    pub fn bits(&self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }

    /// Map a numeric bit count (16 is not supported by serial drivers)
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(UartError::InvalidDataBits {
                value: other.to_string(),
            }),
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits (1.5 is not supported)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    fn digit(&self) -> char {
        match self {
            StopBits::One => '1',
            StopBits::Two => '2',
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FlowControl {
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

impl FlowControl {
    fn letter(&self) -> char {
        match self {
            FlowControl::None => 'N',
            FlowControl::Software => 'S',
            FlowControl::Hardware => 'H',
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

// =============================================================================
// Baud rates
// =============================================================================

/// Standard baud rates accepted on this platform
#[cfg(target_os = "linux")]
pub const STANDARD_BAUD_RATES: &[u32] = &[
    0, 50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000, 2500000,
    3000000, 3500000, 4000000,
];

/// Standard baud rates accepted on this platform
#[cfg(all(unix, not(target_os = "linux")))]
pub const STANDARD_BAUD_RATES: &[u32] = &[
    0, 50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 921600, 1000000, 1500000, 2000000, 2500000, 3000000,
    3500000, 4000000,
];

/// Standard baud rates accepted on this platform
#[cfg(windows)]
pub const STANDARD_BAUD_RATES: &[u32] = &[
    110, 300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200, 128000, 256000,
];

/// Standard baud rates accepted on this platform
#[cfg(not(any(unix, windows)))]
pub const STANDARD_BAUD_RATES: &[u32] = &[
    110, 300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
];

/// Check a baud rate against the platform table
pub fn validate_baud(baud: u32) -> Result<u32> {
    if STANDARD_BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(UartError::InvalidBaud { baud })
    }
}

// =============================================================================
// Port settings
// =============================================================================

/// Complete line configuration of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl PortSettings {
    /// Build settings from a baud rate and an option string (e.g. `8N1N`)
    pub fn new(baud: u32, options: &str) -> Result<Self> {
        let mut settings: PortSettings = options.parse()?;
        settings.baud = validate_baud(baud)?;
        Ok(settings)
    }

    /// Option string of these settings (e.g. `8N1N`)
    pub fn options(&self) -> String {
        format!(
            "{}{}{}{}",
            self.data_bits.bits(),
            self.parity.letter(),
            self.stop_bits.digit(),
            self.flow_control.letter()
        )
    }
}

impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} baud {}", self.baud, self.options())
    }
}

/// Parse `<data bits><parity><stop bits><flow control>`
///
/// Data bits `5`-`8`, parity `N`/`O`/`E`, stop bits `1`/`2`, flow control
/// `N`/`S`/`H`. The baud rate keeps its default.
impl FromStr for PortSettings {
    type Err = UartError;

    fn from_str(options: &str) -> Result<Self> {
        let invalid = |reason: &str| UartError::InvalidOption {
            option: options.to_string(),
            reason: reason.to_string(),
        };
        let mut chars = options.chars();

        let data_bits = match chars.next() {
            Some(c) => match c.to_digit(10) {
                Some(digit) => DataBits::from_bits(digit as u8)?,
                None => {
                    return Err(UartError::InvalidDataBits {
                        value: c.to_string(),
                    })
                }
            },
            None => return Err(invalid("empty option string")),
        };

        let parity = match chars.next() {
            Some('N') => Parity::None,
            Some('O') => Parity::Odd,
            Some('E') => Parity::Even,
            Some(c) => {
                return Err(UartError::InvalidParity {
                    value: c.to_string(),
                })
            }
            None => return Err(invalid("missing parity")),
        };

        let stop_bits = match chars.next() {
            Some('1') => StopBits::One,
            Some('2') => StopBits::Two,
            Some(c) => {
                return Err(UartError::InvalidStopBits {
                    value: c.to_string(),
                })
            }
            None => return Err(invalid("missing stop bits")),
        };

        let flow_control = match chars.next() {
            Some('N') => FlowControl::None,
            Some('S') => FlowControl::Software,
            Some('H') => FlowControl::Hardware,
            Some(c) => {
                return Err(UartError::InvalidFlowControl {
                    value: c.to_string(),
                })
            }
            None => return Err(invalid("missing flow control")),
        };

        if chars.next().is_some() {
            return Err(invalid("trailing characters"));
        }

        Ok(Self {
            baud: DEFAULT_BAUD_RATE,
            data_bits,
            parity,
            stop_bits,
            flow_control,
        })
    }
}

// =============================================================================
// Transport options
// =============================================================================

/// Tuning of the buffered transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Capacity of each ring buffer
    pub buffer_size: usize,
    /// Maximum bytes per device write
    pub chunk_size: usize,
    /// Sleep between pump cycles
    pub pump_interval: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            chunk_size: PUMP_CHUNK_SIZE,
            pump_interval: Duration::from_millis(PUMP_INTERVAL_MS),
        }
    }
}

impl TransportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < 1 {
            return Err(UartError::ConfigValidation {
                field: "buffer_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.chunk_size < 1 {
            return Err(UartError::ConfigValidation {
                field: "chunk_size",
                reason: "must be at least 1".into(),
            });
        }
        // A zero sleep makes the pumps spin on the buffer-locks
        if self.pump_interval < Duration::from_millis(1) {
            return Err(UartError::ConfigValidation {
                field: "pump_interval",
                reason: "must be at least 1 ms".into(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Config file
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub port: PortConfig,
    pub transport: TransportConfig,
}

/// Default device and line settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortConfig {
    /// Device name (empty = must be given on the command line)
    pub name: String,
    pub baud: u32,
    /// Frame format option string, e.g. "8N1N"
    pub options: String,
    /// Read timeout of the OS handle in milliseconds
    pub timeout_ms: u64,
}

/// Buffered transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Run rx/tx pumps on background threads (false = direct blocking I/O)
    pub threaded: bool,
    pub buffer_size: usize,
    pub chunk_size: usize,
    pub pump_interval_ms: u64,
    /// Upper bound for flush() waiting on the tx ring
    pub flush_timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            baud: DEFAULT_BAUD_RATE,
            options: DEFAULT_PORT_OPTIONS.to_string(),
            timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            threaded: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            chunk_size: PUMP_CHUNK_SIZE,
            pump_interval_ms: PUMP_INTERVAL_MS,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

impl PortConfig {
    /// Validated line settings
    pub fn settings(&self) -> Result<PortSettings> {
        PortSettings::new(self.baud, &self.options)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TransportConfig {
    /// Validated transport options
    pub fn options(&self) -> Result<TransportOptions> {
        let options = TransportOptions {
            buffer_size: self.buffer_size,
            chunk_size: self.chunk_size,
            pump_interval: Duration::from_millis(self.pump_interval_ms),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Get the default config file path (next to the executable)
pub fn config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| UartError::Io {
        path: PathBuf::from("executable"),
        source: e,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| UartError::ConfigValidation {
        field: "exe_path",
        reason: "no parent directory".into(),
    })?;
    Ok(exe_dir.join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load config from `path` (or the default location), falling back to
    /// defaults on any error
    pub fn load(path: Option<&Path>) -> Config {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match config_path() {
                Ok(p) => p,
                Err(e) => {
                    warn!("Failed to determine config path: {}, using defaults", e);
                    return Config::default();
                }
            },
        };

        if !path.exists() {
            return Config::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config error in {:?}: {}, using defaults", path, e);
                Config::default()
            }
        }
    }

    /// Load config from `path`, reporting read and parse errors
    pub fn load_from(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| UartError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| UartError::ConfigValidation {
            field: "config",
            reason: e.to_string(),
        })
    }

    /// Serialize as TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| UartError::ConfigValidation {
            field: "config",
            reason: e.to_string(),
        })
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?).map_err(|e| UartError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
