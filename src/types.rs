//! Types shared by the packet codec and the bus

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use thiserror::Error;

/// Device ID addressing every device on the bus. Devices never answer it.
pub const BROADCAST_ID: u8 = 0xFE;

/// Reserved ID that no device may use.
pub const INVALID_ID: u8 = 0xFF;

/// Largest parameter block a single frame can carry (length byte = params + 2).
pub const MAX_PARAMS: usize = 253;

/// Human readable rendering of a device ID
pub fn id_str(id: u8) -> String {
    match id {
        BROADCAST_ID => "BROADCAST".into(),
        INVALID_ID => "INVALID".into(),
        _ => format!("0x{:02x}", id),
    }
}

/// Instruction codes carried in the command byte of an outgoing packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Request a status packet
    Ping = 0x01,
    /// Read values from the control table
    Read = 0x02,
    /// Write values to the control table
    Write = 0x03,
    /// Stage values to be written when ACTION is broadcast
    RegWrite = 0x04,
    /// Apply every staged REG_WRITE
    Action = 0x05,
    /// Restore the control table to factory defaults (ID becomes 1)
    Reset = 0x06,
    /// Write one block per device at a common offset
    SyncWrite = 0x83,
}

impl Command {
    const ALL: [Command; 7] = [
        Command::Ping,
        Command::Read,
        Command::Write,
        Command::RegWrite,
        Command::Action,
        Command::Reset,
        Command::SyncWrite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Read => "READ",
            Command::Write => "WRITE",
            Command::RegWrite => "REG_WRITE",
            Command::Action => "ACTION",
            Command::Reset => "RESET",
            Command::SyncWrite => "SYNC_WRITE",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = BusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|cmd| *cmd as u8 == value)
            .ok_or_else(|| BusError::InvalidParameter(format!("Unknown command: 0x{:02x}", value)))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| BusError::InvalidParameter(format!("Unrecognized command: '{}'", s)))
    }
}

/// Error bitmask reported by a device in the error byte of its status packet.
///
/// Several flags can be set at once, so this is a set rather than a single value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ErrorCode(u8);

impl ErrorCode {
    pub const NONE: ErrorCode = ErrorCode(0x00);
    /// Input voltage out of range
    pub const INPUT_VOLTAGE: ErrorCode = ErrorCode(0x01);
    /// Goal position outside of the angle limits
    pub const ANGLE_LIMIT: ErrorCode = ErrorCode(0x02);
    /// Internal temperature too high
    pub const OVERHEATING: ErrorCode = ErrorCode(0x04);
    /// Instruction parameter out of range
    pub const RANGE: ErrorCode = ErrorCode(0x08);
    /// Checksum of the instruction packet was wrong
    pub const CHECKSUM: ErrorCode = ErrorCode(0x10);
    /// Maximum torque can't hold the applied load
    pub const OVERLOAD: ErrorCode = ErrorCode(0x20);
    /// Undefined instruction
    pub const INSTRUCTION: ErrorCode = ErrorCode(0x40);
    pub const RESERVED: ErrorCode = ErrorCode(0x80);
    /// Every defined (non reserved) flag
    pub const ALL: ErrorCode = ErrorCode(0x7F);

    // Indexed by bit position
    const NAMES: [&'static str; 8] = [
        "InputVoltage",
        "AngleLimit",
        "OverHeating",
        "Range",
        "Checksum",
        "Overload",
        "Instruction",
        "Reserved",
    ];

    pub const fn from_bits(bits: u8) -> Self {
        ErrorCode(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is also set in `self`
    pub const fn contains(self, other: ErrorCode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Iterate over the individual flags that are set, lowest bit first
    pub fn flags(self) -> impl Iterator<Item = ErrorCode> {
        (0..8)
            .map(|bit| 1u8 << bit)
            .filter(move |mask| self.0 & mask != 0)
            .map(ErrorCode)
    }
}

impl BitOr for ErrorCode {
    type Output = ErrorCode;

    fn bitor(self, rhs: ErrorCode) -> ErrorCode {
        ErrorCode(self.0 | rhs.0)
    }
}

impl From<u8> for ErrorCode {
    fn from(bits: u8) -> Self {
        ErrorCode(bits)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorCode::NONE => f.write_str("None"),
            ErrorCode::ALL => f.write_str("All"),
            _ => {
                let names: Vec<&str> = self
                    .flags()
                    .map(|flag| Self::NAMES[flag.0.trailing_zeros() as usize])
                    .collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

impl FromStr for ErrorCode {
    type Err = BusError;

    /// Parses `none`, `all`, or a comma separated list of flag names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(ErrorCode::NONE);
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(ErrorCode::ALL);
        }
        s.split(',').try_fold(ErrorCode::NONE, |acc, word| {
            let word = word.trim();
            Self::NAMES
                .iter()
                .position(|name| name.eq_ignore_ascii_case(word))
                .map(|bit| acc | ErrorCode(1 << bit))
                .ok_or_else(|| BusError::InvalidParameter(format!("Invalid mask string '{}'", word)))
        })
    }
}

/// Errors that can occur during bus operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// No byte arrived before the per-byte deadline
    #[error("Rcvd Status: Timeout")]
    Timeout,
    /// The received checksum byte didn't match the frame contents
    #[error("Rcvd Status: Checksum")]
    Checksum,
    /// The device reported one or more error flags
    #[error("Rcvd Status: {code} from ID: {id}")]
    Device { id: u8, code: ErrorCode },
    /// Transport layer error (UART, serial, etc.)
    #[error("transport error: {0}")]
    Transport(String),
    /// Invalid parameter passed to a function
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A well formed status packet that doesn't answer the request
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BusError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout)
    }

    /// Error flags carried by a device error, if this is one
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            BusError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Convert bytes to space separated lowercase hex
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
