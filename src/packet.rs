//! Packet framing: the incremental parser for received frames and the
//! builder for outgoing ones.
//!
//! Frame layout, identical in both directions:
//!
//! ```text
//! 0xFF 0xFF <id> <length> <cmd|error> <param 0> .. <param length-3> <checksum>
//! ```
//!
//! `length` counts the parameters plus the command/error byte and the checksum.
//! The checksum is the inverted 8-bit sum of every byte from `id` through the
//! last parameter.

use crate::types::{BusError, ErrorCode, MAX_PARAMS};

const HEADER: u8 = 0xFF;

/// Bytes in a frame that aren't parameters (2 header, id, length, cmd, checksum)
pub const FRAME_OVERHEAD: usize = 6;

/// Result of feeding one byte to a [`PacketParser`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The frame is incomplete
    NotDone,
    /// A frame was received and its checksum matched
    Done,
    /// A frame was received but its checksum didn't match
    Checksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitStart1,
    WaitStart2,
    WaitId,
    WaitLength,
    WaitError,
    WaitParam,
    WaitChecksum,
    Done,
    Failed,
}

/// A decoded, checksum-validated frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    dev_id: u8,
    length: u8,
    cmd: u8,
    params: Vec<u8>,
    checksum: u8,
}

impl Packet {
    pub fn dev_id(&self) -> u8 {
        self.dev_id
    }

    /// Raw length byte (parameter count + 2)
    pub fn length(&self) -> u8 {
        self.length
    }

    /// The command byte, for instruction packets
    pub fn command(&self) -> u8 {
        self.cmd
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn param_byte(&self, idx: usize) -> Option<u8> {
        self.params.get(idx).copied()
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn param_len(&self) -> usize {
        self.params.len()
    }

    /// The error flags of a status packet, which occupy the command position
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_bits(self.cmd)
    }

    pub fn error_code_str(&self) -> String {
        self.error_code().to_string()
    }
}

/// Byte at a time frame decoder.
///
/// Feed bytes with [`process_byte`](Self::process_byte) until it returns
/// something other than [`ParseStatus::NotDone`]. Feeding a byte after a
/// terminal status starts a new frame.
///
/// Every byte after the two header bytes is taken as the ID, 0xFF included,
/// so a third 0xFF of line noise in front of a frame costs that frame: the
/// real ID is read as the length and the parser goes back to hunting for a
/// header.
#[derive(Debug)]
pub struct PacketParser {
    state: State,
    dev_id: u8,
    length: u8,
    cmd: u8,
    params: Vec<u8>,
    sum: u8,
    raw: Vec<u8>,
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketParser {
    pub fn new() -> Self {
        Self {
            state: State::WaitStart1,
            dev_id: 0,
            length: 0,
            cmd: 0,
            params: Vec::new(),
            sum: 0,
            raw: Vec::with_capacity(FRAME_OVERHEAD),
        }
    }

    /// Discard any partial or completed frame and hunt for a new header
    pub fn reset(&mut self) {
        self.state = State::WaitStart1;
        self.dev_id = 0;
        self.length = 0;
        self.cmd = 0;
        self.params.clear();
        self.sum = 0;
        self.raw.clear();
    }

    /// Run a single byte through the state machine
    pub fn process_byte(&mut self, byte: u8) -> ParseStatus {
        if matches!(self.state, State::Done | State::Failed) {
            self.reset();
        }
        self.raw.push(byte);

        match self.state {
            State::WaitStart1 | State::Done | State::Failed => {
                if byte == HEADER {
                    self.state = State::WaitStart2;
                } else {
                    self.raw.clear();
                }
            }
            State::WaitStart2 => {
                if byte == HEADER {
                    self.state = State::WaitId;
                } else {
                    // back to looking for two 0xFF's in a row
                    self.reset();
                }
            }
            State::WaitId => {
                self.dev_id = byte;
                self.sum = byte;
                self.state = State::WaitLength;
            }
            State::WaitLength => {
                if byte < 2 {
                    // can't describe a frame, treat it as line noise
                    self.reset();
                } else {
                    self.length = byte;
                    self.sum = self.sum.wrapping_add(byte);
                    self.params.reserve(byte as usize - 2);
                    self.state = State::WaitError;
                }
            }
            State::WaitError => {
                self.cmd = byte;
                self.sum = self.sum.wrapping_add(byte);
                self.state = if self.length == 2 {
                    State::WaitChecksum
                } else {
                    State::WaitParam
                };
            }
            State::WaitParam => {
                self.params.push(byte);
                self.sum = self.sum.wrapping_add(byte);
                if self.params.len() == self.length as usize - 2 {
                    self.state = State::WaitChecksum;
                }
            }
            State::WaitChecksum => {
                return if !self.sum == byte {
                    self.state = State::Done;
                    ParseStatus::Done
                } else {
                    self.state = State::Failed;
                    ParseStatus::Checksum
                };
            }
        }
        ParseStatus::NotDone
    }

    /// ID byte of the frame in progress, or of the last one completed or
    /// failed. Lets a device tell whether a corrupt frame was meant for it.
    pub fn dev_id(&self) -> Option<u8> {
        match self.state {
            State::WaitStart1 | State::WaitStart2 | State::WaitId => None,
            _ => Some(self.dev_id),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// The decoded frame, available once `process_byte` has returned `Done`
    pub fn packet(&self) -> Option<Packet> {
        if self.state != State::Done {
            return None;
        }
        self.raw.last().map(|&checksum| Packet {
            dev_id: self.dev_id,
            length: self.length,
            cmd: self.cmd,
            params: self.params.clone(),
            checksum,
        })
    }

    /// Bytes consumed for the current frame, starting at the header
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Build a complete outgoing frame for `cmd` addressed to `dev_id`.
///
/// `cmd` is usually a [`Command`](crate::Command) but any raw instruction
/// byte is accepted.
pub fn build_packet(dev_id: u8, cmd: impl Into<u8>, params: &[u8]) -> Result<Vec<u8>, BusError> {
    if params.len() > MAX_PARAMS {
        return Err(BusError::InvalidParameter(format!(
            "Too many parameters: {} (maximum: {})",
            params.len(),
            MAX_PARAMS
        )));
    }

    let length = params.len() as u8 + 2;
    let mut pkt = Vec::with_capacity(params.len() + FRAME_OVERHEAD);
    pkt.extend_from_slice(&[HEADER, HEADER, dev_id, length, cmd.into()]);
    pkt.extend_from_slice(params);

    let sum = pkt[2..].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    pkt.push(!sum);
    Ok(pkt)
}
