//! The device end of the bus: a generic servo-like endpoint that answers
//! instruction packets out of an in-memory control table.

use log::{Level, debug, log_enabled, trace, warn};

use crate::dump::dump_mem;
use crate::packet::{Packet, PacketParser, ParseStatus, build_packet};
use crate::types::{BROADCAST_ID, BusError, Command, ErrorCode, MAX_PARAMS};

/// Control table offset holding the model number (2 bytes)
pub const MODEL_OFFSET: u8 = 0;
/// Control table offset holding the firmware version
pub const VERSION_OFFSET: u8 = 2;
/// Control table offset holding the device ID
pub const DEV_ID_OFFSET: u8 = 3;
/// Control table offset holding the baud rate divisor
pub const BAUD_OFFSET: u8 = 4;
/// Control table offset holding the return delay time
pub const RDT_OFFSET: u8 = 5;

/// A device endpoint.
///
/// Feed it every byte seen on the bus with [`process_byte`](Self::process_byte);
/// whenever the device owes a status packet the frame to transmit is returned.
/// The device's ID lives in its control table at [`DEV_ID_OFFSET`], so a
/// WRITE there re-addresses it and RESET restores the factory ID.
#[derive(Debug)]
pub struct Device {
    parser: PacketParser,
    control_table: Vec<u8>,
    initial: Vec<u8>,
    deferred: Option<(usize, Vec<u8>)>,
    status: ErrorCode,
}

impl Device {
    /// Create a device whose factory control table is `initial`
    pub fn new(initial: &[u8]) -> Result<Self, BusError> {
        if initial.len() <= RDT_OFFSET as usize {
            return Err(BusError::InvalidParameter(format!(
                "Control table too short: {} bytes (minimum: {})",
                initial.len(),
                RDT_OFFSET + 1
            )));
        }
        if initial[DEV_ID_OFFSET as usize] >= BROADCAST_ID {
            return Err(BusError::InvalidParameter(format!(
                "Invalid device ID: {}",
                initial[DEV_ID_OFFSET as usize]
            )));
        }

        Ok(Self {
            parser: PacketParser::new(),
            control_table: initial.to_vec(),
            initial: initial.to_vec(),
            deferred: None,
            status: ErrorCode::NONE,
        })
    }

    /// Move the device to `dev_id` without touching the factory table
    pub fn with_id(mut self, dev_id: u8) -> Self {
        self.control_table[DEV_ID_OFFSET as usize] = dev_id;
        self
    }

    pub fn dev_id(&self) -> u8 {
        self.control_table[DEV_ID_OFFSET as usize]
    }

    pub fn control_table(&self) -> &[u8] {
        &self.control_table
    }

    /// Flags reported in every status packet on top of the command's own
    /// result, e.g. OVERHEATING while the device is too hot
    pub fn set_status(&mut self, status: ErrorCode) {
        self.status = status;
    }

    /// Run one received byte through the parser and act on any complete
    /// frame. Returns the status packet to send back, if any.
    pub fn process_byte(&mut self, byte: u8) -> Option<Vec<u8>> {
        match self.parser.process_byte(byte) {
            ParseStatus::NotDone => None,
            ParseStatus::Done => {
                let pkt = self.parser.packet()?;
                self.packet_received(&pkt)
            }
            ParseStatus::Checksum => {
                if self.parser.dev_id() == Some(self.dev_id()) {
                    warn!("Checksum error in packet for ID {}", self.dev_id());
                    self.status_packet(self.dev_id(), ErrorCode::CHECKSUM, &[])
                } else {
                    None
                }
            }
        }
    }

    fn packet_received(&mut self, pkt: &Packet) -> Option<Vec<u8>> {
        let broadcast = pkt.dev_id() == BROADCAST_ID;
        if pkt.dev_id() != self.dev_id() && !broadcast {
            return None;
        }

        let cmd = Command::try_from(pkt.command());
        debug!(
            "Rcvd packet for ID: {} Cmd: {}",
            pkt.dev_id(),
            cmd.as_ref()
                .map_or_else(|_| format!("0x{:02x}", pkt.command()), |cmd| cmd.to_string())
        );
        if log_enabled!(Level::Trace) {
            for line in dump_mem(self.parser.raw_bytes(), "  R", 0) {
                trace!("{}", line);
            }
        }

        // replies go out under the ID the command arrived for, even if the
        // command just rewrote it
        let reply_id = self.dev_id();
        let reply = match cmd {
            Ok(Command::Ping) => Some((ErrorCode::NONE, Vec::new())),
            Ok(Command::Read) => Some(self.command_read(pkt)),
            Ok(Command::Write) => Some(self.command_write(pkt)),
            Ok(Command::RegWrite) => Some(self.command_reg_write(pkt)),
            Ok(Command::Action) => {
                self.command_action();
                None
            }
            Ok(Command::Reset) => {
                self.control_table.copy_from_slice(&self.initial);
                self.deferred = None;
                Some((ErrorCode::NONE, Vec::new()))
            }
            Ok(Command::SyncWrite) => {
                self.command_sync_write(pkt);
                None
            }
            Err(_) => Some((ErrorCode::INSTRUCTION, Vec::new())),
        };

        // nobody answers a broadcast
        match reply {
            Some((code, params)) if !broadcast => self.status_packet(reply_id, code, &params),
            _ => None,
        }
    }

    fn command_read(&self, pkt: &Packet) -> (ErrorCode, Vec<u8>) {
        let (Some(offset), Some(length)) = (pkt.param_byte(0), pkt.param_byte(1)) else {
            return (ErrorCode::RANGE, Vec::new());
        };
        let (offset, length) = (offset as usize, length as usize);
        if length > MAX_PARAMS || offset + length > self.control_table.len() {
            return (ErrorCode::RANGE, Vec::new());
        }
        (ErrorCode::NONE, self.control_table[offset..offset + length].to_vec())
    }

    /// WRITE and REG_WRITE parameters: the offset followed by the data
    fn write_params<'p>(&self, pkt: &'p Packet) -> Option<(usize, &'p [u8])> {
        let (offset, data) = pkt.params().split_first()?;
        let offset = *offset as usize;
        (offset + data.len() <= self.control_table.len()).then_some((offset, data))
    }

    fn command_write(&mut self, pkt: &Packet) -> (ErrorCode, Vec<u8>) {
        match self.write_params(pkt) {
            Some((offset, data)) => {
                self.control_table[offset..offset + data.len()].copy_from_slice(data);
                (ErrorCode::NONE, Vec::new())
            }
            None => (ErrorCode::RANGE, Vec::new()),
        }
    }

    fn command_reg_write(&mut self, pkt: &Packet) -> (ErrorCode, Vec<u8>) {
        match self.write_params(pkt) {
            Some((offset, data)) => {
                self.deferred = Some((offset, data.to_vec()));
                (ErrorCode::NONE, Vec::new())
            }
            None => (ErrorCode::RANGE, Vec::new()),
        }
    }

    fn command_action(&mut self) {
        if let Some((offset, data)) = self.deferred.take() {
            self.control_table[offset..offset + data.len()].copy_from_slice(&data);
        }
    }

    fn command_sync_write(&mut self, pkt: &Packet) {
        let params = pkt.params();
        let (Some(offset), Some(length)) = (pkt.param_byte(0), pkt.param_byte(1)) else {
            return;
        };
        let (offset, length) = (offset as usize, length as usize);

        let own_block = params[2..]
            .chunks(length + 1)
            .find(|block| block.len() == length + 1 && block[0] == self.dev_id());
        if let Some(block) = own_block {
            if offset + length <= self.control_table.len() {
                self.control_table[offset..offset + length].copy_from_slice(&block[1..]);
            } else {
                warn!("SYNC_WRITE for ID {} out of range", self.dev_id());
            }
        }
    }

    fn status_packet(&self, dev_id: u8, code: ErrorCode, params: &[u8]) -> Option<Vec<u8>> {
        match build_packet(dev_id, (self.status | code).bits(), params) {
            Ok(pkt) => {
                if log_enabled!(Level::Trace) {
                    for line in dump_mem(&pkt, "  W", 0) {
                        trace!("{}", line);
                    }
                }
                Some(pkt)
            }
            Err(e) => {
                warn!("Unable to build status packet: {}", e);
                None
            }
        }
    }
}
