use log::{Level, debug, log_enabled, trace, warn};

use crate::dump::dump_mem;
use crate::packet::{Packet, PacketParser, ParseStatus, build_packet};
use crate::transport::BusTransport;
use crate::types::{BROADCAST_ID, BusError, Command, MAX_PARAMS};

/// Controller for a bus of Bioloid devices.
///
/// Every command is a strict write-then-read exchange over the half-duplex
/// line. `Bus` does no locking of its own: share one between threads only
/// behind a mutex.
pub struct Bus<T: BusTransport> {
    transport: T,
}

impl<T: BusTransport> Bus<T> {
    /// Create a new bus controller using the given transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the bus, giving the transport back
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Broadcast an ACTION, which makes every device apply its deferred
    /// (REG_WRITE) data at the same time. No device answers.
    pub fn action(&mut self) -> Result<(), BusError> {
        debug!("Broadcasting ACTION");
        self.fill_and_write_packet(BROADCAST_ID, Command::Action, &[])
    }

    /// Build a frame around `data` and hand it to the transport
    pub fn fill_and_write_packet(
        &mut self,
        dev_id: u8,
        cmd: impl Into<u8>,
        data: &[u8],
    ) -> Result<(), BusError> {
        let pkt = build_packet(dev_id, cmd, data)?;
        trace_packet(&pkt, "  W");
        self.transport
            .write_packet(&pkt)
            .map_err(|e| BusError::Transport(format!("{:?}", e)))
    }

    /// Send a PING and wait for the status packet.
    ///
    /// Returns `Ok(false)` if the device didn't answer in time. A checksum
    /// failure or a status packet with error flags set is an `Err`, not an
    /// absent device.
    pub fn ping(&mut self, dev_id: u8) -> Result<bool, BusError> {
        self.send_ping(dev_id)?;
        match self.read_status_packet() {
            Ok(pkt) => {
                check_source(dev_id, &pkt)?;
                Ok(true)
            }
            Err(BusError::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read `length` bytes of the control table starting at `offset`
    pub fn read(&mut self, dev_id: u8, offset: u8, length: u8) -> Result<Vec<u8>, BusError> {
        self.send_read(dev_id, offset, length)?;
        let pkt = self.read_status_packet()?;
        check_source(dev_id, &pkt)?;

        if pkt.param_len() != length as usize {
            warn!(
                "READ from ID {} returned {} bytes, expected {}",
                dev_id,
                pkt.param_len(),
                length
            );
            return Err(BusError::InvalidResponse(format!(
                "Expected {} bytes from ID {}, got {}",
                length,
                dev_id,
                pkt.param_len()
            )));
        }
        Ok(pkt.params().to_vec())
    }

    /// Write `data` into the control table at `offset`.
    ///
    /// With `deferred` set this sends a REG_WRITE, which the device holds
    /// until an ACTION is broadcast. Broadcast writes return as soon as the
    /// frame is sent.
    pub fn write(&mut self, dev_id: u8, offset: u8, data: &[u8], deferred: bool) -> Result<(), BusError> {
        self.send_write(dev_id, offset, data, deferred)?;
        if dev_id == BROADCAST_ID {
            return Ok(());
        }
        let pkt = self.read_status_packet()?;
        check_source(dev_id, &pkt)
    }

    /// Restore the device's control table to factory defaults.
    ///
    /// The device comes back with ID 1; the caller has to account for that.
    pub fn reset(&mut self, dev_id: u8) -> Result<(), BusError> {
        self.send_reset(dev_id)?;
        if dev_id == BROADCAST_ID {
            return Ok(());
        }
        let pkt = self.read_status_packet()?;
        check_source(dev_id, &pkt)
    }

    /// Write one equally sized block per device, all at `offset`, in a
    /// single broadcast frame. No device answers.
    ///
    /// Fails before anything is sent if `values` doesn't hold exactly one
    /// block per ID or the blocks differ in length.
    pub fn sync_write<V: AsRef<[u8]>>(&mut self, dev_ids: &[u8], offset: u8, values: &[V]) -> Result<(), BusError> {
        let bytes_per_id = values.first().map_or(0, |v| v.as_ref().len());
        debug!(
            "Sending SYNC_WRITE to IDs {} offset 0x{:02x} len {}",
            dev_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            offset,
            bytes_per_id
        );

        if dev_ids.is_empty() {
            return Err(BusError::InvalidParameter("SYNC_WRITE needs at least one device".into()));
        }
        if dev_ids.len() != values.len() {
            return Err(BusError::InvalidParameter(format!(
                "len(dev_ids) = {} must match len(values) = {}",
                dev_ids.len(),
                values.len()
            )));
        }
        if let Some(idx) = values.iter().position(|v| v.as_ref().len() != bytes_per_id) {
            return Err(BusError::InvalidParameter(format!(
                "len(values[{}]) = {} not equal {}",
                idx,
                values[idx].as_ref().len(),
                bytes_per_id
            )));
        }

        let param_len = dev_ids.len() * (bytes_per_id + 1) + 2;
        if param_len > MAX_PARAMS {
            return Err(BusError::InvalidParameter(format!(
                "SYNC_WRITE needs {} parameter bytes (maximum: {})",
                param_len, MAX_PARAMS
            )));
        }

        let mut data = Vec::with_capacity(param_len);
        data.push(offset);
        data.push(bytes_per_id as u8);
        for (id, value) in dev_ids.iter().zip(values) {
            data.push(*id);
            data.extend_from_slice(value.as_ref());
        }

        self.fill_and_write_packet(BROADCAST_ID, Command::SyncWrite, &data)
    }

    /// Ping IDs `start_id .. start_id + num_ids` in order, calling
    /// `on_found` for each device that answers and `on_missing` for each
    /// that times out. The broadcast ID is never pinged.
    ///
    /// Any error other than a timeout stops the scan and is returned.
    /// Returns true if any device was found.
    pub fn scan<F, M>(
        &mut self,
        start_id: u8,
        num_ids: u8,
        mut on_found: F,
        mut on_missing: M,
    ) -> Result<bool, BusError>
    where
        F: FnMut(&mut Self, u8),
        M: FnMut(&mut Self, u8),
    {
        let end_id = (start_id as u16 + num_ids as u16).min(BROADCAST_ID as u16);
        let mut some_dev_found = false;

        for dev_id in (start_id as u16..end_id).map(|id| id as u8) {
            if self.ping(dev_id)? {
                some_dev_found = true;
                on_found(self, dev_id);
            } else {
                on_missing(self, dev_id);
            }
        }

        Ok(some_dev_found)
    }

    /// Scan a range of IDs and return the ones that answered
    pub fn find_devices(&mut self, start_id: u8, num_ids: u8) -> Result<Vec<u8>, BusError> {
        let mut found = Vec::new();
        self.scan(start_id, num_ids, |_, id| found.push(id), |_, _| {})?;
        Ok(found)
    }

    pub fn send_ping(&mut self, dev_id: u8) -> Result<(), BusError> {
        debug!("Sending PING to ID {}", dev_id);
        self.fill_and_write_packet(dev_id, Command::Ping, &[])
    }

    pub fn send_read(&mut self, dev_id: u8, offset: u8, length: u8) -> Result<(), BusError> {
        debug!("Sending READ to ID {} offset 0x{:02x} len {}", dev_id, offset, length);
        self.fill_and_write_packet(dev_id, Command::Read, &[offset, length])
    }

    pub fn send_reset(&mut self, dev_id: u8) -> Result<(), BusError> {
        if dev_id == BROADCAST_ID {
            debug!("Broadcasting RESET");
        } else {
            debug!("Sending RESET to ID {}", dev_id);
        }
        self.fill_and_write_packet(dev_id, Command::Reset, &[])
    }

    pub fn send_write(&mut self, dev_id: u8, offset: u8, data: &[u8], deferred: bool) -> Result<(), BusError> {
        let cmd = if deferred { Command::RegWrite } else { Command::Write };
        if dev_id == BROADCAST_ID {
            debug!("Broadcasting {} offset 0x{:02x} len {}", cmd, offset, data.len());
        } else {
            debug!("Sending {} to ID {} offset 0x{:02x} len {}", cmd, dev_id, offset, data.len());
        }

        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(offset);
        params.extend_from_slice(data);
        self.fill_and_write_packet(dev_id, cmd, &params)
    }

    /// Read one status packet from the transport.
    ///
    /// Fails with `Timeout` if any byte doesn't arrive in time, `Checksum`
    /// if the frame is corrupt and `Device` if the device set error flags.
    pub fn read_status_packet(&mut self) -> Result<Packet, BusError> {
        let mut parser = PacketParser::new();

        let status = loop {
            let byte = self
                .transport
                .read_byte()
                .map_err(|e| BusError::Transport(format!("{:?}", e)))?;
            let Some(byte) = byte else {
                debug!("TIMEOUT");
                trace_packet(parser.raw_bytes(), "  R");
                return Err(BusError::Timeout);
            };
            match parser.process_byte(byte) {
                ParseStatus::NotDone => {}
                status => break status,
            }
        };

        let pkt = match (status, parser.packet()) {
            (ParseStatus::Done, Some(pkt)) => pkt,
            _ => {
                warn!("Rcvd Status: Checksum");
                trace_packet(parser.raw_bytes(), "  R");
                return Err(BusError::Checksum);
            }
        };

        let code = pkt.error_code();
        debug!("Rcvd Status: {} from ID: {}", code, pkt.dev_id());
        trace_packet(parser.raw_bytes(), "  R");
        if !code.is_none() {
            return Err(BusError::Device { id: pkt.dev_id(), code });
        }
        Ok(pkt)
    }
}

fn check_source(dev_id: u8, pkt: &Packet) -> Result<(), BusError> {
    if pkt.dev_id() == dev_id {
        return Ok(());
    }
    warn!("Expected status from ID {}, got ID {}", dev_id, pkt.dev_id());
    Err(BusError::InvalidResponse(format!(
        "Status packet from ID {} while talking to ID {}",
        pkt.dev_id(),
        dev_id
    )))
}

fn trace_packet(bytes: &[u8], prefix: &str) {
    if log_enabled!(Level::Trace) {
        for line in dump_mem(bytes, prefix, 0) {
            trace!("{}", line);
        }
    }
}
