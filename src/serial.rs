//! Serial port transport for desktop using serialport crate

use crate::transport::BusTransport;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Baud rate devices ship with (baud register value 1)
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Per-byte deadline. USB-serial latency dominates the device turnaround.
pub const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(10);

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    echo: bool,
}

impl SerialTransport {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(DEFAULT_BYTE_TIMEOUT)
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;

        Ok(Self { port, echo: false })
    }

    pub fn with_byte_timeout(mut self, timeout: Duration) -> Result<Self, serialport::Error> {
        self.port.set_timeout(timeout)?;
        Ok(self)
    }

    /// Set when TX is looped back to RX (single wire adapters without
    /// direction control). The echo of each frame is read back and dropped.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn discard_echo(&mut self, len: usize) -> std::io::Result<()> {
        let mut echo = vec![0u8; len];
        self.port.read_exact(&mut echo)
    }
}

impl BusTransport for SerialTransport {
    type Error = std::io::Error;

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        // leftovers of an abandoned exchange
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::other)?;
        self.port.write_all(data)?;
        self.port.flush()?;
        if self.echo {
            self.discard_echo(data.len())?;
        }
        Ok(())
    }
}
