/// Trait for bus communication backends.
/// Implement this trait for different transports (UART, serial port, etc.)
///
/// The bus is half-duplex: `write_packet` owns the switch to transmit and
/// back to receive, so that the reply can be read with `read_byte` as soon
/// as it returns.
pub trait BusTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Read the next received byte, waiting at most the transport's per-byte
    /// timeout. `Ok(None)` means no byte arrived in time.
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Transmit a complete frame
    fn write_packet(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}
