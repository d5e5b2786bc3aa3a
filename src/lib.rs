//! Bioloid / Dynamixel (protocol 1.0) bus driver with support for multiple
//! transport backends.
//!
//! Many smart servos share one half-duplex serial line, each addressed by an
//! ID in `0..=253`. ID 254 ([`BROADCAST_ID`]) addresses every device at once
//! and is never answered.
//!
//! # Features
//!
//! - `uart-esp32` - UART transport for ESP32 using esp-idf-svc
//! - `serial` - Serial port transport for desktop using serialport crate
//!
//! # Example
//!
//! ```ignore
//! use bioloid::{Bus, SerialTransport, DEFAULT_BAUD_RATE};
//!
//! let transport = SerialTransport::new("/dev/ttyUSB0", DEFAULT_BAUD_RATE)?;
//! let mut bus = Bus::new(transport);
//!
//! for id in bus.find_devices(0, 32)? {
//!     let temp = bus.read(id, 0x2b, 1)?;
//!     println!("ID {} is at {} C", id, temp[0]);
//! }
//! ```
//!
//! The device end of the bus is [`Device`], which answers instruction
//! packets out of an in-memory control table.
//!
//! Commands are logged through the `log` crate: one `debug` line per command
//! and status packet, and a hex dump of every frame at `trace`.

mod bus;
mod device;
mod dump;
mod packet;
mod transport;
mod types;

#[cfg(feature = "uart-esp32")]
mod uart;

#[cfg(feature = "serial")]
mod serial;

// Re-exports
pub use bus::Bus;
pub use device::{BAUD_OFFSET, DEV_ID_OFFSET, Device, MODEL_OFFSET, RDT_OFFSET, VERSION_OFFSET};
pub use dump::dump_mem;
pub use packet::{FRAME_OVERHEAD, Packet, PacketParser, ParseStatus, build_packet};
pub use transport::BusTransport;
pub use types::{BROADCAST_ID, BusError, Command, ErrorCode, INVALID_ID, MAX_PARAMS, id_str};

#[cfg(feature = "uart-esp32")]
pub use uart::UartTransport;

#[cfg(feature = "serial")]
pub use serial::{DEFAULT_BAUD_RATE, DEFAULT_BYTE_TIMEOUT, SerialTransport};
