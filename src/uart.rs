//! UART transport for ESP32 using esp-idf-svc
//!
//! The bus line is shared by TX and RX. Each frame is written, the TX FIFO is
//! drained, and only then is the receiver read again, so direction changes
//! happen between frames and never inside one.

use crate::transport::BusTransport;
use esp_idf_svc::hal::delay::{BLOCK, TickType};
use esp_idf_svc::hal::gpio::{self, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartDriver};
use std::time::Duration;

const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(10);

pub struct UartTransport<'a> {
    uart: UartDriver<'a>,
    timeout_ticks: u32,
    echo: bool,
}

impl<'a> UartTransport<'a> {
    pub fn new(
        uart: impl Peripheral<P = impl uart::Uart> + 'a,
        tx: impl Peripheral<P = impl OutputPin> + 'a,
        rx: impl Peripheral<P = impl InputPin> + 'a,
        baud_rate: u32,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let config = uart::config::Config::default().baudrate(baud_rate.into());
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<gpio::Gpio0>::None,
            Option::<gpio::Gpio0>::None,
            &config,
        )?;
        uart.clear_rx()?;

        Ok(Self {
            uart,
            timeout_ticks: Self::ticks(DEFAULT_BYTE_TIMEOUT),
            echo: false,
        })
    }

    pub fn with_byte_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ticks = Self::ticks(timeout);
        self
    }

    /// Set when TX and RX are tied to the same wire, so every transmitted
    /// byte is also received
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn ticks(timeout: Duration) -> u32 {
        // never round a short deadline down to a non-blocking read
        TickType::new_millis(timeout.as_millis() as u64).ticks().max(1)
    }
}

impl BusTransport for UartTransport<'_> {
    type Error = esp_idf_svc::sys::EspError;

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut buf = [0u8; 1];
        match self.uart.read(&mut buf, self.timeout_ticks)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.uart.clear_rx()?;
        let mut written = 0;
        while written < data.len() {
            written += self.uart.write(&data[written..])?;
        }
        self.uart.wait_tx_done(BLOCK)?;
        if self.echo {
            // the echo is already in the RX FIFO once TX is done
            self.uart.clear_rx()?;
        }
        Ok(())
    }
}
