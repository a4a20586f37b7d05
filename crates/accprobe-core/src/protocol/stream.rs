//! Link abstraction
//!
//! The transport talks to a [`SerialLink`] rather than a concrete serial
//! port so the simulated device and test doubles can stand in for hardware.

use serialport::SerialPort;
use std::io::{self, Read, Write};

use super::serial::{configure_port, open_port};
use super::ProtocolError;
use crate::config::LinkConfig;

/// Byte-oriented half-duplex link to the sensor board
pub trait SerialLink: Read + Write + Send {
    /// Number of bytes waiting in the receive buffer
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Drop everything waiting in the receive buffer
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Opens links for a transport
pub trait LinkOpener: Send {
    /// Open a link with the given settings
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ProtocolError>;
}

/// Serial port wrapper implementing SerialLink
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ProtocolError> {
        let mut port = open_port(config)?;
        configure_port(port.as_mut()).map_err(|e| ProtocolError::ConnectionFailed {
            port: config.port_name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(SerialChannel::new(port)))
    }
}
