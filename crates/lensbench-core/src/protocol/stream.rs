//! Byte channels to the controller and the connector that opens them

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::serial::{configure_port, list_ports, open_port, try_list_ports, PortInfo};
use super::ProtocolError;

/// Byte stream to the controller
pub trait CommunicationChannel: Read + Write + Send {
    /// Discard anything the controller sent before we were listening
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already configured port
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

impl CommunicationChannel for SerialChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

/// Opens channels to the controller.
///
/// The worker only ever talks to the hardware through this seam, which lets
/// tests run the full engine against an in-memory controller.
pub trait Connector: Send + Sync + 'static {
    /// Open a channel to `port` at `baud_rate`; reads block at most `read_timeout`
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn CommunicationChannel>, ProtocolError>;

    /// Enumerate ports, reporting enumeration failure
    fn try_list_ports(&self) -> Result<Vec<PortInfo>, ProtocolError>;

    /// Best-effort enumeration that never fails
    fn list_ports(&self) -> Vec<PortInfo> {
        self.try_list_ports().unwrap_or_default()
    }
}

/// Connector for real serial hardware
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        let mut handle = open_port(port, baud_rate, read_timeout)?;
        configure_port(handle.as_mut())?;
        Ok(Box::new(SerialChannel::new(handle)))
    }

    fn try_list_ports(&self) -> Result<Vec<PortInfo>, ProtocolError> {
        try_list_ports()
    }

    fn list_ports(&self) -> Vec<PortInfo> {
        list_ports()
    }
}
