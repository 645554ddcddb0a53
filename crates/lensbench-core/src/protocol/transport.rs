//! Line framing on top of a [`CommunicationChannel`]
//!
//! The controller speaks newline-terminated ASCII in both directions. This
//! layer turns the raw byte stream into whole lines and back.

use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::stream::CommunicationChannel;
use super::LINE_TERMINATOR;

/// Size of a single read from the channel
const READ_CHUNK: usize = 256;

/// A line-oriented session with the controller
pub struct LineTransport {
    channel: Option<Box<dyn CommunicationChannel>>,
    /// Bytes received but not yet terminated
    pending: Vec<u8>,
    max_line_len: usize,
}

impl LineTransport {
    /// Frame `channel`; partial lines beyond `max_line_len` bytes are dropped
    pub fn new(channel: Box<dyn CommunicationChannel>, max_line_len: usize) -> Self {
        Self {
            channel: Some(channel),
            pending: Vec::new(),
            max_line_len,
        }
    }

    /// Whether the underlying channel is still held
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Pop one complete line out of the pending buffer, if any.
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == LINE_TERMINATOR) {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                .trim_end_matches('\r')
                .to_string();
            if !line.trim().is_empty() {
                return Some(line);
            }
        }
        None
    }

    /// Wait up to `timeout` for a complete line.
    ///
    /// Returns `Ok(None)` when the deadline passes without a terminator; any
    /// partial line is kept for the next call.
    pub fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let channel = self
                .channel
                .as_mut()
                .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "transport closed"))?;

            match channel.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "controller closed the connection",
                    ));
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    if let Some(line) = self.take_line() {
                        return Ok(Some(line));
                    }
                    if self.pending.len() > self.max_line_len {
                        warn!(len = self.pending.len(), "line exceeds limit, discarding");
                        self.pending.clear();
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Write `text` followed by the line terminator
    pub fn write_line(&mut self, text: &str) -> io::Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "transport closed"))?;

        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(LINE_TERMINATOR);

        channel.write_all(&bytes)?;
        channel.flush()?;
        debug!(line = text, "sent");
        Ok(())
    }

    /// Release the channel. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.flush() {
                debug!(error = %e, "flush on close failed");
            }
            self.pending.clear();
            debug!("transport closed");
        }
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.close();
    }
}
