//! Receive strategies
//!
//! Command acknowledgements are short newline-terminated text, batch
//! payloads are binary and may contain the terminator byte. Each pattern gets
//! its own strategy so the transport only owns the handle and the pending
//! buffer.

use std::io::ErrorKind;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::Clock;
use super::stream::SerialLink;
use super::{ProtocolError, LINE_TERMINATOR};

/// Chunk size for draining the driver buffer
const READ_CHUNK: usize = 512;

/// A way of pulling one response out of the link
pub trait ReceiveStrategy {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Receive one response.
    ///
    /// `pending` holds bytes already read from the link but not yet handed to
    /// a caller; strategies consume from its front and leave the rest.
    fn receive(
        &self,
        link: &mut dyn SerialLink,
        pending: &mut Vec<u8>,
        clock: &dyn Clock,
    ) -> Result<Vec<u8>, ProtocolError>;
}

/// Read until a line terminator or until the driver has nothing more
///
/// Returns the line without its terminator, or an empty buffer when no
/// complete line is available yet. Partial lines stay in `pending`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineReceive;

impl ReceiveStrategy for LineReceive {
    fn name(&self) -> &'static str {
        "line"
    }

    fn receive(
        &self,
        link: &mut dyn SerialLink,
        pending: &mut Vec<u8>,
        _clock: &dyn Clock,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut buffer = [0u8; READ_CHUNK];
        loop {
            if let Some(pos) = pending.iter().position(|b| *b == LINE_TERMINATOR) {
                let mut line: Vec<u8> = pending.drain(..=pos).collect();
                line.pop();
                return Ok(line);
            }

            match link.read(&mut buffer) {
                Ok(0) => return Ok(Vec::new()),
                Ok(n) => {
                    trace!(bytes = n, "line receive: read chunk");
                    pending.extend_from_slice(&buffer[..n]);
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    if !pending.is_empty() {
                        trace!(partial = pending.len(), "line receive: incomplete line kept");
                    }
                    return Ok(Vec::new());
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProtocolError::IoError(e)),
            }
        }
    }
}

/// Wait until enough bytes are buffered, then read out everything available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkReceive {
    /// Bytes that should be buffered before reading
    pub min_bytes: usize,
    /// Delay between buffered-byte checks
    pub poll_interval: Duration,
    /// Checks before giving up and reading whatever arrived
    pub max_polls: u32,
}

impl BulkReceive {
    /// Create a bulk strategy
    pub fn new(min_bytes: usize, poll_interval: Duration, max_polls: u32) -> Self {
        Self {
            min_bytes,
            poll_interval,
            max_polls,
        }
    }
}

impl ReceiveStrategy for BulkReceive {
    fn name(&self) -> &'static str {
        "bulk"
    }

    fn receive(
        &self,
        link: &mut dyn SerialLink,
        pending: &mut Vec<u8>,
        clock: &dyn Clock,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut polls = 0;
        let mut available = link.bytes_to_read()? as usize;
        while pending.len() + available < self.min_bytes && polls < self.max_polls {
            clock.sleep(self.poll_interval);
            polls += 1;
            available = link.bytes_to_read()? as usize;
        }

        if pending.len() + available < self.min_bytes {
            debug!(
                polls,
                buffered = pending.len() + available,
                wanted = self.min_bytes,
                "bulk receive: poll budget exhausted, reading what arrived"
            );
        }

        let mut response = std::mem::take(pending);
        let mut buffer = [0u8; READ_CHUNK];
        let mut remaining = available;
        while remaining > 0 {
            let want = remaining.min(buffer.len());
            match link.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&buffer[..n]);
                    remaining = remaining.saturating_sub(n);
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    break
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProtocolError::IoError(e)),
            }
        }

        trace!(bytes = response.len(), polls, "bulk receive complete");
        Ok(response)
    }
}
