//! Transport
//!
//! Owns the link handle and exposes byte-level send/receive with a
//! connect/disconnect lifecycle. Everything above this layer is stop-and-wait:
//! one send, then one bounded receive.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::clock::SessionContext;
use super::receive::{BulkReceive, LineReceive, ReceiveStrategy};
use super::stream::{LinkOpener, SerialLink, SerialOpener};
use super::ProtocolError;
use crate::config::LinkConfig;

/// Cumulative traffic counters for one transport
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkCounters {
    /// Bytes written
    pub tx_bytes: u64,
    /// Bytes handed to callers
    pub rx_bytes: u64,
    /// Commands written
    pub tx_messages: u64,
    /// Non-empty responses handed to callers
    pub rx_messages: u64,
}

/// Raw serial transport
pub struct Transport {
    config: LinkConfig,
    opener: Box<dyn LinkOpener>,
    link: Option<Box<dyn SerialLink>>,
    /// Bytes read from the link that no caller has consumed yet
    pending: Vec<u8>,
    counters: LinkCounters,
    ctx: SessionContext,
}

impl Transport {
    /// Transport over a real serial port (not yet connected)
    pub fn new(config: LinkConfig, ctx: SessionContext) -> Self {
        Self::with_opener(config, Box::new(SerialOpener), ctx)
    }

    /// Transport with a custom link opener
    pub fn with_opener(config: LinkConfig, opener: Box<dyn LinkOpener>, ctx: SessionContext) -> Self {
        Self {
            config,
            opener,
            link: None,
            pending: Vec::new(),
            counters: LinkCounters::default(),
            ctx,
        }
    }

    /// Link settings
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Whether the handle is open
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Traffic counters
    pub fn counters(&self) -> LinkCounters {
        self.counters
    }

    /// Session context shared with the layers above
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Open the handle. Reconnecting an open transport is a no-op.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        let _span = self.ctx.span().enter();
        if self.link.is_some() {
            debug!("connect: already open");
            return Ok(());
        }

        match self.opener.open(&self.config) {
            Ok(link) => {
                self.link = Some(link);
                self.pending.clear();
                info!(
                    baud = self.config.baud_rate,
                    "Connected to {}", self.config.port_name
                );
                Ok(())
            }
            Err(e) => {
                error!("Error connecting to {}: {}", self.config.port_name, e);
                Err(match e {
                    ProtocolError::ConnectionFailed { .. } => e,
                    other => ProtocolError::ConnectionFailed {
                        port: self.config.port_name.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Close the handle if open; calling it again does nothing
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            let _span = self.ctx.span().enter();
            let _ = link.flush();
            self.pending.clear();
            info!("Disconnected from {}", self.config.port_name);
        }
    }

    fn link_mut(&mut self, operation: &str) -> Result<&mut Box<dyn SerialLink>, ProtocolError> {
        match self.link.as_mut() {
            Some(link) => Ok(link),
            None => {
                error!("Attempt to {} while serial port not connected", operation);
                Err(ProtocolError::NotConnected)
            }
        }
    }

    /// Write `bytes`, then block for `settle` so the peer can process them.
    ///
    /// Stale input (unread bytes from an earlier exchange) is discarded first
    /// so the next receive only sees the reply to this send.
    pub fn send(&mut self, bytes: &[u8], settle: Duration) -> Result<(), ProtocolError> {
        let span = self.ctx.span().clone();
        let _span = span.enter();
        let stale = self.pending.len();
        self.pending.clear();
        let link = self.link_mut("send")?;

        let buffered = link.bytes_to_read()? as usize;
        if stale + buffered > 0 {
            warn!(stale = stale + buffered, "discarding unread input before send");
            link.clear_input()?;
        }

        link.write_all(bytes)?;
        link.flush()?;
        debug!(
            bytes = bytes.len(),
            "Sent: {}",
            String::from_utf8_lossy(bytes).trim_end()
        );

        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(bytes.len() as u64);
        self.counters.tx_messages = self.counters.tx_messages.saturating_add(1);

        self.ctx.sleep(settle);
        Ok(())
    }

    /// Receive one response using the given strategy
    pub fn receive(&mut self, strategy: &dyn ReceiveStrategy) -> Result<Vec<u8>, ProtocolError> {
        let _span = self.ctx.span().enter();
        let link = match self.link.as_mut() {
            Some(link) => link,
            None => {
                error!("Attempt to receive ({}) while serial port not connected", strategy.name());
                return Err(ProtocolError::NotConnected);
            }
        };
        let data = strategy.receive(link.as_mut(), &mut self.pending, self.ctx.clock())?;
        if !data.is_empty() {
            self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(data.len() as u64);
            self.counters.rx_messages = self.counters.rx_messages.saturating_add(1);
        }
        Ok(data)
    }

    /// Receive one line, decoded and trimmed; empty if nothing complete arrived
    pub fn receive_line(&mut self) -> Result<String, ProtocolError> {
        let raw = self.receive(&LineReceive)?;
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            debug!(parent: self.ctx.span(), "Received: {}", line);
        }
        Ok(line)
    }

    /// Poll until `min_bytes` are buffered or `max_polls` checks ran out,
    /// then return whatever is buffered (possibly less than asked for)
    pub fn receive_bulk(
        &mut self,
        min_bytes: usize,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.receive(&BulkReceive::new(min_bytes, poll_interval, max_polls))
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
