//! Bulk transfer
//!
//! Batched binary retrieval: send the batch command, wait until a full frame
//! is buffered (or the poll budget runs out), then hand back the raw bytes.

use std::time::Duration;

use tracing::{debug, error};

use super::commands::Command;
use super::transport::Transport;
use super::{ProtocolError, BATCH_FRAME_LEN, ERROR_SENTINEL, LINE_TERMINATOR};

/// Polling discipline for batch reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkPolicy {
    /// Bytes that make one full frame
    pub min_bytes: usize,
    /// Delay between buffered-byte checks
    pub poll_interval: Duration,
    /// Buffered-byte checks before reading out whatever arrived
    pub max_polls: u32,
}

impl Default for BulkPolicy {
    fn default() -> Self {
        Self {
            min_bytes: BATCH_FRAME_LEN,
            poll_interval: Duration::from_micros(100),
            max_polls: 500,
        }
    }
}

/// Outcome of inspecting a raw batch buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Nothing arrived
    Empty,
    /// First terminator-delimited segment is the error sentinel
    DeviceError,
    /// Anything else; still has to pass payload length checks
    Data,
}

/// Classify a raw batch buffer.
///
/// Only the first `\n`-delimited segment is compared against the sentinel;
/// trailing bytes do not matter.
pub fn frame_status(raw: &[u8]) -> FrameStatus {
    if raw.is_empty() {
        return FrameStatus::Empty;
    }
    let first = raw.split(|b| *b == LINE_TERMINATOR).next().unwrap_or(raw);
    if first == ERROR_SENTINEL {
        FrameStatus::DeviceError
    } else {
        FrameStatus::Data
    }
}

/// Batch retrieval primitive on top of [`Transport`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkTransfer {
    policy: BulkPolicy,
}

impl BulkTransfer {
    /// Bulk transfer with a polling policy
    pub fn new(policy: BulkPolicy) -> Self {
        Self { policy }
    }

    /// Polling policy
    pub fn policy(&self) -> BulkPolicy {
        self.policy
    }

    /// Send the batch command and return the raw frame.
    ///
    /// An empty buffer or an error-sentinel frame is reported as
    /// [`FrameStatus`] alongside the bytes; turning that into a download
    /// failure is up to the caller, which knows the batch index.
    pub fn request_batch(
        &self,
        transport: &mut Transport,
        command: &Command,
    ) -> Result<(FrameStatus, Vec<u8>), ProtocolError> {
        transport.send(&command.to_bytes(), command.settle())?;
        let raw = transport.receive_bulk(
            self.policy.min_bytes,
            self.policy.poll_interval,
            self.policy.max_polls,
        )?;

        let status = frame_status(&raw);
        match status {
            FrameStatus::DeviceError => {
                error!(parent: transport.context().span(), command = command.text(), "Received: :er");
            }
            FrameStatus::Empty => {
                error!(parent: transport.context().span(), command = command.text(), "Received nothing");
            }
            FrameStatus::Data => {
                debug!(
                    parent: transport.context().span(),
                    command = command.text(),
                    bytes = raw.len(),
                    "Received batch frame"
                );
            }
        }
        Ok((status, raw))
    }
}
