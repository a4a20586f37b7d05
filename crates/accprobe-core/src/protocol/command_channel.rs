//! Command channel
//!
//! Short textual request/response exchanges: one send, then a bounded number
//! of line receives until something non-empty arrives.

use std::time::Duration;

use tracing::{debug, warn};

use super::commands::Command;
use super::transport::Transport;
use super::{ProtocolError, ERROR_SENTINEL};

/// Retry budget for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Line receives before giving up
    pub max_attempts: u32,
    /// Delay between empty receives
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Longest time spent waiting between attempts
    pub fn ceiling(&self) -> Duration {
        self.retry_delay * self.max_attempts.saturating_sub(1)
    }
}

/// Reply to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Decoded, trimmed line; empty when the budget ran out
    pub line: String,
    /// Receive attempts used
    pub attempts: u32,
}

impl Reply {
    /// Nothing arrived within the retry budget
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// The device answered with the error sentinel
    pub fn is_rejection(&self) -> bool {
        self.line.as_bytes() == ERROR_SENTINEL
    }
}

/// Request/response primitive on top of [`Transport`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandChannel {
    policy: RetryPolicy,
}

impl CommandChannel {
    /// Channel with a retry policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Default retry policy of this channel
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `command` and return the first non-empty line, using the
    /// channel's retry policy
    pub fn request(&self, transport: &mut Transport, command: &Command) -> Result<Reply, ProtocolError> {
        self.request_with(transport, command, self.policy)
    }

    /// Send `command` once, then receive up to `policy.max_attempts` lines,
    /// sleeping `policy.retry_delay` between empty results.
    ///
    /// An exhausted budget is not an error here: the reply comes back empty
    /// and the caller decides what that means.
    pub fn request_with(
        &self,
        transport: &mut Transport,
        command: &Command,
        policy: RetryPolicy,
    ) -> Result<Reply, ProtocolError> {
        transport.send(&command.to_bytes(), command.settle())?;

        let mut attempts = 0;
        while attempts < policy.max_attempts {
            if attempts > 0 {
                transport.context().sleep(policy.retry_delay);
            }
            attempts += 1;
            let line = transport.receive_line()?;
            if !line.is_empty() {
                debug!(
                    parent: transport.context().span(),
                    command = command.text(),
                    attempts,
                    "reply received"
                );
                return Ok(Reply { line, attempts });
            }
        }

        warn!(
            parent: transport.context().span(),
            command = command.text(),
            attempts,
            "no reply within retry budget"
        );
        Ok(Reply {
            line: String::new(),
            attempts,
        })
    }

    /// Like [`request`](Self::request) but an empty reply becomes
    /// [`ProtocolError::CommandTimeout`]
    pub fn require(&self, transport: &mut Transport, command: &Command) -> Result<Reply, ProtocolError> {
        self.require_with(transport, command, self.policy)
    }

    /// Like [`request_with`](Self::request_with) but an empty reply becomes
    /// [`ProtocolError::CommandTimeout`]
    pub fn require_with(
        &self,
        transport: &mut Transport,
        command: &Command,
        policy: RetryPolicy,
    ) -> Result<Reply, ProtocolError> {
        let reply = self.request_with(transport, command, policy)?;
        if reply.is_empty() {
            return Err(ProtocolError::CommandTimeout {
                command: command.text().to_string(),
                attempts: reply.attempts,
            });
        }
        Ok(reply)
    }
}
