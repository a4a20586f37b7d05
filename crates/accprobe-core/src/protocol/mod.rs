//! Serial Protocol Communication
//!
//! Drives the sensor board over a half-duplex serial link. Layers, leaf
//! first:
//!
//! - [`Transport`]: owns the handle, byte-level send and two receive modes
//! - [`CommandChannel`]: text command, bounded wait for a reply line
//! - [`BulkTransfer`]: batch command, poll until a full binary frame is buffered
//! - [`DeviceSession`]: device verbs composed in the right order, with a
//!   session state machine on top

mod bulk;
pub mod clock;
mod command_channel;
pub mod commands;
mod error;
pub mod receive;
pub mod serial;
mod session;
pub mod stream;
mod transport;

pub use bulk::{frame_status, BulkPolicy, BulkTransfer, FrameStatus};
pub use clock::{Clock, ManualClock, SessionContext, SystemClock};
pub use command_channel::{CommandChannel, Reply, RetryPolicy};
pub use commands::{Command, CommandSet, Verb};
pub use error::{ProtocolError, Result};
pub use receive::{BulkReceive, LineReceive, ReceiveStrategy};
pub use serial::{list_ports, open_port, PortInfo};
pub use session::{DeviceSession, SessionState};
pub use stream::{LinkOpener, SerialChannel, SerialLink, SerialOpener};
pub use transport::{LinkCounters, Transport};

/// Line terminator for command replies
pub const LINE_TERMINATOR: u8 = b'\n';

/// Reply the board sends instead of data or an acknowledgement on failure
pub const ERROR_SENTINEL: &[u8] = b":er";

/// Acknowledgement the board sends for accepted commands
pub const ACK: &[u8] = b":ok";

/// Samples per full batch
pub const BATCH_SAMPLES: usize = 32;

/// Bytes per sample field
pub const SAMPLE_WIDTH: usize = 2;

/// Bytes per three-axis sample
pub const SAMPLE_LEN: usize = 3 * SAMPLE_WIDTH;

/// Payload bytes of a full batch
pub const BATCH_PAYLOAD_LEN: usize = BATCH_SAMPLES * SAMPLE_LEN;

/// Status trailer following the payload in every batch frame
pub const BATCH_TRAILER_LEN: usize = 4;

/// Bytes in one full batch frame
pub const BATCH_FRAME_LEN: usize = BATCH_PAYLOAD_LEN + BATCH_TRAILER_LEN;
