//! Protocol facade
//!
//! Device verbs composed from command-channel and bulk calls, guarded by a
//! session state machine:
//!
//! ```text
//! Disconnected -connect-> Unconfigured -configure-> Configured -init-> Ready
//! Ready -run-> AcquisitionComplete -fetch batches-> DataReady -run-> ...
//! ```
//!
//! An SPI speed override sends any configured session back to `Configured`,
//! so `init` has to be issued again before the next run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::bulk::{BulkPolicy, BulkTransfer, FrameStatus};
use super::clock::{Clock, SessionContext, SystemClock};
use super::command_channel::{CommandChannel, Reply, RetryPolicy};
use super::commands::{Command, CommandSet, Verb};
use super::stream::{LinkOpener, SerialOpener};
use super::transport::{LinkCounters, Transport};
use super::ProtocolError;
use crate::acquisition::{
    batch_count, samples_in_batch, Acquisition, AcquisitionConfig, AcquisitionMode, AxisData,
    ConfigStep, Endianness, SampleBatch, SampleInfo,
};
use crate::config::{SessionConfig, TimingConfig};

/// Where a device session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Handle closed
    Disconnected,
    /// Connected, parameters not (fully) acknowledged
    Unconfigured,
    /// All parameters acknowledged, init pending
    Configured,
    /// Sensor initialised, acquisition may run
    Ready,
    /// Acquisition finished on the board, data not downloaded
    AcquisitionComplete,
    /// Data downloaded
    DataReady,
}

impl SessionState {
    /// Configuration has been acknowledged in this state
    fn is_configured(self) -> bool {
        matches!(
            self,
            SessionState::Configured
                | SessionState::Ready
                | SessionState::AcquisitionComplete
                | SessionState::DataReady
        )
    }

    /// Sensor initialised with the current configuration
    fn is_initialised(self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::AcquisitionComplete | SessionState::DataReady
        )
    }

    /// The board holds a finished acquisition
    fn has_acquisition(self) -> bool {
        matches!(self, SessionState::AcquisitionComplete | SessionState::DataReady)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configured => "configured",
            SessionState::Ready => "ready",
            SessionState::AcquisitionComplete => "acquisition complete",
            SessionState::DataReady => "data ready",
        })
    }
}

/// One device session over one serial link
pub struct DeviceSession {
    transport: Transport,
    channel: CommandChannel,
    bulk: BulkTransfer,
    vocabulary: CommandSet,
    timing: TimingConfig,
    endianness: Endianness,
    state: SessionState,
    /// Parameters acknowledged by the board, if any
    acquisition: Option<AcquisitionConfig>,
    ctx: SessionContext,
}

impl DeviceSession {
    /// Session on a real serial port.
    ///
    /// The port is opened right away; if that fails the session stays
    /// disconnected and the failure surfaces on first use.
    pub fn open(config: SessionConfig) -> Self {
        Self::with_opener(config, Box::new(SerialOpener), Arc::new(SystemClock))
    }

    /// Session with an injected link opener and clock
    pub fn with_opener(config: SessionConfig, opener: Box<dyn LinkOpener>, clock: Arc<dyn Clock>) -> Self {
        let mut session = Self::new_disconnected(config, opener, clock);
        if let Err(e) = session.connect() {
            debug!(parent: session.ctx.span(), "initial connect failed: {}", e);
        }
        session
    }

    /// Session that does not attempt to connect yet
    pub fn new_disconnected(
        config: SessionConfig,
        opener: Box<dyn LinkOpener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = SessionContext::with_clock(&config.link.port_name, clock);
        let timing = config.timing;
        let channel = CommandChannel::new(RetryPolicy::new(timing.retry_attempts, timing.retry_delay()));
        let bulk = BulkTransfer::new(BulkPolicy {
            min_bytes: timing.bulk_min_bytes,
            poll_interval: timing.bulk_poll_interval(),
            max_polls: timing.bulk_max_polls,
        });
        Self {
            transport: Transport::with_opener(config.link, opener, ctx.clone()),
            channel,
            bulk,
            vocabulary: config.commands,
            timing,
            endianness: config.endianness,
            state: SessionState::Disconnected,
            acquisition: None,
            ctx,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Parameters acknowledged by the board
    pub fn acquisition_config(&self) -> Option<&AcquisitionConfig> {
        self.acquisition.as_ref()
    }

    /// Whether the serial handle is open
    pub fn check_connection(&self) -> bool {
        self.transport.is_open()
    }

    /// Link traffic counters
    pub fn counters(&self) -> LinkCounters {
        self.transport.counters()
    }

    /// Open the link. Keeps the current state if already connected.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        self.transport.connect()?;
        if self.state == SessionState::Disconnected {
            self.state = SessionState::Unconfigured;
        }
        Ok(())
    }

    /// Close the link; safe to call repeatedly
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.state = SessionState::Disconnected;
        self.acquisition = None;
    }

    fn require(&self, operation: &'static str, allowed: fn(SessionState) -> bool) -> Result<(), ProtocolError> {
        if self.state == SessionState::Disconnected {
            error!(parent: self.ctx.span(), "Cannot {}: not connected", operation);
            return Err(ProtocolError::NotConnected);
        }
        if !allowed(self.state) {
            error!(parent: self.ctx.span(), "Cannot {} while {}", operation, self.state);
            return Err(ProtocolError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn command(&self, verb: Verb, arg: Option<&dyn fmt::Display>) -> Command {
        let settle = match verb {
            Verb::Init => self.timing.init_settle(),
            Verb::GetSampleBatch => std::time::Duration::ZERO,
            _ => self.timing.command_settle(),
        };
        self.vocabulary.build(verb, arg, settle)
    }

    /// Request that must be answered with something other than the sentinel
    fn acknowledged(&mut self, command: &Command, policy: RetryPolicy) -> Result<Reply, ProtocolError> {
        let reply = self.channel.require_with(&mut self.transport, command, policy)?;
        if reply.is_rejection() {
            error!(parent: self.ctx.span(), command = command.text(), "device rejected command");
            return Err(ProtocolError::InvalidResponse(format!(
                "'{}' rejected by device",
                command.text()
            )));
        }
        Ok(reply)
    }

    /// Firmware version string
    pub fn firmware_version(&mut self) -> Result<String, ProtocolError> {
        self.require("query firmware version", |_| true)?;
        let command = self.command(Verb::FirmwareVersion, None);
        let reply = self.acknowledged(&command, self.channel.policy())?;
        Ok(reply.line)
    }

    /// Apply all six parameters in order.
    ///
    /// Stops at the first step that is not acknowledged; later steps are not
    /// sent and the session is left unconfigured.
    pub fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), ProtocolError> {
        self.require("configure", |_| true)?;
        config.validate()?;

        let _span = self.ctx.span().clone().entered();
        info!("Configuring accelerometer {}", config.accelerometer);
        self.state = SessionState::Unconfigured;
        self.acquisition = None;

        for step in ConfigStep::SEQUENCE {
            let value = config.value(step);
            let command = self.command(step.verb(), Some(&value));
            let reply = self.channel.request(&mut self.transport, &command)?;

            let reason = if reply.is_empty() {
                Some(format!("no response after {} attempts", reply.attempts))
            } else if reply.is_rejection() {
                Some("rejected by device".to_string())
            } else {
                None
            };

            if let Some(reason) = reason {
                error!(step = %step, value, "{}", reason);
                return Err(ProtocolError::ConfigurationFailed {
                    step,
                    index: step.index(),
                    reason,
                });
            }
            debug!(step = %step, value, reply = %reply.line, "step acknowledged");
        }

        self.acquisition = Some(*config);
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Initialise the sensor with the acknowledged parameters
    pub fn init(&mut self) -> Result<(), ProtocolError> {
        self.require("initialise", SessionState::is_configured)?;
        let command = self.command(Verb::Init, None);
        self.acknowledged(&command, self.channel.policy())?;
        info!(parent: self.ctx.span(), "Accelerometer initialised");
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Override the sensor SPI clock.
    ///
    /// Allowed at any time while connected; a configured session drops back
    /// to `Configured` and needs `init` again.
    pub fn override_spi_speed(&mut self, speed: u32) -> Result<(), ProtocolError> {
        self.require("override SPI speed", |_| true)?;
        let command = self.command(Verb::OverrideSpiSpeed, Some(&speed));
        self.acknowledged(&command, self.channel.policy())?;
        if self.state.is_configured() {
            self.state = SessionState::Configured;
        }
        info!(parent: self.ctx.span(), speed, "SPI speed overridden, init required");
        Ok(())
    }

    /// Start an acquisition and wait for the board to report completion
    pub fn run_acquisition(&mut self, mode: AcquisitionMode) -> Result<(), ProtocolError> {
        self.require("run acquisition", SessionState::is_initialised)?;
        let command = self.command(mode.verb(), None);
        let policy = RetryPolicy::new(self.timing.acquisition_attempts(), self.timing.retry_delay());
        info!(parent: self.ctx.span(), %mode, "Running data acquisition");
        self.acknowledged(&command, policy)?;
        self.state = SessionState::AcquisitionComplete;
        Ok(())
    }

    /// Metadata of the last acquisition
    pub fn fetch_metadata(&mut self) -> Result<SampleInfo, ProtocolError> {
        self.require("fetch sample info", SessionState::has_acquisition)?;
        let command = self.command(Verb::GetSampleInfo, None);
        let reply = self.acknowledged(&command, self.channel.policy())?;
        let info = SampleInfo::parse(&reply.line)?;
        debug!(parent: self.ctx.span(), ?info, "sample info");
        Ok(info)
    }

    fn total_samples(&self) -> usize {
        self.acquisition
            .map(|a| a.num_samples as usize)
            .unwrap_or_default()
    }

    fn download_batch(&mut self, index: usize, total_samples: usize) -> Result<SampleBatch, ProtocolError> {
        let total = batch_count(total_samples);
        let command = self.command(Verb::GetSampleBatch, Some(&index));
        let (status, raw) = self.bulk.request_batch(&mut self.transport, &command)?;

        let failure = |reason: String| ProtocolError::DownloadFailed {
            batch: index,
            total,
            reason,
        };
        match status {
            FrameStatus::Empty => Err(failure("empty buffer".to_string())),
            FrameStatus::DeviceError => Err(failure("error sentinel".to_string())),
            FrameStatus::Data => {
                SampleBatch::decode(&raw, samples_in_batch(index, total_samples), self.endianness)
                    .map_err(|e| failure(e.to_string()))
            }
        }
    }

    /// Download a single batch of the last acquisition
    pub fn fetch_batch(&mut self, index: usize) -> Result<SampleBatch, ProtocolError> {
        self.require("fetch batch", SessionState::has_acquisition)?;
        let total_samples = self.total_samples();
        let total = batch_count(total_samples);
        if index >= total {
            return Err(ProtocolError::InvalidParameter(format!(
                "batch {} out of range (acquisition has {})",
                index, total
            )));
        }
        self.download_batch(index, total_samples)
    }

    /// Download every batch of the last acquisition, in order.
    ///
    /// The first failing batch aborts the whole download; nothing partial is
    /// returned.
    pub fn fetch_all_batches(&mut self) -> Result<AxisData, ProtocolError> {
        self.require("fetch samples", SessionState::has_acquisition)?;
        let total_samples = self.total_samples();
        let total = batch_count(total_samples);
        let _span = self.ctx.span().clone().entered();
        info!(batches = total, samples = total_samples, "Downloading data");

        let mut data = AxisData::with_capacity(total_samples);
        for index in 0..total {
            match self.download_batch(index, total_samples) {
                Ok(batch) => data.extend_from_batch(&batch),
                Err(e) => {
                    error!("Error downloading data: {}", e);
                    return Err(e);
                }
            }
        }

        self.state = SessionState::DataReady;
        Ok(data)
    }

    /// Run an acquisition, then fetch its metadata and all samples
    pub fn acquire(&mut self, mode: AcquisitionMode) -> Result<Acquisition, ProtocolError> {
        self.run_acquisition(mode)?;
        let info = self.fetch_metadata()?;
        let data = self.fetch_all_batches()?;
        Ok(Acquisition { info, data })
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
