//! Device commands
//!
//! The firmware vocabulary is an external contract, so verb strings live in
//! a [`CommandSet`] that can be replaced from configuration. The protocol
//! layer only cares about framing: one text line per command.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Placeholder substituted with the verb argument
const ARG_PLACEHOLDER: &str = "{}";

/// Device verbs known to the protocol facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Select which accelerometer on the board is used
    SelectAccelerometer,
    /// Set full-scale range code
    SetScale,
    /// Set output data rate code
    SetOutputDataRate,
    /// Set number of samples to acquire
    SetSampleCount,
    /// Set decimation factor
    SetDecimationFactor,
    /// Set timer-based sample rate
    SetTimerSampleRate,
    /// Apply configuration to the sensor
    Init,
    /// Override the sensor SPI clock
    OverrideSpiSpeed,
    /// Run an acquisition paced by the sensor's ODR
    RunOdr,
    /// Run an acquisition paced by the board timer
    RunTimer,
    /// Query metadata of the last acquisition
    GetSampleInfo,
    /// Fetch one batch of samples
    GetSampleBatch,
    /// Query firmware version
    FirmwareVersion,
}

impl Verb {
    /// Whether the template expects an argument
    pub fn takes_argument(&self) -> bool {
        matches!(
            self,
            Verb::SelectAccelerometer
                | Verb::SetScale
                | Verb::SetOutputDataRate
                | Verb::SetSampleCount
                | Verb::SetDecimationFactor
                | Verb::SetTimerSampleRate
                | Verb::OverrideSpiSpeed
                | Verb::GetSampleBatch
        )
    }
}

/// Firmware command templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSet {
    /// Select accelerometer; takes the accelerometer id
    pub select_accelerometer: String,
    /// Full-scale code
    pub set_scale: String,
    /// Output data rate code
    pub set_output_data_rate: String,
    /// Samples per acquisition
    pub set_sample_count: String,
    /// Decimation factor
    pub set_decimation_factor: String,
    /// Timer sample rate in Hz
    pub set_timer_sample_rate: String,
    /// Apply the configuration to the sensor
    pub init: String,
    /// SPI clock in Hz
    pub override_spi_speed: String,
    /// Start an ODR-paced run
    pub run_odr: String,
    /// Start a timer-paced run
    pub run_timer: String,
    /// Request the metadata line of the last run
    pub get_sample_info: String,
    /// Request one batch; takes the batch index
    pub get_sample_batch: String,
    /// Request the firmware version string
    pub firmware_version: String,
    /// Appended to every command on the wire
    pub line_ending: String,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            select_accelerometer: "SELECTACC {}".to_string(),
            set_scale: "ACCSCALE {}".to_string(),
            set_output_data_rate: "ACCODR {}".to_string(),
            set_sample_count: "ACQNUMSAMPLES {}".to_string(),
            set_decimation_factor: "ACQDECFACTOR {}".to_string(),
            set_timer_sample_rate: "ACQTIMSAMPLERATE {}".to_string(),
            init: "ACCINIT".to_string(),
            override_spi_speed: "OVRACCSPISPEED {}".to_string(),
            run_odr: "ACQODRRUN".to_string(),
            run_timer: "ACQTIMERRUN".to_string(),
            get_sample_info: "GETSAMPLEINFO".to_string(),
            get_sample_batch: "GETSAMPLEBATCH {}".to_string(),
            firmware_version: "VERSION".to_string(),
            line_ending: "\n".to_string(),
        }
    }
}

impl CommandSet {
    /// Template for a verb
    pub fn template(&self, verb: Verb) -> &str {
        match verb {
            Verb::SelectAccelerometer => &self.select_accelerometer,
            Verb::SetScale => &self.set_scale,
            Verb::SetOutputDataRate => &self.set_output_data_rate,
            Verb::SetSampleCount => &self.set_sample_count,
            Verb::SetDecimationFactor => &self.set_decimation_factor,
            Verb::SetTimerSampleRate => &self.set_timer_sample_rate,
            Verb::Init => &self.init,
            Verb::OverrideSpiSpeed => &self.override_spi_speed,
            Verb::RunOdr => &self.run_odr,
            Verb::RunTimer => &self.run_timer,
            Verb::GetSampleInfo => &self.get_sample_info,
            Verb::GetSampleBatch => &self.get_sample_batch,
            Verb::FirmwareVersion => &self.firmware_version,
        }
    }

    /// Command text for a verb without argument
    pub fn text(&self, verb: Verb) -> String {
        self.template(verb).replace(ARG_PLACEHOLDER, "").trim_end().to_string()
    }

    /// Command text for a verb with its argument substituted
    pub fn text_with<A: fmt::Display>(&self, verb: Verb, arg: A) -> String {
        let template = self.template(verb);
        if template.contains(ARG_PLACEHOLDER) {
            template.replacen(ARG_PLACEHOLDER, &arg.to_string(), 1)
        } else {
            format!("{} {}", template, arg)
        }
    }

    /// Build an outbound command with the given settle delay
    pub fn build(&self, verb: Verb, arg: Option<&dyn fmt::Display>, settle: Duration) -> Command {
        let text = match arg {
            Some(arg) => self.text_with(verb, arg),
            None => self.text(verb),
        };
        Command::new(text, settle).with_line_ending(&self.line_ending)
    }

    /// Match a received line against the vocabulary (used by the simulated
    /// device). Returns the verb and its raw argument, if any.
    pub fn parse<'a>(&self, line: &'a str) -> Option<(Verb, Option<&'a str>)> {
        const ALL: [Verb; 13] = [
            Verb::SelectAccelerometer,
            Verb::SetScale,
            Verb::SetOutputDataRate,
            Verb::SetSampleCount,
            Verb::SetDecimationFactor,
            Verb::SetTimerSampleRate,
            Verb::Init,
            Verb::OverrideSpiSpeed,
            Verb::RunOdr,
            Verb::RunTimer,
            Verb::GetSampleInfo,
            Verb::GetSampleBatch,
            Verb::FirmwareVersion,
        ];
        let line = line.trim();

        // exact matches first so argument-less verbs never shadow a prefix
        for verb in ALL.iter().filter(|v| !v.takes_argument()) {
            if line == self.text(*verb) {
                return Some((*verb, None));
            }
        }
        for verb in ALL.iter().filter(|v| v.takes_argument()) {
            let template = self.template(*verb);
            let (prefix, suffix) = template.split_once(ARG_PLACEHOLDER).unwrap_or((template, ""));
            if let Some(rest) = line.strip_prefix(prefix).and_then(|r| r.strip_suffix(suffix)) {
                let arg = rest.trim();
                if !arg.is_empty() {
                    return Some((*verb, Some(arg)));
                }
            }
        }
        None
    }
}

/// One outbound request: a text line plus the pause before its reply is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    line_ending: String,
    settle: Duration,
}

impl Command {
    /// Create a command terminated by `\n`
    pub fn new(text: impl Into<String>, settle: Duration) -> Self {
        Self {
            text: text.into(),
            line_ending: "\n".to_string(),
            settle,
        }
    }

    /// Replace the line ending
    pub fn with_line_ending(mut self, line_ending: &str) -> Self {
        self.line_ending = line_ending.to_string();
        self
    }

    /// Command text without line ending
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Post-send settle delay
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.text.as_bytes().to_vec();
        if !self.text.ends_with(&self.line_ending) {
            bytes.extend_from_slice(self.line_ending.as_bytes());
        }
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
