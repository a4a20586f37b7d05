//! Acquisition model
//!
//! Device parameters, acquisition metadata and sample containers.

mod batch;

pub use batch::{batch_count, samples_in_batch, AxisData, Endianness, Sample, SampleBatch};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::{ProtocolError, Verb};

/// One step of the fixed configuration sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigStep {
    /// Pick the active accelerometer
    SelectAccelerometer,
    /// Full-scale range code
    Scale,
    /// Sensor output data rate code
    OutputDataRate,
    /// Samples per acquisition
    SampleCount,
    /// Keep one sample out of every N
    DecimationFactor,
    /// Board timer rate for timer-paced runs
    TimerSampleRate,
}

impl ConfigStep {
    /// The order in which steps must be applied
    pub const SEQUENCE: [ConfigStep; 6] = [
        ConfigStep::SelectAccelerometer,
        ConfigStep::Scale,
        ConfigStep::OutputDataRate,
        ConfigStep::SampleCount,
        ConfigStep::DecimationFactor,
        ConfigStep::TimerSampleRate,
    ];

    /// Device verb applying this step
    pub fn verb(self) -> Verb {
        match self {
            ConfigStep::SelectAccelerometer => Verb::SelectAccelerometer,
            ConfigStep::Scale => Verb::SetScale,
            ConfigStep::OutputDataRate => Verb::SetOutputDataRate,
            ConfigStep::SampleCount => Verb::SetSampleCount,
            ConfigStep::DecimationFactor => Verb::SetDecimationFactor,
            ConfigStep::TimerSampleRate => Verb::SetTimerSampleRate,
        }
    }

    /// Position in [`SEQUENCE`](Self::SEQUENCE)
    pub fn index(self) -> usize {
        Self::SEQUENCE
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigStep::SelectAccelerometer => "select accelerometer",
            ConfigStep::Scale => "scale",
            ConfigStep::OutputDataRate => "output data rate",
            ConfigStep::SampleCount => "sample count",
            ConfigStep::DecimationFactor => "decimation factor",
            ConfigStep::TimerSampleRate => "timer sample rate",
        })
    }
}

/// Device parameters that must all be acknowledged before `init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Accelerometer selector on the board (1..=4)
    pub accelerometer: u8,
    /// Full-scale code (0..=3 → ±2/4/8/16 g)
    pub scale: u8,
    /// Output data rate code
    pub odr: u8,
    /// Samples to acquire
    pub num_samples: u32,
    /// Decimation factor applied after acquisition
    pub decimation_factor: u32,
    /// Timer-paced sample rate in Hz
    pub timer_sample_rate: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            accelerometer: 1,
            scale: 2,
            odr: 0,
            num_samples: 1024,
            decimation_factor: 1,
            timer_sample_rate: 8000,
        }
    }
}

impl AcquisitionConfig {
    /// Range-check every parameter
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !(1..=4).contains(&self.accelerometer) {
            return Err(ProtocolError::InvalidParameter(format!(
                "accelerometer must be 1..=4, got {}",
                self.accelerometer
            )));
        }
        if self.scale > 3 {
            return Err(ProtocolError::InvalidParameter(format!(
                "scale code must be 0..=3, got {}",
                self.scale
            )));
        }
        if self.num_samples == 0 {
            return Err(ProtocolError::InvalidParameter(
                "sample count must be positive".to_string(),
            ));
        }
        if self.decimation_factor == 0 {
            return Err(ProtocolError::InvalidParameter(
                "decimation factor must be at least 1".to_string(),
            ));
        }
        if self.timer_sample_rate == 0 {
            return Err(ProtocolError::InvalidParameter(
                "timer sample rate must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Argument sent for a configuration step
    pub fn value(&self, step: ConfigStep) -> u32 {
        match step {
            ConfigStep::SelectAccelerometer => self.accelerometer.into(),
            ConfigStep::Scale => self.scale.into(),
            ConfigStep::OutputDataRate => self.odr.into(),
            ConfigStep::SampleCount => self.num_samples,
            ConfigStep::DecimationFactor => self.decimation_factor,
            ConfigStep::TimerSampleRate => self.timer_sample_rate,
        }
    }

    /// Batches needed to download one acquisition
    pub fn batch_count(&self) -> usize {
        batch_count(self.num_samples as usize)
    }
}

/// How an acquisition run is paced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Board timer at the configured timer sample rate
    #[default]
    Timer,
    /// Sensor output data rate
    Odr,
}

impl AcquisitionMode {
    /// Device verb starting the run
    pub fn verb(self) -> Verb {
        match self {
            AcquisitionMode::Timer => Verb::RunTimer,
            AcquisitionMode::Odr => Verb::RunOdr,
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AcquisitionMode::Timer => "timer",
            AcquisitionMode::Odr => "odr",
        })
    }
}

/// Metadata of a finished acquisition, as reported by the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Accelerometer identifier
    pub accelerometer_id: u8,
    /// Scale code
    pub scale: u8,
    /// Effective sampling frequency in Hz
    pub sampling_frequency: f64,
    /// Samples actually acquired
    pub num_samples: u32,
    /// Acquisition duration in milliseconds
    pub acquisition_time_ms: u32,
}

impl SampleInfo {
    /// Parse the sample-info reply: five fields separated by `;` or `,`
    /// (id, scale, frequency, samples, time in ms)
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = line
            .split([';', ','])
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() != 5 {
            return Err(ProtocolError::InvalidResponse(format!(
                "sample info needs 5 fields, got {}: '{}'",
                fields.len(),
                line
            )));
        }

        fn field<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ProtocolError> {
            raw.parse()
                .map_err(|_| ProtocolError::InvalidResponse(format!("bad {} '{}'", name, raw)))
        }

        Ok(Self {
            accelerometer_id: field("accelerometer id", fields[0])?,
            scale: field("scale", fields[1])?,
            sampling_frequency: field("sampling frequency", fields[2])?,
            num_samples: field("sample count", fields[3])?,
            acquisition_time_ms: field("acquisition time", fields[4])?,
        })
    }

    /// Full-scale range in g for the scale code, if known
    pub fn scale_g(&self) -> Option<u8> {
        match self.scale {
            0 => Some(2),
            1 => Some(4),
            2 => Some(8),
            3 => Some(16),
            _ => None,
        }
    }
}

/// Metadata and samples of one acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    /// Metadata reported by the board
    pub info: SampleInfo,
    /// Downloaded samples, in order
    pub data: AxisData,
}
