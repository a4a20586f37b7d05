//! # AccProbe Core Library
//!
//! Host-side protocol core for serial accelerometer acquisition boards.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial transport with line and bulk receive modes
//! - Command/response exchanges with bounded retries
//! - Batched binary sample download
//! - A session facade that sequences configure, init, run and download
//! - CSV export and a simulated board for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use accprobe_core::prelude::*;
//!
//! let mut session = DeviceSession::open(SessionConfig::for_port("/dev/ttyACM0"));
//! session.configure(&AcquisitionConfig::default())?;
//! session.init()?;
//!
//! let acquisition = session.acquire(AcquisitionMode::Timer)?;
//! println!("{} samples at {:.2} Hz", acquisition.data.len(), acquisition.info.sampling_frequency);
//! ```

pub mod acquisition;
pub mod config;
pub mod demo;
pub mod export;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::acquisition::{
        Acquisition, AcquisitionConfig, AcquisitionMode, AxisData, ConfigStep, Endianness,
        SampleBatch, SampleInfo,
    };
    pub use crate::config::{LinkConfig, SessionConfig, TimingConfig};
    pub use crate::demo::DemoOpener;
    pub use crate::export::{available_path, default_file_name, write_csv};
    pub use crate::protocol::{DeviceSession, ProtocolError, SessionState};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
