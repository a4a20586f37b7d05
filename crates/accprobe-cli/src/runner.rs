//! Acquisition loop: initialise once, then run, download and save

use accprobe_core::acquisition::{AcquisitionConfig, AcquisitionMode};
use accprobe_core::export::{available_path, default_file_name, write_csv};
use accprobe_core::protocol::DeviceSession;
use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Run `f` and log how long it took
fn timed<T>(step: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let out = f();
    debug!("'{}' executed in {:.4}s", step, start.elapsed().as_secs_f64());
    out
}

pub struct Runner {
    session: DeviceSession,
    acquisition: AcquisitionConfig,
    mode: AcquisitionMode,
    spi_speed: Option<u32>,
    output_dir: PathBuf,
}

impl Runner {
    pub fn new(
        session: DeviceSession,
        acquisition: AcquisitionConfig,
        mode: AcquisitionMode,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            acquisition,
            mode,
            spi_speed: None,
            output_dir,
        }
    }

    pub fn with_spi_speed(mut self, speed: Option<u32>) -> Self {
        self.spi_speed = speed;
        self
    }

    /// Connect, configure and initialise the sensor
    pub fn init(&mut self) -> Result<()> {
        timed("initialize", || {
            self.session.connect().context("Failed to open serial port")?;
            self.session
                .configure(&self.acquisition)
                .context("Failed to configure accelerometer")?;
            self.session.init().context("Failed to initialise accelerometer")?;

            if let Some(speed) = self.spi_speed {
                self.session
                    .override_spi_speed(speed)
                    .context("Failed to override SPI speed")?;
                self.session.init().context("Failed to re-initialise after SPI override")?;
            }
            Ok(())
        })
    }

    /// Run `loops` acquisitions, saving each; returns the files written
    pub fn run(&mut self, loops: u32) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for n in 1..=loops {
            info!("Acquisition {} of {} ({})", n, loops, self.mode);
            let mode = self.mode;

            timed("run", || Ok(self.session.run_acquisition(mode)?))?;
            let info = timed("download sample info", || Ok(self.session.fetch_metadata()?))?;
            let data = timed("download data", || Ok(self.session.fetch_all_batches()?))?;

            let name = default_file_name(&info, Local::now().naive_local());
            let path = available_path(&self.output_dir, &name);
            timed("save", || {
                info!("Saving data to {}", path.display());
                write_csv(&path, &info, &data)
                    .with_context(|| format!("Error saving data to {}", path.display()))
            })?;
            files.push(path);
        }
        Ok(files)
    }
}
