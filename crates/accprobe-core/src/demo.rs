//! Demo Mode - Simulated sensor board
//!
//! Speaks the board's command vocabulary over an in-memory link so the whole
//! stack can be exercised without hardware. On each run it synthesises a
//! three-axis vibration signal: two sinusoids on x/y, gravity on z, plus
//! uniform noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::io::{self, Read, Write};

use tracing::debug;

use crate::acquisition::{batch_count, Endianness, Sample, SampleBatch};
use crate::config::LinkConfig;
use crate::protocol::{
    CommandSet, LinkOpener, ProtocolError, SerialLink, Verb, ACK, BATCH_SAMPLES, ERROR_SENTINEL,
    LINE_TERMINATOR,
};

/// Version string reported by the simulated firmware
pub const DEMO_FIRMWARE: &str = "accprobe-demo 0.1.0";

/// Seed used when none is given
pub const DEFAULT_SEED: u64 = 0x5EED;

/// Register values the simulated board has accepted
#[derive(Debug, Clone, Copy)]
struct Registers {
    accelerometer: u32,
    scale: u32,
    odr: u32,
    num_samples: u32,
    decimation_factor: u32,
    timer_sample_rate: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            accelerometer: 1,
            scale: 0,
            odr: 0,
            num_samples: 0,
            decimation_factor: 1,
            timer_sample_rate: 8000,
        }
    }
}

/// Output data rates selectable by the ODR code, in Hz
const ODR_TABLE: [f64; 8] = [1600.0, 3200.0, 6400.0, 12800.0, 800.0, 400.0, 200.0, 100.0];

/// In-memory sensor board
pub struct DemoDevice {
    commands: CommandSet,
    endianness: Endianness,
    registers: Registers,
    /// Bytes written by the host, not yet terminated
    inbox: Vec<u8>,
    /// Bytes waiting for the host to read
    outbox: Vec<u8>,
    samples: Vec<Sample>,
    sampling_frequency: f64,
    acquired: bool,
    rng: StdRng,
}

impl DemoDevice {
    /// Simulated board with a fixed noise seed
    pub fn new(commands: CommandSet, endianness: Endianness, seed: u64) -> Self {
        Self {
            commands,
            endianness,
            registers: Registers::default(),
            inbox: Vec::new(),
            outbox: Vec::new(),
            samples: Vec::new(),
            sampling_frequency: 0.0,
            acquired: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Samples of the last simulated acquisition
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn reply_line(&mut self, text: &[u8]) {
        self.outbox.extend_from_slice(text);
        self.outbox.push(LINE_TERMINATOR);
    }

    fn handle(&mut self, line: &str) {
        let Some((verb, arg)) = self.commands.parse(line) else {
            debug!(line, "demo device: unknown command");
            self.reply_line(ERROR_SENTINEL);
            return;
        };

        let value = match arg.map(str::parse::<u32>) {
            Some(Ok(v)) => Some(v),
            Some(Err(_)) => {
                self.reply_line(ERROR_SENTINEL);
                return;
            }
            None => None,
        };

        let ok = match (verb, value) {
            (Verb::SelectAccelerometer, Some(v)) if (1..=4).contains(&v) => {
                self.registers.accelerometer = v;
                true
            }
            (Verb::SetScale, Some(v)) if v <= 3 => {
                self.registers.scale = v;
                true
            }
            (Verb::SetOutputDataRate, Some(v)) if (v as usize) < ODR_TABLE.len() => {
                self.registers.odr = v;
                true
            }
            (Verb::SetSampleCount, Some(v)) => {
                self.registers.num_samples = v;
                true
            }
            (Verb::SetDecimationFactor, Some(v)) if v > 0 => {
                self.registers.decimation_factor = v;
                true
            }
            (Verb::SetTimerSampleRate, Some(v)) if v > 0 => {
                self.registers.timer_sample_rate = v;
                true
            }
            (Verb::Init, None) => true,
            (Verb::OverrideSpiSpeed, Some(v)) => v > 0,
            (Verb::RunTimer, None) => {
                let rate = f64::from(self.registers.timer_sample_rate);
                self.run(rate);
                true
            }
            (Verb::RunOdr, None) => {
                let rate = ODR_TABLE[self.registers.odr as usize];
                self.run(rate);
                true
            }
            (Verb::GetSampleInfo, None) if self.acquired => {
                let info = self.sample_info();
                self.reply_line(info.as_bytes());
                return;
            }
            (Verb::GetSampleBatch, Some(index)) if self.acquired => {
                self.serve_batch(index as usize);
                return;
            }
            (Verb::FirmwareVersion, None) => {
                self.reply_line(DEMO_FIRMWARE.as_bytes());
                return;
            }
            _ => false,
        };

        if ok {
            self.reply_line(ACK);
        } else {
            self.reply_line(ERROR_SENTINEL);
        }
    }

    fn run(&mut self, rate: f64) {
        let r = self.registers;
        self.sampling_frequency = rate / f64::from(r.decimation_factor);

        // counts per g for the selected full-scale range
        let lsb_per_g = 32768.0 / f64::from(2u32 << r.scale);
        let fs = self.sampling_frequency;

        self.samples = (0..r.num_samples)
            .map(|n| {
                let t = f64::from(n) / fs;
                let x = 0.25 * (2.0 * PI * 50.0 * t).sin();
                let y = 0.10 * (2.0 * PI * 120.0 * t).sin();
                let z = 1.0;
                let mut axis = |g: f64| {
                    let noise = self.rng.gen_range(-0.01..0.01);
                    ((g + noise) * lsb_per_g).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
                };
                Sample::new(axis(x), axis(y), axis(z))
            })
            .collect();
        self.acquired = true;
        debug!(samples = self.samples.len(), rate = fs, "demo device: acquisition done");
    }

    fn sample_info(&self) -> String {
        let r = self.registers;
        let time_ms = if self.sampling_frequency > 0.0 {
            (f64::from(r.num_samples) * 1000.0 / self.sampling_frequency).round() as u64
        } else {
            0
        };
        format!(
            "{};{};{:.2};{};{}",
            r.accelerometer, r.scale, self.sampling_frequency, r.num_samples, time_ms
        )
    }

    fn serve_batch(&mut self, index: usize) {
        if index >= batch_count(self.samples.len()) {
            self.reply_line(ERROR_SENTINEL);
            return;
        }
        let start = index * BATCH_SAMPLES;
        let end = (start + BATCH_SAMPLES).min(self.samples.len());
        match SampleBatch::new(self.samples[start..end].to_vec()) {
            Ok(batch) => {
                let payload = batch.encode(self.endianness);
                self.outbox.extend_from_slice(&payload);
                self.reply_line(ACK);
            }
            Err(_) => self.reply_line(ERROR_SENTINEL),
        }
    }
}

impl Read for DemoDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbox.len());
        buf[..n].copy_from_slice(&self.outbox[..n]);
        self.outbox.drain(..n);
        Ok(n)
    }
}

impl Write for DemoDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        while let Some(pos) = self.inbox.iter().position(|b| *b == LINE_TERMINATOR) {
            let raw: Vec<u8> = self.inbox.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                self.handle(&line);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for DemoDevice {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(u32::try_from(self.outbox.len()).unwrap_or(u32::MAX))
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.outbox.clear();
        Ok(())
    }
}

/// Opens a fresh [`DemoDevice`] for every connect
#[derive(Debug, Clone)]
pub struct DemoOpener {
    commands: CommandSet,
    endianness: Endianness,
    seed: u64,
}

impl DemoOpener {
    /// Opener using [`DEFAULT_SEED`]
    pub fn new(commands: CommandSet, endianness: Endianness) -> Self {
        Self {
            commands,
            endianness,
            seed: DEFAULT_SEED,
        }
    }

    /// Use a different noise seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl LinkOpener for DemoOpener {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ProtocolError> {
        debug!(port = %config.port_name, "opening demo device");
        Ok(Box::new(DemoDevice::new(
            self.commands.clone(),
            self.endianness,
            self.seed,
        )))
    }
}
