//! CSV export of acquisitions
//!
//! `;`-separated layout: two metadata blocks followed by one row per sample.
//!
//! ```text
//! accelerometer;frequency[Hz];num_of_samples
//! 1;8000.00;1024
//! scale[g];bits_per_sample;acquisition_time[ms]
//! 8;16;128
//! x;y;z
//! 12;-4;1021
//! ```

use chrono::{NaiveDateTime, Timelike};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::acquisition::{AxisData, SampleInfo};

/// Bits per sample field written to the metadata block
pub const BITS_PER_SAMPLE: u32 = 16;

/// Write an acquisition to any writer
pub fn write_acquisition<W: Write>(mut out: W, info: &SampleInfo, data: &AxisData) -> io::Result<()> {
    writeln!(out, "accelerometer;frequency[Hz];num_of_samples")?;
    writeln!(
        out,
        "{};{:.2};{}",
        info.accelerometer_id, info.sampling_frequency, info.num_samples
    )?;

    writeln!(out, "scale[g];bits_per_sample;acquisition_time[ms]")?;
    match info.scale_g() {
        Some(g) => write!(out, "{};", g)?,
        None => write!(out, "unknown;")?,
    }
    writeln!(out, "{};{}", BITS_PER_SAMPLE, info.acquisition_time_ms)?;

    writeln!(out, "x;y;z")?;
    for s in data.iter() {
        writeln!(out, "{};{};{}", s.x, s.y, s.z)?;
    }
    out.flush()
}

/// Write an acquisition to a CSV file
pub fn write_csv<P: AsRef<Path>>(path: P, info: &SampleInfo, data: &AxisData) -> io::Result<()> {
    let file = File::create(path)?;
    write_acquisition(BufWriter::new(file), info, data)
}

/// `<accelerometer>_data_<YYYYmmdd_HHMMSS>_<millis>.csv`
pub fn default_file_name(info: &SampleInfo, timestamp: NaiveDateTime) -> String {
    format!(
        "{}_data_{}_{}.csv",
        info.accelerometer_id,
        timestamp.format("%Y%m%d_%H%M%S"),
        timestamp.nanosecond() / 1_000_000 % 1000
    )
}

/// Path for `file_name` in `dir` that no existing file occupies.
///
/// A taken name gets `_1`, `_2`, ... inserted before the extension.
pub fn available_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (file_name, String::new()),
    };
    (1u32..)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, ext)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
