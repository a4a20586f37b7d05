//! Batch frame decoding
//!
//! A batch carries up to [`BATCH_SAMPLES`] consecutive samples, each packed
//! as three signed 16-bit fields (x, y, z). A full frame is the 192-byte
//! payload followed by a 4-byte status trailer.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::protocol::{ProtocolError, BATCH_PAYLOAD_LEN, BATCH_SAMPLES, SAMPLE_LEN};

/// Byte order of sample fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl Endianness {
    fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            Endianness::Little => LittleEndian::read_i16(buf),
            Endianness::Big => BigEndian::read_i16(buf),
        }
    }

    fn write_i16(self, buf: &mut [u8], value: i16) {
        match self {
            Endianness::Little => LittleEndian::write_i16(buf, value),
            Endianness::Big => BigEndian::write_i16(buf, value),
        }
    }
}

/// One three-axis sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sample {
    /// X axis, raw counts
    pub x: i16,
    /// Y axis, raw counts
    pub y: i16,
    /// Z axis, raw counts
    pub z: i16,
}

impl Sample {
    /// Sample from raw axis counts
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }
}

/// Ordered group of up to 32 samples from one bulk read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleBatch {
    samples: Vec<Sample>,
}

impl SampleBatch {
    /// Build a batch; more than [`BATCH_SAMPLES`] samples is rejected
    pub fn new(samples: Vec<Sample>) -> Result<Self, ProtocolError> {
        if samples.len() > BATCH_SAMPLES {
            return Err(ProtocolError::InvalidParameter(format!(
                "batch holds at most {} samples, got {}",
                BATCH_SAMPLES,
                samples.len()
            )));
        }
        Ok(Self { samples })
    }

    /// Decode `count` samples from the start of a raw frame.
    ///
    /// The payload is taken by length, never cut at a terminator byte,
    /// because sample bytes may legitimately be 0x0A. Bytes past the payload
    /// (the frame trailer) are ignored.
    pub fn decode(raw: &[u8], count: usize, endianness: Endianness) -> Result<Self, ProtocolError> {
        if count > BATCH_SAMPLES {
            return Err(ProtocolError::InvalidParameter(format!(
                "batch holds at most {} samples, asked for {}",
                BATCH_SAMPLES, count
            )));
        }
        let needed = count * SAMPLE_LEN;
        if raw.len() < needed {
            return Err(ProtocolError::InvalidResponse(format!(
                "short batch frame: {} bytes, need {} for {} samples",
                raw.len(),
                needed,
                count
            )));
        }

        let samples = raw[..needed]
            .chunks_exact(SAMPLE_LEN)
            .map(|s| Sample {
                x: endianness.read_i16(&s[0..2]),
                y: endianness.read_i16(&s[2..4]),
                z: endianness.read_i16(&s[4..6]),
            })
            .collect();
        Ok(Self { samples })
    }

    /// Encode as a payload of exactly [`BATCH_PAYLOAD_LEN`] bytes,
    /// zero-padded past the last sample
    pub fn encode(&self, endianness: Endianness) -> Vec<u8> {
        let mut out = vec![0u8; BATCH_PAYLOAD_LEN];
        for (sample, slot) in self.samples.iter().zip(out.chunks_exact_mut(SAMPLE_LEN)) {
            endianness.write_i16(&mut slot[0..2], sample.x);
            endianness.write_i16(&mut slot[2..4], sample.y);
            endianness.write_i16(&mut slot[4..6], sample.z);
        }
        out
    }

    /// Samples in device order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for a batch with no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Samples split into three parallel axis sequences
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisData {
    /// X axis samples
    pub x: Vec<i16>,
    /// Y axis samples
    pub y: Vec<i16>,
    /// Z axis samples
    pub z: Vec<i16>,
}

impl AxisData {
    /// Empty sequences with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Append a batch in order
    pub fn extend_from_batch(&mut self, batch: &SampleBatch) {
        for s in batch.samples() {
            self.x.push(s.x);
            self.y.push(s.y);
            self.z.push(s.z);
        }
    }

    /// Number of samples (all three axes have the same length)
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True when nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Iterate samples as (x, y, z) triples
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.z)
            .map(|((x, y), z)| Sample::new(*x, *y, *z))
    }
}

/// Number of batches needed for `total` samples
pub fn batch_count(total: usize) -> usize {
    total.div_ceil(BATCH_SAMPLES)
}

/// Number of samples carried by batch `index` of a `total`-sample acquisition
pub fn samples_in_batch(index: usize, total: usize) -> usize {
    total
        .saturating_sub(index * BATCH_SAMPLES)
        .min(BATCH_SAMPLES)
}
