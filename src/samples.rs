//! Empirical performance sample tables.

use std::path::Path;

use crate::error::{Error, Result};

/// Number of samples stored per type in the source CSV files. Only the first
/// `samples_per_type` of each block are used.
pub const FILE_SAMPLES_PER_TYPE: usize = 10000;

/// Performance channel of an instance type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Sequential I/O throughput (MB/s), divides `seq_data`.
    SeqIo,
    /// Random I/O throughput (ops/s), divides `read_data`.
    RandIo,
    /// Network upload factor, multiplies `trans_data`.
    NetUp,
    /// Network download factor, multiplies `rec_data`.
    NetDown,
}

/// Per-type empirical samples for all four performance channels, indexed by
/// `(type, sample)` with a flat `type * samples_per_type + sample` layout.
/// Immutable after construction.
#[derive(Clone, Debug)]
pub struct SampleTables {
    types: usize,
    samples_per_type: usize,
    seq_io: Vec<f64>,
    rand_io: Vec<f64>,
    net_up: Vec<f64>,
    net_down: Vec<f64>,
}

impl SampleTables {
    /// Loads the four channel files (`randio.csv`, `seqio.csv`, `netup.csv`,
    /// `netdown.csv`) from a directory.
    pub fn load<P: AsRef<Path>>(dir: P, types: usize, samples_per_type: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let rand_io = read_channel(&dir.join("randio.csv"), types, samples_per_type, true)?;
        let seq_io = read_channel(&dir.join("seqio.csv"), types, samples_per_type, true)?;
        let net_up = read_channel(&dir.join("netup.csv"), types, samples_per_type, false)?;
        let net_down = read_channel(&dir.join("netdown.csv"), types, samples_per_type, false)?;
        Ok(Self {
            types,
            samples_per_type,
            seq_io,
            rand_io,
            net_up,
            net_down,
        })
    }

    /// Builds tables from in-memory channel vectors, applying the same
    /// validation as [`load`](Self::load). Each vector must hold
    /// `types * samples_per_type` values in `(type, sample)` order.
    pub fn from_raw(
        types: usize,
        samples_per_type: usize,
        seq_io: Vec<f64>,
        rand_io: Vec<f64>,
        net_up: Vec<f64>,
        net_down: Vec<f64>,
    ) -> Result<Self> {
        let expected = types * samples_per_type;
        for (name, channel, divisor) in [
            ("seqio", &seq_io, true),
            ("randio", &rand_io, true),
            ("netup", &net_up, false),
            ("netdown", &net_down, false),
        ] {
            if channel.len() != expected {
                return Err(Error::InvalidSample {
                    file: name.to_string(),
                    line: channel.len() + 1,
                    reason: "wrong number of samples",
                });
            }
            for (i, value) in channel.iter().enumerate() {
                validate_sample(name, i + 1, *value, divisor)?;
            }
        }
        Ok(Self {
            types,
            samples_per_type,
            seq_io,
            rand_io,
            net_up,
            net_down,
        })
    }

    /// Returns the sample value for `(instance type, sample index)` of one channel.
    pub fn sample(&self, tp: usize, sample: usize, channel: Channel) -> f64 {
        let idx = tp * self.samples_per_type + sample;
        match channel {
            Channel::SeqIo => self.seq_io[idx],
            Channel::RandIo => self.rand_io[idx],
            Channel::NetUp => self.net_up[idx],
            Channel::NetDown => self.net_down[idx],
        }
    }

    pub fn types(&self) -> usize {
        self.types
    }

    pub fn samples_per_type(&self) -> usize {
        self.samples_per_type
    }
}

fn validate_sample(file: &str, line: usize, value: f64, divisor: bool) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::InvalidSample {
            file: file.to_string(),
            line,
            reason: "not a finite number",
        });
    }
    if divisor && value <= 0. {
        return Err(Error::InvalidSample {
            file: file.to_string(),
            line,
            reason: "must be positive",
        });
    }
    Ok(())
}

/// Reads one channel file: text, one float per line, `FILE_SAMPLES_PER_TYPE`
/// lines per type, of which the first `samples_per_type` are kept.
fn read_channel(path: &Path, types: usize, samples_per_type: usize, divisor: bool) -> Result<Vec<f64>> {
    let name = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|_| Error::InputMissing(name.clone()))?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < types.saturating_sub(1) * FILE_SAMPLES_PER_TYPE + samples_per_type {
        return Err(Error::InvalidSample {
            file: name,
            line: lines.len() + 1,
            reason: "file truncated",
        });
    }
    let mut values = Vec::with_capacity(types * samples_per_type);
    for tp in 0..types {
        for j in 0..samples_per_type {
            let line = tp * FILE_SAMPLES_PER_TYPE + j;
            let value: f64 = lines[line].trim().parse().map_err(|_| Error::InvalidSample {
                file: name.clone(),
                line: line + 1,
                reason: "not a number",
            })?;
            validate_sample(&name, line + 1, value, divisor)?;
            values.push(value);
        }
    }
    Ok(values)
}
