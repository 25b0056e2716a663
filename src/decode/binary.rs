//! Compact binary snapshot list.
//!
//! Layout (little-endian): a version byte, a `u32` metric count, then per
//! metric a `u16`-prefixed name, a `u16`-prefixed label, `i64` t0, `i64` t1,
//! `i32` amount and a `u32`-prefixed run of `i64` sample values. Every length
//! is checked against the remaining bytes before anything is allocated.

use super::{Decode, DecodeError};
use crate::snapshot::{MetricSnapshot, SnapshotSet};

/// Only supported layout version.
pub const VERSION: u8 = 1;

/// Fixed-width part of a metric record after the two strings.
const METRIC_FIXED_SIZE: usize = 8 + 8 + 4 + 4;

/// Decoder for the binary snapshot list.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDecoder;

impl Decode for BinaryDecoder {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn decode(&self, payload: &[u8]) -> Result<SnapshotSet, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut reader = Reader::new(payload);

        let version = reader.u8("version")?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion { version });
        }

        let count = reader.u32("metric count")? as usize;
        // Each record needs at least its two length prefixes and fixed fields.
        reader.ensure_records(count, 2 + 2 + METRIC_FIXED_SIZE, "metric count")?;

        let mut metrics = Vec::with_capacity(count);
        for _ in 0..count {
            metrics.push(read_metric(&mut reader)?);
        }

        if reader.remaining() > 0 {
            return Err(DecodeError::TrailingBytes {
                remaining: reader.remaining(),
            });
        }

        Ok(SnapshotSet::new(None, metrics))
    }
}

fn read_metric(reader: &mut Reader<'_>) -> Result<MetricSnapshot, DecodeError> {
    let name = reader.string("metric name")?;
    let label = reader.string("metric label")?;
    let t0 = reader.i64("t0")?;
    let t1 = reader.i64("t1")?;
    let amount = reader.i32("amount")?;

    let sample_len = reader.u32("sample length")? as usize;
    reader.ensure_records(sample_len, 8, "sample")?;
    let mut sample = Vec::with_capacity(sample_len);
    for _ in 0..sample_len {
        sample.push(reader.i64("sample value")?);
    }

    Ok(MetricSnapshot {
        name,
        label,
        t0,
        t1,
        amount,
        sample,
    })
}

/// Encodes metrics in the layout [`BinaryDecoder`] accepts.
pub fn encode(metrics: &[MetricSnapshot]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + metrics.len() * 64);
    buf.push(VERSION);
    buf.extend_from_slice(&(metrics.len() as u32).to_le_bytes());

    for m in metrics {
        write_string(&mut buf, &m.name);
        write_string(&mut buf, &m.label);
        buf.extend_from_slice(&m.t0.to_le_bytes());
        buf.extend_from_slice(&m.t1.to_le_bytes());
        buf.extend_from_slice(&m.amount.to_le_bytes());
        buf.extend_from_slice(&(m.sample.len() as u32).to_le_bytes());
        for v in &m.sample {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    buf
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    // Strings longer than u16::MAX are cut at a char boundary.
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.extend_from_slice(&(end as u16).to_le_bytes());
    buf.extend_from_slice(&s.as_bytes()[..end]);
}

// ---------------------------------------------------------------------------
// Bounds-checked cursor
// ---------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let bytes = self
            .offset
            .checked_add(n)
            .and_then(|end| self.data.get(self.offset..end))
            .ok_or(DecodeError::Truncated {
                field,
                offset: self.offset,
            })?;
        self.offset += n;
        Ok(bytes)
    }

    fn fixed<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn ensure_records(
        &self,
        count: usize,
        min_size: usize,
        field: &'static str,
    ) -> Result<(), DecodeError> {
        let need = count.saturating_mul(min_size);
        if need > self.remaining() {
            return Err(DecodeError::LengthOverflow {
                field,
                len: count,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.fixed::<1>(field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.fixed(field)?))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.fixed(field)?))
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.fixed(field)?))
    }

    fn i64(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.fixed(field)?))
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u16(field)? as usize;
        if len > self.remaining() {
            return Err(DecodeError::LengthOverflow {
                field,
                len,
                remaining: self.remaining(),
            });
        }
        let bytes = self.take(len, field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }
}
