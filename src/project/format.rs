use std::time::Duration;

use serde::Deserialize;

const KILOBYTE: u64 = 1 << 10;
const MEGABYTE: u64 = 1 << 20;
const GIGABYTE: u64 = 1 << 30;
const TERABYTE: u64 = 1 << 40;
const PETABYTE: u64 = 1 << 50;
const EXABYTE: u64 = 1 << 60;

/// How a statistic is rendered into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Whole number, e.g. `42`.
    #[default]
    Integer,
    /// Core count, e.g. `x8`.
    Cores,
    /// 1024-based byte size, e.g. `1.5M`.
    Bytes,
    /// Value in nanoseconds rendered as a duration, e.g. `1s 250ms`.
    Duration,
    /// One decimal percentage, e.g. `12.5%`.
    Percent,
    /// Latency in whole microseconds, e.g. `350μs`.
    Micros,
}

impl Format {
    /// Renders `value`.
    pub fn apply(self, value: f64) -> String {
        match self {
            Self::Integer => integer(value).to_string(),
            Self::Cores => format!("x{}", integer(value)),
            Self::Bytes => byte_size(integer(value)),
            Self::Duration => duration(value),
            Self::Percent => format!("{:.1}%", finite(value)),
            Self::Micros => format!("{:.0}μs", finite(value)),
        }
    }

    /// Renders an exact integer, for the formatters that show whole numbers.
    pub fn apply_integer(self, value: i64) -> Option<String> {
        match self {
            Self::Integer => Some(value.to_string()),
            Self::Cores => Some(format!("x{value}")),
            Self::Bytes => Some(byte_size(value)),
            Self::Duration | Self::Percent | Self::Micros => None,
        }
    }
}

/// Maps non-finite values to zero.
fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Rounds to the nearest integer, saturating at the i64 bounds.
fn integer(value: f64) -> i64 {
    finite(value).round() as i64
}

/// Formats a byte count with a single-letter binary unit.
///
/// One decimal place with a trailing `.0` dropped; `0B` for zero. Negative
/// counts keep their sign in front of the magnitude.
pub fn byte_size(bytes: i64) -> String {
    if bytes < 0 {
        return format!("-{}", unsigned_byte_size(bytes.unsigned_abs()));
    }
    unsigned_byte_size(bytes as u64)
}

fn unsigned_byte_size(bytes: u64) -> String {
    let (unit, divisor) = match bytes {
        0 => return "0B".to_string(),
        b if b >= EXABYTE => ("E", EXABYTE),
        b if b >= PETABYTE => ("P", PETABYTE),
        b if b >= TERABYTE => ("T", TERABYTE),
        b if b >= GIGABYTE => ("G", GIGABYTE),
        b if b >= MEGABYTE => ("M", MEGABYTE),
        b if b >= KILOBYTE => ("K", KILOBYTE),
        _ => ("B", 1),
    };

    let value = bytes as f64 / divisor as f64;
    let text = format!("{value:.1}");
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{text}{unit}")
}

/// Formats nanoseconds as a compact duration.
///
/// Precision is trimmed to milliseconds above one second and to microseconds
/// above one millisecond. Negative or non-finite input renders as `0s`.
pub fn duration(nanos: f64) -> String {
    let nanos = finite(nanos);
    if nanos <= 0.0 {
        return "0s".to_string();
    }

    let d = Duration::from_nanos(nanos.round().min(u64::MAX as f64) as u64);
    let trimmed = if d >= Duration::from_secs(1) {
        Duration::from_millis(d.as_millis() as u64)
    } else if d >= Duration::from_millis(1) {
        Duration::from_micros(d.as_micros() as u64)
    } else {
        d
    };

    humantime::format_duration(trimmed).to_string()
}
