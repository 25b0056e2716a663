use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::format::Format;
use crate::snapshot::MetricSnapshot;

/// Statistic extracted from a metric snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum Stat {
    Max,
    Min,
    Mean,
    Count,
    /// Percentile in percent, e.g. `Quantile(99.0)`.
    Quantile(f64),
    /// Reporting window length in nanoseconds.
    Window,
}

impl Stat {
    /// Reads this statistic from `snapshot` as a float.
    pub fn value(self, snapshot: &MetricSnapshot) -> f64 {
        match self {
            Self::Max => snapshot.max() as f64,
            Self::Min => snapshot.min() as f64,
            Self::Mean => snapshot.mean(),
            Self::Count => snapshot.count() as f64,
            Self::Quantile(p) => snapshot.quantile(p),
            Self::Window => snapshot.window().as_nanos() as f64,
        }
    }

    /// Reads this statistic exactly when it is integral (max, min, count).
    pub fn integer(self, snapshot: &MetricSnapshot) -> Option<i64> {
        match self {
            Self::Max => Some(snapshot.max()),
            Self::Min => Some(snapshot.min()),
            Self::Count => Some(i64::try_from(snapshot.count()).unwrap_or(i64::MAX)),
            Self::Mean | Self::Quantile(_) | Self::Window => None,
        }
    }
}

impl FromStr for Stat {
    type Err = String;

    /// Parses `max`, `min`, `mean`, `count`, `window` or `pNN` (e.g. `p99`,
    /// `p99.9`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "mean" => Ok(Self::Mean),
            "count" => Ok(Self::Count),
            "window" => Ok(Self::Window),
            other => {
                let p = other
                    .strip_prefix('p')
                    .and_then(|p| p.parse::<f64>().ok())
                    .ok_or_else(|| format!("unknown statistic: {other}"))?;
                if !(p > 0.0 && p <= 100.0) {
                    return Err(format!("quantile {other} must be within (0, 100]"));
                }
                Ok(Self::Quantile(p))
            }
        }
    }
}

impl TryFrom<String> for Stat {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Min => f.write_str("min"),
            Self::Mean => f.write_str("mean"),
            Self::Count => f.write_str("count"),
            Self::Window => f.write_str("window"),
            Self::Quantile(p) => write!(f, "p{p}"),
        }
    }
}

/// One formatted value inside a cell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Part {
    /// Source metric name.
    pub metric: String,

    /// Statistic to read. Default: max.
    #[serde(default = "default_stat")]
    pub stat: Stat,

    /// Cell formatter. Default: integer.
    #[serde(default)]
    pub format: Format,

    /// Divisor applied before formatting. Default: 1.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

impl Part {
    pub fn new(metric: &str, stat: Stat, format: Format) -> Self {
        Self {
            metric: metric.to_string(),
            stat,
            format,
            scale: default_scale(),
        }
    }

    /// Sets the divisor applied before formatting.
    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Formats this part for a snapshot (the zero snapshot if missing).
    pub fn render(&self, snapshot: &MetricSnapshot) -> String {
        // Unscaled integral stats skip f64, which is exact only up to 2^53.
        if self.scale == 1.0 {
            if let Some(text) = self
                .stat
                .integer(snapshot)
                .and_then(|v| self.format.apply_integer(v))
            {
                return text;
            }
        }

        self.format.apply(self.stat.value(snapshot) / self.scale)
    }
}

/// A displayed column: a header plus one or more parts joined by `separator`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Column {
    pub header: String,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub separator: String,
}

impl Column {
    pub fn new(header: &str, parts: Vec<Part>, separator: &str) -> Self {
        Self {
            header: header.to_string(),
            parts,
            separator: separator.to_string(),
        }
    }

    /// Single-part column.
    pub fn single(header: &str, part: Part) -> Self {
        Self::new(header, vec![part], "")
    }
}

/// Ordered column definitions. The node identity is always the first column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    pub identity_header: String,
    pub columns: Vec<Column>,
}

impl ColumnSet {
    pub fn new(identity_header: &str, columns: Vec<Column>) -> Self {
        Self {
            identity_header: identity_header.to_string(),
            columns,
        }
    }

    /// Version 1 layout: peers, connections, cores, goroutines, heap, GC and
    /// publish latency percentiles.
    pub fn v1() -> Self {
        use Format::{Bytes, Cores, Integer, Micros, Percent};
        use Stat::{Max, Mean, Quantile};

        Self::new(
            "Addr",
            vec![
                Column::single("Peers", Part::new("node.peers", Max, Integer)),
                Column::single("Conns", Part::new("node.conns", Max, Integer)),
                Column::single("Core", Part::new("go.procs", Max, Cores)),
                Column::single("Go", Part::new("go.count", Max, Integer)),
                Column::new(
                    "Heap",
                    vec![
                        Part::new("heap.inuse", Max, Bytes),
                        Part::new("heap.sys", Max, Bytes),
                    ],
                    "/",
                ),
                Column::new(
                    "GC",
                    vec![
                        Part::new("gc.sys", Max, Bytes),
                        // gc.cpu is reported in tenths of a percent.
                        Part::new("gc.cpu", Mean, Percent).scaled(10.0),
                    ],
                    " ",
                ),
                Column::single("<- p99", Part::new("send.pub", Quantile(99.0), Micros)),
                Column::single("-> p99", Part::new("rcv.pub", Quantile(99.0), Micros)),
            ],
        )
    }

    /// Header row, identity first.
    pub fn headers(&self) -> Vec<String> {
        std::iter::once(self.identity_header.clone())
            .chain(self.columns.iter().map(|c| c.header.clone()))
            .collect()
    }

    /// Number of displayed columns including the identity.
    pub fn width(&self) -> usize {
        self.columns.len() + 1
    }
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self::v1()
    }
}

fn default_stat() -> Stat {
    Stat::Max
}

fn default_scale() -> f64 {
    1.0
}
