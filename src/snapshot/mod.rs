use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Metric carrying the node fingerprint in its sample.
pub const NODE_ID_METRIC: &str = "node.id";

/// Metric carrying the node address in its label.
pub const NODE_ADDR_METRIC: &str = "node.addr";

/// Zero-value snapshot handed out for metrics a node did not report.
static ZERO_SNAPSHOT: MetricSnapshot = MetricSnapshot {
    name: String::new(),
    label: String::new(),
    t0: 0,
    t1: 0,
    amount: 0,
    sample: Vec::new(),
};

/// Statistical summary of one metric over a reporting window.
///
/// Every accessor is total: an empty snapshot answers zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSnapshot {
    /// Metric name (e.g. "node.peers").
    pub name: String,
    /// Free-form label attached by the publisher.
    pub label: String,
    /// Window start, unix nanoseconds.
    pub t0: i64,
    /// Window end, unix nanoseconds.
    pub t1: i64,
    /// Number of observations the publisher counted in the window.
    pub amount: i32,
    /// Retained raw observations.
    pub sample: Vec<i64>,
}

impl MetricSnapshot {
    /// Returns the shared zero-value snapshot.
    pub fn zero() -> &'static MetricSnapshot {
        &ZERO_SNAPSHOT
    }

    /// Largest observation, or 0 when the sample is empty.
    pub fn max(&self) -> i64 {
        self.sample.iter().copied().max().unwrap_or(0)
    }

    /// Smallest observation, or 0 when the sample is empty.
    pub fn min(&self) -> i64 {
        self.sample.iter().copied().min().unwrap_or(0)
    }

    /// Arithmetic mean of the sample, or 0 when the sample is empty.
    pub fn mean(&self) -> f64 {
        if self.sample.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.sample.iter().map(|&v| v as f64).sum();
        sum / self.sample.len() as f64
    }

    /// Observation count: the publisher's amount when positive, otherwise the
    /// number of retained observations.
    pub fn count(&self) -> u64 {
        if self.amount > 0 {
            self.amount as u64
        } else {
            self.sample.len() as u64
        }
    }

    /// Sample percentile for `p` in percent (e.g. 99.0).
    ///
    /// Position is `p/100 * (n+1)` over the sorted sample; positions below the
    /// first element clamp to the minimum, past the last to the maximum, and
    /// anything in between interpolates linearly.
    pub fn quantile(&self, p: f64) -> f64 {
        if self.sample.is_empty() || !p.is_finite() {
            return 0.0;
        }

        let mut sorted = self.sample.clone();
        sorted.sort_unstable();
        let n = sorted.len();
        let pos = (p / 100.0) * (n as f64 + 1.0);

        if pos < 1.0 {
            return sorted[0] as f64;
        }
        if pos >= n as f64 {
            return sorted[n - 1] as f64;
        }

        let lower = sorted[pos as usize - 1] as f64;
        let upper = sorted[pos as usize] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }

    /// Length of the reporting window; zero if the bounds are inverted.
    pub fn window(&self) -> Duration {
        let nanos = self.t1.saturating_sub(self.t0);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
    }
}

/// Stable key identifying one cluster node in the table.
///
/// Ordering is byte-lexicographic on the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    /// Renders a 64-bit node fingerprint as 16 lowercase hex digits.
    pub fn from_fingerprint(fingerprint: u64) -> Self {
        Self::new(&format!("{fingerprint:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// All metrics decoded from a single payload, keyed by name.
///
/// Immutable once built; the store shares it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotSet {
    node: Option<String>,
    metrics: HashMap<String, MetricSnapshot>,
}

impl SnapshotSet {
    /// Builds a set from owned snapshots. A repeated name keeps the last one.
    pub fn new(node: Option<String>, metrics: impl IntoIterator<Item = MetricSnapshot>) -> Self {
        let metrics = metrics
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect::<HashMap<_, _>>();
        Self { node, metrics }
    }

    /// Looks up a metric by name.
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    /// Looks up a metric by name, falling back to the zero snapshot.
    pub fn stat(&self, name: &str) -> &MetricSnapshot {
        self.get(name).unwrap_or(MetricSnapshot::zero())
    }

    /// Explicit node name carried by the payload, if any.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Metric names in this set, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Resolves the node identity: explicit node name, then the `node.id`
    /// fingerprint, then the `node.addr` label.
    pub fn identity(&self) -> Option<NodeId> {
        if let Some(node) = self.node().filter(|n| !n.is_empty()) {
            return Some(NodeId::new(node));
        }

        if let Some(id) = self.get(NODE_ID_METRIC).filter(|m| !m.sample.is_empty()) {
            return Some(NodeId::from_fingerprint(id.max() as u64));
        }

        self.get(NODE_ADDR_METRIC)
            .filter(|m| !m.label.is_empty())
            .map(|m| NodeId::new(&m.label))
    }
}
