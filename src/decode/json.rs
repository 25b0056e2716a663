//! JSON snapshot documents.
//!
//! Accepts either `{"node": "...", "metrics": [...]}` or a bare array of
//! metric objects. Only `name` is required per metric.

use serde::Deserialize;

use super::{Decode, DecodeError};
use crate::snapshot::{MetricSnapshot, SnapshotSet};

/// Decoder for JSON snapshot documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    Object {
        #[serde(default)]
        node: Option<String>,
        metrics: Vec<JsonMetric>,
    },
    List(Vec<JsonMetric>),
}

#[derive(Debug, Deserialize)]
struct JsonMetric {
    name: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    t0: i64,
    #[serde(default)]
    t1: i64,
    #[serde(default)]
    amount: i32,
    #[serde(default)]
    sample: Vec<i64>,
}

impl From<JsonMetric> for MetricSnapshot {
    fn from(m: JsonMetric) -> Self {
        Self {
            name: m.name,
            label: m.label,
            t0: m.t0,
            t1: m.t1,
            amount: m.amount,
            sample: m.sample,
        }
    }
}

impl Decode for JsonDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, payload: &[u8]) -> Result<SnapshotSet, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        let (node, metrics) = match serde_json::from_slice::<Document>(payload)? {
            Document::Object { node, metrics } => (node, metrics),
            Document::List(metrics) => (None, metrics),
        };

        Ok(SnapshotSet::new(
            node,
            metrics.into_iter().map(MetricSnapshot::from),
        ))
    }
}
