use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::decode::{Decode, DecodeError, Decoder};
use crate::snapshot::NodeId;
use crate::store::NodeStore;

/// Result of handling one inbound payload.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The payload decoded and replaced the entry for this node.
    Stored(NodeId),
    /// The payload did not decode; the store is untouched.
    Rejected(DecodeError),
    /// The payload decoded but carried no node identity; the store is untouched.
    MissingIdentity,
}

/// Decodes payloads from the transport and upserts them into the store.
///
/// Cheap to clone; clones share the store and counters.
#[derive(Clone)]
pub struct Ingestor {
    decoder: Decoder,
    store: Arc<NodeStore>,
    stats: Arc<IngestStats>,
}

impl Ingestor {
    pub fn new(decoder: Decoder, store: Arc<NodeStore>) -> Self {
        Self {
            decoder,
            store,
            stats: Arc::new(IngestStats::new()),
        }
    }

    /// Handles one payload. Nothing is written unless decoding and identity
    /// resolution both succeed.
    pub fn ingest(&self, payload: &[u8]) -> IngestOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let set = match self.decoder.decode(payload) {
            Ok(set) => set,
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!(
                    decoder = self.decoder.name(),
                    bytes = payload.len(),
                    error = %e,
                    "dropping undecodable payload",
                );
                return IngestOutcome::Rejected(e);
            }
        };

        let Some(id) = set.identity() else {
            self.stats.missing_identity.fetch_add(1, Ordering::Relaxed);
            debug!(metrics = set.len(), "dropping snapshot without node identity");
            return IngestOutcome::MissingIdentity;
        };

        trace!(node = %id, metrics = set.len(), "snapshot stored");
        self.store.upsert(id.clone(), Arc::new(set));
        self.stats.stored.fetch_add(1, Ordering::Relaxed);

        IngestOutcome::Stored(id)
    }

    /// Returns the shared store.
    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    /// Returns the shared counters.
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }
}

/// Lock-free ingest counters. Cumulative since startup.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    stored: AtomicU64,
    decode_errors: AtomicU64,
    missing_identity: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads all counters.
    pub fn snapshot(&self) -> IngestCounts {
        IngestCounts {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            missing_identity: self.missing_identity.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounts {
    pub received: u64,
    pub stored: u64,
    pub decode_errors: u64,
    pub missing_identity: u64,
}

impl IngestCounts {
    /// Payloads that never reached the store.
    pub fn dropped(&self) -> u64 {
        self.decode_errors + self.missing_identity
    }
}
