use std::sync::Arc;

use dashmap::DashMap;

use crate::snapshot::{NodeId, SnapshotSet};

/// Current-state table of the latest snapshot set per node.
///
/// Uses `DashMap` so concurrent upserts only contend on the shard holding the
/// key. Values are whole `Arc<SnapshotSet>`s swapped under the shard lock, so a
/// reader sees either the previous set or the next one, never a mix.
pub struct NodeStore {
    nodes: DashMap<NodeId, Arc<SnapshotSet>>,
}

impl NodeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            nodes: DashMap::with_capacity(64),
        }
    }

    /// Replaces whatever is stored for `id`. Last call wins; nothing is merged.
    pub fn upsert(&self, id: NodeId, set: Arc<SnapshotSet>) {
        self.nodes.insert(id, set);
    }

    /// Returns a point-in-time copy of every entry for one render pass.
    ///
    /// Only `Arc` handles are cloned; the shard read locks are released before
    /// returning.
    pub fn snapshot_all(&self) -> Vec<(NodeId, Arc<SnapshotSet>)> {
        self.nodes
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Returns the set currently stored for `id`.
    pub fn get(&self, id: &NodeId) -> Option<Arc<SnapshotSet>> {
        self.nodes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MetricSnapshot;

    fn set_with(name: &str, value: i64) -> Arc<SnapshotSet> {
        Arc::new(SnapshotSet::new(
            None,
            vec![MetricSnapshot {
                name: name.to_string(),
                sample: vec![value],
                ..Default::default()
            }],
        ))
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = NodeStore::new();
        let id = NodeId::new("a");
        let set = set_with("node.peers", 3);

        store.upsert(id.clone(), Arc::clone(&set));
        store.upsert(id.clone(), Arc::clone(&set));
        store.upsert(id.clone(), Arc::clone(&set));

        let all = store.snapshot_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, id);
        assert_eq!(all[0].1.stat("node.peers").max(), 3);
    }

    #[test]
    fn test_last_write_wins() {
        let store = NodeStore::new();
        let a = NodeId::new("a");
        let b = NodeId::new("b");

        store.upsert(a.clone(), set_with("node.peers", 1));
        store.upsert(b.clone(), set_with("node.peers", 100));
        store.upsert(a.clone(), set_with("node.peers", 2));
        store.upsert(a.clone(), set_with("node.peers", 3));

        let stored = store.get(&a).expect("a present");
        assert_eq!(stored.stat("node.peers").max(), 3);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_no_cross_talk() {
        let store = NodeStore::new();
        let a = NodeId::new("a");
        let b = NodeId::new("b");

        store.upsert(b.clone(), set_with("node.conns", 9));
        let before = store.get(&b).expect("b present");

        store.upsert(a.clone(), set_with("node.conns", 1));
        store.upsert(a, set_with("node.peers", 2));

        let after = store.get(&b).expect("b present");
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.stat("node.conns").max(), 9);
    }

    #[test]
    fn test_upsert_replaces_whole_set() {
        let store = NodeStore::new();
        let x = NodeId::new("x");

        store.upsert(x.clone(), set_with("node.peers", 5));
        store.upsert(x.clone(), set_with("node.conns", 7));

        let stored = store.get(&x).expect("x present");
        assert!(stored.get("node.peers").is_none());
        assert_eq!(stored.stat("node.conns").max(), 7);
    }

    #[test]
    fn test_empty_store() {
        let store = NodeStore::default();
        assert!(store.is_empty());
        assert!(store.snapshot_all().is_empty());
        assert!(store.get(&NodeId::new("missing")).is_none());
    }

    #[test]
    fn test_concurrent_upserts() {
        use std::thread;

        let store = Arc::new(NodeStore::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let id = NodeId::new(&format!("node-{}", i % 16));
                    store.upsert(id, set_with("node.peers", t * 1000 + i));
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }

        assert_eq!(store.len(), 16);
        for (_, set) in store.snapshot_all() {
            assert_eq!(set.len(), 1);
        }
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_upserts() {
        let store = NodeStore::new();
        let a = NodeId::new("a");
        store.upsert(a.clone(), set_with("node.peers", 1));

        let view = store.snapshot_all();
        store.upsert(a, set_with("node.peers", 2));

        assert_eq!(view[0].1.stat("node.peers").max(), 1);
    }
}
