// ── Daemon registry ──
//
// Lock-free arena of the latest daemon snapshots, keyed by daemon id.
// Synchronous readers (transaction Apply, lease dispatch) consult it
// instead of the store; the state puller publishes every refreshed
// snapshot here. Subscribers get the full snapshot via a `watch` channel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{Daemon, DaemonId};

pub struct DaemonRegistry {
    by_id: DashMap<DaemonId, Arc<Daemon>>,

    /// Full snapshot, rebuilt on mutation, sorted by id.
    snapshot: watch::Sender<Arc<Vec<Arc<Daemon>>>>,
}

impl DaemonRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a daemon. Returns `true` if the id was new.
    pub fn upsert(&self, daemon: Daemon) -> bool {
        let is_new = self
            .by_id
            .insert(daemon.id, Arc::new(daemon))
            .is_none();
        self.rebuild_snapshot();
        is_new
    }

    pub fn remove(&self, id: DaemonId) -> Option<Arc<Daemon>> {
        let removed = self.by_id.remove(&id).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub fn get(&self, id: DaemonId) -> Option<Arc<Daemon>> {
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Daemon>>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Daemon>>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Daemon>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by_key(|d| d.id);
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for DaemonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AccessPoint, DaemonName, MachineId};

    fn daemon(id: i64) -> Daemon {
        let mut d = Daemon::new(
            MachineId(1),
            DaemonName::Dhcp4,
            AccessPoint::control("10.0.0.1", 8000),
        );
        d.id = DaemonId(id);
        d
    }

    #[test]
    fn upsert_reports_new_ids() {
        let registry = DaemonRegistry::new();
        assert!(registry.upsert(daemon(1)));
        assert!(!registry.upsert(daemon(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_tracks_removal() {
        let registry = DaemonRegistry::new();
        registry.upsert(daemon(3));
        registry.upsert(daemon(1));
        let ids: Vec<DaemonId> = registry.snapshot().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![DaemonId(1), DaemonId(3)]);

        assert!(registry.remove(DaemonId(3)).is_some());
        assert!(registry.get(DaemonId(3)).is_none());
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.remove(DaemonId(3)).is_none());
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let registry = DaemonRegistry::new();
        let mut rx = registry.subscribe();
        registry.upsert(daemon(5));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
