// ── Daemon locker ──
//
// Process-wide advisory locks on daemons. A transaction locks every daemon
// it will touch in one call; overlap with a lock held elsewhere fails the
// whole call. Each call gets its own key so that unlocking releases exactly
// the daemons that call locked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::DaemonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey(Uuid);

#[derive(Default)]
pub struct DaemonLocker {
    table: Mutex<HashMap<DaemonId, LockKey>>,
}

impl DaemonLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock all of `daemon_ids` or none of them.
    pub fn lock(self: &Arc<Self>, daemon_ids: &[DaemonId]) -> Result<DaemonLockGuard, CoreError> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mut busy: Vec<DaemonId> = daemon_ids
            .iter()
            .copied()
            .filter(|id| table.contains_key(id))
            .collect();
        if !busy.is_empty() {
            busy.sort();
            busy.dedup();
            return Err(CoreError::LockContention { daemon_ids: busy });
        }

        let key = LockKey(Uuid::new_v4());
        for id in daemon_ids {
            table.insert(*id, key);
        }
        debug!(daemons = ?daemon_ids, "locked daemons");
        Ok(DaemonLockGuard {
            locker: Arc::clone(self),
            key,
            daemon_ids: daemon_ids.to_vec(),
        })
    }

    /// Release every daemon locked under `key`.
    pub fn unlock(&self, key: LockKey) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.retain(|_, held| *held != key);
    }

    pub fn is_locked(&self, daemon_id: DaemonId) -> bool {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&daemon_id)
    }
}

/// Locks held by one transaction; released on drop.
pub struct DaemonLockGuard {
    locker: Arc<DaemonLocker>,
    key: LockKey,
    daemon_ids: Vec<DaemonId>,
}

impl DaemonLockGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn daemon_ids(&self) -> &[DaemonId] {
        &self.daemon_ids
    }
}

impl Drop for DaemonLockGuard {
    fn drop(&mut self) {
        self.locker.unlock(self.key);
        debug!(daemons = ?self.daemon_ids, "unlocked daemons");
    }
}

impl std::fmt::Debug for DaemonLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonLockGuard")
            .field("key", &self.key)
            .field("daemon_ids", &self.daemon_ids)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_locks_contend() {
        let locker = Arc::new(DaemonLocker::new());
        let guard = locker.lock(&[DaemonId(1), DaemonId(2)]).unwrap();

        let err = locker.lock(&[DaemonId(2), DaemonId(3)]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::LockContention { ref daemon_ids } if daemon_ids == &vec![DaemonId(2)]
        ));
        assert!(!locker.is_locked(DaemonId(3)));

        let other = locker.lock(&[DaemonId(3)]).unwrap();
        drop(guard);
        assert!(!locker.is_locked(DaemonId(1)));
        assert!(locker.is_locked(DaemonId(3)));
        drop(other);
        assert!(!locker.is_locked(DaemonId(3)));
    }
}
