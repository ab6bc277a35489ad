// ── Transaction context ──
//
// A context is owned by exactly one caller from Begin to Commit. It holds
// the user on whose behalf the transaction runs, the daemons it touches,
// the locks taken on them and the pending updates. Dropping a context
// releases its locks.

use std::fmt;

use crate::error::CoreError;
use crate::locker::DaemonLockGuard;
use crate::model::{DaemonId, Operation, PersistedConfigUpdate, UserId};

use super::recipe::Recipe;

/// One operation of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate {
    pub operation: Operation,
    pub daemon_ids: Vec<DaemonId>,
    pub recipe: Recipe,
}

impl ConfigUpdate {
    pub fn new(operation: Operation, recipe: Recipe) -> Self {
        Self {
            operation,
            daemon_ids: Vec::new(),
            recipe,
        }
    }

    /// Encode for a scheduled change row.
    pub fn to_persisted(&self) -> Result<PersistedConfigUpdate, CoreError> {
        Ok(PersistedConfigUpdate {
            operation: self.operation,
            daemon_ids: self.daemon_ids.clone(),
            recipe: serde_json::to_string(&self.recipe)?,
        })
    }

    /// Decode a scheduled change row.
    pub fn from_persisted(persisted: &PersistedConfigUpdate) -> Result<Self, serde_json::Error> {
        Ok(Self {
            operation: persisted.operation,
            daemon_ids: persisted.daemon_ids.clone(),
            recipe: serde_json::from_str(&persisted.recipe)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionState {
    /// Set when the state was restored from a scheduled change.
    pub scheduled: bool,
    pub updates: Vec<ConfigUpdate>,
}

impl TransactionState {
    /// Whether Commit would send anything.
    pub fn has_commands(&self) -> bool {
        self.updates.iter().any(|u| !u.recipe.commands().is_empty())
    }
}

pub struct TransactionContext {
    user_id: Option<UserId>,
    daemon_ids: Vec<DaemonId>,
    locks: Vec<DaemonLockGuard>,
    pub(crate) state: TransactionState,
}

impl TransactionContext {
    pub(crate) fn new(user_id: Option<UserId>, update: ConfigUpdate) -> Self {
        Self {
            user_id,
            daemon_ids: Vec::new(),
            locks: Vec::new(),
            state: TransactionState {
                scheduled: false,
                updates: vec![update],
            },
        }
    }

    pub(crate) fn restored(user_id: UserId, updates: Vec<ConfigUpdate>) -> Self {
        let mut ctx = Self {
            user_id: Some(user_id),
            daemon_ids: Vec::new(),
            locks: Vec::new(),
            state: TransactionState {
                scheduled: true,
                updates,
            },
        };
        let ids: Vec<DaemonId> = ctx
            .state
            .updates
            .iter()
            .flat_map(|u| u.daemon_ids.iter().copied())
            .collect();
        ctx.add_daemons(&ids);
        ctx
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Every daemon the transaction targets, in first-seen order.
    pub fn daemon_ids(&self) -> &[DaemonId] {
        &self.daemon_ids
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn is_scheduled(&self) -> bool {
        self.state.scheduled
    }

    /// Whether this context holds the lock on `daemon_id`.
    pub fn holds_lock(&self, daemon_id: DaemonId) -> bool {
        self.locks
            .iter()
            .any(|guard| guard.daemon_ids().contains(&daemon_id))
    }

    pub(crate) fn add_daemons(&mut self, ids: &[DaemonId]) {
        for id in ids {
            if !self.daemon_ids.contains(id) {
                self.daemon_ids.push(*id);
            }
        }
    }

    pub(crate) fn add_lock(&mut self, guard: DaemonLockGuard) {
        self.locks.push(guard);
    }

    /// Daemons among `ids` this context has not locked yet.
    pub(crate) fn unlocked(&self, ids: &[DaemonId]) -> Vec<DaemonId> {
        let mut missing: Vec<DaemonId> = Vec::new();
        for id in ids {
            if !self.holds_lock(*id) && !missing.contains(id) {
                missing.push(*id);
            }
        }
        missing
    }

    /// The pending update begun for `operation`.
    pub(crate) fn update_mut(&mut self, operation: Operation) -> Result<&mut ConfigUpdate, CoreError> {
        self.state
            .updates
            .iter_mut()
            .rev()
            .find(|u| u.operation == operation)
            .ok_or_else(|| {
                CoreError::validation(format!("transaction was not begun for {operation}"))
            })
    }

    /// Split into the state and the locks; the caller drops the locks
    /// when it is done.
    pub(crate) fn into_parts(self) -> (TransactionState, Vec<DaemonLockGuard>) {
        (self.state, self.locks)
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("user_id", &self.user_id)
            .field("daemon_ids", &self.daemon_ids)
            .field("locks", &self.locks.len())
            .field("state", &self.state)
            .finish()
    }
}
