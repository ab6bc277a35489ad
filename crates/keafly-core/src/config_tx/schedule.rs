// ── Scheduled transactions ──
//
// An applied context can be parked in the store with a deadline instead of
// being committed. Its locks are released at that point; the due-scanner
// re-locks the daemons when the deadline passes. A change is executed at
// most once: success deletes the row, failure marks it executed and keeps
// the error text.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{ConfigModule, ConfigUpdate, TransactionContext};
use crate::config::LockPolicy;
use crate::error::CoreError;
use crate::model::{NewEvent, ScheduledChangeId, ScheduledConfigChange};

/// Outcome of one due-scanner pass.
#[derive(Debug, Default)]
pub struct DueChangesReport {
    pub committed: Vec<ScheduledChangeId>,
    /// Changes that failed to commit and were marked executed.
    pub failed: Vec<(ScheduledChangeId, String)>,
    /// Changes left for a later pass because a daemon was locked.
    pub postponed: Vec<ScheduledChangeId>,
    /// Changes whose stored recipe could not be decoded.
    pub errors: Vec<CoreError>,
}

impl DueChangesReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
            && self.failed.is_empty()
            && self.postponed.is_empty()
            && self.errors.is_empty()
    }
}

impl ConfigModule {
    /// Persist the applied context for execution at `deadline_at`.
    ///
    /// The context is consumed; its locks are released.
    pub async fn schedule(
        &self,
        ctx: TransactionContext,
        deadline_at: DateTime<Utc>,
    ) -> Result<ScheduledConfigChange, CoreError> {
        let user_id = ctx
            .user_id()
            .ok_or_else(|| CoreError::validation("scheduled changes require a user"))?;
        if ctx.state().updates.is_empty() {
            return Err(CoreError::validation("transaction has no updates to schedule"));
        }
        let updates = ctx
            .state()
            .updates
            .iter()
            .map(ConfigUpdate::to_persisted)
            .collect::<Result<Vec<_>, _>>()?;
        drop(ctx);

        let stored = self
            .store
            .add_scheduled_config_change(ScheduledConfigChange::new(deadline_at, user_id, updates))
            .await?;
        info!(id = %stored.id, deadline = %stored.deadline_at, "config change scheduled");
        Ok(stored)
    }

    /// Rebuild a locked context from a stored change.
    pub fn restore(&self, change: &ScheduledConfigChange) -> Result<TransactionContext, CoreError> {
        let updates = change
            .updates
            .iter()
            .map(|persisted| {
                ConfigUpdate::from_persisted(persisted).map_err(|e| CoreError::ScheduleRetrieval {
                    id: change.id.get(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut ctx = TransactionContext::restored(change.user_id, updates);
        let ids = ctx.daemon_ids().to_vec();
        if !ids.is_empty() {
            ctx.add_lock(self.locker.lock(&ids)?);
        }
        Ok(ctx)
    }

    /// Commit every change whose deadline is at or before `now`.
    pub async fn commit_due_changes(&self, now: DateTime<Utc>) -> Result<DueChangesReport, CoreError> {
        let mut report = DueChangesReport::default();
        for change in self.store.get_due_config_changes(now).await? {
            let ctx = match self.restore(&change) {
                Ok(ctx) => ctx,
                Err(CoreError::LockContention { daemon_ids }) if self.lock_policy == LockPolicy::Postpone => {
                    info!(id = %change.id, daemons = ?daemon_ids, "scheduled change postponed");
                    report.postponed.push(change.id);
                    continue;
                }
                Err(e @ CoreError::LockContention { .. }) => {
                    self.fail_change(&change, &e, &mut report).await?;
                    continue;
                }
                Err(e) => {
                    warn!(id = %change.id, error = %e, "cannot restore scheduled change");
                    report.errors.push(e);
                    continue;
                }
            };

            match self.commit(ctx).await {
                Ok(_) => {
                    self.store.delete_scheduled_config_change(change.id).await?;
                    info!(id = %change.id, "scheduled change committed");
                    report.committed.push(change.id);
                }
                Err(e) => self.fail_change(&change, &e, &mut report).await?,
            }
        }
        Ok(report)
    }

    async fn fail_change(
        &self,
        change: &ScheduledConfigChange,
        error: &CoreError,
        report: &mut DueChangesReport,
    ) -> Result<(), CoreError> {
        let text = error.to_string();
        warn!(id = %change.id, error = %text, "scheduled change failed");
        self.store
            .mark_scheduled_config_change_executed(change.id, Some(text.clone()))
            .await?;
        self.events
            .emit(
                NewEvent::error(format!("scheduled config change {} failed", change.id))
                    .with_details(text.clone()),
            )
            .await;
        report.failed.push((change.id, text));
        Ok(())
    }
}
