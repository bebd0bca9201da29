//! Converges the external monitor store toward desired monitors.
//!
//! For each desired monitor the synchronizer looks up the owner's monitors,
//! finds one with the same name, and then either creates the monitor, updates
//! it with the merged result, or leaves it alone when nothing user-visible
//! changed. Every query-then-write sequence runs under one lock so concurrent
//! reconciliations never interleave on the store.

use std::collections::BTreeSet;

use kubemon_metrics::ControllerMetrics;
use kubemon_rules::Monitor;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::MonitorApi;
use crate::error::{Result, SyncError};

/// What [`MonitorSynchronizer::add_or_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No matching monitor existed; one was created.
    Created,
    /// A matching monitor differed and was updated.
    Updated,
    /// A matching monitor was already converged.
    Unchanged,
    /// Dry-run mode; the write was only logged.
    DryRun,
}

/// Returns true if writing `merged` over `current` would change nothing.
///
/// Tag order is not significant to the store, so tags compare as sets.
fn is_converged(merged: &Monitor, current: &Monitor) -> bool {
    fn normalized(monitor: &Monitor) -> Monitor {
        let mut monitor = monitor.clone();
        monitor.tags.sort();
        monitor.tags.dedup();
        monitor
    }
    normalized(merged) == normalized(current)
}

/// Reconciles desired monitors against a [`MonitorApi`].
#[derive(Debug)]
pub struct MonitorSynchronizer<C> {
    client: C,
    owner_tag: String,
    dry_run: bool,
    metrics: ControllerMetrics,
    lock: Mutex<()>,
}

impl<C: MonitorApi> MonitorSynchronizer<C> {
    /// Creates a synchronizer scoped to monitors carrying `owner_tag`.
    pub fn new(
        client: C,
        owner_tag: impl Into<String>,
        dry_run: bool,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            client,
            owner_tag: owner_tag.into(),
            dry_run,
            metrics,
            lock: Mutex::new(()),
        }
    }

    /// Returns the owner tag.
    #[must_use]
    pub fn owner_tag(&self) -> &str {
        &self.owner_tag
    }

    /// Returns true if writes are only logged.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the underlying store client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    fn store_error(&self, err: SyncError) -> SyncError {
        self.metrics.inc_store_api_errors();
        err
    }

    async fn list(&self, tags: &[String]) -> Result<Vec<Monitor>> {
        self.client
            .list_by_tags(tags)
            .await
            .map_err(|e| self.store_error(e))
    }

    /// Creates or updates one desired monitor.
    ///
    /// Store failures are counted and returned; the caller decides whether to
    /// continue with sibling monitors.
    pub async fn add_or_update(&self, desired: &Monitor) -> Result<SyncOutcome> {
        let _guard = self.lock.lock().await;
        let name = desired.name_str();

        let owned = self.list(std::slice::from_ref(&self.owner_tag)).await?;
        let Some(current) = owned.iter().find(|m| m.name.as_deref() == Some(name)) else {
            if self.dry_run {
                info!(monitor = %name, "dry run: would create monitor");
                return Ok(SyncOutcome::DryRun);
            }
            self.client
                .create(desired)
                .await
                .map_err(|e| self.store_error(e))?;
            info!(monitor = %name, "created monitor");
            return Ok(SyncOutcome::Created);
        };

        let merged = desired.merged_with(current);
        if is_converged(&merged, current) {
            debug!(monitor = %name, "monitor unchanged");
            return Ok(SyncOutcome::Unchanged);
        }

        let id = current.id.ok_or_else(|| SyncError::MissingId {
            name: name.to_string(),
        })?;
        if self.dry_run {
            info!(monitor = %name, id, "dry run: would update monitor");
            return Ok(SyncOutcome::DryRun);
        }
        self.client
            .update(id, &merged)
            .await
            .map_err(|e| self.store_error(e))?;
        info!(monitor = %name, id, "updated monitor");
        Ok(SyncOutcome::Updated)
    }

    /// Deletes every monitor carrying all of `tags`.
    ///
    /// Returns the number of monitors deleted.
    pub async fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let found = self.list(tags).await?;
        self.delete_all(&found).await
    }

    /// Deletes monitors carrying all of `tags` whose names are not in `record`.
    ///
    /// `record` holds the names produced by the latest reconciliation of the
    /// owning object. Returns the number of monitors deleted.
    pub async fn delete_extinct(&self, record: &BTreeSet<String>, tags: &[String]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let found = self.list(tags).await?;
        let extinct: Vec<Monitor> = found
            .into_iter()
            .filter(|m| !record.contains(m.name_str()))
            .collect();
        if !extinct.is_empty() {
            debug!(count = extinct.len(), tags = ?tags, "found extinct monitors");
        }
        self.delete_all(&extinct).await
    }

    async fn delete_all(&self, monitors: &[Monitor]) -> Result<usize> {
        let mut deleted = 0;
        let mut failed = 0;
        for monitor in monitors {
            let name = monitor.name_str();
            let Some(id) = monitor.id else {
                warn!(monitor = %name, "skipping monitor without id");
                continue;
            };
            if self.dry_run {
                info!(monitor = %name, id, "dry run: would delete monitor");
                continue;
            }
            match self.client.delete(id).await {
                Ok(()) => {
                    info!(monitor = %name, id, "deleted monitor");
                    deleted += 1;
                }
                Err(SyncError::NotFound { .. }) => {
                    debug!(monitor = %name, id, "monitor already gone");
                }
                Err(e) => {
                    self.metrics.inc_store_api_errors();
                    error!(monitor = %name, id, error = %e, "failed to delete monitor");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(SyncError::DeleteFailed {
                failed,
                attempted: deleted + failed,
            });
        }
        Ok(deleted)
    }
}
