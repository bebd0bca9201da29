//! In-memory monitor store for tests and local runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kubemon_rules::Monitor;
use parking_lot::Mutex;

use crate::api::MonitorApi;
use crate::error::{Result, SyncError};

/// A store call, as recorded by [`InMemoryMonitorStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// A tag query.
    List {
        /// The queried tags.
        tags: Vec<String>,
    },
    /// A create of the named monitor.
    Create {
        /// Monitor name.
        name: String,
    },
    /// An update of the identified monitor.
    Update {
        /// Monitor id.
        id: i64,
        /// Monitor name.
        name: String,
    },
    /// A delete of the identified monitor.
    Delete {
        /// Monitor id.
        id: i64,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    monitors: BTreeMap<i64, Monitor>,
    next_id: i64,
    calls: Vec<StoreCall>,
    failing_names: BTreeSet<String>,
    fail_lists: bool,
}

/// Monitor store kept in process memory.
///
/// Clones share state, so a test can hand one clone to the synchronizer and
/// inspect another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMonitorStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryMonitorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a monitor directly, assigning an id. Not recorded as a call.
    pub fn seed(&self, mut monitor: Monitor) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        monitor.id = Some(id);
        state.monitors.insert(id, monitor);
        id
    }

    /// Returns every stored monitor ordered by id.
    #[must_use]
    pub fn monitors(&self) -> Vec<Monitor> {
        self.state.lock().monitors.values().cloned().collect()
    }

    /// Returns the stored monitor with this name, if any.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Monitor> {
        self.state
            .lock()
            .monitors
            .values()
            .find(|m| m.name.as_deref() == Some(name))
            .cloned()
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the recorded calls that change state.
    #[must_use]
    pub fn write_calls(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, StoreCall::List { .. }))
            .collect()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Makes creates and updates of the named monitor fail.
    pub fn fail_writes_for(&self, name: &str) {
        self.state.lock().failing_names.insert(name.to_string());
    }

    /// Makes every tag query fail.
    pub fn fail_lists(&self, fail: bool) {
        self.state.lock().fail_lists = fail;
    }

    fn rejected(operation: &'static str, name: &str) -> SyncError {
        SyncError::Api {
            operation,
            status: 500,
            body: format!("injected failure for {name}"),
        }
    }
}

impl MonitorApi for InMemoryMonitorStore {
    async fn list_by_tags(&self, tags: &[String]) -> Result<Vec<Monitor>> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::List {
            tags: tags.to_vec(),
        });
        if state.fail_lists {
            return Err(Self::rejected("list", &tags.join(",")));
        }
        Ok(state
            .monitors
            .values()
            .filter(|m| m.has_tags(tags))
            .cloned()
            .collect())
    }

    async fn create(&self, monitor: &Monitor) -> Result<Monitor> {
        let mut state = self.state.lock();
        let name = monitor.name_str().to_string();
        state.calls.push(StoreCall::Create { name: name.clone() });
        if state.failing_names.contains(&name) {
            return Err(Self::rejected("create", &name));
        }
        state.next_id += 1;
        let id = state.next_id;
        let mut created = monitor.clone();
        created.id = Some(id);
        state.monitors.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, monitor: &Monitor) -> Result<()> {
        let mut state = self.state.lock();
        let name = monitor.name_str().to_string();
        state.calls.push(StoreCall::Update {
            id,
            name: name.clone(),
        });
        if state.failing_names.contains(&name) {
            return Err(Self::rejected("update", &name));
        }
        let Some(existing) = state.monitors.get_mut(&id) else {
            return Err(SyncError::NotFound { id });
        };
        let overall_state = existing.overall_state.take();
        *existing = monitor.clone();
        existing.id = Some(id);
        existing.overall_state = overall_state;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::Delete { id });
        state
            .monitors
            .remove(&id)
            .map(|_| ())
            .ok_or(SyncError::NotFound { id })
    }
}
