//! Prometheus counters for the kubemon controller.
//!
//! Every component that talks to the cluster or the external monitor store
//! reports through a shared [`ControllerMetrics`] handle. The handle is cheap
//! to clone; all clones feed the same registry.
//!
//! # Example
//!
//! ```rust
//! use kubemon_metrics::{ControllerMetrics, ChangeAction};
//!
//! let metrics = ControllerMetrics::new();
//! metrics.inc_changed("deployments", ChangeAction::CreateUpdate);
//! metrics.inc_template_errors();
//!
//! let output = metrics.encode();
//! assert!(output.contains("kubemon_changed_total"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// The kind of change applied to the monitor store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// A monitor was created or updated.
    CreateUpdate,
    /// Monitors were deleted.
    Delete,
}

impl ChangeAction {
    /// Returns the label value for this action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUpdate => "create_update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Label set for change counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChangeLabels {
    /// The object family that triggered the change (e.g. "deployments").
    pub object: String,
    /// The action taken ("create_update" or "delete").
    pub action: String,
}

/// Counters shared by the reconciliation engine.
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Arc<RwLock<Registry>>,
    errors_total: Counter,
    template_errors_total: Counter,
    store_api_errors_total: Counter,
    events_abandoned_total: Counter,
    changed_total: Family<ChangeLabels, Counter>,
}

impl std::fmt::Debug for ControllerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerMetrics")
            .field("errors_total", &self.errors_total.get())
            .field("template_errors_total", &self.template_errors_total.get())
            .field("store_api_errors_total", &self.store_api_errors_total.get())
            .finish_non_exhaustive()
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    /// Creates a fresh registry with every kubemon counter registered.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let errors_total = Counter::default();
        registry.register(
            "kubemon_errors",
            "Number of errors while reconciling",
            errors_total.clone(),
        );

        let template_errors_total = Counter::default();
        registry.register(
            "kubemon_template_errors",
            "Number of errors applying templates",
            template_errors_total.clone(),
        );

        let store_api_errors_total = Counter::default();
        registry.register(
            "kubemon_store_api_errors",
            "Number of errors interacting with the monitor store api",
            store_api_errors_total.clone(),
        );

        let events_abandoned_total = Counter::default();
        registry.register(
            "kubemon_events_abandoned",
            "Number of change events dropped after exhausting their retries",
            events_abandoned_total.clone(),
        );

        let changed_total = Family::<ChangeLabels, Counter>::default();
        registry.register(
            "kubemon_changed",
            "Number of times a monitor is created, updated or deleted",
            changed_total.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            errors_total,
            template_errors_total,
            store_api_errors_total,
            events_abandoned_total,
            changed_total,
        }
    }

    /// Increments the reconcile error counter.
    pub fn inc_errors(&self) {
        self.errors_total.inc();
    }

    /// Returns the reconcile error count.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors_total.get()
    }

    /// Increments the template error counter.
    pub fn inc_template_errors(&self) {
        self.template_errors_total.inc();
    }

    /// Returns the template error count.
    #[must_use]
    pub fn template_errors(&self) -> u64 {
        self.template_errors_total.get()
    }

    /// Increments the monitor store error counter.
    pub fn inc_store_api_errors(&self) {
        self.store_api_errors_total.inc();
    }

    /// Returns the monitor store error count.
    #[must_use]
    pub fn store_api_errors(&self) -> u64 {
        self.store_api_errors_total.get()
    }

    /// Increments the abandoned event counter.
    pub fn inc_events_abandoned(&self) {
        self.events_abandoned_total.inc();
    }

    /// Returns the abandoned event count.
    #[must_use]
    pub fn events_abandoned(&self) -> u64 {
        self.events_abandoned_total.get()
    }

    /// Increments the change counter for an object family and action.
    pub fn inc_changed(&self, object: &str, action: ChangeAction) {
        let labels = ChangeLabels {
            object: object.to_string(),
            action: action.as_str().to_string(),
        };
        self.changed_total.get_or_create(&labels).inc();
    }

    /// Returns the change count for an object family and action.
    #[must_use]
    pub fn changed(&self, object: &str, action: ChangeAction) -> u64 {
        let labels = ChangeLabels {
            object: object.to_string(),
            action: action.as_str().to_string(),
        };
        self.changed_total.get_or_create(&labels).get()
    }

    /// Encodes all counters in Prometheus text format.
    #[must_use]
    pub fn encode(&self) -> String {
        let registry = self.registry.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }
}
