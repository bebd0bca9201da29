//! Kubernetes controller that keeps alerting monitors in line with cluster objects.
//!
//! Deployments and namespaces are watched through kube-rs reflectors. Every
//! change becomes a [`ChangeEvent`] on a per-kind [`RetryQueue`], drained by a
//! single [`Pipeline`] worker that hands it to the [`Reconciler`]:
//!
//! - rules matching the object's annotations produce monitor templates
//! - override annotations adjust or drop individual monitors
//! - templates are rendered against the object
//! - the monitor synchronizer creates, updates and retires store monitors
//!
//! Namespace changes are propagated to the deployments their binding groups
//! reach. Two timers run next to the pipelines: one reconciles static
//! monitors, the other reloads the rules.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use kubemon_controller::{ChangeEvent, Controller, ControllerConfig, MemoryCluster, ObjectKind};
//! use kubemon_metrics::ControllerMetrics;
//! use kubemon_rules::{RuleStore, parse_rule_set};
//! use kubemon_sync::InMemoryMonitorStore;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let rules = parse_rule_set(
//!     r#"
//! rulesets:
//!   - type: deployment
//!     match_annotations: [{name: team/owner, value: platform}]
//!     monitors:
//!       high-cpu:
//!         name: "Alert {{ .ObjectMeta.Name }}"
//!         query: "avg(last_5m):avg:cpu{*} > 90"
//! "#,
//!     "inline",
//! )
//! .unwrap();
//!
//! let store = InMemoryMonitorStore::new();
//! let config = ControllerConfig {
//!     api_key: "api".to_string(),
//!     app_key: "app".to_string(),
//!     ..ControllerConfig::default()
//! };
//! let controller = Controller::new(
//!     config,
//!     Arc::new(RuleStore::from_rules(rules)),
//!     store.clone(),
//!     ControllerMetrics::new(),
//! );
//!
//! let cluster = MemoryCluster::new();
//! cluster.add_namespace("shop", &[]);
//! let meta = cluster.add_deployment("shop", "checkout", &[("team/owner", "platform")]);
//!
//! let reconciler = controller.reconciler(Arc::new(cluster));
//! reconciler
//!     .handle(&ChangeEvent::resync(ObjectKind::Deployment, meta))
//!     .await
//!     .unwrap();
//! assert!(store.get_by_name("Alert checkout").is_some());
//! # });
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod queue;
pub mod reconciler;

pub use cluster::{ClusterView, MemoryCluster, ObjectSnapshot, ReflectorCluster};
pub use config::ControllerConfig;
pub use controller::Controller;
pub use error::{ControllerError, Result};
pub use event::{ChangeEvent, EventKind, EventTranslator, ObjectKind, ObjectMetadata};
pub use pipeline::{Pipeline, wait_for_cache, watch_resource};
pub use queue::{QueueHandle, QueueItem, RetryPolicy, RetryQueue};
pub use reconciler::{Reconciler, ReconcilerSettings};
