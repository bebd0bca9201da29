//! External monitor store access for kubemon.
//!
//! - [`MonitorApi`] is the store seam: list by tags, create, update, delete
//! - [`DatadogClient`] implements it over the Datadog v1 HTTP API
//! - [`InMemoryMonitorStore`] implements it in memory and records calls
//! - [`MonitorSynchronizer`] converges the store toward desired monitors and
//!   retires monitors that are no longer desired
//!
//! # Example
//!
//! ```rust
//! use kubemon_metrics::ControllerMetrics;
//! use kubemon_rules::Monitor;
//! use kubemon_sync::{InMemoryMonitorStore, MonitorSynchronizer, SyncOutcome};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let store = InMemoryMonitorStore::new();
//! let sync = MonitorSynchronizer::new(store.clone(), "kubemon", false, ControllerMetrics::new());
//!
//! let monitor = Monitor {
//!     name: Some("Alert checkout".to_string()),
//!     tags: vec!["kubemon".to_string()],
//!     ..Monitor::default()
//! };
//! assert_eq!(sync.add_or_update(&monitor).await.unwrap(), SyncOutcome::Created);
//! assert_eq!(sync.add_or_update(&monitor).await.unwrap(), SyncOutcome::Unchanged);
//! # });
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod datadog;
pub mod error;
pub mod memory;
pub mod synchronizer;

pub use api::MonitorApi;
pub use datadog::{DEFAULT_API_URL, DatadogClient, DatadogConfig};
pub use error::{Result, SyncError};
pub use memory::{InMemoryMonitorStore, StoreCall};
pub use synchronizer::{MonitorSynchronizer, SyncOutcome};
