//! The external monitor store interface.

use kubemon_rules::Monitor;

use crate::error::Result;

/// Operations kubemon needs from the external monitor store.
///
/// Implemented over HTTP by [`DatadogClient`](crate::DatadogClient) and in
/// memory by [`InMemoryMonitorStore`](crate::InMemoryMonitorStore).
#[allow(async_fn_in_trait)]
pub trait MonitorApi: Send + Sync + 'static {
    /// Lists every monitor carrying all of `tags`.
    fn list_by_tags(
        &self,
        tags: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Monitor>>> + Send;

    /// Creates a monitor and returns it with its store-assigned id.
    fn create(&self, monitor: &Monitor)
    -> impl std::future::Future<Output = Result<Monitor>> + Send;

    /// Replaces the monitor with the given id.
    fn update(
        &self,
        id: i64,
        monitor: &Monitor,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Deletes the monitor with the given id.
    fn delete(&self, id: i64) -> impl std::future::Future<Output = Result<()>> + Send;
}
