//! Per-kind event pipelines.
//!
//! A watch feeder keeps the reflector cache current and enqueues translated
//! change events; a single worker drains the queue in order.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::Resource;
use kube::api::Api;
use kube::runtime::reflector::{Store, store::Writer};
use kube::runtime::{WatchStreamExt, watcher};
use kubemon_metrics::ControllerMetrics;
use kubemon_sync::MonitorApi;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterView;
use crate::error::{ControllerError, Result};
use crate::event::{ChangeEvent, EventTranslator, ObjectKind};
use crate::queue::{QueueHandle, QueueItem, RetryPolicy, RetryQueue};
use crate::reconciler::Reconciler;

/// Worker side of one object kind's pipeline.
#[derive(Debug)]
pub struct Pipeline<C, V> {
    kind: ObjectKind,
    reconciler: Arc<Reconciler<C, V>>,
    queue: RetryQueue<ChangeEvent>,
    metrics: ControllerMetrics,
}

impl<C: MonitorApi, V: ClusterView> Pipeline<C, V> {
    /// Creates a pipeline with an empty queue.
    pub fn new(
        kind: ObjectKind,
        reconciler: Arc<Reconciler<C, V>>,
        policy: RetryPolicy,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            kind,
            reconciler,
            queue: RetryQueue::new(policy),
            metrics,
        }
    }

    /// Returns the object kind this pipeline handles.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Returns a handle for enqueueing events.
    #[must_use]
    pub fn handle(&self) -> QueueHandle<ChangeEvent> {
        self.queue.handle()
    }

    /// Drains the queue until `shutdown` is cancelled.
    ///
    /// An event being processed when shutdown arrives is finished first.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(kind = %self.kind, "pipeline worker started");
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = self.queue.next() => next,
            };
            let Some(item) = next else {
                break;
            };
            self.process(item).await;
        }
        info!(kind = %self.kind, "pipeline worker stopped");
    }

    async fn process(&self, item: QueueItem<ChangeEvent>) {
        let Err(e) = self.reconciler.handle(&item.item).await else {
            return;
        };
        self.metrics.inc_errors();
        let key = item.item.key.clone();
        let event = item.item.kind;
        match self.queue.requeue(item) {
            Ok(delay) => warn!(
                kind = %self.kind,
                key = %key,
                event = %event,
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "event failed, requeueing"
            ),
            Err(dropped) => {
                self.metrics.inc_events_abandoned();
                error!(
                    kind = %self.kind,
                    key = %key,
                    event = %event,
                    attempts = dropped.requeues + 1,
                    error = %e,
                    "event abandoned after exhausting retries"
                );
            }
        }
    }
}

/// Watches one resource kind, keeps `writer` current and feeds `queue`.
///
/// The cache is updated before the event is enqueued, so the worker always
/// finds the object it is told about unless it has since been deleted.
pub async fn watch_resource<K>(
    api: Api<K>,
    kind: ObjectKind,
    mut writer: Writer<K>,
    queue: QueueHandle<ChangeEvent>,
    shutdown: CancellationToken,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let mut translator = EventTranslator::new(kind);
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                writer.apply_watcher_event(&event);
                for change in translator.translate(&event) {
                    debug!(kind = %kind, key = %change.key, event = %change.kind, "enqueueing change");
                    if !queue.push(change) {
                        debug!(kind = %kind, "queue closed, stopping watch");
                        return;
                    }
                }
            }
            Some(Err(e)) => warn!(kind = %kind, error = %e, "watch error"),
            None => break,
        }
    }
    debug!(kind = %kind, "watch stopped");
}

/// Waits until a reflector store has completed its initial list.
pub async fn wait_for_cache<K>(store: &Store<K>, kind: ObjectKind, timeout: Duration) -> Result<()>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    match tokio::time::timeout(timeout, store.wait_until_ready()).await {
        Ok(Ok(())) => {
            info!(kind = %kind, objects = store.len(), "cache synced");
            Ok(())
        }
        Ok(Err(_)) | Err(_) => Err(ControllerError::CacheSyncTimeout {
            kind: kind.as_str(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::event::EventKind;
    use crate::reconciler::ReconcilerSettings;
    use k8s_openapi::api::core::v1::Namespace;
    use kube::runtime::reflector;
    use kubemon_rules::{RuleSet, RuleStore};
    use kubemon_sync::{InMemoryMonitorStore, MonitorSynchronizer};

    fn pipeline(
        cluster: &MemoryCluster,
        metrics: &ControllerMetrics,
    ) -> Pipeline<InMemoryMonitorStore, MemoryCluster> {
        let synchronizer = Arc::new(MonitorSynchronizer::new(
            InMemoryMonitorStore::new(),
            "kubemon",
            false,
            metrics.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(RuleStore::from_rules(RuleSet::default())),
            synchronizer,
            Arc::new(cluster.clone()),
            metrics.clone(),
            ReconcilerSettings {
                owner_tag: "kubemon".to_string(),
                annotation_domain: "kubemon.io".to_string(),
                cluster_name: String::new(),
            },
        ));
        Pipeline::new(
            ObjectKind::Namespace,
            reconciler,
            RetryPolicy::default(),
            metrics.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failing_event_is_abandoned_after_six_attempts() {
        let cluster = MemoryCluster::new();
        let metrics = ControllerMetrics::new();
        let pipeline = pipeline(&cluster, &metrics);
        let handle = pipeline.handle();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(pipeline.run(shutdown.clone()));

        let missing = crate::event::ObjectMetadata {
            name: "ghost".to_string(),
            ..Default::default()
        };
        assert!(handle.push(ChangeEvent::new(
            EventKind::Create,
            ObjectKind::Namespace,
            None,
            Some(missing),
        )));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(metrics.errors(), 6);
        assert_eq!(metrics.events_abandoned(), 1);

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn healthy_event_is_processed_once() {
        let cluster = MemoryCluster::new();
        let meta = cluster.add_namespace("shop", &[]);
        let metrics = ControllerMetrics::new();
        let pipeline = pipeline(&cluster, &metrics);
        let handle = pipeline.handle();
        let shutdown = CancellationToken::new();

        handle.push(ChangeEvent::new(
            EventKind::Create,
            ObjectKind::Namespace,
            None,
            Some(meta),
        ));
        let token = shutdown.clone();
        let worker = tokio::spawn(pipeline.run(token));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        worker.await.unwrap();

        assert_eq!(metrics.errors(), 0);
        assert_eq!(
            metrics.changed("namespaces", kubemon_metrics::ChangeAction::CreateUpdate),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cache_wait_times_out_without_initial_list() {
        let (store, _writer) = reflector::store::<Namespace>();
        let err = wait_for_cache(&store, ObjectKind::Namespace, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::CacheSyncTimeout { kind: "namespace" }));
    }

    #[tokio::test]
    async fn cache_wait_returns_once_listed() {
        let (store, mut writer) = reflector::store::<Namespace>();
        writer.apply_watcher_event(&watcher::Event::Init);
        writer.apply_watcher_event(&watcher::Event::InitDone);
        wait_for_cache(&store, ObjectKind::Namespace, Duration::from_secs(1))
            .await
            .unwrap();
    }
}
