//! Top-level wiring: watches, pipelines and timers under one shutdown token.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube::runtime::reflector;
use kubemon_metrics::ControllerMetrics;
use kubemon_rules::{RuleLoader, RuleStore};
use kubemon_sync::{DatadogClient, MonitorApi, MonitorSynchronizer};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cluster::{ClusterView, ReflectorCluster};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::event::ObjectKind;
use crate::pipeline::{Pipeline, wait_for_cache, watch_resource};
use crate::reconciler::{Reconciler, ReconcilerSettings};

/// The kubemon controller.
///
/// Owns the rule store, the monitor synchronizer and the metrics; everything
/// else is built per [`run`](Self::run).
#[derive(Debug)]
pub struct Controller<C> {
    config: ControllerConfig,
    rules: Arc<RuleStore>,
    synchronizer: Arc<MonitorSynchronizer<C>>,
    metrics: ControllerMetrics,
}

impl Controller<DatadogClient> {
    /// Builds a controller from configuration.
    ///
    /// Fails if the configuration is invalid or the first rule load fails.
    pub async fn from_config(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let sources = config.rule_sources();
        info!(sources = sources.len(), "loading rules");
        let rules = RuleStore::load(RuleLoader::new(sources)).await?;
        let client = DatadogClient::new(config.datadog())?;
        Ok(Self::new(
            config,
            Arc::new(rules),
            client,
            ControllerMetrics::new(),
        ))
    }
}

impl<C: MonitorApi> Controller<C> {
    /// Creates a controller over an already loaded rule store.
    pub fn new(
        config: ControllerConfig,
        rules: Arc<RuleStore>,
        client: C,
        metrics: ControllerMetrics,
    ) -> Self {
        let dry_run = config.effective_dry_run();
        let synchronizer = Arc::new(MonitorSynchronizer::new(
            client,
            config.owner_tag.as_str(),
            dry_run,
            metrics.clone(),
        ));
        Self {
            config,
            rules,
            synchronizer,
            metrics,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    /// Returns the rule store.
    #[must_use]
    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    /// Returns the monitor synchronizer.
    #[must_use]
    pub fn synchronizer(&self) -> &Arc<MonitorSynchronizer<C>> {
        &self.synchronizer
    }

    /// Builds a reconciler over the given cluster view.
    pub fn reconciler<V: ClusterView>(&self, cluster: Arc<V>) -> Arc<Reconciler<C, V>> {
        Arc::new(Reconciler::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.synchronizer),
            cluster,
            self.metrics.clone(),
            ReconcilerSettings {
                owner_tag: self.config.owner_tag.clone(),
                annotation_domain: self.config.annotation_domain.clone(),
                cluster_name: self.config.cluster_name.clone(),
            },
        ))
    }

    /// Builds the pipeline for one object kind.
    pub fn pipeline<V: ClusterView>(
        &self,
        kind: ObjectKind,
        reconciler: Arc<Reconciler<C, V>>,
    ) -> Pipeline<C, V> {
        Pipeline::new(
            kind,
            reconciler,
            self.config.retry.clone(),
            self.metrics.clone(),
        )
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// This is what a leader-election callback should call on gaining
    /// leadership; cancel the token on losing it.
    pub async fn run(&self, client: kube::Client, shutdown: CancellationToken) -> Result<()> {
        info!(
            owner = %self.config.owner_tag,
            cluster = %self.config.cluster_name,
            dry_run = self.synchronizer.is_dry_run(),
            "starting controller"
        );

        let (deployments, deployment_writer) = reflector::store::<Deployment>();
        let (namespaces, namespace_writer) = reflector::store::<Namespace>();
        let cluster = Arc::new(ReflectorCluster::new(
            deployments.clone(),
            namespaces.clone(),
        ));
        let reconciler = self.reconciler(cluster);

        let deployment_pipeline = self.pipeline(ObjectKind::Deployment, Arc::clone(&reconciler));
        let namespace_pipeline = self.pipeline(ObjectKind::Namespace, Arc::clone(&reconciler));

        let mut tasks = JoinSet::new();
        tasks.spawn(watch_resource(
            Api::<Deployment>::all(client.clone()),
            ObjectKind::Deployment,
            deployment_writer,
            deployment_pipeline.handle(),
            shutdown.clone(),
        ));
        tasks.spawn(watch_resource(
            Api::<Namespace>::all(client),
            ObjectKind::Namespace,
            namespace_writer,
            namespace_pipeline.handle(),
            shutdown.clone(),
        ));

        let timeout = self.config.cache_sync_timeout;
        let token = shutdown.clone();
        tasks.spawn(async move {
            match wait_for_cache(&deployments, ObjectKind::Deployment, timeout).await {
                Ok(()) => deployment_pipeline.run(token).await,
                Err(e) => error!(error = %e, "aborting deployment pipeline"),
            }
        });
        let token = shutdown.clone();
        tasks.spawn(async move {
            match wait_for_cache(&namespaces, ObjectKind::Namespace, timeout).await {
                Ok(()) => namespace_pipeline.run(token).await,
                Err(e) => error!(error = %e, "aborting namespace pipeline"),
            }
        });

        tokio::join!(
            self.run_static_loop(&reconciler, shutdown.clone()),
            self.run_reload_loop(shutdown.clone()),
        );

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "controller task failed");
            }
        }
        info!("controller stopped");
        Ok(())
    }

    /// Reconciles static monitors immediately and then every `static_interval`.
    pub async fn run_static_loop<V: ClusterView>(
        &self,
        reconciler: &Reconciler<C, V>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.config.static_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            reconciler.reconcile_static().await;
        }
    }

    /// Reloads rules every `rule_reload_interval`, starting one interval in.
    pub async fn run_reload_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.rule_reload_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.rules.reload().await.is_err() {
                self.metrics.inc_errors();
            }
        }
    }
}
