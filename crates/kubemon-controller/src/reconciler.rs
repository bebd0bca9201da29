//! Turns one change event into monitor store writes.
//!
//! Each handler takes a single rules snapshot for its whole run, computes the
//! desired monitors for the object, renders them, and hands them to the
//! synchronizer. Namespace events also re-run the deployment handler for every
//! deployment a matching binding group reaches.

use std::collections::BTreeSet;
use std::sync::Arc;

use kubemon_metrics::{ChangeAction, ControllerMetrics};
use kubemon_rules::{
    Monitor, Ownership, Overrides, RuleSet, RuleStore, STATIC_OBJECT_TYPE, TemplateRenderer,
    object_type_tag,
};
use kubemon_sync::{MonitorApi, MonitorSynchronizer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterView, ObjectSnapshot};
use crate::error::{ControllerError, Result};
use crate::event::{ChangeEvent, EventKind, ObjectKind};

/// Label used for static-monitor change counters.
const STATIC_METRIC_LABEL: &str = "static";

/// Settings shared by every handler.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Tag carried by every managed monitor.
    pub owner_tag: String,
    /// Domain of override annotations.
    pub annotation_domain: String,
    /// Cluster name for templates.
    pub cluster_name: String,
}

/// Outcome of rendering and syncing one object's monitors.
#[derive(Debug, Default)]
struct SyncPass {
    record: BTreeSet<String>,
    template_errors: usize,
}

/// Dispatches change events to the deployment, namespace and static handlers.
#[derive(Debug)]
pub struct Reconciler<C, V> {
    rules: Arc<RuleStore>,
    synchronizer: Arc<MonitorSynchronizer<C>>,
    cluster: Arc<V>,
    metrics: ControllerMetrics,
    settings: ReconcilerSettings,
}

impl<C: MonitorApi, V: ClusterView> Reconciler<C, V> {
    /// Creates a reconciler.
    pub fn new(
        rules: Arc<RuleStore>,
        synchronizer: Arc<MonitorSynchronizer<C>>,
        cluster: Arc<V>,
        metrics: ControllerMetrics,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            rules,
            synchronizer,
            cluster,
            metrics,
            settings,
        }
    }

    /// Returns the cluster view.
    #[must_use]
    pub fn cluster(&self) -> &V {
        &self.cluster
    }

    /// Handles one change event.
    pub async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        let rules = self.rules.snapshot();
        debug!(
            object_kind = %event.object_kind,
            key = %event.key,
            event = %event.kind,
            "handling change event"
        );
        match event.object_kind {
            ObjectKind::Deployment => self.handle_deployment(&rules, event).await,
            ObjectKind::Namespace => self.handle_namespace(&rules, event).await,
        }
    }

    fn ownership(&self, kind: ObjectKind, key: &str) -> Ownership {
        Ownership::new(self.settings.owner_tag.as_str(), kind.as_str(), key)
    }

    async fn handle_deployment(&self, rules: &RuleSet, event: &ChangeEvent) -> Result<()> {
        let kind = ObjectKind::Deployment;
        let ownership = self.ownership(kind, &event.key);
        if event.kind == EventKind::Delete {
            return self.handle_delete(kind, &event.key, &ownership).await;
        }

        let object = self
            .cluster
            .get(kind, &event.key)
            .ok_or_else(|| ControllerError::ObjectNotFound {
                kind: kind.as_str(),
                key: event.key.clone(),
            })?;
        let namespace = self
            .cluster
            .get(ObjectKind::Namespace, &event.namespace)
            .ok_or_else(|| ControllerError::NamespaceNotFound {
                namespace: event.namespace.clone(),
            })?;

        let overrides =
            Overrides::from_annotations(object.annotations(), &self.settings.annotation_domain);
        let mut monitors = rules.matching_monitors(object.annotations(), kind.as_str(), &overrides);
        monitors.extend(rules.bound_monitors(namespace.annotations(), kind.as_str(), &overrides));

        let pass = self
            .sync_monitors(rules, &monitors, Some(&object.object), &ownership)
            .await;
        if event.kind == EventKind::Update {
            self.delete_extinct(&pass, &ownership.tags()).await;
        }
        self.metrics
            .inc_changed(kind.metric_label(), ChangeAction::CreateUpdate);
        Ok(())
    }

    async fn handle_namespace(&self, rules: &RuleSet, event: &ChangeEvent) -> Result<()> {
        let kind = ObjectKind::Namespace;
        let ownership = self.ownership(kind, &event.key);
        if event.kind == EventKind::Delete {
            return self.handle_delete(kind, &event.key, &ownership).await;
        }

        let object = self
            .cluster
            .get(kind, &event.key)
            .ok_or_else(|| ControllerError::ObjectNotFound {
                kind: kind.as_str(),
                key: event.key.clone(),
            })?;

        let overrides =
            Overrides::from_annotations(object.annotations(), &self.settings.annotation_domain);
        let monitors = rules.matching_monitors(object.annotations(), kind.as_str(), &overrides);
        let pass = self
            .sync_monitors(rules, &monitors, Some(&object.object), &ownership)
            .await;
        if event.kind == EventKind::Update {
            self.delete_extinct(&pass, &ownership.tags()).await;
        }
        self.metrics
            .inc_changed(kind.metric_label(), ChangeAction::CreateUpdate);

        self.propagate_bound(rules, event, &object).await
    }

    async fn handle_delete(&self, kind: ObjectKind, key: &str, ownership: &Ownership) -> Result<()> {
        let deleted = self.synchronizer.delete_by_tags(&ownership.tags()).await?;
        info!(object_kind = %kind, key = %key, deleted, "removed monitors of deleted object");
        self.metrics
            .inc_changed(kind.metric_label(), ChangeAction::Delete);
        Ok(())
    }

    /// Re-reconciles every object a namespace's binding groups reach.
    ///
    /// Bound types from both the previous and current annotations are
    /// visited, so objects that lost a binding get their bound monitors
    /// cleaned up. Runs inline; the first failure is returned after every
    /// object has been attempted.
    pub async fn propagate_bound(
        &self,
        rules: &RuleSet,
        event: &ChangeEvent,
        namespace: &ObjectSnapshot,
    ) -> Result<()> {
        let mut bound_types = rules.bound_object_types(namespace.annotations());
        if let Some(old) = &event.old {
            bound_types.extend(rules.bound_object_types(&old.annotations));
        }

        let mut first_error = None;
        for object_type in &bound_types {
            let Some(ObjectKind::Deployment) = ObjectKind::parse(object_type) else {
                warn!(
                    namespace = %event.namespace,
                    object_type = %object_type,
                    "unsupported bound object type"
                );
                continue;
            };
            for object in self
                .cluster
                .list_in_namespace(ObjectKind::Deployment, &event.namespace)
            {
                let resync = ChangeEvent::resync(ObjectKind::Deployment, object.metadata);
                debug!(namespace = %event.namespace, key = %resync.key, "propagating bound monitors");
                if let Err(e) = self.handle_deployment(rules, &resync).await {
                    warn!(key = %resync.key, error = %e, "bound propagation failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reconciles the static monitors and removes the ones no longer declared.
    pub async fn reconcile_static(&self) {
        let rules = self.rules.snapshot();
        let ownership = Ownership::static_monitors(self.settings.owner_tag.as_str());
        let monitors = rules.static_monitors();
        let pass = self.sync_monitors(&rules, &monitors, None, &ownership).await;
        let tags = vec![
            self.settings.owner_tag.clone(),
            object_type_tag(STATIC_OBJECT_TYPE),
        ];
        self.delete_extinct(&pass, &tags).await;
        self.metrics
            .inc_changed(STATIC_METRIC_LABEL, ChangeAction::CreateUpdate);
    }

    async fn sync_monitors(
        &self,
        rules: &RuleSet,
        monitors: &[Monitor],
        context: Option<&Value>,
        ownership: &Ownership,
    ) -> SyncPass {
        let renderer = TemplateRenderer::new(&rules.cluster_variables, &self.settings.cluster_name);
        let mut pass = SyncPass::default();
        for monitor in monitors {
            let rendered = match renderer.render(monitor, context, ownership) {
                Ok(rendered) => rendered,
                Err(e) => {
                    self.metrics.inc_template_errors();
                    warn!(
                        resource = %ownership.resource,
                        monitor = %monitor.name_str(),
                        error = %e,
                        "failed to render monitor"
                    );
                    pass.template_errors += 1;
                    continue;
                }
            };
            // a monitor whose write failed still counts as declared
            pass.record.insert(rendered.name_str().to_string());
            if let Err(e) = self.synchronizer.add_or_update(&rendered).await {
                error!(monitor = %rendered.name_str(), error = %e, "failed to sync monitor");
            }
        }
        pass
    }

    async fn delete_extinct(&self, pass: &SyncPass, tags: &[String]) {
        if self.synchronizer.is_dry_run() {
            return;
        }
        if pass.template_errors > 0 {
            warn!(
                template_errors = pass.template_errors,
                "skipping extinct cleanup after template errors"
            );
            return;
        }
        match self.synchronizer.delete_extinct(&pass.record, tags).await {
            Ok(0) => {}
            Ok(deleted) => {
                info!(deleted, tags = ?tags, "removed extinct monitors");
                self.metrics
                    .inc_changed(object_label(tags), ChangeAction::Delete);
            }
            Err(e) => error!(tags = ?tags, error = %e, "extinct cleanup failed"),
        }
    }
}

fn object_label(tags: &[String]) -> &'static str {
    let is = |kind: &str| tags.iter().any(|t| *t == object_type_tag(kind));
    if is(ObjectKind::Deployment.as_str()) {
        ObjectKind::Deployment.metric_label()
    } else if is(ObjectKind::Namespace.as_str()) {
        ObjectKind::Namespace.metric_label()
    } else {
        STATIC_METRIC_LABEL
    }
}
