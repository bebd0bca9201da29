//! Read access to the local watch cache.
//!
//! The reconciler only needs point lookups and per-namespace listings.
//! [`ReflectorCluster`] answers them from kube-rs reflector stores;
//! [`MemoryCluster`] answers them from a map and backs the tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::Resource;
use kube::runtime::reflector::{ObjectRef, Store};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::event::{ObjectKind, ObjectMetadata, split_key};

/// A cached object: its metadata plus its serialized form for templating.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    /// The object kind.
    pub kind: ObjectKind,
    /// Name, namespace and annotations.
    pub metadata: ObjectMetadata,
    /// The full object, used as template context.
    pub object: Value,
}

impl ObjectSnapshot {
    /// Snapshots a Kubernetes resource.
    ///
    /// Returns `None` if the object cannot be serialized.
    pub fn from_resource<K: Resource + Serialize>(kind: ObjectKind, obj: &K) -> Option<Self> {
        let metadata = ObjectMetadata::from_meta(obj.meta());
        match serde_json::to_value(obj) {
            Ok(object) => Some(Self {
                kind,
                metadata,
                object,
            }),
            Err(e) => {
                warn!(kind = %kind, key = %metadata.key(), error = %e, "failed to serialize object");
                None
            }
        }
    }

    /// Builds a minimal snapshot from metadata alone.
    #[must_use]
    pub fn from_metadata(kind: ObjectKind, metadata: ObjectMetadata) -> Self {
        let object = json!({
            "kind": match kind {
                ObjectKind::Deployment => "Deployment",
                ObjectKind::Namespace => "Namespace",
            },
            "metadata": {
                "name": metadata.name,
                "namespace": metadata.namespace,
                "annotations": metadata.annotations,
            },
        });
        Self {
            kind,
            metadata,
            object,
        }
    }

    /// Returns the cache key.
    #[must_use]
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Returns the object annotations.
    #[must_use]
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.metadata.annotations
    }
}

/// Read-only view of watched cluster objects.
pub trait ClusterView: Send + Sync + 'static {
    /// Looks up an object by cache key.
    fn get(&self, kind: ObjectKind, key: &str) -> Option<ObjectSnapshot>;

    /// Lists every object of `kind` in `namespace`.
    fn list_in_namespace(&self, kind: ObjectKind, namespace: &str) -> Vec<ObjectSnapshot>;
}

/// Cluster view over kube-rs reflector stores.
#[derive(Clone)]
pub struct ReflectorCluster {
    deployments: Store<Deployment>,
    namespaces: Store<Namespace>,
}

impl std::fmt::Debug for ReflectorCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectorCluster")
            .field("deployments", &self.deployments.len())
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}

impl ReflectorCluster {
    /// Wraps the two reflector stores.
    #[must_use]
    pub fn new(deployments: Store<Deployment>, namespaces: Store<Namespace>) -> Self {
        Self {
            deployments,
            namespaces,
        }
    }
}

impl ClusterView for ReflectorCluster {
    fn get(&self, kind: ObjectKind, key: &str) -> Option<ObjectSnapshot> {
        let (namespace, name) = split_key(key);
        match kind {
            ObjectKind::Deployment => {
                let reference = ObjectRef::<Deployment>::new(name).within(namespace?);
                let obj = self.deployments.get(&reference)?;
                ObjectSnapshot::from_resource(kind, &*obj)
            }
            ObjectKind::Namespace => {
                let obj = self.namespaces.get(&ObjectRef::<Namespace>::new(name))?;
                ObjectSnapshot::from_resource(kind, &*obj)
            }
        }
    }

    fn list_in_namespace(&self, kind: ObjectKind, namespace: &str) -> Vec<ObjectSnapshot> {
        match kind {
            ObjectKind::Deployment => self
                .deployments
                .state()
                .iter()
                .filter(|d| d.meta().namespace.as_deref() == Some(namespace))
                .filter_map(|d| ObjectSnapshot::from_resource(kind, &**d))
                .collect(),
            ObjectKind::Namespace => Vec::new(),
        }
    }
}

/// Cluster view held in memory.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    objects: Arc<RwLock<BTreeMap<(ObjectKind, String), ObjectSnapshot>>>,
}

impl MemoryCluster {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an object.
    pub fn upsert(&self, snapshot: ObjectSnapshot) {
        self.objects
            .write()
            .insert((snapshot.kind, snapshot.key()), snapshot);
    }

    /// Removes an object.
    pub fn remove(&self, kind: ObjectKind, key: &str) -> Option<ObjectSnapshot> {
        self.objects.write().remove(&(kind, key.to_string()))
    }

    /// Inserts a namespace with the given annotations and returns its metadata.
    pub fn add_namespace(&self, name: &str, annotations: &[(&str, &str)]) -> ObjectMetadata {
        let metadata = ObjectMetadata {
            name: name.to_string(),
            namespace: None,
            annotations: to_map(annotations),
        };
        self.upsert(ObjectSnapshot::from_metadata(
            ObjectKind::Namespace,
            metadata.clone(),
        ));
        metadata
    }

    /// Inserts a deployment with the given annotations and returns its metadata.
    pub fn add_deployment(
        &self,
        namespace: &str,
        name: &str,
        annotations: &[(&str, &str)],
    ) -> ObjectMetadata {
        let metadata = ObjectMetadata {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            annotations: to_map(annotations),
        };
        self.upsert(ObjectSnapshot::from_metadata(
            ObjectKind::Deployment,
            metadata.clone(),
        ));
        metadata
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

impl ClusterView for MemoryCluster {
    fn get(&self, kind: ObjectKind, key: &str) -> Option<ObjectSnapshot> {
        self.objects.read().get(&(kind, key.to_string())).cloned()
    }

    fn list_in_namespace(&self, kind: ObjectKind, namespace: &str) -> Vec<ObjectSnapshot> {
        self.objects
            .read()
            .values()
            .filter(|s| s.kind == kind && s.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::reflector;
    use kube::runtime::watcher;

    #[test]
    fn memory_cluster_lookup_and_listing() {
        let cluster = MemoryCluster::new();
        cluster.add_namespace("shop", &[("bind", "yes")]);
        cluster.add_deployment("shop", "checkout", &[]);
        cluster.add_deployment("shop", "cart", &[]);
        cluster.add_deployment("blog", "web", &[]);

        let ns = cluster.get(ObjectKind::Namespace, "shop").unwrap();
        assert_eq!(ns.annotations()["bind"], "yes");
        assert!(cluster.get(ObjectKind::Deployment, "shop/checkout").is_some());
        assert!(cluster.get(ObjectKind::Deployment, "blog/checkout").is_none());
        assert_eq!(
            cluster
                .list_in_namespace(ObjectKind::Deployment, "shop")
                .len(),
            2
        );

        cluster.remove(ObjectKind::Deployment, "shop/cart");
        assert_eq!(
            cluster
                .list_in_namespace(ObjectKind::Deployment, "shop")
                .len(),
            1
        );
    }

    #[test]
    fn metadata_snapshot_is_templatable() {
        let snapshot = ObjectSnapshot::from_metadata(
            ObjectKind::Deployment,
            ObjectMetadata {
                name: "checkout".to_string(),
                namespace: Some("shop".to_string()),
                annotations: BTreeMap::new(),
            },
        );
        assert_eq!(snapshot.object["metadata"]["name"], "checkout");
        assert_eq!(snapshot.object["kind"], "Deployment");
    }

    #[test]
    fn reflector_cluster_reads_stores() {
        let (deployments, mut deployment_writer) = reflector::store::<Deployment>();
        let (namespaces, mut namespace_writer) = reflector::store::<Namespace>();

        deployment_writer.apply_watcher_event(&watcher::Event::Apply(Deployment {
            metadata: ObjectMeta {
                name: Some("checkout".to_string()),
                namespace: Some("shop".to_string()),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        }));
        namespace_writer.apply_watcher_event(&watcher::Event::Apply(Namespace {
            metadata: ObjectMeta {
                name: Some("shop".to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }));

        let cluster = ReflectorCluster::new(deployments, namespaces);
        let snapshot = cluster.get(ObjectKind::Deployment, "shop/checkout").unwrap();
        assert_eq!(snapshot.object["metadata"]["name"], "checkout");
        assert!(cluster.get(ObjectKind::Namespace, "shop").is_some());
        assert!(cluster.get(ObjectKind::Deployment, "checkout").is_none());
        assert_eq!(
            cluster.list_in_namespace(ObjectKind::Deployment, "shop").len(),
            1
        );
    }
}
