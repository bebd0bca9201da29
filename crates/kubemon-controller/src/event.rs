//! Change events and their translation from watch notifications.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube::runtime::watcher;

/// The cluster object kinds kubemon watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// `apps/v1` Deployment.
    Deployment,
    /// `v1` Namespace.
    Namespace,
}

impl ObjectKind {
    /// Object type name used in rule files and ownership tags.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::Namespace => "namespace",
        }
    }

    /// Label used for change counters.
    #[must_use]
    pub const fn metric_label(&self) -> &'static str {
        match self {
            Self::Deployment => "deployments",
            Self::Namespace => "namespaces",
        }
    }

    /// Parses a rule-file object type.
    #[must_use]
    pub fn parse(object_type: &str) -> Option<Self> {
        match object_type {
            "deployment" => Some(Self::Deployment),
            "namespace" => Some(Self::Namespace),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The object appeared.
    Create,
    /// The object changed.
    Update,
    /// The object was removed.
    Delete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// The metadata fields kubemon cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object name.
    pub name: String,
    /// Namespace, for namespaced objects.
    pub namespace: Option<String>,
    /// Object annotations.
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMetadata {
    /// Extracts metadata from a Kubernetes object meta block.
    #[must_use]
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone(),
            annotations: meta.annotations.clone().unwrap_or_default(),
        }
    }

    /// Returns the cache key: `<namespace>/<name>`, or `<name>` when cluster scoped.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}/{}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Splits a cache key into namespace and name.
#[must_use]
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, key),
    }
}

/// One unit of work for a pipeline. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Cache key of the object.
    pub key: String,
    /// What happened.
    pub kind: EventKind,
    /// The object kind.
    pub object_kind: ObjectKind,
    /// Namespace of the object; the object's own name for namespaces.
    pub namespace: String,
    /// Metadata before the change, if known.
    pub old: Option<ObjectMetadata>,
    /// Metadata after the change; `None` for deletes.
    pub new: Option<ObjectMetadata>,
}

impl ChangeEvent {
    /// Builds an event from before/after metadata.
    #[must_use]
    pub fn new(
        kind: EventKind,
        object_kind: ObjectKind,
        old: Option<ObjectMetadata>,
        new: Option<ObjectMetadata>,
    ) -> Self {
        let meta = new.as_ref().or(old.as_ref()).cloned().unwrap_or_default();
        let namespace = match object_kind {
            ObjectKind::Namespace => meta.name.clone(),
            ObjectKind::Deployment => meta.namespace.clone().unwrap_or_default(),
        };
        Self {
            key: meta.key(),
            kind,
            object_kind,
            namespace,
            old,
            new,
        }
    }

    /// Builds a synthetic update event for an object already in the cache.
    #[must_use]
    pub fn resync(object_kind: ObjectKind, metadata: ObjectMetadata) -> Self {
        Self::new(
            EventKind::Update,
            object_kind,
            Some(metadata.clone()),
            Some(metadata),
        )
    }
}

/// Turns watch notifications into create/update/delete events.
///
/// Keeps the metadata of every object seen so it can tell creates from
/// updates and detect objects that vanished across a relist.
#[derive(Debug)]
pub struct EventTranslator {
    kind: ObjectKind,
    known: BTreeMap<String, ObjectMetadata>,
    relist: Option<BTreeMap<String, ObjectMetadata>>,
}

impl EventTranslator {
    /// Creates a translator for one object kind.
    #[must_use]
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            known: BTreeMap::new(),
            relist: None,
        }
    }

    fn applied(&mut self, meta: ObjectMetadata) -> ChangeEvent {
        let key = meta.key();
        let previous = self.known.insert(key, meta.clone());
        let kind = if previous.is_some() {
            EventKind::Update
        } else {
            EventKind::Create
        };
        ChangeEvent::new(kind, self.kind, previous, Some(meta))
    }

    /// Translates one watch notification.
    pub fn translate<K: Resource>(&mut self, event: &watcher::Event<K>) -> Vec<ChangeEvent> {
        match event {
            watcher::Event::Apply(obj) => {
                vec![self.applied(ObjectMetadata::from_meta(obj.meta()))]
            }
            watcher::Event::Delete(obj) => {
                let meta = ObjectMetadata::from_meta(obj.meta());
                let previous = self.known.remove(&meta.key()).unwrap_or_else(|| meta.clone());
                vec![ChangeEvent::new(
                    EventKind::Delete,
                    self.kind,
                    Some(previous),
                    None,
                )]
            }
            watcher::Event::Init => {
                self.relist = Some(BTreeMap::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let meta = ObjectMetadata::from_meta(obj.meta());
                self.relist
                    .get_or_insert_with(BTreeMap::new)
                    .insert(meta.key(), meta);
                Vec::new()
            }
            watcher::Event::InitDone => {
                let listed = self.relist.take().unwrap_or_default();
                let mut events = Vec::new();
                let vanished: Vec<String> = self
                    .known
                    .keys()
                    .filter(|k| !listed.contains_key(*k))
                    .cloned()
                    .collect();
                for key in vanished {
                    if let Some(previous) = self.known.remove(&key) {
                        events.push(ChangeEvent::new(
                            EventKind::Delete,
                            self.kind,
                            Some(previous),
                            None,
                        ));
                    }
                }
                for meta in listed.into_values() {
                    events.push(self.applied(meta));
                }
                events
            }
        }
    }
}
