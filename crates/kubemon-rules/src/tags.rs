//! Ownership tags attached to every managed monitor.

/// Prefix of every tag kubemon writes.
pub const TAG_PREFIX: &str = "kubemon";

/// Marker tag on monitors contributed through a namespace binding.
pub const BOUND_OBJECT_TAG: &str = "kubemon:bound_object";

/// Object type used for monitors reconciled on the static timer.
pub const STATIC_OBJECT_TYPE: &str = "static";

/// Builds the object-type tag.
#[must_use]
pub fn object_type_tag(object_type: &str) -> String {
    format!("{TAG_PREFIX}:object_type:{object_type}")
}

/// Builds the resource tag for an event key.
#[must_use]
pub fn resource_tag(key: &str) -> String {
    format!("{TAG_PREFIX}:resource:{key}")
}

/// Identifies the cluster object a monitor belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    /// The fixed owner tag shared by every managed monitor.
    pub owner: String,
    /// The owning object type, e.g. "deployment".
    pub object_type: String,
    /// The owning object's key, `<namespace>/<name>`.
    pub resource: String,
}

impl Ownership {
    /// Creates ownership for a cluster object.
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        object_type: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            object_type: object_type.into(),
            resource: resource.into(),
        }
    }

    /// Ownership for monitors driven by the static timer.
    #[must_use]
    pub fn static_monitors(owner: impl Into<String>) -> Self {
        Self::new(owner, STATIC_OBJECT_TYPE, STATIC_OBJECT_TYPE)
    }

    /// Returns the owner, object-type and resource tags, in that order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        vec![
            self.owner.clone(),
            object_type_tag(&self.object_type),
            resource_tag(&self.resource),
        ]
    }
}
