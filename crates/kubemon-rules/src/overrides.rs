//! Annotation-driven monitor overrides.
//!
//! Cluster objects customize the monitors produced for them with annotations of
//! the form `<modifier>.<domain>/<target>[.<field-path>]`:
//!
//! - `override.kubemon.io/high-cpu.options.thresholds.critical: "95"` replaces
//!   one field of the `high-cpu` monitor.
//! - `override.kubemon.io/global.options.renotify_interval: "30"` applies to
//!   every monitor evaluated for the object.
//! - `ignore.kubemon.io/high-cpu: "true"` drops the monitor entirely. An ignore
//!   wins over any override for the same monitor.
//!
//! Parsing produces typed [`OverrideKey`]s. Monitor names may contain dots, so
//! the part after the `/` is kept whole and split into target and field path
//! only when it is resolved against a concrete monitor name.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::fields;
use crate::monitor::Monitor;

/// The target name that applies to every monitor.
pub const GLOBAL_TARGET: &str = "global";

/// What an annotation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Replace one field.
    Override,
    /// Drop the monitor.
    Ignore,
}

impl Modifier {
    /// Returns the annotation prefix for this modifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Ignore => "ignore",
        }
    }
}

/// Which monitors an annotation addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    /// Every monitor evaluated for the object.
    Global,
    /// The monitor with this stable name.
    Monitor(String),
}

impl Target {
    fn name(&self) -> &str {
        match self {
            Self::Global => GLOBAL_TARGET,
            Self::Monitor(name) => name,
        }
    }
}

/// A parsed override annotation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideKey {
    /// The requested action.
    pub modifier: Modifier,
    /// Everything after the `/`: `<target>[.<field-path>]`.
    pub selector: String,
}

impl OverrideKey {
    /// Returns the field path this key addresses on `target`.
    ///
    /// `None` means the key is for some other target. An empty path means
    /// the key names the target alone.
    #[must_use]
    pub fn resolve(&self, target: &Target) -> Option<&str> {
        let name = target.name();
        if self.selector == name {
            return Some("");
        }
        self.selector.strip_prefix(name)?.strip_prefix('.')
    }
}

/// Parses an annotation key against the configured annotation domain.
///
/// Returns `None` for keys that are not kubemon override annotations, and for
/// override keys that cannot name a field.
#[must_use]
pub fn parse_annotation_key(key: &str, domain: &str) -> Option<OverrideKey> {
    let (prefix, selector) = key.split_once('/')?;
    let (modifier, key_domain) = prefix.split_once('.')?;
    if key_domain != domain {
        return None;
    }
    let modifier = match modifier {
        "override" => Modifier::Override,
        "ignore" => Modifier::Ignore,
        _ => return None,
    };

    if selector.is_empty() || selector.starts_with('.') || selector.ends_with('.') {
        return None;
    }
    if modifier == Modifier::Override && !selector.contains('.') {
        return None;
    }

    Some(OverrideKey {
        modifier,
        selector: selector.to_string(),
    })
}

/// One override annotation and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    /// The parsed annotation key.
    pub key: OverrideKey,
    /// The literal annotation value.
    pub value: String,
}

/// All overrides declared by one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    entries: Vec<Override>,
}

impl Overrides {
    /// Creates an empty override set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every override annotation from an object's annotations.
    #[must_use]
    pub fn from_annotations(annotations: &BTreeMap<String, String>, domain: &str) -> Self {
        let mut overrides = Self::new();
        for (key, value) in annotations {
            let Some(parsed) = parse_annotation_key(key, domain) else {
                continue;
            };
            overrides.insert(parsed, value);
        }
        overrides
    }

    /// Records one parsed annotation.
    pub fn insert(&mut self, key: OverrideKey, value: &str) {
        self.entries.push(Override {
            key,
            value: value.to_string(),
        });
    }

    /// Returns true if no overrides were declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the named monitor is suppressed.
    #[must_use]
    pub fn is_ignored(&self, monitor_name: &str) -> bool {
        let targets = [Target::Global, Target::Monitor(monitor_name.to_string())];
        self.entries
            .iter()
            .filter(|o| o.key.modifier == Modifier::Ignore)
            .any(|o| targets.iter().any(|t| o.key.resolve(t).is_some()))
    }

    /// Applies the overrides for `monitor_name` to a copy of `monitor`.
    ///
    /// Global overrides apply first, then monitor-specific ones. Returns
    /// `None` if the monitor is ignored. Fields that cannot be set are logged
    /// and skipped.
    #[must_use]
    pub fn apply(&self, monitor_name: &str, monitor: &Monitor) -> Option<Monitor> {
        if self.is_ignored(monitor_name) {
            debug!(monitor = %monitor_name, "monitor ignored by annotation");
            return None;
        }

        let mut result = monitor.clone();
        let targets = [Target::Global, Target::Monitor(monitor_name.to_string())];
        for target in &targets {
            for o in self.entries.iter().filter(|o| o.key.modifier == Modifier::Override) {
                let Some(field) = o.key.resolve(target).filter(|f| !f.is_empty()) else {
                    continue;
                };
                let old = fields::get_field(&result, field);
                match fields::set_field(&mut result, field, &o.value) {
                    Ok(()) => debug!(
                        monitor = %monitor_name,
                        field = %field,
                        old = ?old,
                        new = ?fields::get_field(&result, field),
                        "applied monitor override"
                    ),
                    Err(e) => warn!(
                        monitor = %monitor_name,
                        field = %field,
                        error = %e,
                        "skipping monitor override"
                    ),
                }
            }
        }
        Some(result)
    }
}
