//! The rule model: groups of monitor templates keyed by object type and
//! required annotations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::monitor::Monitor;
use crate::overrides::Overrides;
use crate::tags::{BOUND_OBJECT_TAG, STATIC_OBJECT_TYPE};

/// Group type whose monitors are contributed to objects inside a matching
/// namespace.
pub const BINDING_OBJECT_TYPE: &str = "binding";

/// One required annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationMatch {
    /// Annotation key.
    pub name: String,
    /// Required value.
    pub value: String,
}

/// Binds an object type and required annotations to named monitors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorGroup {
    /// Object type: "deployment", "namespace", "static" or "binding".
    #[serde(rename = "type")]
    pub object_type: String,
    /// Annotations that must all be present with equal values.
    #[serde(default, rename = "match_annotations")]
    pub annotations: Vec<AnnotationMatch>,
    /// Object types a binding group contributes monitors to.
    #[serde(default)]
    pub bound_objects: Vec<String>,
    /// Monitor templates keyed by stable name.
    #[serde(default)]
    pub monitors: BTreeMap<String, Monitor>,
}

impl MonitorGroup {
    /// Returns true if every required annotation is present with an equal value.
    #[must_use]
    pub fn matches(&self, annotations: &BTreeMap<String, String>) -> bool {
        self.annotations
            .iter()
            .all(|required| annotations.get(&required.name) == Some(&required.value))
    }

    /// Returns true if this group binds monitors to `object_type`.
    #[must_use]
    pub fn is_bound_to(&self, object_type: &str) -> bool {
        self.bound_objects.iter().any(|b| b == object_type)
    }
}

/// The full rule configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Global variables exposed to templates.
    #[serde(default)]
    pub cluster_variables: BTreeMap<String, String>,
    /// Monitor groups in declaration order.
    #[serde(default, rename = "rulesets")]
    pub groups: Vec<MonitorGroup>,
}

impl RuleSet {
    /// Appends another source's groups and overlays its variables.
    pub fn merge(&mut self, other: Self) {
        self.cluster_variables.extend(other.cluster_variables);
        self.groups.extend(other.groups);
    }

    /// Returns the groups of `object_type` whose annotations all match.
    #[must_use]
    pub fn matching_groups(
        &self,
        annotations: &BTreeMap<String, String>,
        object_type: &str,
    ) -> Vec<&MonitorGroup> {
        self.groups
            .iter()
            .filter(|g| g.object_type == object_type && g.matches(annotations))
            .collect()
    }

    /// Returns the monitors of every matching group with overrides applied.
    ///
    /// Ignored monitors are left out.
    #[must_use]
    pub fn matching_monitors(
        &self,
        annotations: &BTreeMap<String, String>,
        object_type: &str,
        overrides: &Overrides,
    ) -> Vec<Monitor> {
        self.matching_groups(annotations, object_type)
            .into_iter()
            .flat_map(|g| g.monitors.iter())
            .filter_map(|(name, monitor)| overrides.apply(name, monitor))
            .collect()
    }

    /// Returns every monitor declared under the static object type.
    #[must_use]
    pub fn static_monitors(&self) -> Vec<Monitor> {
        self.groups
            .iter()
            .filter(|g| g.object_type == STATIC_OBJECT_TYPE)
            .flat_map(|g| g.monitors.values().cloned())
            .collect()
    }

    /// Returns the monitors a namespace binds to objects of `bound_object_type`.
    ///
    /// Each monitor carries [`BOUND_OBJECT_TAG`] in addition to its own tags.
    #[must_use]
    pub fn bound_monitors(
        &self,
        namespace_annotations: &BTreeMap<String, String>,
        bound_object_type: &str,
        overrides: &Overrides,
    ) -> Vec<Monitor> {
        self.matching_groups(namespace_annotations, BINDING_OBJECT_TYPE)
            .into_iter()
            .filter(|g| g.is_bound_to(bound_object_type))
            .flat_map(|g| g.monitors.iter())
            .filter_map(|(name, monitor)| overrides.apply(name, monitor))
            .map(|mut monitor| {
                monitor.tags.push(BOUND_OBJECT_TAG.to_string());
                monitor
            })
            .collect()
    }

    /// Returns the object types bound by binding groups matching a namespace.
    #[must_use]
    pub fn bound_object_types(
        &self,
        namespace_annotations: &BTreeMap<String, String>,
    ) -> BTreeSet<String> {
        self.matching_groups(namespace_annotations, BINDING_OBJECT_TYPE)
            .into_iter()
            .flat_map(|g| g.bound_objects.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn monitor(name: &str) -> Monitor {
        Monitor {
            name: Some(name.to_string()),
            ..Monitor::default()
        }
    }

    fn group(object_type: &str, required: &[(&str, &str)], monitors: &[&str]) -> MonitorGroup {
        MonitorGroup {
            object_type: object_type.to_string(),
            annotations: required
                .iter()
                .map(|(k, v)| AnnotationMatch {
                    name: (*k).to_string(),
                    value: (*v).to_string(),
                })
                .collect(),
            bound_objects: Vec::new(),
            monitors: monitors
                .iter()
                .map(|m| ((*m).to_string(), monitor(m)))
                .collect(),
        }
    }

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn names(monitors: &[Monitor]) -> Vec<&str> {
        monitors.iter().map(Monitor::name_str).collect()
    }

    mod matching_tests {
        use super::*;

        #[test]
        fn all_required_annotations_must_match() {
            let rules = RuleSet {
                groups: vec![group(
                    "deployment",
                    &[("team/owner", "platform"), ("tier", "web")],
                    &["cpu"],
                )],
                ..RuleSet::default()
            };
            let both = annotations(&[("team/owner", "platform"), ("tier", "web"), ("x", "y")]);
            let one = annotations(&[("team/owner", "platform")]);
            let wrong = annotations(&[("team/owner", "platform"), ("tier", "db")]);

            assert_eq!(rules.matching_groups(&both, "deployment").len(), 1);
            assert!(rules.matching_groups(&one, "deployment").is_empty());
            assert!(rules.matching_groups(&wrong, "deployment").is_empty());
            assert!(rules.matching_groups(&both, "namespace").is_empty());
        }

        #[test]
        fn object_may_match_several_groups() {
            let rules = RuleSet {
                groups: vec![
                    group("deployment", &[("a", "1")], &["cpu"]),
                    group("deployment", &[("b", "2")], &["memory"]),
                    group("namespace", &[("a", "1")], &["quota"]),
                ],
                ..RuleSet::default()
            };
            let found = rules.matching_monitors(
                &annotations(&[("a", "1"), ("b", "2")]),
                "deployment",
                &Overrides::new(),
            );
            assert_eq!(names(&found), vec!["cpu", "memory"]);
        }

        #[test]
        fn empty_requirements_match_every_object() {
            let rules = RuleSet {
                groups: vec![group("deployment", &[], &["cpu"])],
                ..RuleSet::default()
            };
            assert_eq!(
                rules.matching_groups(&BTreeMap::new(), "deployment").len(),
                1
            );
        }

        #[test]
        fn ignored_monitor_is_dropped() {
            let rules = RuleSet {
                groups: vec![group("deployment", &[("a", "1")], &["cpu", "memory"])],
                ..RuleSet::default()
            };
            let object = annotations(&[("a", "1"), ("ignore.kubemon.io/cpu", "true")]);
            let overrides = Overrides::from_annotations(&object, "kubemon.io");
            let found = rules.matching_monitors(&object, "deployment", &overrides);
            assert_eq!(names(&found), vec!["memory"]);
        }
    }

    mod static_tests {
        use super::*;

        #[test]
        fn static_monitors_ignore_annotations() {
            let rules = RuleSet {
                groups: vec![
                    group("static", &[("never", "present")], &["uptime"]),
                    group("deployment", &[], &["cpu"]),
                ],
                ..RuleSet::default()
            };
            assert_eq!(names(&rules.static_monitors()), vec!["uptime"]);
        }
    }

    mod binding_tests {
        use super::*;

        fn binding_rules() -> RuleSet {
            let mut binding = group("binding", &[("bind", "yes")], &["restarts"]);
            binding.bound_objects = vec!["deployment".to_string()];
            RuleSet {
                groups: vec![binding, group("namespace", &[("bind", "yes")], &["quota"])],
                ..RuleSet::default()
            }
        }

        #[test]
        fn bound_monitors_carry_marker_tag() {
            let rules = binding_rules();
            let found = rules.bound_monitors(
                &annotations(&[("bind", "yes")]),
                "deployment",
                &Overrides::new(),
            );
            assert_eq!(names(&found), vec!["restarts"]);
            assert!(found[0].tags.contains(&BOUND_OBJECT_TAG.to_string()));
            // the rule template itself is untouched
            assert!(rules.groups[0].monitors["restarts"].tags.is_empty());
        }

        #[test]
        fn bound_monitors_require_listed_type() {
            let rules = binding_rules();
            let found = rules.bound_monitors(
                &annotations(&[("bind", "yes")]),
                "statefulset",
                &Overrides::new(),
            );
            assert!(found.is_empty());
        }

        #[test]
        fn bound_object_types_of_matching_bindings() {
            let rules = binding_rules();
            let types = rules.bound_object_types(&annotations(&[("bind", "yes")]));
            assert_eq!(types.into_iter().collect::<Vec<_>>(), vec!["deployment"]);
            assert!(rules.bound_object_types(&BTreeMap::new()).is_empty());
        }
    }

    #[test]
    fn merge_concatenates_groups_and_overlays_variables() {
        let mut first = RuleSet {
            cluster_variables: annotations(&[("env", "dev"), ("region", "eu")]),
            groups: vec![group("deployment", &[], &["cpu"])],
        };
        let second = RuleSet {
            cluster_variables: annotations(&[("env", "prod")]),
            groups: vec![group("namespace", &[], &["quota"])],
        };
        first.merge(second);
        assert_eq!(first.cluster_variables["env"], "prod");
        assert_eq!(first.cluster_variables["region"], "eu");
        assert_eq!(first.groups.len(), 2);
        assert_eq!(first.groups[1].object_type, "namespace");
    }

    proptest! {
        #[test]
        fn group_matches_iff_all_required_present(
            required in proptest::collection::btree_map("[a-d]", "[0-2]", 1..4),
            extra in proptest::collection::btree_map("[e-h]", "[0-2]", 0..3),
            flip in any::<proptest::sample::Index>(),
        ) {
            let rules = RuleSet {
                groups: vec![MonitorGroup {
                    object_type: "deployment".to_string(),
                    annotations: required
                        .iter()
                        .map(|(k, v)| AnnotationMatch { name: k.clone(), value: v.clone() })
                        .collect(),
                    bound_objects: Vec::new(),
                    monitors: [("cpu".to_string(), monitor("cpu"))].into_iter().collect(),
                }],
                ..RuleSet::default()
            };

            let mut object = extra.clone();
            object.extend(required.clone());
            let found = rules.matching_monitors(&object, "deployment", &Overrides::new());
            prop_assert_eq!(found.len(), 1);

            let keys: Vec<&String> = required.keys().collect();
            let key = keys[flip.index(keys.len())].clone();
            object.insert(key, "mismatch".to_string());
            let found = rules.matching_monitors(&object, "deployment", &Overrides::new());
            prop_assert!(found.is_empty());
        }
    }
}
