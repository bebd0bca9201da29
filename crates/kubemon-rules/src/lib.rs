//! Rule model, override resolution and monitor templating for kubemon.
//!
//! A rule file maps object types and annotations to named monitor templates.
//! For each changed cluster object this crate answers "which monitors should
//! exist for it, and what do they look like":
//!
//! - [`RuleStore`] holds the current [`RuleSet`] and reloads it atomically
//! - [`RuleSet::matching_monitors`] selects templates by annotation
//! - [`Overrides`] customizes or suppresses templates per object
//! - [`TemplateRenderer`] fills template fields from the object
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use kubemon_rules::{Overrides, Ownership, RuleSet, TemplateRenderer, parse_rule_set};
//!
//! let rules: RuleSet = parse_rule_set(r#"
//! rulesets:
//!   - type: deployment
//!     match_annotations: [{name: team/owner, value: platform}]
//!     monitors:
//!       cpu:
//!         name: "Alert {{ .ObjectMeta.Name }}"
//! "#, "inline").unwrap();
//!
//! let annotations: BTreeMap<String, String> =
//!     [("team/owner".to_string(), "platform".to_string())].into_iter().collect();
//! let overrides = Overrides::from_annotations(&annotations, "kubemon.io");
//! let monitors = rules.matching_monitors(&annotations, "deployment", &overrides);
//!
//! let object = serde_json::json!({"metadata": {"name": "checkout"}});
//! let renderer = TemplateRenderer::new(&rules.cluster_variables, "prod");
//! let ownership = Ownership::new("kubemon", "deployment", "shop/checkout");
//! let rendered = renderer.render(&monitors[0], Some(&object), &ownership).unwrap();
//! assert_eq!(rendered.name.as_deref(), Some("Alert checkout"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fields;
pub mod loader;
pub mod monitor;
pub mod overrides;
pub mod ruleset;
pub mod store;
pub mod tags;
pub mod template;

pub use error::{Result, RuleError};
pub use loader::{RuleLoader, RuleSource, load_rule_sets, parse_rule_set};
pub use monitor::{Monitor, MonitorOptions, Thresholds};
pub use overrides::{Modifier, Override, OverrideKey, Overrides, Target, parse_annotation_key};
pub use ruleset::{AnnotationMatch, BINDING_OBJECT_TYPE, MonitorGroup, RuleSet};
pub use store::RuleStore;
pub use tags::{BOUND_OBJECT_TAG, Ownership, STATIC_OBJECT_TYPE, object_type_tag, resource_tag};
pub use template::TemplateRenderer;
