//! Statically declared field accessors for [`Monitor`].
//!
//! Override annotations address monitor fields by path, for example
//! `options.thresholds.critical`. Each addressable field is listed once in
//! [`FIELDS`] with its serialization path, its Rust-style identifier path and a
//! typed getter/setter pair. Path segments match case-insensitively against
//! either form, ignoring `_` and `-`, so `Options.EscalationMessage` and
//! `options.escalation_message` address the same field.

use crate::error::{Result, RuleError};
use crate::monitor::Monitor;

/// The value kind of an addressable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// Signed integer.
    Integer,
    /// Boolean flag.
    Flag,
    /// Floating point threshold.
    Number,
}

impl FieldKind {
    /// Human readable name used in error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Flag => "boolean",
            Self::Number => "number",
        }
    }
}

/// Typed getter and setter for one field.
#[derive(Clone, Copy)]
pub enum Accessor {
    /// Text field accessors.
    Text {
        /// Reads the field.
        get: fn(&Monitor) -> Option<String>,
        /// Writes the field.
        set: fn(&mut Monitor, String),
    },
    /// Integer field accessors.
    Integer {
        /// Reads the field.
        get: fn(&Monitor) -> Option<i64>,
        /// Writes the field.
        set: fn(&mut Monitor, i64),
    },
    /// Boolean field accessors.
    Flag {
        /// Reads the field.
        get: fn(&Monitor) -> Option<bool>,
        /// Writes the field.
        set: fn(&mut Monitor, bool),
    },
    /// Threshold field accessors.
    Number {
        /// Reads the field.
        get: fn(&Monitor) -> Option<f64>,
        /// Writes the field.
        set: fn(&mut Monitor, f64),
    },
}

impl Accessor {
    /// Returns the kind of value this accessor handles.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Text { .. } => FieldKind::Text,
            Self::Integer { .. } => FieldKind::Integer,
            Self::Flag { .. } => FieldKind::Flag,
            Self::Number { .. } => FieldKind::Number,
        }
    }
}

/// One addressable monitor field.
#[derive(Clone, Copy)]
pub struct FieldSpec {
    /// Serialization path, e.g. `options.escalation_message`.
    pub path: &'static str,
    /// Identifier path, e.g. `Options.EscalationMessage`.
    pub identifier: &'static str,
    /// Typed accessors.
    pub accessor: Accessor,
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("path", &self.path)
            .field("kind", &self.accessor.kind())
            .finish()
    }
}

/// Every field an override can address.
pub static FIELDS: &[FieldSpec] = &[
    FieldSpec {
        path: "name",
        identifier: "Name",
        accessor: Accessor::Text {
            get: |m: &Monitor| m.name.clone(),
            set: |m: &mut Monitor, v: String| m.name = Some(v),
        },
    },
    FieldSpec {
        path: "type",
        identifier: "MonitorType",
        accessor: Accessor::Text {
            get: |m: &Monitor| m.monitor_type.clone(),
            set: |m: &mut Monitor, v: String| m.monitor_type = Some(v),
        },
    },
    FieldSpec {
        path: "query",
        identifier: "Query",
        accessor: Accessor::Text {
            get: |m: &Monitor| m.query.clone(),
            set: |m: &mut Monitor, v: String| m.query = Some(v),
        },
    },
    FieldSpec {
        path: "message",
        identifier: "Message",
        accessor: Accessor::Text {
            get: |m: &Monitor| m.message.clone(),
            set: |m: &mut Monitor, v: String| m.message = Some(v),
        },
    },
    FieldSpec {
        path: "options.no_data_timeframe",
        identifier: "Options.NoDataTimeframe",
        accessor: Accessor::Integer {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.no_data_timeframe),
            set: |m: &mut Monitor, v: i64| m.options_mut().no_data_timeframe = Some(v),
        },
    },
    FieldSpec {
        path: "options.notify_audit",
        identifier: "Options.NotifyAudit",
        accessor: Accessor::Flag {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.notify_audit),
            set: |m: &mut Monitor, v: bool| m.options_mut().notify_audit = Some(v),
        },
    },
    FieldSpec {
        path: "options.notify_no_data",
        identifier: "Options.NotifyNoData",
        accessor: Accessor::Flag {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.notify_no_data),
            set: |m: &mut Monitor, v: bool| m.options_mut().notify_no_data = Some(v),
        },
    },
    FieldSpec {
        path: "options.renotify_interval",
        identifier: "Options.RenotifyInterval",
        accessor: Accessor::Integer {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.renotify_interval),
            set: |m: &mut Monitor, v: i64| m.options_mut().renotify_interval = Some(v),
        },
    },
    FieldSpec {
        path: "options.new_host_delay",
        identifier: "Options.NewHostDelay",
        accessor: Accessor::Integer {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.new_host_delay),
            set: |m: &mut Monitor, v: i64| m.options_mut().new_host_delay = Some(v),
        },
    },
    FieldSpec {
        path: "options.evaluation_delay",
        identifier: "Options.EvaluationDelay",
        accessor: Accessor::Integer {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.evaluation_delay),
            set: |m: &mut Monitor, v: i64| m.options_mut().evaluation_delay = Some(v),
        },
    },
    FieldSpec {
        path: "options.timeout_h",
        identifier: "Options.TimeoutH",
        accessor: Accessor::Integer {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.timeout_h),
            set: |m: &mut Monitor, v: i64| m.options_mut().timeout_h = Some(v),
        },
    },
    FieldSpec {
        path: "options.escalation_message",
        identifier: "Options.EscalationMessage",
        accessor: Accessor::Text {
            get: |m: &Monitor| m.escalation_message().map(str::to_string),
            set: |m: &mut Monitor, v: String| m.options_mut().escalation_message = Some(v),
        },
    },
    FieldSpec {
        path: "options.require_full_window",
        identifier: "Options.RequireFullWindow",
        accessor: Accessor::Flag {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.require_full_window),
            set: |m: &mut Monitor, v: bool| m.options_mut().require_full_window = Some(v),
        },
    },
    FieldSpec {
        path: "options.locked",
        identifier: "Options.Locked",
        accessor: Accessor::Flag {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.locked),
            set: |m: &mut Monitor, v: bool| m.options_mut().locked = Some(v),
        },
    },
    FieldSpec {
        path: "options.include_tags",
        identifier: "Options.IncludeTags",
        accessor: Accessor::Flag {
            get: |m: &Monitor| m.options.as_ref().and_then(|o| o.include_tags),
            set: |m: &mut Monitor, v: bool| m.options_mut().include_tags = Some(v),
        },
    },
    FieldSpec {
        path: "options.thresholds.ok",
        identifier: "Options.Thresholds.Ok",
        accessor: Accessor::Number {
            get: |m: &Monitor| threshold(m, |t| t.ok),
            set: |m: &mut Monitor, v: f64| m.options_mut().thresholds_mut().ok = Some(v),
        },
    },
    FieldSpec {
        path: "options.thresholds.critical",
        identifier: "Options.Thresholds.Critical",
        accessor: Accessor::Number {
            get: |m: &Monitor| threshold(m, |t| t.critical),
            set: |m: &mut Monitor, v: f64| m.options_mut().thresholds_mut().critical = Some(v),
        },
    },
    FieldSpec {
        path: "options.thresholds.warning",
        identifier: "Options.Thresholds.Warning",
        accessor: Accessor::Number {
            get: |m: &Monitor| threshold(m, |t| t.warning),
            set: |m: &mut Monitor, v: f64| m.options_mut().thresholds_mut().warning = Some(v),
        },
    },
    FieldSpec {
        path: "options.thresholds.unknown",
        identifier: "Options.Thresholds.Unknown",
        accessor: Accessor::Number {
            get: |m: &Monitor| threshold(m, |t| t.unknown),
            set: |m: &mut Monitor, v: f64| m.options_mut().thresholds_mut().unknown = Some(v),
        },
    },
    FieldSpec {
        path: "options.thresholds.critical_recovery",
        identifier: "Options.Thresholds.CriticalRecovery",
        accessor: Accessor::Number {
            get: |m: &Monitor| threshold(m, |t| t.critical_recovery),
            set: |m: &mut Monitor, v: f64| {
                m.options_mut().thresholds_mut().critical_recovery = Some(v);
            },
        },
    },
    FieldSpec {
        path: "options.thresholds.warning_recovery",
        identifier: "Options.Thresholds.WarningRecovery",
        accessor: Accessor::Number {
            get: |m: &Monitor| threshold(m, |t| t.warning_recovery),
            set: |m: &mut Monitor, v: f64| {
                m.options_mut().thresholds_mut().warning_recovery = Some(v);
            },
        },
    },
];

/// Older annotation spellings kept for compatibility.
const ALIASES: &[(&str, &str)] = &[
    ("threshold-critical", "options.thresholds.critical"),
    ("threshold-warning", "options.thresholds.warning"),
];

fn threshold(
    monitor: &Monitor,
    pick: fn(&crate::monitor::Thresholds) -> Option<f64>,
) -> Option<f64> {
    monitor
        .options
        .as_ref()
        .and_then(|o| o.thresholds.as_ref())
        .and_then(pick)
}

fn normalize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn segments_match(requested: &[String], declared: &str) -> bool {
    let declared: Vec<&str> = declared.split('.').collect();
    requested.len() == declared.len()
        && requested
            .iter()
            .zip(declared)
            .all(|(r, d)| *r == normalize(d))
}

/// Finds the field addressed by `path`.
#[must_use]
pub fn lookup(path: &str) -> Option<&'static FieldSpec> {
    let trimmed = path.trim();
    let resolved = ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        .map_or(trimmed, |(_, target)| *target);

    let requested: Vec<String> = resolved.split('.').map(normalize).collect();
    FIELDS.iter().find(|spec| {
        segments_match(&requested, spec.path) || segments_match(&requested, spec.identifier)
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Sets the field addressed by `path` from its string form.
///
/// The value is coerced to the field's declared kind. On error the monitor is
/// left unchanged.
pub fn set_field(monitor: &mut Monitor, path: &str, raw: &str) -> Result<()> {
    let spec = lookup(path).ok_or_else(|| RuleError::UnknownField {
        path: path.to_string(),
    })?;

    let invalid = || RuleError::InvalidFieldValue {
        path: spec.path.to_string(),
        expected: spec.accessor.kind().as_str(),
        value: raw.to_string(),
    };

    match spec.accessor {
        Accessor::Text { set, .. } => set(monitor, raw.to_string()),
        Accessor::Integer { set, .. } => {
            let value = raw.trim().parse::<i64>().map_err(|_| invalid())?;
            set(monitor, value);
        }
        Accessor::Flag { set, .. } => {
            let value = parse_flag(raw).ok_or_else(invalid)?;
            set(monitor, value);
        }
        Accessor::Number { set, .. } => {
            let value = raw.trim().parse::<f64>().map_err(|_| invalid())?;
            set(monitor, value);
        }
    }
    Ok(())
}

/// Reads the field addressed by `path` in string form.
#[must_use]
pub fn get_field(monitor: &Monitor, path: &str) -> Option<String> {
    let spec = lookup(path)?;
    match spec.accessor {
        Accessor::Text { get, .. } => get(monitor),
        Accessor::Integer { get, .. } => get(monitor).map(|v| v.to_string()),
        Accessor::Flag { get, .. } => get(monitor).map(|v| v.to_string()),
        Accessor::Number { get, .. } => get(monitor).map(|v| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    mod lookup_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("name", "name" ; "plain")]
        #[test_case("Name", "name" ; "identifier case")]
        #[test_case("type", "type" ; "serialization tag")]
        #[test_case("MonitorType", "type" ; "identifier only")]
        #[test_case("options.escalation_message", "options.escalation_message" ; "nested tag")]
        #[test_case("Options.EscalationMessage", "options.escalation_message" ; "nested identifier")]
        #[test_case("options.EscalationMessage", "options.escalation_message" ; "mixed forms")]
        #[test_case("OPTIONS.THRESHOLDS.CRITICAL", "options.thresholds.critical" ; "upper case")]
        #[test_case("threshold-critical", "options.thresholds.critical" ; "legacy critical")]
        #[test_case("threshold-warning", "options.thresholds.warning" ; "legacy warning")]
        fn resolves(path: &str, expected: &str) {
            assert_eq!(lookup(path).map(|s| s.path), Some(expected));
        }

        #[test_case("options" ; "intermediate node")]
        #[test_case("options.thresholds" ; "intermediate nested node")]
        #[test_case("bogus" ; "unknown")]
        #[test_case("name.extra" ; "too deep")]
        #[test_case("" ; "empty")]
        fn rejects(path: &str) {
            assert!(lookup(path).is_none());
        }

        #[test]
        fn every_declared_path_resolves_to_itself() {
            for spec in FIELDS {
                assert_eq!(lookup(spec.path).map(|s| s.path), Some(spec.path));
                assert_eq!(lookup(spec.identifier).map(|s| s.path), Some(spec.path));
            }
        }
    }

    mod set_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("options.thresholds.critical", "95.5", "95.5" ; "threshold")]
        #[test_case("options.renotify_interval", "30", "30" ; "integer")]
        #[test_case("options.notify_no_data", "true", "true" ; "flag")]
        #[test_case("options.locked", "0", "false" ; "flag from digit")]
        #[test_case("message", "page @ops", "page @ops" ; "text")]
        #[test_case("message", "", "" ; "explicitly empty text")]
        fn sets_typed_value(path: &str, raw: &str, expected: &str) {
            let mut monitor = Monitor::default();
            set_field(&mut monitor, path, raw).unwrap();
            assert_eq!(get_field(&monitor, path).as_deref(), Some(expected));
        }

        #[test]
        fn creates_nested_blocks() {
            let mut monitor = Monitor::default();
            set_field(&mut monitor, "threshold-warning", "80").unwrap();
            let thresholds = monitor.options.and_then(|o| o.thresholds).unwrap();
            assert_eq!(thresholds.warning, Some(80.0));
            assert_eq!(thresholds.critical, None);
        }

        #[test_case("options.thresholds.critical", "high" ; "bad number")]
        #[test_case("options.new_host_delay", "1.5" ; "bad integer")]
        #[test_case("options.locked", "maybe" ; "bad flag")]
        fn invalid_value_leaves_monitor_unchanged(path: &str, raw: &str) {
            let mut monitor = Monitor::default();
            let err = set_field(&mut monitor, path, raw).unwrap_err();
            assert!(matches!(err, RuleError::InvalidFieldValue { .. }));
            assert_eq!(monitor, Monitor::default());
        }

        #[test]
        fn unknown_path_is_an_error() {
            let mut monitor = Monitor::default();
            let err = set_field(&mut monitor, "options.silenced", "x").unwrap_err();
            assert!(matches!(err, RuleError::UnknownField { .. }));
            assert_eq!(monitor, Monitor::default());
        }
    }
}
