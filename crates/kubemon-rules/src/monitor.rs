//! The monitor model shared by rule files and the external monitor store.
//!
//! A [`Monitor`] is both the desired shape declared in a rule file and the
//! representation returned by the store. Every field is optional so that an
//! unset field can be told apart from one explicitly set to an empty value.

use serde::{Deserialize, Serialize};

/// One external alerting monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    /// Store-assigned identifier. Never declared in rule files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Display name; also the lookup key within the owner's monitors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Alert type, e.g. "metric alert" or "query alert".
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub monitor_type: Option<String>,
    /// Monitor query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Notification message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Tags attached to the monitor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Current alert state as reported by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_state: Option<String>,
    /// Behavioral options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<MonitorOptions>,
}

/// Per-monitor alerting options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorOptions {
    /// Minutes without data before a no-data alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data_timeframe: Option<i64>,
    /// Notify tagged users on monitor changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_audit: Option<bool>,
    /// Alert when data stops arriving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_no_data: Option<bool>,
    /// Minutes between re-notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renotify_interval: Option<i64>,
    /// Seconds to wait before evaluating new hosts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_host_delay: Option<i64>,
    /// Seconds to delay evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_delay: Option<i64>,
    /// Hours of no data before auto-resolve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_h: Option<i64>,
    /// Message sent on re-notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_message: Option<String>,
    /// Alerting thresholds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    /// Require a full evaluation window of data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_full_window: Option<bool>,
    /// Restrict edits to the creator and admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    /// Include triggering tags in notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_tags: Option<bool>,
}

/// Numeric alerting thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Recovery threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<f64>,
    /// Critical threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
    /// Warning threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    /// Unknown-state threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown: Option<f64>,
    /// Critical recovery threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_recovery: Option<f64>,
    /// Warning recovery threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_recovery: Option<f64>,
}

fn fill<T: Clone>(slot: &mut Option<T>, current: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(current);
    }
}

impl Monitor {
    /// Returns the monitor name, or an empty string when unset.
    #[must_use]
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Returns the options block, creating an empty one if needed.
    pub fn options_mut(&mut self) -> &mut MonitorOptions {
        self.options.get_or_insert_with(MonitorOptions::default)
    }

    /// Returns the escalation message if one is set.
    #[must_use]
    pub fn escalation_message(&self) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|o| o.escalation_message.as_deref())
    }

    /// Returns true if the monitor carries every tag in `tags`.
    #[must_use]
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }

    /// Builds the monitor that should be written over `current`.
    ///
    /// Fields set on `self` win. Unset fields are filled from `current`. The
    /// store-owned identifier and overall state are always taken from
    /// `current`.
    #[must_use]
    pub fn merged_with(&self, current: &Self) -> Self {
        let mut merged = self.clone();
        fill(&mut merged.name, &current.name);
        fill(&mut merged.monitor_type, &current.monitor_type);
        fill(&mut merged.query, &current.query);
        fill(&mut merged.message, &current.message);
        if merged.tags.is_empty() {
            merged.tags.clone_from(&current.tags);
        }
        if let Some(existing) = &current.options {
            merged.options_mut().fill_from(existing);
        }
        merged.id = current.id;
        merged.overall_state.clone_from(&current.overall_state);
        merged
    }
}

impl MonitorOptions {
    fn fill_from(&mut self, current: &Self) {
        fill(&mut self.no_data_timeframe, &current.no_data_timeframe);
        fill(&mut self.notify_audit, &current.notify_audit);
        fill(&mut self.notify_no_data, &current.notify_no_data);
        fill(&mut self.renotify_interval, &current.renotify_interval);
        fill(&mut self.new_host_delay, &current.new_host_delay);
        fill(&mut self.evaluation_delay, &current.evaluation_delay);
        fill(&mut self.timeout_h, &current.timeout_h);
        fill(&mut self.escalation_message, &current.escalation_message);
        fill(&mut self.require_full_window, &current.require_full_window);
        fill(&mut self.locked, &current.locked);
        fill(&mut self.include_tags, &current.include_tags);
        if let Some(existing) = &current.thresholds {
            self.thresholds_mut().fill_from(existing);
        }
    }

    /// Returns the thresholds block, creating an empty one if needed.
    pub fn thresholds_mut(&mut self) -> &mut Thresholds {
        self.thresholds.get_or_insert_with(Thresholds::default)
    }
}

impl Thresholds {
    fn fill_from(&mut self, current: &Self) {
        fill(&mut self.ok, &current.ok);
        fill(&mut self.critical, &current.critical);
        fill(&mut self.warning, &current.warning);
        fill(&mut self.unknown, &current.unknown);
        fill(&mut self.critical_recovery, &current.critical_recovery);
        fill(&mut self.warning_recovery, &current.warning_recovery);
    }
}
