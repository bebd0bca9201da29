//! Controller configuration.

use std::time::Duration;

use kubemon_rules::RuleSource;
use kubemon_sync::{DEFAULT_API_URL, DatadogConfig};
use tracing::warn;

use crate::error::{ControllerError, Result};
use crate::queue::RetryPolicy;

/// Default owner tag.
pub const DEFAULT_OWNER_TAG: &str = "kubemon";

/// Default annotation domain for override annotations.
pub const DEFAULT_ANNOTATION_DOMAIN: &str = "kubemon.io";

/// Default rule source.
pub const DEFAULT_DEFINITIONS: &str = "conf.yml";

/// Process inputs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Monitor store API key.
    pub api_key: String,
    /// Monitor store application key.
    pub app_key: String,
    /// Monitor store base URL.
    pub api_url: String,
    /// Cluster name, exposed to templates as `ClusterName`.
    pub cluster_name: String,
    /// Tag carried by every managed monitor.
    pub owner_tag: String,
    /// `;`-separated rule sources.
    pub definitions: String,
    /// Log writes instead of performing them.
    pub dry_run: bool,
    /// Domain of override annotations.
    pub annotation_domain: String,
    /// How often rules are reloaded.
    pub rule_reload_interval: Duration,
    /// How often static monitors are reconciled.
    pub static_interval: Duration,
    /// How long to wait for watch caches to sync.
    pub cache_sync_timeout: Duration,
    /// Retry behavior for failed events.
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            app_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            cluster_name: String::new(),
            owner_tag: DEFAULT_OWNER_TAG.to_string(),
            definitions: DEFAULT_DEFINITIONS.to_string(),
            dry_run: false,
            annotation_domain: DEFAULT_ANNOTATION_DOMAIN.to_string(),
            rule_reload_interval: Duration::from_secs(60),
            static_interval: Duration::from_secs(300),
            cache_sync_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.owner_tag.trim().is_empty() {
            return Err(ControllerError::Config {
                reason: "owner tag cannot be empty".to_string(),
            });
        }
        if self.rule_sources().is_empty() {
            return Err(ControllerError::Config {
                reason: "at least one rule source is required".to_string(),
            });
        }
        if self.annotation_domain.is_empty() || self.annotation_domain.contains('/') {
            return Err(ControllerError::Config {
                reason: format!("invalid annotation domain: {:?}", self.annotation_domain),
            });
        }
        for (name, interval) in [
            ("rule reload interval", self.rule_reload_interval),
            ("static interval", self.static_interval),
            ("cache sync timeout", self.cache_sync_timeout),
        ] {
            if interval.is_zero() {
                return Err(ControllerError::Config {
                    reason: format!("{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }

    /// Returns true if both store credentials are set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.app_key.is_empty()
    }

    /// Returns the dry-run setting, forced on when credentials are missing.
    #[must_use]
    pub fn effective_dry_run(&self) -> bool {
        if !self.has_credentials() && !self.dry_run {
            warn!("monitor store credentials missing, forcing dry run");
            return true;
        }
        self.dry_run
    }

    /// Returns the parsed rule sources.
    #[must_use]
    pub fn rule_sources(&self) -> Vec<RuleSource> {
        RuleSource::parse_list(&self.definitions)
    }

    /// Returns connection settings for the monitor store.
    #[must_use]
    pub fn datadog(&self) -> DatadogConfig {
        DatadogConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            app_key: self.app_key.clone(),
            ..DatadogConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn with_credentials() -> ControllerConfig {
        ControllerConfig {
            api_key: "api".to_string(),
            app_key: "app".to_string(),
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.owner_tag, "kubemon");
        assert_eq!(config.static_interval, Duration::from_secs(300));
        assert_eq!(config.retry.max_requeues, 5);
    }

    #[test_case(ControllerConfig { owner_tag: " ".into(), ..ControllerConfig::default() } ; "empty owner")]
    #[test_case(ControllerConfig { definitions: ";".into(), ..ControllerConfig::default() } ; "no sources")]
    #[test_case(ControllerConfig { annotation_domain: "a/b".into(), ..ControllerConfig::default() } ; "bad domain")]
    #[test_case(ControllerConfig { static_interval: Duration::ZERO, ..ControllerConfig::default() } ; "zero interval")]
    fn rejects_invalid(config: ControllerConfig) {
        assert!(matches!(
            config.validate(),
            Err(ControllerError::Config { .. })
        ));
    }

    #[test]
    fn missing_credentials_force_dry_run() {
        assert!(ControllerConfig::default().effective_dry_run());
        assert!(!with_credentials().effective_dry_run());
        let explicit = ControllerConfig {
            dry_run: true,
            ..with_credentials()
        };
        assert!(explicit.effective_dry_run());
    }

    #[test]
    fn splits_rule_sources() {
        let config = ControllerConfig {
            definitions: "a.yml;https://rules.example.com/b.yml".to_string(),
            ..ControllerConfig::default()
        };
        assert_eq!(config.rule_sources().len(), 2);
    }

    #[test]
    fn datadog_settings_follow_config() {
        let datadog = with_credentials().datadog();
        assert!(datadog.has_credentials());
        assert_eq!(datadog.api_url, DEFAULT_API_URL);
    }
}
