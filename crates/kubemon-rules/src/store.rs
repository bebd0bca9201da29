//! The rule store: the current [`RuleSet`] behind an atomically swapped
//! pointer.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use crate::error::Result;
use crate::loader::RuleLoader;
use crate::ruleset::RuleSet;

/// Holds the authoritative rule set.
///
/// Readers take a [`snapshot`](Self::snapshot) and keep using it for the whole
/// reconciliation, so a reload never changes rules under an in-flight event.
#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
    loader: Option<RuleLoader>,
}

impl RuleStore {
    /// Performs the initial load. Failure here is fatal to the caller.
    pub async fn load(loader: RuleLoader) -> Result<Self> {
        let rules = loader.load().await?;
        Ok(Self {
            current: RwLock::new(Arc::new(rules)),
            loader: Some(loader),
        })
    }

    /// Creates a store over fixed rules with no reload source.
    #[must_use]
    pub fn from_rules(rules: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
            loader: None,
        }
    }

    /// Returns the current rule set.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the current rule set.
    pub fn replace(&self, rules: RuleSet) {
        *self.current.write() = Arc::new(rules);
    }

    /// Reloads every source and swaps in the merged result.
    ///
    /// On failure the previous rule set stays authoritative and the error is
    /// returned for the caller to log or count.
    pub async fn reload(&self) -> Result<()> {
        let Some(loader) = &self.loader else {
            return Ok(());
        };
        match loader.load().await {
            Ok(rules) => {
                info!(groups = rules.groups.len(), "reloaded rules");
                self.replace(rules);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "rule reload failed, keeping previous rules");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RuleSource;
    use crate::ruleset::MonitorGroup;
    use std::io::Write;

    fn group(object_type: &str) -> MonitorGroup {
        MonitorGroup {
            object_type: object_type.to_string(),
            ..MonitorGroup::default()
        }
    }

    #[test]
    fn snapshot_survives_replace() {
        let store = RuleStore::from_rules(RuleSet {
            groups: vec![group("deployment")],
            ..RuleSet::default()
        });
        let before = store.snapshot();
        store.replace(RuleSet::default());

        assert_eq!(before.groups.len(), 1);
        assert!(store.snapshot().groups.is_empty());
    }

    #[tokio::test]
    async fn reload_picks_up_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"rulesets:\n  - type: deployment\n").unwrap();
        let loader = RuleLoader::new(vec![RuleSource::Path(file.path().to_path_buf())]);
        let store = RuleStore::load(loader).await.unwrap();
        assert_eq!(store.snapshot().groups.len(), 1);

        std::fs::write(
            file.path(),
            "rulesets:\n  - type: deployment\n  - type: namespace\n",
        )
        .unwrap();
        store.reload().await.unwrap();
        assert_eq!(store.snapshot().groups.len(), 2);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"rulesets:\n  - type: deployment\n").unwrap();
        let loader = RuleLoader::new(vec![RuleSource::Path(file.path().to_path_buf())]);
        let store = RuleStore::load(loader).await.unwrap();

        std::fs::write(file.path(), "rulesets: [unterminated").unwrap();
        assert!(store.reload().await.is_err());
        assert_eq!(store.snapshot().groups.len(), 1);
    }

    #[tokio::test]
    async fn first_load_failure_is_returned() {
        let loader = RuleLoader::new(vec![RuleSource::parse("/nonexistent/kubemon.yml")]);
        assert!(RuleStore::load(loader).await.is_err());
    }

    #[tokio::test]
    async fn fixed_rules_reload_is_noop() {
        let store = RuleStore::from_rules(RuleSet {
            groups: vec![group("static")],
            ..RuleSet::default()
        });
        store.reload().await.unwrap();
        assert_eq!(store.snapshot().groups.len(), 1);
    }
}
