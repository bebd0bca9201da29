//! Rule sources and loading.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Result, RuleError};
use crate::ruleset::RuleSet;

/// Where a rule document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// A local YAML file.
    Path(PathBuf),
    /// An `http://` or `https://` URL.
    Url(String),
}

impl RuleSource {
    /// Classifies a configured source string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }

    /// Splits a `;`-separated list of sources, skipping empty entries.
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(';')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Reads the raw document.
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<String> {
        match self {
            Self::Path(path) => {
                if !path.is_file() {
                    return Err(RuleError::InvalidSource {
                        source_name: self.to_string(),
                    });
                }
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| RuleError::Io {
                        source_name: self.to_string(),
                        reason: e.to_string(),
                    })
            }
            Self::Url(url) => {
                let http_error = |e: reqwest::Error| RuleError::Http {
                    source_name: url.clone(),
                    reason: e.to_string(),
                };
                client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(http_error)?
                    .text()
                    .await
                    .map_err(http_error)
            }
        }
    }
}

impl std::fmt::Display for RuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Parses one YAML rule document. An empty document yields an empty rule set.
pub fn parse_rule_set(document: &str, source_name: &str) -> Result<RuleSet> {
    if document.trim().is_empty() {
        return Ok(RuleSet::default());
    }
    serde_yaml::from_str(document).map_err(|e| RuleError::Parse {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    })
}

/// Loads and merges every source in order.
///
/// Fails as a whole if any single source fails, so callers never see a
/// partially merged rule set.
pub async fn load_rule_sets(sources: &[RuleSource], client: &reqwest::Client) -> Result<RuleSet> {
    if sources.is_empty() {
        return Err(RuleError::NoSources);
    }
    let mut merged = RuleSet::default();
    for source in sources {
        let document = source.fetch(client).await?;
        let rules = parse_rule_set(&document, &source.to_string())?;
        debug!(
            source = %source,
            groups = rules.groups.len(),
            variables = rules.cluster_variables.len(),
            "loaded rule source"
        );
        merged.merge(rules);
    }
    info!(
        sources = sources.len(),
        groups = merged.groups.len(),
        "loaded rules"
    );
    Ok(merged)
}

/// Loads rule sets from a fixed list of sources.
#[derive(Debug, Clone)]
pub struct RuleLoader {
    sources: Vec<RuleSource>,
    client: reqwest::Client,
}

impl RuleLoader {
    /// Creates a loader with a default HTTP client.
    #[must_use]
    pub fn new(sources: Vec<RuleSource>) -> Self {
        Self::with_client(sources, reqwest::Client::new())
    }

    /// Creates a loader with a caller-supplied HTTP client.
    #[must_use]
    pub fn with_client(sources: Vec<RuleSource>, client: reqwest::Client) -> Self {
        Self { sources, client }
    }

    /// Returns the configured sources.
    #[must_use]
    pub fn sources(&self) -> &[RuleSource] {
        &self.sources
    }

    /// Loads and merges every source.
    pub async fn load(&self) -> Result<RuleSet> {
        load_rule_sets(&self.sources, &self.client).await
    }
}
