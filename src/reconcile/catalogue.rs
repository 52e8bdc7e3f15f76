//! Rate limit rule catalogue.
//!
//! The catalogue is the desired state pushed to every zone's rate limiting
//! ruleset. It is loaded from YAML when a path is configured and falls back
//! to a built-in set of rules otherwise.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{ProvisionerError, Result};

/// A rate limiting rule as submitted to the rules collection of a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Human readable description, also the key used to detect existing rules
    pub description: String,
    /// Filter expression selecting the requests this rule counts
    pub expression: String,
    /// Action taken once the threshold is exceeded, e.g. `managed_challenge`
    pub action: String,
    /// Threshold parameters
    pub ratelimit: RateLimitSpec,
    /// Disabled rules are still created, but inert
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Counter characteristics and thresholds of a rate limiting rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Signals the counter is keyed on, in order (e.g. `cf.colo.id`, `ip.src`)
    pub characteristics: Vec<String>,
    /// Counting period in seconds
    pub period: u64,
    /// Requests allowed per period
    pub requests_per_period: u64,
    /// How long the action applies once triggered, in seconds
    pub mitigation_timeout: u64,
}

fn default_enabled() -> bool {
    true
}

/// An ordered list of rule definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCatalogue {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleCatalogue {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }

    /// The catalogue applied when no rules file is configured.
    pub fn builtin() -> Self {
        let per_colo_and_ip = || vec!["cf.colo.id".to_string(), "ip.src".to_string()];

        Self::new(vec![
            RuleDefinition {
                description: "Rate limit login endpoints".to_string(),
                expression: r#"(http.request.uri.path eq "/wp-login.php") or (http.request.uri.path eq "/xmlrpc.php")"#.to_string(),
                action: "managed_challenge".to_string(),
                ratelimit: RateLimitSpec {
                    characteristics: per_colo_and_ip(),
                    period: 60,
                    requests_per_period: 20,
                    mitigation_timeout: 600,
                },
                enabled: true,
            },
            RuleDefinition {
                description: "Rate limit API requests".to_string(),
                expression: r#"(starts_with(http.request.uri.path, "/api/"))"#.to_string(),
                action: "block".to_string(),
                ratelimit: RateLimitSpec {
                    characteristics: per_colo_and_ip(),
                    period: 10,
                    requests_per_period: 100,
                    mitigation_timeout: 60,
                },
                enabled: false,
            },
        ])
    }

    /// Load a catalogue from a YAML file.
    ///
    /// A configured file must define at least one rule.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rule catalogue");

        let contents = std::fs::read_to_string(path)?;
        let catalogue = Self::from_yaml(&contents)?;
        if catalogue.is_empty() {
            return Err(ProvisionerError::Config(format!(
                "rule catalogue {} defines no rules",
                path.display()
            )));
        }
        Ok(catalogue)
    }

    /// Load a catalogue from a YAML string.
    ///
    /// Accepts either a bare list of rules or a mapping with a `rules` list;
    /// the document's shape decides which form is parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_error)?;

        let catalogue = match document {
            serde_yaml::Value::Sequence(_) => {
                Self::new(serde_yaml::from_value::<Vec<RuleDefinition>>(document).map_err(parse_error)?)
            }
            serde_yaml::Value::Mapping(_) => {
                serde_yaml::from_value::<RuleCatalogue>(document).map_err(parse_error)?
            }
            serde_yaml::Value::Null => {
                return Err(ProvisionerError::Config("rule catalogue is empty".into()));
            }
            _ => {
                return Err(ProvisionerError::Config(
                    "rule catalogue must be a list of rules or a mapping with a `rules` list".into(),
                ));
            }
        };

        catalogue.validate()?;
        Ok(catalogue)
    }

    fn validate(&self) -> Result<()> {
        if let Some(index) = self.rules.iter().position(|r| r.description.trim().is_empty()) {
            return Err(ProvisionerError::Config(format!(
                "rule #{} in catalogue has an empty description",
                index + 1
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RuleDefinition> {
        self.rules.iter()
    }
}

fn parse_error(e: serde_yaml::Error) -> ProvisionerError {
    ProvisionerError::Config(format!("Failed to parse rule catalogue: {}", e))
}
