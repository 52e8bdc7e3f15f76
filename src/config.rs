//! Configuration management for the provisioner.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `RLP__`-prefixed environment overrides (`RLP__API__BASE_URL`,
//! `RLP__ZONES__IDS=a,b`), and finally the well-known Cloudflare variables
//! `CF_AUTH_EMAIL`, `CF_AUTH_KEY`, `CF_ACCOUNT_NAME` and `CF_API_BASE_URL`.
//! The resulting value is immutable and handed to the components that need it.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ProvisionerError, Result};

/// Default Cloudflare v4 API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Main configuration for the provisioner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// API endpoint and credentials
    #[serde(default)]
    pub api: ApiConfig,

    /// Account whose zones are enumerated
    #[serde(default)]
    pub account_name: Option<String>,

    /// Zone selection filters
    #[serde(default)]
    pub zones: ZoneSelection,

    /// Path to a YAML rule catalogue; the built-in catalogue is used when unset
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// Skip catalogue entries whose description already exists in the ruleset
    #[serde(default)]
    pub skip_existing_rules: bool,
}

/// API endpoint and credential headers.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root every path is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value of the `X-Auth-Email` header
    #[serde(default)]
    pub auth_email: String,

    /// Value of the `X-Auth-Key` header
    #[serde(default)]
    pub auth_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_email: String::new(),
            auth_key: String::new(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("auth_email", &self.auth_email)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Which zones a run touches.
///
/// Explicit `ids` bypass enumeration entirely. Otherwise every zone of the
/// account is enumerated and, when `names` is non-empty, only zones with a
/// listed name are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSelection {
    #[serde(default)]
    pub ids: Vec<String>,

    #[serde(default)]
    pub names: Vec<String>,
}

impl ProvisionerConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_vars(path, None)
    }

    /// Load configuration, reading variables from `vars` instead of the
    /// process environment when given.
    ///
    /// Environment values are kept as strings; only `zones.ids` and
    /// `zones.names` are split on commas.
    pub fn load_with_vars(path: Option<&Path>, vars: Option<&HashMap<String, String>>) -> Result<Self> {
        let var = |name: &str| match vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        let list = |name: &str| var(name).map(|raw| split_list(&raw));

        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: ProvisionerConfig = builder
            .add_source(
                Environment::with_prefix("RLP")
                    .separator("__")
                    .source(vars.cloned()),
            )
            .set_override_option("zones.ids", list("RLP__ZONES__IDS"))
            .and_then(|b| b.set_override_option("zones.names", list("RLP__ZONES__NAMES")))
            .and_then(|b| b.set_override_option("api.auth_email", var("CF_AUTH_EMAIL")))
            .and_then(|b| b.set_override_option("api.auth_key", var("CF_AUTH_KEY")))
            .and_then(|b| b.set_override_option("api.base_url", var("CF_API_BASE_URL")))
            .and_then(|b| b.set_override_option("account_name", var("CF_ACCOUNT_NAME")))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ProvisionerError::Config(e.to_string()))?;

        config.validate_api()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without consulting the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProvisionerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ProvisionerError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable for a reconciliation run.
    pub fn validate(&self) -> Result<()> {
        self.validate_api()?;
        if self.zones.ids.is_empty() && self.account_name().is_none() {
            return Err(ProvisionerError::Config(
                "an account name (CF_ACCOUNT_NAME) is required unless zones.ids is set".into(),
            ));
        }
        Ok(())
    }

    /// Check the endpoint and credentials only.
    pub fn validate_api(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ProvisionerError::Config("api.base_url must not be empty".into()));
        }
        if self.api.auth_email.trim().is_empty() {
            return Err(ProvisionerError::Config(
                "missing auth email (set CF_AUTH_EMAIL or api.auth_email)".into(),
            ));
        }
        if self.api.auth_key.trim().is_empty() {
            return Err(ProvisionerError::Config(
                "missing auth key (set CF_AUTH_KEY or api.auth_key)".into(),
            ));
        }
        Ok(())
    }

    /// The configured account name, ignoring blank values.
    pub fn account_name(&self) -> Option<&str> {
        self.account_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
