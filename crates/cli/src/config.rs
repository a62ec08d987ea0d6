//! Console configuration read from `envdeck.toml`.
//!
//! # Example
//!
//! ```toml
//! log_filter = "envdeck=info"
//! page_size = 20
//!
//! [capabilities]
//! grant = ["view-detail", "devops-service.application-instance.queryValues"]
//! ```
//!
//! Every key is optional. Without a `[capabilities]` table every action
//! kind is granted.

use std::path::{Path, PathBuf};

use envdeck_core::page::DEFAULT_PAGE_SIZE;
use envdeck_core::CapabilitySet;
use serde::{Deserialize, Serialize};

/// Looked up in the working directory when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "envdeck.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// `EnvFilter` directives used when `ENVDECK_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub capabilities: Option<CapabilitiesConfig>,
}

/// `[capabilities]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CapabilitiesConfig {
    /// Action-kind names or remote service codes.
    #[serde(default)]
    pub grant: Vec<String>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: None,
            page_size: DEFAULT_PAGE_SIZE,
            capabilities: None,
        }
    }
}

impl Config {
    /// The configured capability set; all kinds when none is configured.
    pub fn capability_set(&self) -> Result<CapabilitySet, String> {
        match &self.capabilities {
            None => Ok(CapabilitySet::full()),
            Some(caps) => CapabilitySet::from_grants(&caps.grant)
                .map_err(|e| format!("invalid [capabilities] grant: {}", e)),
        }
    }
}

/// Read and parse a config file from `path`.
pub(crate) fn read_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| format!("could not parse '{}': {}", path.display(), e))?;
    if config.page_size == 0 {
        return Err(format!(
            "invalid '{}': page_size must be positive",
            path.display()
        ));
    }
    Ok(config)
}

/// Load the explicit config, else `./envdeck.toml` if present, else defaults.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Config, String> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                read_config(&default)
            } else {
                Ok(Config::default())
            }
        }
    }
}
