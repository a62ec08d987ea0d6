use serde::{Deserialize, Serialize};

/// Deployed configuration values of one application version in one
/// environment, as a YAML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValues {
    pub environment_id: String,
    pub application_id: String,
    pub version_id: String,
    pub yaml: String,
}

/// A published application version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub version: String,
}

impl Version {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
        }
    }
}

/// An execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Board the environment is shown on; `None` for the default board.
    #[serde(default)]
    pub group_id: Option<String>,
    pub active: bool,
    /// Whether the environment's agent is connected.
    #[serde(default)]
    pub connect: bool,
}

/// A board grouping environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentGroup {
    pub id: String,
    pub name: String,
}

/// Reply to a successful environment creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEnvironment {
    pub id: String,
    /// One-time shell command that installs the environment agent.
    pub token: String,
}

/// Organization/project scope a user acts in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub organization_id: String,
    pub project_id: String,
}
