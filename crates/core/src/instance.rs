//! Deployed instance snapshots and their classification.
//!
//! A snapshot arrives from the polling layer with loosely typed status
//! strings. [`InstanceState::classify`] turns it into a closed set of
//! states, one per row of the action table, so the resolver never has to
//! compare strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Deployment status of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Operating,
    Failed,
    Running,
    Stopped,
    Other(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Operating => "operating",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Other(s) => s,
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(s: &str) -> Self {
        match s {
            "operating" => InstanceStatus::Operating,
            "failed" => InstanceStatus::Failed,
            "running" => InstanceStatus::Running,
            // The deployment service has historically spelled it "stoped".
            "stopped" | "stoped" => InstanceStatus::Stopped,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(s: String) -> Self {
        InstanceStatus::from(s.as_str())
    }
}

impl From<InstanceStatus> for String {
    fn from(status: InstanceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the last command issued to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Doing,
    Success,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Doing => "doing",
            CommandStatus::Success => "success",
            CommandStatus::Failed => "failed",
        }
    }
}

/// Read-only view of a deployed instance for one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub id: String,
    /// Human-facing instance name.
    #[serde(default)]
    pub code: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub connect: bool,
    #[serde(default)]
    pub command_status: Option<CommandStatus>,
    #[serde(default)]
    pub command_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub env_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_version_id: Option<String>,
}

impl InstanceSnapshot {
    /// A connected instance with no command history.
    pub fn new(id: &str, status: InstanceStatus) -> Self {
        Self {
            id: id.to_string(),
            code: String::new(),
            status,
            connect: true,
            command_status: None,
            command_type: None,
            error: None,
            env_id: None,
            app_id: None,
            app_version_id: None,
        }
    }

    pub fn with_command(mut self, status: CommandStatus, command_type: &str) -> Self {
        self.command_status = Some(status);
        self.command_type = Some(command_type.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connect = false;
        self
    }

    pub fn deployed_from(mut self, env_id: &str, app_id: &str, app_version_id: &str) -> Self {
        self.env_id = Some(env_id.to_string());
        self.app_id = Some(app_id.to_string());
        self.app_version_id = Some(app_version_id.to_string());
        self
    }

    pub fn state(&self) -> InstanceState {
        InstanceState::classify(self)
    }
}

impl Entity for InstanceSnapshot {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Where the last command cycle of a live instance stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum CommandPhase {
    /// Last command succeeded, or none was ever issued.
    Settled,
    InProgress { command_type: Option<String> },
    Errored { summary: String },
}

/// Closed classification of an instance, one variant per action-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum InstanceState {
    /// A deployment is under way; nothing but inspection is safe.
    Operating,
    /// The environment agent is not connected.
    Disconnected,
    /// Deployment failed.
    Failed,
    /// Deployed and reachable.
    Live { stopped: bool, command: CommandPhase },
}

impl InstanceState {
    pub fn classify(snapshot: &InstanceSnapshot) -> Self {
        if snapshot.status == InstanceStatus::Operating {
            return InstanceState::Operating;
        }
        if !snapshot.connect {
            return InstanceState::Disconnected;
        }
        if snapshot.status == InstanceStatus::Failed {
            return InstanceState::Failed;
        }
        let command = match snapshot.command_status {
            None | Some(CommandStatus::Success) => CommandPhase::Settled,
            Some(CommandStatus::Doing) => CommandPhase::InProgress {
                command_type: snapshot.command_type.clone(),
            },
            Some(CommandStatus::Failed) => CommandPhase::Errored {
                summary: format!(
                    "{} {}: {}",
                    snapshot.command_type.as_deref().unwrap_or("command"),
                    CommandStatus::Failed.as_str(),
                    snapshot.error.as_deref().unwrap_or("")
                ),
            },
        };
        InstanceState::Live {
            stopped: snapshot.status == InstanceStatus::Stopped,
            command,
        }
    }

    pub fn command_in_progress(&self) -> bool {
        matches!(
            self,
            InstanceState::Live {
                command: CommandPhase::InProgress { .. },
                ..
            }
        )
    }
}
