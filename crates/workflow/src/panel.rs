//! Side panels of the environment console.

use std::fmt;

use envdeck_core::SelectionPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PanelKind {
    Create,
    Edit,
    CreateGroup,
    EditGroup,
    Permission,
    /// Shows the agent install command after creation.
    Token,
    /// Shows the agent install command of an existing environment.
    Key,
}

/// Label of the panel's confirm button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitLabel {
    Create,
    Save,
    Close,
}

impl PanelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelKind::Create => "create",
            PanelKind::Edit => "edit",
            PanelKind::CreateGroup => "create-group",
            PanelKind::EditGroup => "edit-group",
            PanelKind::Permission => "permission",
            PanelKind::Token => "token",
            PanelKind::Key => "key",
        }
    }

    /// How the panel's member table keeps selections; `None` when the panel
    /// has no member table.
    pub fn selection_policy(&self) -> Option<SelectionPolicy> {
        match self {
            PanelKind::Create => Some(SelectionPolicy::PageScoped),
            PanelKind::Permission => Some(SelectionPolicy::Accumulate),
            _ => None,
        }
    }

    pub fn shows_buttons(&self) -> bool {
        matches!(
            self,
            PanelKind::Create | PanelKind::Edit | PanelKind::Permission
        )
    }

    pub fn submit_label(&self) -> SubmitLabel {
        match self {
            PanelKind::Create | PanelKind::CreateGroup => SubmitLabel::Create,
            PanelKind::Edit | PanelKind::EditGroup | PanelKind::Permission => SubmitLabel::Save,
            PanelKind::Token | PanelKind::Key => SubmitLabel::Close,
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
