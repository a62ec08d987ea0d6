use envdeck_core::{ActionKind, PageError, SelectionError, ValidationError};
use envdeck_services::ServiceError;

use crate::panel::PanelKind;
use crate::session::SessionToken;

/// Errors that abort a workflow. None is fatal; the user may retry.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A collaborator call reported failure. Surfaced once, never retried.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        source: ServiceError,
    },

    /// The action is not in the instance's menu (ungranted or illegal in
    /// the instance's state).
    #[error("action '{kind}' is not available for instance {instance_id}")]
    NotOffered {
        instance_id: String,
        kind: ActionKind,
    },

    /// A command on the instance has not resolved yet.
    #[error("instance {instance_id} has a command in progress")]
    CommandInProgress { instance_id: String },

    /// Another workflow for the same instance is still running.
    #[error("a workflow for instance {instance_id} is already running")]
    Busy { instance_id: String },

    /// The snapshot lacks the environment, application, or version id the
    /// remote calls need.
    #[error("instance {instance_id} has no complete deployment reference")]
    MissingDeployment { instance_id: String },

    /// The session was closed while the workflow was waiting.
    #[error("session {token} closed before the result arrived")]
    Stale { token: SessionToken },

    #[error("environment form is invalid: {}", describe(.0))]
    Validation(Vec<ValidationError>),

    #[error("{kind} panel does not support this operation")]
    WrongPanel { kind: PanelKind },

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Page(#[from] PageError),
}

fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl WorkflowError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(ServiceError) -> Self {
        move |source| WorkflowError::Remote { operation, source }
    }

    /// Whether the host should show this as a failure notification rather
    /// than drop it silently.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, WorkflowError::Stale { .. })
    }
}
