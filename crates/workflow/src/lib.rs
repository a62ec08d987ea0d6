//! Asynchronous workflows of the envdeck console.
//!
//! [`InstanceWorkflows`] runs the pre-condition chains behind instance
//! actions; [`EnvironmentWorkflows`] drives the member-selection panels and
//! the environment lifecycle. Both talk to the platform only through the
//! traits in `envdeck-services`, and both stamp their results with a
//! [`SessionToken`] so a host can drop answers for views it already closed.

mod environment;
mod error;
mod inflight;
mod instance;
mod panel;
mod session;

use serde::{Deserialize, Serialize};

pub use environment::{
    DisableConfirmation, EnvironmentWorkflows, GroupDeleteConfirmation, MemberPanel,
};
pub use error::WorkflowError;
pub use inflight::{InFlight, InFlightGuard};
pub use instance::{
    ConfigEditor, DeleteConfirmation, InstanceListView, InstanceWorkflows, UpgradeOutcome,
    UpgradePlan,
};
pub use panel::{PanelKind, SubmitLabel};
pub use session::{SessionClock, SessionToken, Stamped};

/// Returned by a successful mutation: the host must reload its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct ReloadRequired;
