//! Instance action workflows.
//!
//! The action menu says what is legal; this module runs the pre-conditions
//! an action needs before its UI opens or its mutation fires:
//!
//! - view-config: fetch current values, then open the editor.
//! - upgrade: fetch current values, then newer versions; open the upgrade
//!   panel only if both succeed and at least one newer version exists.
//! - delete: ask for confirmation; delete only on confirm.
//! - start/stop: mutate immediately.
//!
//! Each workflow holds the instance's in-flight guard for its whole
//! duration. Pre-condition chains stop at the first await that finds their
//! session closed; mutation results come back stamped and the host drops
//! them through [`SessionClock::accept`] if the view has since closed.

use std::sync::Arc;

use envdeck_core::{
    resolve_actions, Action, ActionKind, ActionMenu, CapabilitySet, InstanceSnapshot, Page,
    PageQuery, TableChange, TargetState,
};
use envdeck_services::{
    ConfigValueService, ConfigValues, InstanceQuery, InstanceService, ServiceError, Version,
    VersionService,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::WorkflowError;
use crate::inflight::{InFlight, InFlightGuard};
use crate::session::{SessionClock, SessionToken, Stamped};
use crate::ReloadRequired;

/// Everything the upgrade panel needs to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub instance_id: String,
    pub values: ConfigValues,
    /// Newer versions, oldest first. Never empty.
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum UpgradeOutcome {
    Ready(UpgradePlan),
    /// Not an error: the instance already runs the newest version.
    NoUpgradeAvailable,
}

/// Values the configuration editor opens with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEditor {
    pub instance_id: String,
    pub values: ConfigValues,
}

/// A pending delete. Only [`InstanceWorkflows::request_delete`] creates one,
/// so the destructive call cannot fire without passing through the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    instance_id: String,
    token: SessionToken,
}

impl DeleteConfirmation {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

struct Deployment<'a> {
    environment_id: &'a str,
    application_id: &'a str,
    version_id: &'a str,
}

fn deployment(snapshot: &InstanceSnapshot) -> Result<Deployment<'_>, WorkflowError> {
    match (
        snapshot.env_id.as_deref(),
        snapshot.app_id.as_deref(),
        snapshot.app_version_id.as_deref(),
    ) {
        (Some(environment_id), Some(application_id), Some(version_id)) => Ok(Deployment {
            environment_id,
            application_id,
            version_id,
        }),
        _ => Err(WorkflowError::MissingDeployment {
            instance_id: snapshot.id.clone(),
        }),
    }
}

/// Runs instance actions against the platform for one instance list view.
pub struct InstanceWorkflows<S> {
    services: Arc<S>,
    capabilities: CapabilitySet,
    sessions: SessionClock,
    in_flight: InFlight,
}

impl<S> InstanceWorkflows<S>
where
    S: ConfigValueService + VersionService + InstanceService,
{
    pub fn new(services: Arc<S>, capabilities: CapabilitySet) -> Self {
        let sessions = SessionClock::new();
        sessions.advance();
        Self {
            services,
            capabilities,
            sessions,
            in_flight: InFlight::new(),
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Replace the capability set, e.g. after the user switches project.
    pub fn set_capabilities(&mut self, capabilities: CapabilitySet) {
        self.capabilities = capabilities;
    }

    pub fn sessions(&self) -> &SessionClock {
        &self.sessions
    }

    /// Close the view. Results of workflows still in flight become stale.
    pub fn close(&self) -> SessionToken {
        let token = self.sessions.advance();
        info!(token = %token, "instance view closed");
        token
    }

    pub fn menu(&self, snapshot: &InstanceSnapshot) -> ActionMenu {
        resolve_actions(snapshot, &self.capabilities)
    }

    /// Fetch one page of instances together with each row's menu.
    pub async fn load(
        &self,
        view: &InstanceListView,
    ) -> Result<Stamped<(Page<InstanceSnapshot>, Vec<ActionMenu>)>, WorkflowError> {
        let token = self.sessions.current();
        let result = self.services.list_instances(&view.query()).await;
        let page = self.settle(token, result, "list instances")?;
        let menus = page.items.iter().map(|i| self.menu(i)).collect();
        Ok(self.sessions.stamp(token, (page, menus)))
    }

    /// Look up `kind` in the instance's menu, or explain why it is absent.
    fn offered(
        &self,
        snapshot: &InstanceSnapshot,
        kind: ActionKind,
    ) -> Result<Action, WorkflowError> {
        let menu = self.menu(snapshot);
        if let Some(action) = menu.find(kind) {
            return Ok(action.clone());
        }
        if menu.blocked.iter().any(|b| b.kind == kind) {
            return Err(WorkflowError::CommandInProgress {
                instance_id: snapshot.id.clone(),
            });
        }
        Err(WorkflowError::NotOffered {
            instance_id: snapshot.id.clone(),
            kind,
        })
    }

    fn claim(&self, instance_id: &str) -> Result<InFlightGuard, WorkflowError> {
        self.in_flight.try_acquire(instance_id).ok_or_else(|| {
            debug!(instance_id, "workflow already in flight");
            WorkflowError::Busy {
                instance_id: instance_id.to_string(),
            }
        })
    }

    fn ensure_current(&self, token: SessionToken) -> Result<(), WorkflowError> {
        if self.sessions.is_current(token) {
            Ok(())
        } else {
            debug!(token = %token, "session closed while waiting");
            Err(WorkflowError::Stale { token })
        }
    }

    /// Judge a remote result that arrived for `token`. A closed session wins
    /// over the result, failure included.
    fn settle<T>(
        &self,
        token: SessionToken,
        result: Result<T, ServiceError>,
        operation: &'static str,
    ) -> Result<T, WorkflowError> {
        self.ensure_current(token)?;
        result.map_err(WorkflowError::remote(operation))
    }

    /// A failed mutation, or `Stale` if the session closed meanwhile.
    /// Successes stay stamped so the host can still drop them.
    fn failure(
        &self,
        token: SessionToken,
        source: ServiceError,
        operation: &'static str,
    ) -> WorkflowError {
        match self.ensure_current(token) {
            Ok(()) => WorkflowError::Remote { operation, source },
            Err(stale) => stale,
        }
    }

    async fn fetch_values(
        &self,
        deployment: &Deployment<'_>,
        token: SessionToken,
    ) -> Result<ConfigValues, WorkflowError> {
        let result = self
            .services
            .fetch_values(
                deployment.environment_id,
                deployment.application_id,
                deployment.version_id,
            )
            .await;
        self.settle(token, result, "fetch configuration values")
    }

    /// Pre-condition for the configuration editor.
    pub async fn prepare_config_edit(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<Stamped<ConfigEditor>, WorkflowError> {
        self.offered(snapshot, ActionKind::ViewConfig)?;
        let deployment = deployment(snapshot)?;
        let _guard = self.claim(&snapshot.id)?;
        let token = self.sessions.current();

        let values = self.fetch_values(&deployment, token).await.inspect_err(|e| {
            warn!(instance_id = %snapshot.id, error = %e, "config edit aborted");
        })?;
        Ok(self.sessions.stamp(
            token,
            ConfigEditor {
                instance_id: snapshot.id.clone(),
                values,
            },
        ))
    }

    /// Pre-condition for the upgrade panel: values first, then versions.
    pub async fn prepare_upgrade(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<Stamped<UpgradeOutcome>, WorkflowError> {
        self.offered(snapshot, ActionKind::Upgrade)?;
        let deployment = deployment(snapshot)?;
        let _guard = self.claim(&snapshot.id)?;
        let token = self.sessions.current();

        let values = self.fetch_values(&deployment, token).await.inspect_err(|e| {
            warn!(instance_id = %snapshot.id, error = %e, "upgrade aborted");
        })?;

        let result = self
            .services
            .fetch_newer_versions(deployment.version_id)
            .await;
        let versions = self
            .settle(token, result, "fetch newer versions")
            .inspect_err(|e| {
                warn!(instance_id = %snapshot.id, error = %e, "upgrade aborted");
            })?;

        let outcome = if versions.is_empty() {
            info!(instance_id = %snapshot.id, "no upgrade available");
            UpgradeOutcome::NoUpgradeAvailable
        } else {
            UpgradeOutcome::Ready(UpgradePlan {
                instance_id: snapshot.id.clone(),
                values,
                versions,
            })
        };
        Ok(self.sessions.stamp(token, outcome))
    }

    /// Start or stop the instance, whichever its menu offers.
    pub async fn toggle_start_stop(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<Stamped<ReloadRequired>, WorkflowError> {
        let action = self.offered(snapshot, ActionKind::ToggleStartStop)?;
        let target = action.target.ok_or_else(|| WorkflowError::NotOffered {
            instance_id: snapshot.id.clone(),
            kind: ActionKind::ToggleStartStop,
        })?;
        let _guard = self.claim(&snapshot.id)?;
        let token = self.sessions.current();

        let operation = match target {
            TargetState::Start => "start instance",
            TargetState::Stop => "stop instance",
        };
        self.services
            .start_or_stop(&snapshot.id, target)
            .await
            .map_err(|e| self.failure(token, e, operation))?;
        info!(instance_id = %snapshot.id, target = target.as_str(), "instance toggled");
        Ok(self.sessions.stamp(token, ReloadRequired))
    }

    /// First step of delete: open the confirmation prompt. No remote call.
    pub fn request_delete(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<DeleteConfirmation, WorkflowError> {
        self.offered(snapshot, ActionKind::Delete)?;
        Ok(DeleteConfirmation {
            instance_id: snapshot.id.clone(),
            token: self.sessions.current(),
        })
    }

    /// Second step of delete: the user confirmed.
    pub async fn confirm_delete(
        &self,
        confirmation: DeleteConfirmation,
    ) -> Result<Stamped<ReloadRequired>, WorkflowError> {
        self.ensure_current(confirmation.token)?;
        let _guard = self.claim(&confirmation.instance_id)?;

        self.services
            .delete_instance(&confirmation.instance_id)
            .await
            .map_err(|e| self.failure(confirmation.token, e, "delete instance"))?;
        info!(instance_id = %confirmation.instance_id, "instance deleted");
        Ok(self.sessions.stamp(confirmation.token, ReloadRequired))
    }
}

/// Query state of the instance list for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceListView {
    pub environment_id: String,
    pub application_id: Option<String>,
    pub page: PageQuery,
}

impl InstanceListView {
    pub fn new(environment_id: &str, page_size: usize) -> Self {
        Self {
            environment_id: environment_id.to_string(),
            application_id: None,
            page: PageQuery::first(page_size),
        }
    }

    /// Filter by an application; picking the active one again clears the
    /// filter. Either way the list restarts at its first page.
    pub fn toggle_application(&mut self, application_id: &str) {
        if self.application_id.as_deref() == Some(application_id) {
            self.application_id = None;
        } else {
            self.application_id = Some(application_id.to_string());
        }
        self.page.page_index = 0;
    }

    /// Switching environment clears the application filter.
    pub fn switch_environment(&mut self, environment_id: &str) {
        self.environment_id = environment_id.to_string();
        self.application_id = None;
        self.page = PageQuery::first(self.page.page_size);
    }

    pub fn apply_table_change(&mut self, change: &TableChange) -> Result<(), WorkflowError> {
        self.page = PageQuery::from_table_change(change)?;
        Ok(())
    }

    pub fn query(&self) -> InstanceQuery {
        InstanceQuery {
            environment_id: self.environment_id.clone(),
            application_id: self.application_id.clone(),
            page: self.page.clone(),
        }
    }
}
