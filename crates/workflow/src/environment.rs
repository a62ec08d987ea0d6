//! Environment management workflows: the member-selection panels (create,
//! permission) and the enable/disable/group-delete lifecycle.
//!
//! Only one side panel is open at a time. Opening, cancelling, or
//! successfully submitting a panel advances the session clock, so a member
//! page that arrives for a panel the user already left is rejected as stale.
//! A failed submit keeps the panel and its selection.

use std::sync::Arc;

use envdeck_core::validate::{validate_edit, validate_form};
use envdeck_core::{
    reconcile_with_delta, EnvironmentForm, Member, Page, PageQuery, SelectionAccumulator,
    SelectionChange, SelectionDelta, SelectionPolicy, TableChange,
};
use envdeck_services::{
    CreatedEnvironment, EnvironmentRecord, EnvironmentService, ServiceError,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::WorkflowError;
use crate::panel::PanelKind;
use crate::session::{SessionClock, SessionToken};
use crate::ReloadRequired;

/// An open panel with a member table.
#[derive(Debug, Clone, Serialize)]
pub struct MemberPanel {
    kind: PanelKind,
    policy: SelectionPolicy,
    environment_id: Option<String>,
    token: SessionToken,
    query: PageQuery,
    page: Page<Member>,
    selection: SelectionAccumulator<Member>,
}

impl MemberPanel {
    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn environment_id(&self) -> Option<&str> {
        self.environment_id.as_deref()
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// The page currently rendered.
    pub fn page(&self) -> &Page<Member> {
        &self.page
    }

    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    pub fn selection(&self) -> &SelectionAccumulator<Member> {
        &self.selection
    }

    /// Tag labels of the selected members, in selection order.
    pub fn tags(&self) -> Vec<String> {
        self.selection.entities().map(Member::tag_label).collect()
    }
}

/// A pending disable. The prompt warns when instances still run in the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisableConfirmation {
    environment_id: String,
    has_instances: bool,
}

impl DisableConfirmation {
    pub fn environment_id(&self) -> &str {
        &self.environment_id
    }

    pub fn has_instances(&self) -> bool {
        self.has_instances
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDeleteConfirmation {
    group_id: String,
}

impl GroupDeleteConfirmation {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

/// Runs environment workflows against the platform.
pub struct EnvironmentWorkflows<S> {
    services: Arc<S>,
    sessions: SessionClock,
    page_size: usize,
}

impl<S: EnvironmentService> EnvironmentWorkflows<S> {
    pub fn new(services: Arc<S>, page_size: usize) -> Self {
        Self {
            services,
            sessions: SessionClock::new(),
            page_size,
        }
    }

    pub fn sessions(&self) -> &SessionClock {
        &self.sessions
    }

    /// Open the permission panel of an existing environment.
    pub async fn open_permission(
        &self,
        environment_id: &str,
    ) -> Result<MemberPanel, WorkflowError> {
        self.open(PanelKind::Permission, Some(environment_id)).await
    }

    /// Open the create panel. Its member table keeps only the latest page's
    /// checks.
    pub async fn open_create(&self) -> Result<MemberPanel, WorkflowError> {
        self.open(PanelKind::Create, None).await
    }

    async fn open(
        &self,
        kind: PanelKind,
        environment_id: Option<&str>,
    ) -> Result<MemberPanel, WorkflowError> {
        let policy = kind
            .selection_policy()
            .ok_or(WorkflowError::WrongPanel { kind })?;
        let token = self.sessions.advance();
        let query = PageQuery::first(self.page_size);
        let page = self.fetch_members(environment_id, &query, token).await?;
        debug!(panel = %kind, token = %token, "panel opened");
        Ok(MemberPanel {
            kind,
            policy,
            environment_id: environment_id.map(str::to_string),
            token,
            query,
            page,
            selection: SelectionAccumulator::new(),
        })
    }

    async fn fetch_members(
        &self,
        environment_id: Option<&str>,
        query: &PageQuery,
        token: SessionToken,
    ) -> Result<Page<Member>, WorkflowError> {
        let result = self.services.list_members(environment_id, query).await;
        self.settle(token, result, "list members")
    }

    /// A result that arrived after its panel closed is dropped, failure
    /// included.
    fn settle<T>(
        &self,
        token: SessionToken,
        result: Result<T, ServiceError>,
        operation: &'static str,
    ) -> Result<T, WorkflowError> {
        self.ensure_current(token)?;
        result.map_err(WorkflowError::remote(operation))
    }

    fn ensure_current(&self, token: SessionToken) -> Result<(), WorkflowError> {
        if self.sessions.is_current(token) {
            Ok(())
        } else {
            debug!(token = %token, "panel closed while waiting");
            Err(WorkflowError::Stale { token })
        }
    }

    /// Load another page after the user paged, sorted, or filtered. The
    /// selection is untouched until the next [`Self::select`].
    pub async fn change_page(
        &self,
        panel: &mut MemberPanel,
        change: &TableChange,
    ) -> Result<(), WorkflowError> {
        let query = PageQuery::from_table_change(change)?;
        let page = self
            .fetch_members(panel.environment_id.as_deref(), &query, panel.token)
            .await?;
        panel.query = query;
        panel.page = page;
        Ok(())
    }

    /// Apply the checks the user left on the current page.
    pub fn select(
        &self,
        panel: &mut MemberPanel,
        checked: &[&str],
    ) -> Result<SelectionDelta, WorkflowError> {
        let change = SelectionChange::from_rows(&panel.page.items, checked);
        self.apply_selection(panel, &change)
    }

    /// Apply a change exactly as the list control reported it.
    pub fn apply_selection(
        &self,
        panel: &mut MemberPanel,
        change: &SelectionChange<Member>,
    ) -> Result<SelectionDelta, WorkflowError> {
        self.ensure_current(panel.token)?;
        let (next, delta) = reconcile_with_delta(&panel.selection, change, panel.policy)?;
        if !delta.is_empty() {
            debug!(
                panel = %panel.kind,
                deselected = delta.deselected.len(),
                selected = delta.newly_selected.len(),
                "selection changed"
            );
        }
        panel.selection = next;
        Ok(delta)
    }

    /// Close a panel without submitting. Late pages for it become stale.
    pub fn cancel(&self, panel: MemberPanel) -> SessionToken {
        let token = self.sessions.advance();
        info!(panel = %panel.kind, "panel cancelled");
        token
    }

    /// Replace the environment's permitted users with the selection. The
    /// panel closes only on success; after a failure it can be submitted
    /// again with its selection intact.
    pub async fn submit_permission(&self, panel: &MemberPanel) -> Result<(), WorkflowError> {
        let environment_id = match (panel.kind, panel.environment_id.as_deref()) {
            (PanelKind::Permission, Some(id)) => id,
            _ => return Err(WorkflowError::WrongPanel { kind: panel.kind }),
        };
        self.ensure_current(panel.token)?;
        let user_ids = panel.selection.submission();
        let result = self.services.assign_permission(environment_id, &user_ids).await;
        self.settle(panel.token, result, "assign permission")
            .inspect_err(|e| warn!(environment_id, error = %e, "permission not saved"))?;
        self.sessions.advance();
        info!(environment_id, users = user_ids.len(), "permission assigned");
        Ok(())
    }

    /// Validate the form, check code and name are free, then create the
    /// environment with the selected users. The returned token is shown in
    /// the token panel. Like [`Self::submit_permission`], a failure leaves
    /// the panel open.
    pub async fn submit_create(
        &self,
        panel: &MemberPanel,
        form: &EnvironmentForm,
    ) -> Result<CreatedEnvironment, WorkflowError> {
        if panel.kind != PanelKind::Create {
            return Err(WorkflowError::WrongPanel { kind: panel.kind });
        }
        validate_form(form).map_err(WorkflowError::Validation)?;
        self.ensure_current(panel.token)?;

        let result = self.services.check_code(&form.code).await;
        self.settle(panel.token, result, "check code")?;
        let result = self.services.check_name(&form.name).await;
        self.settle(panel.token, result, "check name")?;

        let user_ids = panel.selection.submission();
        let result = self.services.create_environment(form, &user_ids).await;
        let created = self
            .settle(panel.token, result, "create environment")
            .inspect_err(|e| warn!(code = %form.code, error = %e, "environment not created"))?;
        self.sessions.advance();
        info!(environment_id = %created.id, code = %form.code, "environment created");
        Ok(created)
    }

    /// Save the edit panel. The code is immutable; the name is checked for
    /// uniqueness only when it changed.
    pub async fn update_environment(
        &self,
        environment_id: &str,
        form: &EnvironmentForm,
        current_name: &str,
    ) -> Result<EnvironmentRecord, WorkflowError> {
        validate_edit(form).map_err(WorkflowError::Validation)?;
        if form.name != current_name {
            self.services
                .check_name(&form.name)
                .await
                .map_err(WorkflowError::remote("check name"))?;
        }
        let record = self
            .services
            .update_environment(environment_id, form)
            .await
            .map_err(WorkflowError::remote("update environment"))?;
        info!(environment_id, "environment updated");
        Ok(record)
    }

    pub async fn enable(&self, environment_id: &str) -> Result<ReloadRequired, WorkflowError> {
        self.services
            .set_environment_active(environment_id, true)
            .await
            .map_err(WorkflowError::remote("enable environment"))?;
        info!(environment_id, "environment enabled");
        Ok(ReloadRequired)
    }

    /// First step of disable: count instances so the prompt can warn.
    pub async fn request_disable(
        &self,
        environment_id: &str,
    ) -> Result<DisableConfirmation, WorkflowError> {
        let count = self
            .services
            .count_instances(environment_id)
            .await
            .map_err(WorkflowError::remote("count instances"))?;
        Ok(DisableConfirmation {
            environment_id: environment_id.to_string(),
            has_instances: count > 0,
        })
    }

    pub async fn confirm_disable(
        &self,
        confirmation: DisableConfirmation,
    ) -> Result<ReloadRequired, WorkflowError> {
        self.services
            .set_environment_active(&confirmation.environment_id, false)
            .await
            .map_err(WorkflowError::remote("disable environment"))?;
        info!(environment_id = %confirmation.environment_id, "environment disabled");
        Ok(ReloadRequired)
    }

    pub fn request_group_delete(&self, group_id: &str) -> GroupDeleteConfirmation {
        GroupDeleteConfirmation {
            group_id: group_id.to_string(),
        }
    }

    /// Environments of a deleted group become ungrouped.
    pub async fn confirm_group_delete(
        &self,
        confirmation: GroupDeleteConfirmation,
    ) -> Result<ReloadRequired, WorkflowError> {
        self.services
            .delete_group(&confirmation.group_id)
            .await
            .map_err(WorkflowError::remote("delete group"))?;
        info!(group_id = %confirmation.group_id, "group deleted");
        Ok(ReloadRequired)
    }
}
