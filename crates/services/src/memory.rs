//! In-memory platform implementing every collaborator trait.
//!
//! Backs the CLI demo commands and the workflow tests. Any call can be
//! made to fail with a chosen message, and every call is recorded so tests
//! can assert on what was (and was not) sent to the platform.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use envdeck_core::page::{FilterMap, SortDirection};
use envdeck_core::{
    CapabilitySet, CommandStatus, EnvironmentForm, InstanceSnapshot, InstanceStatus, Member, Page,
    PageQuery, TargetState,
};
use tokio::sync::Mutex;

use crate::error::ServiceError;
use crate::record::{
    ConfigValues, CreatedEnvironment, EnvironmentGroup, EnvironmentRecord, Scope, Version,
};
use crate::traits::{
    AuthorizationService, ConfigValueService, EnvironmentService, InstanceQuery, InstanceService,
    VersionService,
};

/// One kind of platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    FetchValues,
    FetchNewerVersions,
    ListInstances,
    StartOrStop,
    DeleteInstance,
    ListMembers,
    AssignPermission,
    CreateEnvironment,
    UpdateEnvironment,
    GetEnvironment,
    SetEnvironmentActive,
    CountInstances,
    ListGroups,
    DeleteGroup,
    CheckCode,
    CheckName,
    Capabilities,
}

#[derive(Default)]
struct State {
    instances: BTreeMap<String, InstanceSnapshot>,
    values: BTreeMap<(String, String, String), String>,
    versions: BTreeMap<String, Vec<Version>>,
    members: Vec<Member>,
    permissions: BTreeMap<String, Vec<String>>,
    environments: BTreeMap<String, EnvironmentRecord>,
    groups: BTreeMap<String, EnvironmentGroup>,
    capabilities: CapabilitySet,
    failures: HashMap<Call, String>,
    calls: Vec<Call>,
    next_id: u64,
}

impl State {
    fn record(&mut self, call: Call) -> Result<(), ServiceError> {
        self.calls.push(call);
        match self.failures.get(&call) {
            Some(message) => Err(ServiceError::failed(message.clone())),
            None => Ok(()),
        }
    }

    fn environment_mut(&mut self, id: &str) -> Result<&mut EnvironmentRecord, ServiceError> {
        self.environments
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "environment",
                id: id.to_string(),
            })
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("gen-{}", self.next_id)
    }
}

/// A self-contained platform holding instances, environments, members,
/// and permissions in memory.
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    /// An empty platform that grants every capability.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                capabilities: CapabilitySet::full(),
                ..State::default()
            }),
        }
    }

    // ── Seeding ──────────────────────────────────────────────────────────────

    pub fn with_instance(mut self, instance: InstanceSnapshot) -> Self {
        let state = self.state.get_mut();
        state.instances.insert(instance.id.clone(), instance);
        self
    }

    pub fn with_values(
        mut self,
        environment_id: &str,
        application_id: &str,
        version_id: &str,
        yaml: &str,
    ) -> Self {
        let key = (
            environment_id.to_string(),
            application_id.to_string(),
            version_id.to_string(),
        );
        self.state.get_mut().values.insert(key, yaml.to_string());
        self
    }

    pub fn with_newer_versions(mut self, version_id: &str, versions: Vec<Version>) -> Self {
        self.state
            .get_mut()
            .versions
            .insert(version_id.to_string(), versions);
        self
    }

    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.state.get_mut().members.extend(members);
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentRecord) -> Self {
        self.state
            .get_mut()
            .environments
            .insert(environment.id.clone(), environment);
        self
    }

    pub fn with_group(mut self, group: EnvironmentGroup) -> Self {
        self.state.get_mut().groups.insert(group.id.clone(), group);
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.state.get_mut().capabilities = capabilities;
        self
    }

    // ── Failure injection and inspection ─────────────────────────────────────

    /// Make every subsequent `call` fail with `message`.
    pub async fn fail(&self, call: Call, message: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert(call, message.to_string());
    }

    pub async fn recover(&self, call: Call) {
        self.state.lock().await.failures.remove(&call);
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count_calls(&self, call: Call) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub async fn instance(&self, id: &str) -> Option<InstanceSnapshot> {
        self.state.lock().await.instances.get(id).cloned()
    }

    pub async fn environment(&self, id: &str) -> Option<EnvironmentRecord> {
        self.state.lock().await.environments.get(id).cloned()
    }

    pub async fn group(&self, id: &str) -> Option<EnvironmentGroup> {
        self.state.lock().await.groups.get(id).cloned()
    }

    /// User ids permitted on an environment.
    pub async fn permissions(&self, environment_id: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .permissions
            .get(environment_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn matches_filters(filters: &FilterMap, field: impl Fn(&str) -> Option<String>) -> bool {
    filters.iter().all(|(name, accepted)| match field(name) {
        Some(value) => accepted.iter().any(|a| value.contains(a.as_str())),
        None => true,
    })
}

fn paginate<E: Clone>(
    mut items: Vec<E>,
    query: &PageQuery,
    sort_key: impl Fn(&E, &str) -> Option<String>,
) -> Page<E> {
    if let Some(sort) = &query.sort {
        items.sort_by(|a, b| {
            let ordering = sort_key(a, &sort.field).cmp(&sort_key(b, &sort.field));
            match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
    let total_count = items.len();
    let start = query.page_index.saturating_mul(query.page_size);
    let page_items = items
        .into_iter()
        .skip(start)
        .take(query.page_size)
        .collect();
    Page {
        items: page_items,
        page_index: query.page_index,
        page_size: query.page_size,
        total_count,
        sort: query.sort.clone(),
        filters: query.filters.clone(),
        free_text: query.free_text.clone(),
    }
}

fn member_field(member: &Member, field: &str) -> Option<String> {
    match field {
        "loginName" => Some(member.login_name.clone()),
        "realName" => Some(member.real_name.clone()),
        _ => None,
    }
}

fn instance_field(instance: &InstanceSnapshot, field: &str) -> Option<String> {
    match field {
        "code" => Some(instance.code.clone()),
        "status" => Some(instance.status.to_string()),
        "appVersionId" => instance.app_version_id.clone(),
        _ => None,
    }
}

#[async_trait]
impl ConfigValueService for InMemoryPlatform {
    async fn fetch_values(
        &self,
        environment_id: &str,
        application_id: &str,
        version_id: &str,
    ) -> Result<ConfigValues, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::FetchValues)?;
        let key = (
            environment_id.to_string(),
            application_id.to_string(),
            version_id.to_string(),
        );
        let yaml = state
            .values
            .get(&key)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                kind: "values",
                id: format!("{}/{}/{}", environment_id, application_id, version_id),
            })?;
        Ok(ConfigValues {
            environment_id: key.0,
            application_id: key.1,
            version_id: key.2,
            yaml,
        })
    }
}

#[async_trait]
impl VersionService for InMemoryPlatform {
    async fn fetch_newer_versions(&self, version_id: &str) -> Result<Vec<Version>, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::FetchNewerVersions)?;
        Ok(state.versions.get(version_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl InstanceService for InMemoryPlatform {
    async fn list_instances(
        &self,
        query: &InstanceQuery,
    ) -> Result<Page<InstanceSnapshot>, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::ListInstances)?;
        let free_text = query.page.free_text.as_deref().unwrap_or("");
        let items: Vec<InstanceSnapshot> = state
            .instances
            .values()
            .filter(|i| i.env_id.as_deref() == Some(query.environment_id.as_str()))
            .filter(|i| match &query.application_id {
                Some(app) => i.app_id.as_deref() == Some(app.as_str()),
                None => true,
            })
            .filter(|i| matches_filters(&query.page.filters, |f| instance_field(i, f)))
            .filter(|i| free_text.is_empty() || i.code.contains(free_text))
            .cloned()
            .collect();
        Ok(paginate(items, &query.page, instance_field))
    }

    async fn start_or_stop(
        &self,
        instance_id: &str,
        target: TargetState,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::StartOrStop)?;
        let instance =
            state
                .instances
                .get_mut(instance_id)
                .ok_or_else(|| ServiceError::NotFound {
                    kind: "instance",
                    id: instance_id.to_string(),
                })?;
        instance.status = match target {
            TargetState::Start => InstanceStatus::Running,
            TargetState::Stop => InstanceStatus::Stopped,
        };
        instance.command_status = Some(CommandStatus::Success);
        instance.command_type = Some(target.as_str().to_string());
        instance.error = None;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::DeleteInstance)?;
        state
            .instances
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound {
                kind: "instance",
                id: instance_id.to_string(),
            })
    }
}

#[async_trait]
impl EnvironmentService for InMemoryPlatform {
    async fn list_members(
        &self,
        environment_id: Option<&str>,
        query: &PageQuery,
    ) -> Result<Page<Member>, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::ListMembers)?;
        if let Some(id) = environment_id {
            state.environment_mut(id)?;
        }
        let free_text = query.free_text.as_deref().unwrap_or("");
        let items: Vec<Member> = state
            .members
            .iter()
            .filter(|m| matches_filters(&query.filters, |f| member_field(m, f)))
            .filter(|m| {
                free_text.is_empty()
                    || m.login_name.contains(free_text)
                    || m.real_name.contains(free_text)
            })
            .cloned()
            .collect();
        Ok(paginate(items, query, member_field))
    }

    async fn assign_permission(
        &self,
        environment_id: &str,
        user_ids: &[String],
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::AssignPermission)?;
        state.environment_mut(environment_id)?;
        state
            .permissions
            .insert(environment_id.to_string(), user_ids.to_vec());
        Ok(())
    }

    async fn create_environment(
        &self,
        form: &EnvironmentForm,
        user_ids: &[String],
    ) -> Result<CreatedEnvironment, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::CreateEnvironment)?;
        if state.environments.values().any(|e| e.code == form.code) {
            return Err(ServiceError::AlreadyExists {
                field: "code",
                value: form.code.clone(),
            });
        }
        let id = state.fresh_id();
        state.environments.insert(
            id.clone(),
            EnvironmentRecord {
                id: id.clone(),
                code: form.code.clone(),
                name: form.name.clone(),
                description: form.description.clone(),
                group_id: form.group_id.clone(),
                active: true,
                connect: false,
            },
        );
        state.permissions.insert(id.clone(), user_ids.to_vec());
        Ok(CreatedEnvironment {
            token: format!("envdeck-agent install --env {} --token {}", form.code, id),
            id,
        })
    }

    async fn update_environment(
        &self,
        environment_id: &str,
        form: &EnvironmentForm,
    ) -> Result<EnvironmentRecord, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::UpdateEnvironment)?;
        let environment = state.environment_mut(environment_id)?;
        environment.name = form.name.clone();
        environment.description = form.description.clone();
        environment.group_id = form.group_id.clone();
        Ok(environment.clone())
    }

    async fn get_environment(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentRecord, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::GetEnvironment)?;
        state.environment_mut(environment_id).map(|e| e.clone())
    }

    async fn set_environment_active(
        &self,
        environment_id: &str,
        active: bool,
    ) -> Result<EnvironmentRecord, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::SetEnvironmentActive)?;
        let environment = state.environment_mut(environment_id)?;
        environment.active = active;
        Ok(environment.clone())
    }

    async fn count_instances(&self, environment_id: &str) -> Result<usize, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::CountInstances)?;
        Ok(state
            .instances
            .values()
            .filter(|i| i.env_id.as_deref() == Some(environment_id))
            .count())
    }

    async fn list_groups(&self) -> Result<Vec<EnvironmentGroup>, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::ListGroups)?;
        Ok(state.groups.values().cloned().collect())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::DeleteGroup)?;
        if state.groups.remove(group_id).is_none() {
            return Err(ServiceError::NotFound {
                kind: "group",
                id: group_id.to_string(),
            });
        }
        for environment in state.environments.values_mut() {
            if environment.group_id.as_deref() == Some(group_id) {
                environment.group_id = None;
            }
        }
        Ok(())
    }

    async fn check_code(&self, code: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::CheckCode)?;
        if state.environments.values().any(|e| e.code == code) {
            return Err(ServiceError::AlreadyExists {
                field: "code",
                value: code.to_string(),
            });
        }
        Ok(())
    }

    async fn check_name(&self, name: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::CheckName)?;
        if state.environments.values().any(|e| e.name == name) {
            return Err(ServiceError::AlreadyExists {
                field: "name",
                value: name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorizationService for InMemoryPlatform {
    async fn capabilities(&self, _scope: &Scope) -> Result<CapabilitySet, ServiceError> {
        let mut state = self.state.lock().await;
        state.record(Call::Capabilities)?;
        Ok(state.capabilities.clone())
    }
}
