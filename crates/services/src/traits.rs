use async_trait::async_trait;
use envdeck_core::{
    CapabilitySet, EnvironmentForm, InstanceSnapshot, Member, Page, PageQuery, TargetState,
};

use crate::error::ServiceError;
use crate::record::{
    ConfigValues, CreatedEnvironment, EnvironmentGroup, EnvironmentRecord, Scope, Version,
};

/// Filter for the instance list of one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceQuery {
    pub environment_id: String,
    /// Restrict to instances of one application.
    pub application_id: Option<String>,
    pub page: PageQuery,
}

/// Reads deployed configuration values.
#[async_trait]
pub trait ConfigValueService: Send + Sync {
    async fn fetch_values(
        &self,
        environment_id: &str,
        application_id: &str,
        version_id: &str,
    ) -> Result<ConfigValues, ServiceError>;
}

/// Looks up versions an instance can be upgraded to.
#[async_trait]
pub trait VersionService: Send + Sync {
    /// Versions newer than `version_id` in the same lineage, oldest first.
    ///
    /// An empty list is a successful answer meaning "no upgrade available".
    async fn fetch_newer_versions(&self, version_id: &str) -> Result<Vec<Version>, ServiceError>;
}

/// Queries and mutates deployed instances.
#[async_trait]
pub trait InstanceService: Send + Sync {
    async fn list_instances(
        &self,
        query: &InstanceQuery,
    ) -> Result<Page<InstanceSnapshot>, ServiceError>;

    async fn start_or_stop(
        &self,
        instance_id: &str,
        target: TargetState,
    ) -> Result<(), ServiceError>;

    async fn delete_instance(&self, instance_id: &str) -> Result<(), ServiceError>;
}

/// Environment CRUD, boards, and per-user permissions.
#[async_trait]
pub trait EnvironmentService: Send + Sync {
    /// Page of permission candidates. With `environment_id`, candidates for
    /// that environment; without, for a new environment.
    async fn list_members(
        &self,
        environment_id: Option<&str>,
        query: &PageQuery,
    ) -> Result<Page<Member>, ServiceError>;

    /// Replace the set of users permitted on an environment.
    async fn assign_permission(
        &self,
        environment_id: &str,
        user_ids: &[String],
    ) -> Result<(), ServiceError>;

    async fn create_environment(
        &self,
        form: &EnvironmentForm,
        user_ids: &[String],
    ) -> Result<CreatedEnvironment, ServiceError>;

    async fn update_environment(
        &self,
        environment_id: &str,
        form: &EnvironmentForm,
    ) -> Result<EnvironmentRecord, ServiceError>;

    async fn get_environment(&self, environment_id: &str)
        -> Result<EnvironmentRecord, ServiceError>;

    /// Enable (`true`) or disable (`false`) an environment.
    async fn set_environment_active(
        &self,
        environment_id: &str,
        active: bool,
    ) -> Result<EnvironmentRecord, ServiceError>;

    async fn count_instances(&self, environment_id: &str) -> Result<usize, ServiceError>;

    async fn list_groups(&self) -> Result<Vec<EnvironmentGroup>, ServiceError>;

    async fn delete_group(&self, group_id: &str) -> Result<(), ServiceError>;

    /// `Err(ServiceError::AlreadyExists)` if the code is taken.
    async fn check_code(&self, code: &str) -> Result<(), ServiceError>;

    /// `Err(ServiceError::AlreadyExists)` if the name is taken.
    async fn check_name(&self, name: &str) -> Result<(), ServiceError>;
}

/// Supplies the action kinds the current user may invoke in a scope.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn capabilities(&self, scope: &Scope) -> Result<CapabilitySet, ServiceError>;
}
