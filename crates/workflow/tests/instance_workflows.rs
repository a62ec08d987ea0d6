//! Instance action workflows against the in-memory platform and a gated
//! platform whose calls block until the test releases them.

use std::sync::Arc;

use async_trait::async_trait;
use envdeck_core::{
    ActionKind, CapabilitySet, CommandStatus, InstanceSnapshot, InstanceStatus, Page, TargetState,
};
use envdeck_services::{
    Call, ConfigValueService, ConfigValues, InMemoryPlatform, InstanceQuery, InstanceService,
    ServiceError, Version, VersionService,
};
use envdeck_workflow::{
    InstanceListView, InstanceWorkflows, ReloadRequired, UpgradeOutcome, WorkflowError,
};
use tokio::sync::Notify;

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

fn stopped() -> InstanceSnapshot {
    InstanceSnapshot::new("i1", InstanceStatus::Stopped)
        .with_command(CommandStatus::Success, "create")
        .deployed_from("e1", "a1", "v1")
}

fn platform_with(snapshot: &InstanceSnapshot) -> InMemoryPlatform {
    InMemoryPlatform::new()
        .with_instance(snapshot.clone())
        .with_values("e1", "a1", "v1", "replicas: 1\n")
}

fn workflows(
    platform: InMemoryPlatform,
) -> (Arc<InMemoryPlatform>, InstanceWorkflows<InMemoryPlatform>) {
    let platform = Arc::new(platform);
    let workflows = InstanceWorkflows::new(Arc::clone(&platform), CapabilitySet::full());
    (platform, workflows)
}

// ──────────────────────────────────────────────
// Upgrade and config edit
// ──────────────────────────────────────────────

#[tokio::test]
async fn upgrade_opens_with_values_and_newer_versions() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot).with_newer_versions(
        "v1",
        vec![Version::new("v2", "1.1.0"), Version::new("v3", "1.2.0")],
    ));

    let stamped = workflows.prepare_upgrade(&snapshot).await.unwrap();
    let outcome = workflows.sessions().accept(stamped).expect("session still open");
    match outcome {
        UpgradeOutcome::Ready(plan) => {
            assert_eq!(plan.instance_id, "i1");
            assert_eq!(plan.values.yaml, "replicas: 1\n");
            assert_eq!(plan.versions.len(), 2);
            assert_eq!(plan.versions[0].version, "1.1.0");
        }
        other => panic!("expected a ready plan, got {:?}", other),
    }
    assert_eq!(
        platform.calls().await,
        vec![Call::FetchValues, Call::FetchNewerVersions]
    );
}

#[tokio::test]
async fn upgrade_without_newer_versions_is_a_notice() {
    let snapshot = stopped();
    let (_platform, workflows) = workflows(platform_with(&snapshot));

    let stamped = workflows.prepare_upgrade(&snapshot).await.unwrap();
    assert_eq!(stamped.value, UpgradeOutcome::NoUpgradeAvailable);
}

#[tokio::test]
async fn upgrade_outcome_serializes_for_the_host() {
    let snapshot = stopped();
    let (_platform, workflows) = workflows(
        platform_with(&snapshot).with_newer_versions("v1", vec![Version::new("v2", "1.1.0")]),
    );

    let stamped = workflows.prepare_upgrade(&snapshot).await.unwrap();
    let json = serde_json::to_value(&stamped).unwrap();
    assert_eq!(json["value"]["outcome"], "ready");
    assert_eq!(json["value"]["versions"][0]["version"], "1.1.0");
    assert_eq!(
        serde_json::to_value(UpgradeOutcome::NoUpgradeAvailable).unwrap()["outcome"],
        "no-upgrade-available"
    );
}

#[tokio::test]
async fn upgrade_stops_when_values_fail() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot));
    platform.fail(Call::FetchValues, "values unavailable").await;

    let err = workflows.prepare_upgrade(&snapshot).await.unwrap_err();
    match &err {
        WorkflowError::Remote { operation, source } => {
            assert_eq!(*operation, "fetch configuration values");
            assert_eq!(source, &ServiceError::failed("values unavailable"));
        }
        other => panic!("expected a remote failure, got {:?}", other),
    }
    assert!(err.to_string().contains("values unavailable"));
    assert_eq!(platform.count_calls(Call::FetchNewerVersions).await, 0);
}

#[tokio::test]
async fn upgrade_reports_version_lookup_failure() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot));
    platform.fail(Call::FetchNewerVersions, "registry down").await;

    let err = workflows.prepare_upgrade(&snapshot).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Remote {
            operation: "fetch newer versions",
            ..
        }
    ));
}

#[tokio::test]
async fn config_edit_failure_opens_nothing() {
    let snapshot = stopped();
    let (platform, workflows) =
        workflows(InMemoryPlatform::new().with_instance(snapshot.clone()));

    let err = workflows.prepare_config_edit(&snapshot).await.unwrap_err();
    assert!(err.is_user_visible());
    assert!(matches!(err, WorkflowError::Remote { .. }));
    assert_eq!(platform.calls().await, vec![Call::FetchValues]);
}

#[tokio::test]
async fn config_edit_needs_a_deployment_reference() {
    let snapshot = InstanceSnapshot::new("bare", InstanceStatus::Running);
    let (platform, workflows) = workflows(InMemoryPlatform::new());

    let err = workflows.prepare_config_edit(&snapshot).await.unwrap_err();
    assert!(matches!(err, WorkflowError::MissingDeployment { .. }));
    assert!(platform.calls().await.is_empty());
}

// ──────────────────────────────────────────────
// Mutations
// ──────────────────────────────────────────────

#[tokio::test]
async fn delete_needs_confirmation() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot));

    let confirmation = workflows.request_delete(&snapshot).unwrap();
    assert_eq!(confirmation.instance_id(), "i1");
    assert_eq!(platform.count_calls(Call::DeleteInstance).await, 0);

    let stamped = workflows.confirm_delete(confirmation).await.unwrap();
    assert_eq!(workflows.sessions().accept(stamped), Some(ReloadRequired));
    assert!(platform.instance("i1").await.is_none());
}

#[tokio::test]
async fn confirmation_from_a_closed_view_is_refused() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot));

    let confirmation = workflows.request_delete(&snapshot).unwrap();
    workflows.close();
    let err = workflows.confirm_delete(confirmation).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Stale { .. }));
    assert!(!err.is_user_visible());
    assert!(platform.instance("i1").await.is_some());
}

#[tokio::test]
async fn toggle_starts_a_stopped_instance() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot));

    let stamped = workflows.toggle_start_stop(&snapshot).await.unwrap();
    assert_eq!(stamped.value, ReloadRequired);
    let after = platform.instance("i1").await.unwrap();
    assert_eq!(after.status, InstanceStatus::Running);
}

#[tokio::test]
async fn toggle_stops_a_running_instance() {
    let snapshot = InstanceSnapshot::new("i1", InstanceStatus::Running)
        .with_command(CommandStatus::Success, "start")
        .deployed_from("e1", "a1", "v1");
    let (platform, workflows) = workflows(platform_with(&snapshot));

    workflows.toggle_start_stop(&snapshot).await.unwrap();
    let after = platform.instance("i1").await.unwrap();
    assert_eq!(after.status, InstanceStatus::Stopped);
    assert_eq!(after.command_type.as_deref(), Some("stop"));
}

#[tokio::test]
async fn toggle_failure_is_surfaced_once() {
    let snapshot = stopped();
    let (platform, workflows) = workflows(platform_with(&snapshot));
    platform.fail(Call::StartOrStop, "agent offline").await;

    let err = workflows.toggle_start_stop(&snapshot).await.unwrap_err();
    assert_eq!(err.to_string(), "start instance failed: agent offline");
    assert_eq!(platform.count_calls(Call::StartOrStop).await, 1);
}

#[tokio::test]
async fn late_mutation_result_is_dropped_after_close() {
    let snapshot = stopped();
    let (_platform, workflows) = workflows(platform_with(&snapshot));

    let stamped = workflows.toggle_start_stop(&snapshot).await.unwrap();
    workflows.close();
    assert_eq!(workflows.sessions().accept(stamped), None);
}

// ──────────────────────────────────────────────
// Menu gating
// ──────────────────────────────────────────────

#[tokio::test]
async fn ungranted_action_never_reaches_the_platform() {
    let snapshot = stopped();
    let platform = Arc::new(platform_with(&snapshot));
    let workflows = InstanceWorkflows::new(
        Arc::clone(&platform),
        CapabilitySet::empty().grant(ActionKind::ViewDetail),
    );

    let err = workflows.toggle_start_stop(&snapshot).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NotOffered {
            kind: ActionKind::ToggleStartStop,
            ..
        }
    ));
    assert!(platform.calls().await.is_empty());
}

#[tokio::test]
async fn command_in_progress_blocks_mutations_but_not_config() {
    let snapshot = InstanceSnapshot::new("i1", InstanceStatus::Running)
        .with_command(CommandStatus::Doing, "upgrade")
        .deployed_from("e1", "a1", "v1");
    let (_platform, workflows) = workflows(platform_with(&snapshot));

    let err = workflows.prepare_upgrade(&snapshot).await.unwrap_err();
    assert!(matches!(err, WorkflowError::CommandInProgress { .. }));
    assert!(workflows.request_delete(&snapshot).is_err());
    assert!(workflows.prepare_config_edit(&snapshot).await.is_ok());
}

#[tokio::test]
async fn operating_instance_offers_only_detail() {
    let snapshot =
        InstanceSnapshot::new("i1", InstanceStatus::Operating).deployed_from("e1", "a1", "v1");
    let (_platform, workflows) = workflows(platform_with(&snapshot));

    assert_eq!(
        workflows.menu(&snapshot).kinds(),
        vec![ActionKind::ViewDetail]
    );
    let err = workflows.toggle_start_stop(&snapshot).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotOffered { .. }));
}

#[tokio::test]
async fn load_returns_a_menu_per_row() {
    let running = InstanceSnapshot::new("i2", InstanceStatus::Running)
        .with_command(CommandStatus::Success, "start")
        .deployed_from("e1", "a1", "v1");
    let (_platform, workflows) = workflows(platform_with(&stopped()).with_instance(running));

    let view = InstanceListView::new("e1", 10);
    let stamped = workflows.load(&view).await.unwrap();
    let (page, menus) = stamped.value;
    assert_eq!(page.total_count, 2);
    assert_eq!(menus.len(), 2);
    for (instance, menu) in page.items.iter().zip(&menus) {
        assert_eq!(instance.id, menu.instance_id);
        let toggle = menu.find(ActionKind::ToggleStartStop).unwrap();
        let expected = match instance.status {
            InstanceStatus::Running => TargetState::Stop,
            _ => TargetState::Start,
        };
        assert_eq!(toggle.target, Some(expected));
    }
}

// ──────────────────────────────────────────────
// Concurrency
// ──────────────────────────────────────────────

/// Platform whose `fetch_values` waits for the test to release it. With a
/// `failure` set, the released call fails and start/stop waits too.
#[derive(Default)]
struct GatedPlatform {
    entered: Notify,
    release: Notify,
    failure: Option<String>,
}

impl GatedPlatform {
    fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    async fn pass(&self) -> Result<(), ServiceError> {
        self.entered.notify_one();
        self.release.notified().await;
        match &self.failure {
            Some(message) => Err(ServiceError::failed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConfigValueService for GatedPlatform {
    async fn fetch_values(
        &self,
        environment_id: &str,
        application_id: &str,
        version_id: &str,
    ) -> Result<ConfigValues, ServiceError> {
        self.pass().await?;
        Ok(ConfigValues {
            environment_id: environment_id.to_string(),
            application_id: application_id.to_string(),
            version_id: version_id.to_string(),
            yaml: String::new(),
        })
    }
}

#[async_trait]
impl VersionService for GatedPlatform {
    async fn fetch_newer_versions(&self, _version_id: &str) -> Result<Vec<Version>, ServiceError> {
        Ok(vec![Version::new("v2", "2.0.0")])
    }
}

#[async_trait]
impl InstanceService for GatedPlatform {
    async fn list_instances(
        &self,
        _query: &InstanceQuery,
    ) -> Result<Page<InstanceSnapshot>, ServiceError> {
        Err(ServiceError::Transport("not served".into()))
    }

    async fn start_or_stop(
        &self,
        _instance_id: &str,
        _target: TargetState,
    ) -> Result<(), ServiceError> {
        match self.failure {
            Some(_) => self.pass().await,
            None => Ok(()),
        }
    }

    async fn delete_instance(&self, _instance_id: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[tokio::test]
async fn second_workflow_for_the_same_instance_is_busy() {
    let gate = Arc::new(GatedPlatform::default());
    let workflows = InstanceWorkflows::new(Arc::clone(&gate), CapabilitySet::full());
    let snapshot = stopped();

    let first = workflows.prepare_upgrade(&snapshot);
    let second = async {
        gate.entered.notified().await;
        let result = workflows.prepare_config_edit(&snapshot).await;
        gate.release.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(first.unwrap().value, UpgradeOutcome::Ready(_)));
    assert!(matches!(second, Err(WorkflowError::Busy { .. })));
}

#[tokio::test]
async fn other_instances_are_not_blocked() {
    let gate = Arc::new(GatedPlatform::default());
    let workflows = InstanceWorkflows::new(Arc::clone(&gate), CapabilitySet::full());
    let first_instance = stopped();
    let other = InstanceSnapshot::new("i9", InstanceStatus::Stopped)
        .with_command(CommandStatus::Success, "create")
        .deployed_from("e1", "a1", "v1");

    let first = workflows.prepare_upgrade(&first_instance);
    let second = async {
        gate.entered.notified().await;
        let result = workflows.toggle_start_stop(&other).await;
        gate.release.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok());
    assert!(second.is_ok());
}

#[tokio::test]
async fn closing_the_view_mid_chain_aborts_the_upgrade() {
    let gate = Arc::new(GatedPlatform::default());
    let workflows = InstanceWorkflows::new(Arc::clone(&gate), CapabilitySet::full());
    let snapshot = stopped();

    let upgrade = workflows.prepare_upgrade(&snapshot);
    let close = async {
        gate.entered.notified().await;
        workflows.close();
        gate.release.notify_one();
    };
    let (upgrade, ()) = tokio::join!(upgrade, close);
    assert!(matches!(upgrade, Err(WorkflowError::Stale { .. })));
}

#[tokio::test]
async fn failure_after_close_is_dropped_as_stale() {
    let gate = Arc::new(GatedPlatform::failing("values unavailable"));
    let workflows = InstanceWorkflows::new(Arc::clone(&gate), CapabilitySet::full());
    let snapshot = stopped();

    let edit = workflows.prepare_config_edit(&snapshot);
    let close = async {
        gate.entered.notified().await;
        workflows.close();
        gate.release.notify_one();
    };
    let (edit, ()) = tokio::join!(edit, close);
    let err = edit.unwrap_err();
    assert!(matches!(err, WorkflowError::Stale { .. }), "got {:?}", err);
    assert!(!err.is_user_visible());
}

#[tokio::test]
async fn failure_while_open_is_still_reported() {
    let gate = Arc::new(GatedPlatform::failing("values unavailable"));
    let workflows = InstanceWorkflows::new(Arc::clone(&gate), CapabilitySet::full());
    let snapshot = stopped();

    let edit = workflows.prepare_config_edit(&snapshot);
    let release = async {
        gate.entered.notified().await;
        gate.release.notify_one();
    };
    let (edit, ()) = tokio::join!(edit, release);
    let err = edit.unwrap_err();
    assert!(matches!(err, WorkflowError::Remote { .. }), "got {:?}", err);
    assert!(err.is_user_visible());
}

#[tokio::test]
async fn toggle_failure_after_close_is_dropped_as_stale() {
    let gate = Arc::new(GatedPlatform::failing("agent offline"));
    let workflows = InstanceWorkflows::new(Arc::clone(&gate), CapabilitySet::full());
    let snapshot = stopped();

    let toggle = workflows.toggle_start_stop(&snapshot);
    let close = async {
        gate.entered.notified().await;
        workflows.close();
        gate.release.notify_one();
    };
    let (toggle, ()) = tokio::join!(toggle, close);
    assert!(matches!(toggle, Err(WorkflowError::Stale { .. })));
}
