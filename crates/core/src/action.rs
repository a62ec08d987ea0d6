//! Instance action resolution -- computes the menu of actions a user may
//! take on one deployed instance right now.
//!
//! Pure function of an [`InstanceSnapshot`] and a [`CapabilitySet`]. The
//! classification table lives in [`legal_kinds`]; authorization is applied
//! afterwards, dropping anything the user was not granted.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::instance::{CommandPhase, InstanceSnapshot, InstanceState};

/// Every kind of action an instance row can offer, in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    ViewDetail,
    ViewConfig,
    Upgrade,
    ToggleStartStop,
    Delete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::ViewDetail,
        ActionKind::ViewConfig,
        ActionKind::Upgrade,
        ActionKind::ToggleStartStop,
        ActionKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ViewDetail => "view-detail",
            ActionKind::ViewConfig => "view-config",
            ActionKind::Upgrade => "upgrade",
            ActionKind::ToggleStartStop => "toggle-start-stop",
            ActionKind::Delete => "delete",
        }
    }

    /// Remote service permissions that gate this action. Holding any one
    /// of them grants the action.
    pub fn service_codes(&self) -> &'static [&'static str] {
        match self {
            ActionKind::ViewDetail => &[
                "devops-service.devops-pod.getLogs",
                "devops-service.application-instance.listResources",
            ],
            ActionKind::ViewConfig => &["devops-service.application-instance.queryValues"],
            ActionKind::Upgrade => &["devops-service.application-version.getUpgradeAppVersion"],
            ActionKind::ToggleStartStop => &[
                "devops-service.application-instance.start",
                "devops-service.application-instance.stop",
            ],
            ActionKind::Delete => &["devops-service.application-instance.delete"],
        }
    }

    pub fn from_service_code(code: &str) -> Option<Self> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.service_codes().iter().any(|c| *c == code))
    }

    /// Whether the action changes the deployment.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ActionKind::Upgrade | ActionKind::ToggleStartStop | ActionKind::Delete
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownCapability;

    /// Accepts a kind name (`"upgrade"`) or one of its service codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .or_else(|| ActionKind::from_service_code(s))
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// A capability grant that names no known action kind or service code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapability(pub String);

impl fmt::Display for UnknownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability '{}'", self.0)
    }
}

impl std::error::Error for UnknownCapability {}

/// The action kinds the current user may invoke in the current scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<ActionKind>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn full() -> Self {
        Self(ActionKind::ALL.into_iter().collect())
    }

    /// Parse grants given as kind names or service codes.
    pub fn from_grants<I, S>(grants: I) -> Result<Self, UnknownCapability>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        grants
            .into_iter()
            .map(|g| g.as_ref().parse::<ActionKind>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn grant(mut self, kind: ActionKind) -> Self {
        self.0.insert(kind);
        self
    }

    pub fn revoke(mut self, kind: ActionKind) -> Self {
        self.0.remove(&kind);
        self
    }

    pub fn allows(&self, kind: ActionKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ActionKind> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = ActionKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Desired run state for the start/stop toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Start,
    Stop,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Start => "start",
            TargetState::Stop => "stop",
        }
    }
}

/// What must happen before an action's UI opens or its mutation fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precondition {
    /// Runs immediately.
    None,
    /// Fetch current configuration values; abort on failure.
    FetchConfig,
    /// Fetch configuration values, then newer versions; abort on failure or
    /// when no newer version exists.
    FetchConfigThenVersions,
    /// Ask the user to confirm first.
    Confirm,
}

/// One legal action on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Only set for [`ActionKind::ToggleStartStop`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetState>,
    pub precondition: Precondition,
    /// Whether the host must reload the instance list after success.
    pub reload_on_success: bool,
}

impl Action {
    fn of(kind: ActionKind, stopped: bool) -> Self {
        let (target, precondition, reload_on_success) = match kind {
            ActionKind::ViewDetail => (None, Precondition::None, false),
            ActionKind::ViewConfig => (None, Precondition::FetchConfig, true),
            ActionKind::Upgrade => (None, Precondition::FetchConfigThenVersions, true),
            ActionKind::ToggleStartStop => {
                let target = if stopped {
                    TargetState::Start
                } else {
                    TargetState::Stop
                };
                (Some(target), Precondition::None, true)
            }
            ActionKind::Delete => (None, Precondition::Confirm, true),
        };
        Self {
            kind,
            target,
            precondition,
            reload_on_success,
        }
    }

    /// Menu label: the kind name, or `start`/`stop` for the toggle.
    pub fn label(&self) -> &'static str {
        match self.target {
            Some(target) => target.as_str(),
            None => self.kind.as_str(),
        }
    }
}

/// Status decoration for an instance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RowIndicator {
    None,
    InProgress { command_type: Option<String> },
    Error { summary: String },
}

/// Why a legal action is withheld for now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockedReason {
    /// A command cycle is still running; it must resolve first.
    CommandInProgress { command_type: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedAction {
    pub kind: ActionKind,
    pub reason: BlockedReason,
}

/// The complete action menu for one instance at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMenu {
    pub instance_id: String,
    pub state: InstanceState,
    pub indicator: RowIndicator,
    pub actions: Vec<Action>,
    /// Granted and otherwise legal, but unavailable until the running
    /// command resolves.
    pub blocked: Vec<BlockedAction>,
}

impl ActionMenu {
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|a| a.kind).collect()
    }

    pub fn find(&self, kind: ActionKind) -> Option<&Action> {
        self.actions.iter().find(|a| a.kind == kind)
    }

    pub fn offers(&self, kind: ActionKind) -> bool {
        self.find(kind).is_some()
    }
}

/// Action kinds legal in `state`, before authorization.
pub fn legal_kinds(state: &InstanceState) -> &'static [ActionKind] {
    match state {
        InstanceState::Operating | InstanceState::Disconnected => &[ActionKind::ViewDetail],
        InstanceState::Failed => &[
            ActionKind::ViewDetail,
            ActionKind::ViewConfig,
            ActionKind::Delete,
        ],
        InstanceState::Live { .. } => &ActionKind::ALL,
    }
}

fn indicator_for(state: &InstanceState) -> RowIndicator {
    match state {
        InstanceState::Live {
            command: CommandPhase::InProgress { command_type },
            ..
        } => RowIndicator::InProgress {
            command_type: command_type.clone(),
        },
        InstanceState::Live {
            command: CommandPhase::Errored { summary },
            ..
        } => RowIndicator::Error {
            summary: summary.clone(),
        },
        _ => RowIndicator::None,
    }
}

/// Compute the action menu for an instance.
///
/// Actions the user lacks capability for are omitted entirely. This holds
/// for view-detail too: an operating or disconnected instance offers only
/// view-detail, and a user without that grant gets an empty menu. While a
/// command is in progress, mutating actions are moved to `blocked` so that
/// no second command can overlap the first.
pub fn resolve_actions(snapshot: &InstanceSnapshot, capabilities: &CapabilitySet) -> ActionMenu {
    let state = InstanceState::classify(snapshot);
    let stopped = matches!(state, InstanceState::Live { stopped: true, .. });
    let busy = match &state {
        InstanceState::Live {
            command: CommandPhase::InProgress { command_type },
            ..
        } => Some(command_type.clone()),
        _ => None,
    };

    let mut actions = Vec::new();
    let mut blocked = Vec::new();
    for &kind in legal_kinds(&state) {
        if !capabilities.allows(kind) {
            continue;
        }
        match &busy {
            Some(command_type) if kind.is_mutating() => blocked.push(BlockedAction {
                kind,
                reason: BlockedReason::CommandInProgress {
                    command_type: command_type.clone(),
                },
            }),
            _ => actions.push(Action::of(kind, stopped)),
        }
    }

    ActionMenu {
        instance_id: snapshot.id.clone(),
        indicator: indicator_for(&state),
        state,
        actions,
        blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{CommandStatus, InstanceStatus};

    fn live(status: InstanceStatus, command: CommandStatus) -> InstanceSnapshot {
        InstanceSnapshot::new("7", status).with_command(command, "restart")
    }

    #[test]
    fn stopped_settled_instance_offers_full_menu_with_start() {
        let menu = resolve_actions(
            &live(InstanceStatus::Stopped, CommandStatus::Success),
            &CapabilitySet::full(),
        );
        assert_eq!(menu.kinds(), ActionKind::ALL.to_vec());
        let toggle = menu.find(ActionKind::ToggleStartStop).unwrap();
        assert_eq!(toggle.target, Some(TargetState::Start));
        assert_eq!(toggle.label(), "start");
        assert_eq!(menu.indicator, RowIndicator::None);
        assert!(menu.blocked.is_empty());
    }

    #[test]
    fn running_instance_toggles_to_stop() {
        for status in [InstanceStatus::Running, InstanceStatus::Other("pending".into())] {
            let menu = resolve_actions(
                &live(status, CommandStatus::Success),
                &CapabilitySet::full(),
            );
            let toggle = menu.find(ActionKind::ToggleStartStop).unwrap();
            assert_eq!(toggle.label(), "stop");
        }
    }

    #[test]
    fn operating_and_disconnected_only_view_detail() {
        let operating = InstanceSnapshot::new("1", InstanceStatus::Operating);
        let offline = InstanceSnapshot::new("2", InstanceStatus::Running).disconnected();
        for snapshot in [operating, offline] {
            let menu = resolve_actions(&snapshot, &CapabilitySet::full());
            assert_eq!(menu.kinds(), vec![ActionKind::ViewDetail]);
            let menu = resolve_actions(
                &snapshot,
                &CapabilitySet::empty().grant(ActionKind::ViewDetail),
            );
            assert_eq!(menu.kinds(), vec![ActionKind::ViewDetail]);

            let menu = resolve_actions(&snapshot, &CapabilitySet::empty());
            assert!(menu.actions.is_empty());
            assert!(menu.blocked.is_empty());
        }
    }

    #[test]
    fn failed_instance_can_be_inspected_and_deleted() {
        let menu = resolve_actions(
            &InstanceSnapshot::new("3", InstanceStatus::Failed),
            &CapabilitySet::full(),
        );
        assert_eq!(
            menu.kinds(),
            vec![
                ActionKind::ViewDetail,
                ActionKind::ViewConfig,
                ActionKind::Delete
            ]
        );
        assert_eq!(
            menu.find(ActionKind::Delete).unwrap().precondition,
            Precondition::Confirm
        );
    }

    #[test]
    fn ungranted_actions_are_omitted_not_disabled() {
        let caps = CapabilitySet::full()
            .revoke(ActionKind::Upgrade)
            .revoke(ActionKind::Delete);
        let menu = resolve_actions(&live(InstanceStatus::Running, CommandStatus::Success), &caps);
        assert_eq!(
            menu.kinds(),
            vec![
                ActionKind::ViewDetail,
                ActionKind::ViewConfig,
                ActionKind::ToggleStartStop
            ]
        );
        assert!(menu.blocked.is_empty());
    }

    #[test]
    fn command_in_progress_blocks_mutations() {
        let menu = resolve_actions(
            &live(InstanceStatus::Running, CommandStatus::Doing),
            &CapabilitySet::full(),
        );
        assert_eq!(
            menu.kinds(),
            vec![ActionKind::ViewDetail, ActionKind::ViewConfig]
        );
        let blocked: Vec<ActionKind> = menu.blocked.iter().map(|b| b.kind).collect();
        assert_eq!(
            blocked,
            vec![
                ActionKind::Upgrade,
                ActionKind::ToggleStartStop,
                ActionKind::Delete
            ]
        );
        assert_eq!(
            menu.indicator,
            RowIndicator::InProgress {
                command_type: Some("restart".into())
            }
        );
    }

    #[test]
    fn failed_command_keeps_actions_and_flags_row() {
        let snapshot = live(InstanceStatus::Running, CommandStatus::Failed).with_error("oom");
        let menu = resolve_actions(&snapshot, &CapabilitySet::full());
        assert_eq!(menu.kinds(), ActionKind::ALL.to_vec());
        assert_eq!(
            menu.indicator,
            RowIndicator::Error {
                summary: "restart failed: oom".into()
            }
        );
    }

    #[test]
    fn grants_accept_kind_names_and_service_codes() {
        let caps = CapabilitySet::from_grants([
            "upgrade",
            "devops-service.application-instance.stop",
            "devops-service.devops-pod.getLogs",
        ])
        .unwrap();
        assert!(caps.allows(ActionKind::Upgrade));
        assert!(caps.allows(ActionKind::ToggleStartStop));
        assert!(caps.allows(ActionKind::ViewDetail));
        assert!(!caps.allows(ActionKind::Delete));

        assert_eq!(
            CapabilitySet::from_grants(["reboot"]),
            Err(UnknownCapability("reboot".into()))
        );
    }
}
