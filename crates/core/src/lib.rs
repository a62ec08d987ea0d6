//! envdeck-core: data-consistency and state-machine contracts for the
//! environment and instance console.
//!
//! Two independent, pure subsystems:
//!
//! - [`selection`] -- keeps a selection of entities alive while the user
//!   pages, filters, and sorts a server-side paginated list.
//! - [`action`] -- derives the permission-gated menu of legal actions for a
//!   deployed instance from its status fields.
//!
//! Both take a value and return a new one. Nothing here performs IO.

pub mod action;
pub mod entity;
pub mod instance;
pub mod page;
pub mod selection;
pub mod validate;

pub use action::{
    resolve_actions, Action, ActionKind, ActionMenu, BlockedAction, BlockedReason, CapabilitySet,
    Precondition, RowIndicator, TargetState, UnknownCapability,
};
pub use entity::{Entity, Member, Record};
pub use instance::{CommandPhase, CommandStatus, InstanceSnapshot, InstanceState, InstanceStatus};
pub use page::{Page, PageError, PageQuery, Sort, SortDirection, TableChange};
pub use selection::{
    reconcile, reconcile_with_delta, SelectionAccumulator, SelectionChange, SelectionDelta,
    SelectionError, SelectionPolicy,
};
pub use validate::{EnvironmentForm, ValidationError};
