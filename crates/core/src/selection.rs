//! Cross-page selection reconciliation.
//!
//! A paginated list control only ever knows about the rows on screen. It
//! reports, on every check or uncheck, the ids it rendered and the subset
//! now checked. [`reconcile`] folds that page-local view into a
//! [`SelectionAccumulator`] that survives page turns, filters, and sorts.
//!
//! Under [`SelectionPolicy::Accumulate`] the accumulator is the union of
//! every checked entity across all visited pages, minus those explicitly
//! unchecked while visible. Ids that are not on the current page are never
//! touched, neither their membership nor their stored payload.
//!
//! Under [`SelectionPolicy::PageScoped`] the accumulator is simply replaced
//! by the latest checked subset.
//!
//! Pure functions. No IO. The previous accumulator is never mutated; the
//! caller replaces it with the returned one.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// How selections made on earlier pages are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Union across pages; unchecking removes only visible ids.
    #[default]
    Accumulate,
    /// The accumulator is the latest visible-selected set.
    PageScoped,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::Accumulate => "accumulate",
            SelectionPolicy::PageScoped => "page-scoped",
        }
    }
}

impl std::str::FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accumulate" => Ok(SelectionPolicy::Accumulate),
            "page-scoped" => Ok(SelectionPolicy::PageScoped),
            other => Err(format!("unknown selection policy '{}'", other)),
        }
    }
}

/// One interaction as reported by the list control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionChange<E> {
    /// Every id rendered on the current page, in display order.
    pub visible_ids: Vec<String>,
    /// The rows currently checked on this page, with full payload.
    pub selected: Vec<E>,
}

impl<E: Entity> SelectionChange<E> {
    pub fn new(visible_ids: Vec<String>, selected: Vec<E>) -> Self {
        Self {
            visible_ids,
            selected,
        }
    }

    /// Build a change from the rendered rows and the ids checked among them.
    ///
    /// Ids in `checked` that are not among `rows` are ignored.
    pub fn from_rows(rows: &[E], checked: &[&str]) -> Self {
        let checked: HashSet<&str> = checked.iter().copied().collect();
        Self {
            visible_ids: rows.iter().map(|r| r.id().to_string()).collect(),
            selected: rows
                .iter()
                .filter(|r| checked.contains(r.id()))
                .cloned()
                .collect(),
        }
    }
}

/// Which ids one interaction removed and added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionDelta {
    pub deselected: Vec<String>,
    pub newly_selected: Vec<String>,
}

impl SelectionDelta {
    pub fn is_empty(&self) -> bool {
        self.deselected.is_empty() && self.newly_selected.is_empty()
    }
}

/// Malformed reconciler input. The previous accumulator is left as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// An id (visible or selected) was the empty string.
    EmptyId,
    /// A checked entity is not among the rendered ids.
    NotVisible { id: String },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::EmptyId => write!(f, "entity id must not be empty"),
            SelectionError::NotVisible { id } => {
                write!(f, "selected entity '{}' is not on the current page", id)
            }
        }
    }
}

impl std::error::Error for SelectionError {}

/// Durable selection state for one workflow session.
///
/// `selected_ids` and the keys of `selected_entities` are always the same
/// set. `order` keeps the sequence in which ids were first selected so
/// tags render stably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionAccumulator<E> {
    selected_ids: BTreeSet<String>,
    selected_entities: BTreeMap<String, E>,
    order: Vec<String>,
}

impl<E> Default for SelectionAccumulator<E> {
    fn default() -> Self {
        Self {
            selected_ids: BTreeSet::new(),
            selected_entities: BTreeMap::new(),
            order: Vec::new(),
        }
    }
}

impl<E: Entity> SelectionAccumulator<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_ids(&self) -> &BTreeSet<String> {
        &self.selected_ids
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.selected_entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_ids.is_empty()
    }

    /// Selected entities in the order they were first selected.
    pub fn entities(&self) -> impl Iterator<Item = &E> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.selected_entities.get(id))
    }

    /// The ids to submit, in selection order. Read once, on submit.
    pub fn submission(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Check the set/map/order invariant.
    pub fn is_consistent(&self) -> bool {
        self.selected_ids.len() == self.selected_entities.len()
            && self.order.len() == self.selected_ids.len()
            && self
                .selected_ids
                .iter()
                .all(|id| self.selected_entities.contains_key(id))
            && self.order.iter().all(|id| self.selected_ids.contains(id))
    }

    fn insert(&mut self, entity: E) {
        let id = entity.id().to_string();
        if self.selected_ids.insert(id.clone()) {
            self.order.push(id.clone());
            self.selected_entities.insert(id, entity);
        }
    }

    fn remove_all(&mut self, ids: &BTreeSet<String>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.selected_ids.remove(id);
            self.selected_entities.remove(id);
        }
        self.order.retain(|id| !ids.contains(id));
    }
}

/// A change with duplicates dropped (first occurrence wins) and validated.
struct Normalized<E> {
    visible_ids: Vec<String>,
    selected: Vec<E>,
    selected_ids: BTreeSet<String>,
}

fn normalize<E: Entity>(change: &SelectionChange<E>) -> Result<Normalized<E>, SelectionError> {
    let mut seen = HashSet::new();
    let mut visible_ids = Vec::with_capacity(change.visible_ids.len());
    for id in &change.visible_ids {
        if id.is_empty() {
            return Err(SelectionError::EmptyId);
        }
        if seen.insert(id.as_str()) {
            visible_ids.push(id.clone());
        }
    }

    let mut selected_ids = BTreeSet::new();
    let mut selected = Vec::with_capacity(change.selected.len());
    for entity in &change.selected {
        let id = entity.id();
        if id.is_empty() {
            return Err(SelectionError::EmptyId);
        }
        if !seen.contains(id) {
            return Err(SelectionError::NotVisible { id: id.to_string() });
        }
        if selected_ids.insert(id.to_string()) {
            selected.push(entity.clone());
        }
    }

    Ok(Normalized {
        visible_ids,
        selected,
        selected_ids,
    })
}

/// Compute what `change` would remove from and add to `previous`.
pub fn selection_delta<E: Entity>(
    previous: &SelectionAccumulator<E>,
    change: &SelectionChange<E>,
    policy: SelectionPolicy,
) -> Result<SelectionDelta, SelectionError> {
    let normalized = normalize(change)?;
    Ok(delta_of(previous, &normalized, policy))
}

fn delta_of<E: Entity>(
    previous: &SelectionAccumulator<E>,
    change: &Normalized<E>,
    policy: SelectionPolicy,
) -> SelectionDelta {
    let deselected = match policy {
        SelectionPolicy::Accumulate => change
            .visible_ids
            .iter()
            .filter(|id| previous.contains(id) && !change.selected_ids.contains(*id))
            .cloned()
            .collect(),
        SelectionPolicy::PageScoped => previous
            .order
            .iter()
            .filter(|id| !change.selected_ids.contains(*id))
            .cloned()
            .collect(),
    };
    let newly_selected = change
        .selected
        .iter()
        .map(|e| e.id())
        .filter(|id| !previous.contains(id))
        .map(str::to_string)
        .collect();
    SelectionDelta {
        deselected,
        newly_selected,
    }
}

/// Fold one page interaction into the accumulator.
///
/// Returns the next accumulator together with the delta it applied.
/// Calling again with the same change yields the same accumulator and an
/// empty delta.
pub fn reconcile_with_delta<E: Entity>(
    previous: &SelectionAccumulator<E>,
    change: &SelectionChange<E>,
    policy: SelectionPolicy,
) -> Result<(SelectionAccumulator<E>, SelectionDelta), SelectionError> {
    let normalized = normalize(change)?;
    let delta = delta_of(previous, &normalized, policy);

    let next = match policy {
        SelectionPolicy::Accumulate => {
            let mut next = previous.clone();
            let removed: BTreeSet<String> = delta.deselected.iter().cloned().collect();
            next.remove_all(&removed);
            for entity in normalized.selected {
                if !previous.contains(entity.id()) {
                    next.insert(entity);
                }
            }
            next
        }
        SelectionPolicy::PageScoped => {
            let mut next = SelectionAccumulator::new();
            for entity in normalized.selected {
                next.insert(entity);
            }
            next
        }
    };

    debug_assert!(next.is_consistent());
    Ok((next, delta))
}

/// Fold one page interaction into the accumulator.
pub fn reconcile<E: Entity>(
    previous: &SelectionAccumulator<E>,
    change: &SelectionChange<E>,
    policy: SelectionPolicy,
) -> Result<SelectionAccumulator<E>, SelectionError> {
    reconcile_with_delta(previous, change, policy).map(|(next, _)| next)
}
