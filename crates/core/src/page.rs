//! Pages of a remote, server-side paginated entity collection and the
//! queries that request them.
//!
//! The list service produces [`Page`]s; nothing here fetches them. A
//! [`PageQuery`] is what the host sends back after a table interaction
//! (page turn, filter, sort, free-text search).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Field name → accepted values.
pub type FilterMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Map a table control's order string. `None` for anything unrecognized.
    pub fn from_table_order(order: &str) -> Option<Self> {
        match order {
            "ascend" | "asc" => Some(SortDirection::Asc),
            "descend" | "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// A bounded, ordered window into a remote entity collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<E> {
    pub items: Vec<E>,
    /// Zero-based.
    pub page_index: usize,
    pub page_size: usize,
    pub total_count: usize,
    #[serde(default)]
    pub sort: Option<Sort>,
    #[serde(default)]
    pub filters: FilterMap,
    #[serde(default)]
    pub free_text: Option<String>,
}

impl<E: Entity> Page<E> {
    /// Ids of the rendered rows, in display order.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|e| e.id().to_string()).collect()
    }

    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page_index + 1 < self.total_pages()
    }
}

/// A table control's sorter as reported on change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorter {
    /// Key of the sorted column; `None` when no column is sorted.
    #[serde(default)]
    pub column_key: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    /// `"ascend"` or `"descend"`.
    #[serde(default)]
    pub order: Option<String>,
}

/// Everything a table control reports when the user pages, filters,
/// sorts, or searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    /// One-based page number.
    pub current: usize,
    pub page_size: usize,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub sorter: Sorter,
    /// Free-text search terms.
    #[serde(default)]
    pub params: Vec<String>,
}

/// Request for one page of a remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page_index: usize,
    pub page_size: usize,
    pub sort: Option<Sort>,
    pub filters: FilterMap,
    pub free_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Page numbers reported by a table control start at 1.
    ZeroPage,
    ZeroPageSize,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::ZeroPage => write!(f, "page numbers start at 1"),
            PageError::ZeroPageSize => write!(f, "page size must be positive"),
        }
    }
}

impl std::error::Error for PageError {}

impl PageQuery {
    /// First page, unsorted, unfiltered.
    pub fn first(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size,
            sort: None,
            filters: FilterMap::new(),
            free_text: None,
        }
    }

    /// Build the query for a table change event.
    ///
    /// A sorted column falls back from its field to its column key, and an
    /// unrecognized order keeps the default descending direction.
    pub fn from_table_change(change: &TableChange) -> Result<Self, PageError> {
        if change.current == 0 {
            return Err(PageError::ZeroPage);
        }
        if change.page_size == 0 {
            return Err(PageError::ZeroPageSize);
        }

        let sort = change.sorter.column_key.as_ref().and_then(|column| {
            let field = change
                .sorter
                .field
                .clone()
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| column.clone());
            if field.is_empty() {
                return None;
            }
            let direction = change
                .sorter
                .order
                .as_deref()
                .and_then(SortDirection::from_table_order)
                .unwrap_or_default();
            Some(Sort { field, direction })
        });

        let filters: FilterMap = change
            .filters
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| (field.clone(), values.iter().cloned().collect()))
            .collect();

        let free_text = if change.params.is_empty() {
            None
        } else {
            Some(change.params.join(","))
        };

        Ok(Self {
            page_index: change.current - 1,
            page_size: change.page_size,
            sort,
            filters,
            free_text,
        })
    }
}
