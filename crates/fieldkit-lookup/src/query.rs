//! Lookup queries: one request descriptor per fetch, discarded after use.

use crate::row::{LookupKey, LookupRow};
use std::fmt;
use std::sync::Arc;

/// Tri-state filter on a row's `active` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveFilter {
    /// Only active rows.
    Active,
    /// Only inactive rows.
    Inactive,
    /// Both active and inactive rows.
    #[default]
    Both,
}

impl ActiveFilter {
    pub fn accepts(self, active: bool) -> bool {
        match self {
            ActiveFilter::Active => active,
            ActiveFilter::Inactive => !active,
            ActiveFilter::Both => true,
        }
    }
}

/// The four mutually exclusive query modes.
///
/// The enum representation makes the selector invariant structural: exactly
/// one of key / text / browse hint / parent key exists per query, and
/// choosing a new mode drops the old selector by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode<K> {
    /// Resolve a concrete key (programmatic value assignment, formatting).
    ByKey(K),
    /// Free-text search, wildcard-normalized by the caller.
    ByText(String),
    /// Browse everything, with an optional provider-specific hint.
    ByAll(Option<String>),
    /// Children of one node; `None` addresses the hierarchy roots.
    ByParent(Option<K>),
}

/// Post-fetch row filter hook, applied after the mode dispatch.
pub type RowFilter<K> = Arc<dyn Fn(&LookupRow<K>) -> bool + Send + Sync>;

/// A single lookup request.
///
/// Queries are created per request and never reused; the provider sees an
/// immutable descriptor.
#[derive(Clone)]
pub struct LookupQuery<K> {
    mode: QueryMode<K>,
    active: ActiveFilter,
    master_value: Option<serde_json::Value>,
    max_row_count: usize,
    filter: Option<RowFilter<K>>,
}

impl<K: LookupKey> LookupQuery<K> {
    fn with_mode(mode: QueryMode<K>) -> Self {
        Self {
            mode,
            active: ActiveFilter::default(),
            master_value: None,
            max_row_count: 0,
            filter: None,
        }
    }

    pub fn by_key(key: K) -> Self {
        Self::with_mode(QueryMode::ByKey(key))
    }

    pub fn by_text(text: impl Into<String>) -> Self {
        Self::with_mode(QueryMode::ByText(text.into()))
    }

    pub fn by_all(browse_hint: Option<String>) -> Self {
        Self::with_mode(QueryMode::ByAll(browse_hint))
    }

    pub fn by_parent(parent_key: Option<K>) -> Self {
        Self::with_mode(QueryMode::ByParent(parent_key))
    }

    pub fn with_active(mut self, active: ActiveFilter) -> Self {
        self.active = active;
        self
    }

    /// Maximum number of rows the provider should return; 0 means unlimited.
    pub fn with_max_row_count(mut self, max_row_count: usize) -> Self {
        self.max_row_count = max_row_count;
        self
    }

    /// Installs the master value for this request.
    ///
    /// Propagation rule: a field's own master value wins; otherwise the
    /// master inherited from the previous request is preserved rather than
    /// clobbered. [`inherit_master`] encodes that policy.
    pub fn with_master_value(mut self, master_value: Option<serde_json::Value>) -> Self {
        self.master_value = master_value;
        self
    }

    pub fn with_filter(mut self, filter: RowFilter<K>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn mode(&self) -> &QueryMode<K> {
        &self.mode
    }

    pub fn key(&self) -> Option<&K> {
        match &self.mode {
            QueryMode::ByKey(key) => Some(key),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.mode {
            QueryMode::ByText(text) => Some(text),
            _ => None,
        }
    }

    pub fn browse_hint(&self) -> Option<&str> {
        match &self.mode {
            QueryMode::ByAll(hint) => hint.as_deref(),
            _ => None,
        }
    }

    /// The parent selector, when in by-parent mode. `Some(None)` addresses
    /// the hierarchy roots.
    pub fn parent_key(&self) -> Option<Option<&K>> {
        match &self.mode {
            QueryMode::ByParent(parent) => Some(parent.as_ref()),
            _ => None,
        }
    }

    pub fn active(&self) -> ActiveFilter {
        self.active
    }

    pub fn master_value(&self) -> Option<&serde_json::Value> {
        self.master_value.as_ref()
    }

    pub fn max_row_count(&self) -> usize {
        self.max_row_count
    }

    pub(crate) fn filter(&self) -> Option<&RowFilter<K>> {
        self.filter.as_ref()
    }
}

impl<K: fmt::Debug> fmt::Debug for LookupQuery<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupQuery")
            .field("mode", &self.mode)
            .field("active", &self.active)
            .field("master_value", &self.master_value)
            .field("max_row_count", &self.max_row_count)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Master-value propagation: the field's own master wins, an inherited one
/// is preserved, and absence of both stays absent.
pub fn inherit_master(
    field_master: Option<serde_json::Value>,
    previous_master: Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    field_master.or(previous_master)
}
