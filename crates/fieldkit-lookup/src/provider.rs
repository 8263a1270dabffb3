//! The lookup provider contract and the bundled in-memory implementation.

use crate::query::{LookupQuery, QueryMode};
use crate::row::{LookupKey, LookupRow};
use crate::LookupError;
use async_trait::async_trait;
use regex::Regex;

/// Where a provider's data lives.
///
/// Local providers answer from memory and may be consulted synchronously on
/// the interaction task; remote providers are always consulted in the
/// background so formatting never blocks on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    Remote,
}

/// The single contract the resolution layer consumes from a backend.
///
/// Four entry points mirror the four query modes; `execute` dispatches on
/// the mode and applies the query's row filter hook afterwards. A provider
/// is a black box: database, remote service or in-memory table.
#[async_trait]
pub trait LookupProvider<K: LookupKey>: Send + Sync {
    async fn rows_by_key(&self, query: &LookupQuery<K>)
        -> Result<Vec<LookupRow<K>>, LookupError>;

    async fn rows_by_text(
        &self,
        query: &LookupQuery<K>,
    ) -> Result<Vec<LookupRow<K>>, LookupError>;

    async fn rows_by_all(&self, query: &LookupQuery<K>)
        -> Result<Vec<LookupRow<K>>, LookupError>;

    async fn rows_by_parent(
        &self,
        query: &LookupQuery<K>,
    ) -> Result<Vec<LookupRow<K>>, LookupError>;

    fn locality(&self) -> Locality {
        Locality::Local
    }

    /// Dispatches on the query mode, then applies the row filter hook.
    async fn execute(&self, query: &LookupQuery<K>) -> Result<Vec<LookupRow<K>>, LookupError> {
        let mut rows = match query.mode() {
            QueryMode::ByKey(_) => self.rows_by_key(query).await?,
            QueryMode::ByText(_) => self.rows_by_text(query).await?,
            QueryMode::ByAll(_) => self.rows_by_all(query).await?,
            QueryMode::ByParent(_) => self.rows_by_parent(query).await?,
        };
        if let Some(filter) = query.filter() {
            rows.retain(|row| filter(row));
        }
        Ok(rows)
    }
}

/// In-memory lookup provider over a fixed row table.
///
/// Supports case-insensitive wildcard text matching (`*` matches any run of
/// characters), key equality, parent-key filtering for hierarchies, the
/// tri-state active filter and max-row-count truncation. Used by tests and
/// the CLI; also the reference for what the four entry points mean.
pub struct StaticLookupProvider<K> {
    rows: Vec<LookupRow<K>>,
    locality: Locality,
}

impl<K: LookupKey> StaticLookupProvider<K> {
    pub fn new(rows: Vec<LookupRow<K>>) -> Self {
        Self {
            rows,
            locality: Locality::Local,
        }
    }

    /// Marks this provider as remote so callers exercise the background
    /// key-lookup path against it.
    pub fn remote(mut self) -> Self {
        self.locality = Locality::Remote;
        self
    }

    pub fn rows(&self) -> &[LookupRow<K>] {
        &self.rows
    }

    fn collect<F>(&self, query: &LookupQuery<K>, mut matches: F) -> Vec<LookupRow<K>>
    where
        F: FnMut(&LookupRow<K>) -> bool,
    {
        let mut out: Vec<LookupRow<K>> = self
            .rows
            .iter()
            .filter(|row| query.active().accepts(row.active))
            .filter(|row| matches(row))
            .cloned()
            .collect();
        if query.max_row_count() > 0 && out.len() > query.max_row_count() {
            out.truncate(query.max_row_count());
        }
        out
    }
}

/// Compiles a `*`-wildcard pattern into an anchored, case-insensitive regex.
pub fn wildcard_regex(pattern: &str) -> Result<Regex, LookupError> {
    let mut source = String::from("(?i)^");
    let mut first = true;
    for segment in pattern.split('*') {
        if !first {
            source.push_str(".*");
        }
        first = false;
        source.push_str(&regex::escape(segment));
    }
    source.push('$');
    Regex::new(&source).map_err(|e| LookupError::invalid_query(e.to_string()))
}

#[async_trait]
impl<K: LookupKey> LookupProvider<K> for StaticLookupProvider<K> {
    async fn rows_by_key(
        &self,
        query: &LookupQuery<K>,
    ) -> Result<Vec<LookupRow<K>>, LookupError> {
        let key = query
            .key()
            .ok_or_else(|| LookupError::invalid_query("by-key query without key"))?;
        Ok(self.collect(query, |row| row.key.as_ref() == Some(key)))
    }

    async fn rows_by_text(
        &self,
        query: &LookupQuery<K>,
    ) -> Result<Vec<LookupRow<K>>, LookupError> {
        let text = query
            .text()
            .ok_or_else(|| LookupError::invalid_query("by-text query without text"))?;
        let pattern = wildcard_regex(text)?;
        Ok(self.collect(query, |row| pattern.is_match(&row.text)))
    }

    async fn rows_by_all(
        &self,
        query: &LookupQuery<K>,
    ) -> Result<Vec<LookupRow<K>>, LookupError> {
        Ok(self.collect(query, |_| true))
    }

    async fn rows_by_parent(
        &self,
        query: &LookupQuery<K>,
    ) -> Result<Vec<LookupRow<K>>, LookupError> {
        let parent = query
            .parent_key()
            .ok_or_else(|| LookupError::invalid_query("by-parent query without selector"))?;
        Ok(self.collect(query, |row| row.parent_key.as_ref() == parent))
    }

    fn locality(&self) -> Locality {
        self.locality
    }
}
