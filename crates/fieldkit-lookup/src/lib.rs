//! Fieldkit lookup layer: rows, queries and the provider contract
//!
//! This crate is the leaf of the fieldkit workspace. It defines:
//!
//! - [`LookupRow`]: one selectable candidate entry (key + display text +
//!   decoration attributes), an immutable value object
//! - [`LookupQuery`]: a single request descriptor with four mutually
//!   exclusive modes (by key, by text, browse-all, by parent)
//! - [`LookupProvider`]: the async contract a backend implements; the only
//!   interface the resolution layer consumes from the outside world
//! - [`StaticLookupProvider`]: an in-memory provider used by tests and the
//!   CLI, with wildcard text matching and hierarchy support
//!
//! The provider is a black box by design: database, remote service and
//! in-memory table implementations all look the same from the field side.

pub mod provider;
pub mod query;
pub mod row;

pub use provider::{Locality, LookupProvider, StaticLookupProvider};
pub use query::{inherit_master, ActiveFilter, LookupQuery, QueryMode, RowFilter};
pub use row::{LookupKey, LookupRow};

use thiserror::Error;

/// Errors surfaced by lookup providers.
///
/// Provider failures are non-fatal: callers attach them to the fetch result
/// and keep the last good value instead of tearing the field down.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The backend failed to produce rows.
    #[error("lookup provider failed: {message}")]
    Provider { message: String },
    /// The query could not be interpreted (e.g. an unusable wildcard pattern).
    #[error("invalid lookup query: {message}")]
    InvalidQuery { message: String },
}

impl LookupError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }
}
