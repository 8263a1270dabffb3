//! Fieldkit assist: the content-assist resolution engine
//!
//! This crate turns user input on a smart field into a resolved lookup row,
//! without knowing anything about rendering:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  PROPOSAL RESOLUTION PIPELINE                    │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  user input ──► ProposalResolutionController                     │
//! │                        │ builds                                  │
//! │                        ▼                                         │
//! │                  LookupQuery ──► LookupRowFetcher ──► provider   │
//! │                                        │ (sync or background,   │
//! │                                        │  generation-checked)   │
//! │                                        ▼                         │
//! │                                  FetchResult                     │
//! │                                        │                         │
//! │            auto-accept ◄── controller ──► chooser content        │
//! │                 │                              │ user selects    │
//! │                 ▼                              ▼                 │
//! │            committed value + cached LookupRow (Resolved)         │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrency discipline: field state lives on one logical task. Background
//! lookups produce immutable [`FetchResult`] snapshots that cross the task
//! boundary exactly once; a generation counter lets a newer request supersede
//! an older one, whose late result is then discarded (cooperative
//! cancellation; no job is ever killed mid-flight).

pub mod chooser;
pub mod controller;
pub mod fetcher;
pub mod search;

pub use chooser::{ChooserContent, TableChooserContent, TreeChooserContent, TreeNode};
pub use controller::{
    FieldEvent, FieldEventHandler, ProposalResolutionController, Resolution, ResolutionPolicy,
    ResolutionState,
};
pub use fetcher::{FetchConfig, FetchResult, LookupRowFetcher};
pub use search::{SearchParam, WildcardPolicy};

use fieldkit_lookup::LookupError;
use thiserror::Error;

/// Errors raised by the resolution layer.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The typed text resolves to no row and free text is not permitted.
    /// The input is vetoed; the previously committed value is retained.
    #[error("cannot complete input {text:?}: no matching proposal")]
    NoMatch { text: String },
    /// A lookup could not even be issued (malformed query).
    #[error(transparent)]
    Lookup(#[from] LookupError),
}
