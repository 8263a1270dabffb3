//! Fieldkit data objects: typed business objects over JSON
//!
//! A thin mapping layer for serializing data-object entities to and from
//! JSON with stable conventions:
//!
//! - a registry maps short logical type names to type descriptors, with
//!   subclass replacement (a project override of a core type keeps the
//!   core's registered name unless explicitly reassigned)
//! - attribute order in output is deterministic: type name first, type
//!   version second, declared attributes (explicit order or alphabetical),
//!   contributions last
//! - unordered collections (sets) normalize by sorting on a comparable
//!   string projection, deep-first, while lists keep their authored order
//!
//! The wire format carries the type discriminator under `_type`, the
//! version under `_typeVersion` and contributions under `_contributions`,
//! keyed by contribution type name.

pub mod entity;
pub mod json;
pub mod registry;

pub use entity::{DoEntity, DoValue};
pub use json::{
    from_json, to_json_string, SerializedDo, CONTRIBUTIONS_ATTRIBUTE, TYPE_ATTRIBUTE,
    TYPE_VERSION_ATTRIBUTE,
};
pub use registry::{TypeDescriptor, TypeRegistry};

use thiserror::Error;

/// Errors of the data-object mapping layer.
#[derive(Debug, Clone, Error)]
pub enum DataObjectError {
    #[error("type name {name:?} is already registered")]
    DuplicateTypeName { name: String },
    #[error("unknown type name {name:?}")]
    UnknownTypeName { name: String },
    #[error("unknown type id {id:?}")]
    UnknownTypeId { id: String },
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}
