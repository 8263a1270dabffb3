//! JSON wire mapping: deterministic serialization and registry-aware
//! deserialization.
//!
//! Output key order is fixed: `_type` first, `_typeVersion` second, declared
//! attributes (explicit order from the registry, else alphabetical), and
//! `_contributions` last, keyed by contribution type name in name order.

use crate::entity::{DoEntity, DoValue};
use crate::registry::TypeRegistry;
use crate::DataObjectError;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Wire attribute carrying the type discriminator.
pub const TYPE_ATTRIBUTE: &str = "_type";
/// Wire attribute carrying the type version.
pub const TYPE_VERSION_ATTRIBUTE: &str = "_typeVersion";
/// Wire attribute containing the contributions container.
pub const CONTRIBUTIONS_ATTRIBUTE: &str = "_contributions";

/// A data object bound to an optional registry for serialization.
///
/// Emits map entries in the deterministic wire order; serialize through
/// `serde_json::to_string` (an intermediate `serde_json::Value` would
/// re-sort the keys).
pub struct SerializedDo<'a> {
    pub entity: &'a DoEntity,
    pub registry: Option<&'a TypeRegistry>,
}

impl Serialize for SerializedDo<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entity = self.entity;
        let mut map = serializer.serialize_map(None)?;
        if let Some(name) = entity.type_name() {
            map.serialize_entry(TYPE_ATTRIBUTE, name)?;
        }
        if let Some(version) = self.type_version() {
            map.serialize_entry(TYPE_VERSION_ATTRIBUTE, &version)?;
        }
        for (name, value) in self.ordered_attributes() {
            map.serialize_entry(
                name,
                &SerializedValue {
                    value,
                    registry: self.registry,
                },
            )?;
        }
        if !entity.contributions().is_empty() {
            map.serialize_entry(
                CONTRIBUTIONS_ATTRIBUTE,
                &SerializedContributions {
                    entity,
                    registry: self.registry,
                },
            )?;
        }
        map.end()
    }
}

impl SerializedDo<'_> {
    /// The entity's own version wins; the registry's registered version is
    /// the fallback.
    fn type_version(&self) -> Option<String> {
        if let Some(version) = self.entity.type_version() {
            return Some(version.to_string());
        }
        let registry = self.registry?;
        registry
            .from_type_name(self.entity.type_name()?)?
            .type_version
    }

    /// Declared order first (attributes listed by the registry, in that
    /// order), everything else alphabetically after it.
    fn ordered_attributes(&self) -> Vec<(&str, &DoValue)> {
        let declared = self
            .registry
            .zip(self.entity.type_name())
            .and_then(|(registry, name)| registry.declared_order(name));
        let mut attributes: Vec<(&str, &DoValue)> = self.entity.attributes().collect();
        match declared {
            Some(order) => attributes.sort_by_key(|(name, _)| {
                let position = order
                    .iter()
                    .position(|declared_name| declared_name == *name)
                    .unwrap_or(usize::MAX);
                (position, name.to_string())
            }),
            None => attributes.sort_by_key(|(name, _)| name.to_string()),
        }
        attributes
    }
}

struct SerializedValue<'a> {
    value: &'a DoValue,
    registry: Option<&'a TypeRegistry>,
}

impl Serialize for SerializedValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            DoValue::Null => serializer.serialize_unit(),
            DoValue::Bool(value) => serializer.serialize_bool(*value),
            DoValue::Int(value) => serializer.serialize_i64(*value),
            DoValue::Float(value) => serializer.serialize_f64(*value),
            DoValue::String(value) => serializer.serialize_str(value),
            DoValue::List(items) | DoValue::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&SerializedValue {
                        value: item,
                        registry: self.registry,
                    })?;
                }
                seq.end()
            }
            DoValue::Entity(entity) => SerializedDo {
                entity,
                registry: self.registry,
            }
            .serialize(serializer),
        }
    }
}

struct SerializedContributions<'a> {
    entity: &'a DoEntity,
    registry: Option<&'a TypeRegistry>,
}

impl Serialize for SerializedContributions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut named: Vec<&DoEntity> = self
            .entity
            .contributions()
            .iter()
            .filter(|contribution| {
                let named = contribution.type_name().is_some();
                if !named {
                    tracing::warn!("skipping contribution without a type name");
                }
                named
            })
            .collect();
        named.sort_by_key(|contribution| contribution.type_name().unwrap_or_default().to_string());
        let mut map = serializer.serialize_map(Some(named.len()))?;
        for contribution in named {
            map.serialize_entry(
                contribution.type_name().unwrap_or_default(),
                &SerializedDo {
                    entity: contribution,
                    registry: self.registry,
                },
            )?;
        }
        map.end()
    }
}

/// Serializes an entity to its deterministic JSON text.
pub fn to_json_string(
    entity: &DoEntity,
    registry: Option<&TypeRegistry>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SerializedDo { entity, registry })
}

/// Converts a value into a `serde_json::Value`.
///
/// Key order is not preserved in a `Value`; this form is the canonical
/// (alphabetical) projection used for set sort keys and ad-hoc inspection,
/// not the wire output.
pub fn value_to_json(value: &DoValue, registry: Option<&TypeRegistry>) -> serde_json::Value {
    match value {
        DoValue::Null => serde_json::Value::Null,
        DoValue::Bool(value) => serde_json::Value::Bool(*value),
        DoValue::Int(value) => serde_json::Value::from(*value),
        DoValue::Float(value) => serde_json::Value::from(*value),
        DoValue::String(value) => serde_json::Value::String(value.clone()),
        DoValue::List(items) | DoValue::Set(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, registry))
                .collect(),
        ),
        DoValue::Entity(entity) => entity_to_json(entity, registry),
    }
}

fn entity_to_json(entity: &DoEntity, registry: Option<&TypeRegistry>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(name) = entity.type_name() {
        map.insert(
            TYPE_ATTRIBUTE.to_string(),
            serde_json::Value::String(name.to_string()),
        );
    }
    if let Some(version) = entity.type_version() {
        map.insert(
            TYPE_VERSION_ATTRIBUTE.to_string(),
            serde_json::Value::String(version.to_string()),
        );
    }
    for (name, value) in entity.attributes() {
        map.insert(name.to_string(), value_to_json(value, registry));
    }
    if !entity.contributions().is_empty() {
        let mut contributions = serde_json::Map::new();
        for contribution in entity.contributions() {
            if let Some(name) = contribution.type_name() {
                contributions.insert(name.to_string(), entity_to_json(contribution, registry));
            }
        }
        map.insert(
            CONTRIBUTIONS_ATTRIBUTE.to_string(),
            serde_json::Value::Object(contributions),
        );
    }
    serde_json::Value::Object(map)
}

/// Rebuilds an entity from parsed JSON, resolving the type discriminator
/// through the registry (replacement-aware) when one is supplied.
pub fn from_json(
    value: &serde_json::Value,
    registry: Option<&TypeRegistry>,
) -> Result<DoEntity, DataObjectError> {
    let map = value.as_object().ok_or(DataObjectError::NotAnObject {
        found: json_kind(value),
    })?;
    let mut entity = match map.get(TYPE_ATTRIBUTE).and_then(|v| v.as_str()) {
        Some(name) => {
            let resolved = match registry {
                Some(registry) => registry
                    .from_type_name(name)
                    .ok_or_else(|| DataObjectError::UnknownTypeName {
                        name: name.to_string(),
                    })?
                    .type_name,
                None => name.to_string(),
            };
            DoEntity::new(resolved)
        }
        None => DoEntity::anonymous(),
    };
    if let Some(version) = map.get(TYPE_VERSION_ATTRIBUTE).and_then(|v| v.as_str()) {
        entity = entity.with_version(version);
    }
    for (name, attribute) in map {
        if name == TYPE_ATTRIBUTE || name == TYPE_VERSION_ATTRIBUTE || name == CONTRIBUTIONS_ATTRIBUTE
        {
            continue;
        }
        entity.put(name, value_from_json(attribute, registry)?);
    }
    if let Some(container) = map.get(CONTRIBUTIONS_ATTRIBUTE) {
        let container = container.as_object().ok_or(DataObjectError::NotAnObject {
            found: json_kind(container),
        })?;
        for (name, contribution) in container {
            let mut contribution = from_json(contribution, registry)?;
            if contribution.type_name().is_none() {
                // the container key is authoritative for untagged entries
                contribution.set_type_name(name.clone());
            }
            entity.add_contribution(contribution);
        }
    }
    Ok(entity)
}

/// JSON has no set literal: arrays parse as lists. Typed models re-tag
/// set-valued attributes after parsing when they need normalization.
fn value_from_json(
    value: &serde_json::Value,
    registry: Option<&TypeRegistry>,
) -> Result<DoValue, DataObjectError> {
    Ok(match value {
        serde_json::Value::Null => DoValue::Null,
        serde_json::Value::Bool(b) => DoValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => DoValue::Int(i),
            None => DoValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => DoValue::String(s.clone()),
        serde_json::Value::Array(items) => DoValue::List(
            items
                .iter()
                .map(|item| value_from_json(item, registry))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(_) => DoValue::Entity(Box::new(from_json(value, registry)?)),
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
