//! The dynamic data-object model and its collection normalization.

/// One attribute value of a data object.
///
/// `List` and `Set` share a vector representation; the distinction matters
/// for normalization only. Lists keep their authored order, sets are an
/// unordered collection that normalizes into a sorted one.
#[derive(Debug, Clone, PartialEq)]
pub enum DoValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<DoValue>),
    Set(Vec<DoValue>),
    Entity(Box<DoEntity>),
}

impl DoValue {
    /// Normalizes unordered collections, deep-first: children are
    /// normalized before the collection containing them is sorted, so sort
    /// keys reflect fully-normalized children. Idempotent.
    pub fn normalize(&mut self) {
        match self {
            DoValue::List(items) => {
                for item in items.iter_mut() {
                    item.normalize();
                }
                // authored order preserved
            }
            DoValue::Set(items) => {
                for item in items.iter_mut() {
                    item.normalize();
                }
                items.sort_by(|a, b| a.comparable_string().cmp(&b.comparable_string()));
            }
            DoValue::Entity(entity) => entity.normalize(),
            _ => {}
        }
    }

    /// The comparable projection used as a set sort key: the raw string for
    /// string values, the canonical JSON text for everything else.
    pub fn comparable_string(&self) -> String {
        match self {
            DoValue::String(s) => s.clone(),
            other => crate::json::value_to_json(other, None).to_string(),
        }
    }
}

impl From<&str> for DoValue {
    fn from(value: &str) -> Self {
        DoValue::String(value.to_string())
    }
}

impl From<String> for DoValue {
    fn from(value: String) -> Self {
        DoValue::String(value)
    }
}

impl From<i64> for DoValue {
    fn from(value: i64) -> Self {
        DoValue::Int(value)
    }
}

impl From<bool> for DoValue {
    fn from(value: bool) -> Self {
        DoValue::Bool(value)
    }
}

impl From<DoEntity> for DoValue {
    fn from(value: DoEntity) -> Self {
        DoValue::Entity(Box::new(value))
    }
}

/// A typed data-object entity: attributes in authored order plus optional
/// contributions (extension objects merged into the serialized form under
/// a dedicated container key).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DoEntity {
    type_name: Option<String>,
    type_version: Option<String>,
    attributes: Vec<(String, DoValue)>,
    contributions: Vec<DoEntity>,
}

impl DoEntity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    /// An entity without a type discriminator (nested structural objects).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.type_version = Some(version.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<DoValue>) -> Self {
        self.put(name, value);
        self
    }

    /// Sets an attribute; an existing one is replaced in place, keeping its
    /// authored position.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<DoValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&DoValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<DoValue> {
        let index = self.attributes.iter().position(|(n, _)| n == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn set_type_name(&mut self, name: impl Into<String>) {
        self.type_name = Some(name.into());
    }

    pub fn type_version(&self) -> Option<&str> {
        self.type_version.as_deref()
    }

    /// Attributes in authored order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &DoValue)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = (&str, &mut DoValue)> {
        self.attributes.iter_mut().map(|(n, v)| (n.as_str(), v))
    }

    pub fn add_contribution(&mut self, contribution: DoEntity) {
        self.contributions.push(contribution);
    }

    pub fn with_contribution(mut self, contribution: DoEntity) -> Self {
        self.add_contribution(contribution);
        self
    }

    pub fn contributions(&self) -> &[DoEntity] {
        &self.contributions
    }

    /// Deep-first normalization of all attribute values and contributions.
    /// Contributions sort by type name so their container key order is
    /// stable; attribute order stays as authored (serialization decides the
    /// output order).
    pub fn normalize(&mut self) {
        for (_, value) in self.attributes.iter_mut() {
            value.normalize();
        }
        for contribution in self.contributions.iter_mut() {
            contribution.normalize();
        }
        self.contributions
            .sort_by(|a, b| a.type_name.cmp(&b.type_name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn string_set(items: &[&str]) -> DoValue {
        DoValue::Set(items.iter().map(|s| DoValue::from(*s)).collect())
    }

    #[test]
    fn sets_sort_lists_do_not() {
        let mut entity = DoEntity::new("test.Fixture")
            .with("unordered", string_set(&["charlie", "alfa", "bravo"]))
            .with(
                "ordered",
                DoValue::List(vec!["charlie".into(), "alfa".into(), "bravo".into()]),
            );
        entity.normalize();

        assert_eq!(
            entity.get("unordered"),
            Some(&string_set(&["alfa", "bravo", "charlie"]))
        );
        assert_eq!(
            entity.get("ordered"),
            Some(&DoValue::List(vec![
                "charlie".into(),
                "alfa".into(),
                "bravo".into()
            ]))
        );
    }

    #[test]
    fn nested_collections_normalize_before_their_container_sorts() {
        // Two entities whose sort order flips once their inner sets are
        // sorted: keys must reflect fully-normalized children.
        let first = DoEntity::anonymous().with("values", string_set(&["z", "a"]));
        let second = DoEntity::anonymous().with("values", string_set(&["b", "y"]));
        let mut outer = DoValue::Set(vec![first.clone().into(), second.clone().into()]);
        outer.normalize();

        let DoValue::Set(items) = &outer else {
            panic!("expected a set");
        };
        // normalized: first -> ["a","z"], second -> ["b","y"]; "a" < "b"
        let DoValue::Entity(head) = &items[0] else {
            panic!("expected an entity");
        };
        assert_eq!(head.get("values"), Some(&string_set(&["a", "z"])));
    }

    #[test]
    fn put_replaces_in_place_keeping_authored_position() {
        let mut entity = DoEntity::anonymous()
            .with("first", 1_i64)
            .with("second", 2_i64);
        entity.put("first", 10_i64);
        let names: Vec<_> = entity.attributes().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(entity.get("first"), Some(&DoValue::Int(10)));
    }

    fn arb_value() -> impl Strategy<Value = DoValue> {
        let leaf = prop_oneof![
            Just(DoValue::Null),
            any::<bool>().prop_map(DoValue::Bool),
            any::<i64>().prop_map(DoValue::Int),
            "[a-z]{0,8}".prop_map(DoValue::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(DoValue::List),
                prop::collection::vec(inner, 0..4).prop_map(DoValue::Set),
            ]
        })
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(mut value in arb_value()) {
            value.normalize();
            let once = value.clone();
            value.normalize();
            prop_assert_eq!(once, value);
        }
    }
}
