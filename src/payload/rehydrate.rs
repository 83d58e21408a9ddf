//! Rebuilds nested plain objects from a normalized document.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::payload::store::{Store, StoreKey};
use crate::types::{PayloadConfig, Pointer, Relationship, RelationshipData, ResourceObject};

/// Resolves relationship pointers against a [`Store`].
pub struct Rehydrator<'a> {
    store: &'a Store,
    config: &'a PayloadConfig,
}

impl<'a> Rehydrator<'a> {
    pub fn new(store: &'a Store, config: &'a PayloadConfig) -> Self {
        Rehydrator { store, config }
    }

    /// Nested form of one top-level resource: primary key first, then
    /// attributes, then resolved relationships.
    ///
    /// Every `(type, id)` is expanded at most once per call; later pointers to
    /// it are skipped.
    pub fn export_resource(&self, resource: &ResourceObject) -> Map<String, Value> {
        let key_name = self.config.key_for(&resource.resource_type);
        let mut visited = HashSet::new();
        let mut result = Map::new();

        if let Some(id) = &resource.id {
            result.insert(key_name.to_string(), id.to_value());
            visited.insert(StoreKey::new(&resource.resource_type, id));
        }
        if let Some(attributes) = &resource.attributes {
            for (name, value) in attributes {
                if resource.id.is_some() && name == key_name {
                    continue;
                }
                result.insert(name.clone(), value.clone());
            }
        }
        if let Some(relationships) = &resource.relationships {
            for (name, relationship) in relationships.iter() {
                if let Some(value) = self.resolve(relationship, &mut visited) {
                    result.insert(name.to_string(), value);
                }
            }
        }

        result
    }

    /// `None` when the relationship has nothing to contribute: no `data`
    /// member, or a single pointer that cannot be expanded.
    fn resolve(&self, relationship: &Relationship, visited: &mut HashSet<StoreKey>) -> Option<Value> {
        match relationship.data.as_ref()? {
            RelationshipData::Null => Some(Value::Null),
            RelationshipData::One(pointer) => self.expand(pointer, visited).map(Value::Object),
            RelationshipData::Many(pointers) => Some(Value::Array(
                pointers
                    .iter()
                    .filter_map(|pointer| self.expand(pointer, visited))
                    .map(Value::Object)
                    .collect(),
            )),
        }
    }

    fn expand(&self, pointer: &Pointer, visited: &mut HashSet<StoreKey>) -> Option<Map<String, Value>> {
        let key = StoreKey::of_pointer(pointer);
        if !visited.insert(key.clone()) {
            tracing::trace!(resource_type = %key.resource_type, id = %key.id, "already expanded");
            return None;
        }
        let Some(record) = self.store.record(&key) else {
            tracing::trace!(resource_type = %key.resource_type, id = %key.id, "not indexed");
            return None;
        };

        let mut result = record.clone();
        if let Some(relationships) = self.store.relationships(&key) {
            for (name, relationship) in relationships.iter() {
                if let Some(value) = self.resolve(relationship, visited) {
                    result.insert(name.to_string(), value);
                }
            }
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceId;
    use serde_json::json;

    fn resource(value: Value) -> ResourceObject {
        serde_json::from_value(value).unwrap()
    }

    fn store(resources: Vec<Value>) -> Store {
        let mut store = Store::new();
        for value in resources {
            store.store(resource(value), "id");
        }
        store
    }

    #[test]
    fn test_export_resolves_nested_pointers() {
        let store = store(vec![
            json!({"type": "people", "id": "9", "attributes": {"name": "Dan"}}),
            json!({"type": "comments", "id": "5", "attributes": {"body": "First!"},
                   "relationships": {"author": {"data": {"type": "people", "id": "9"}}}}),
        ]);
        let config = PayloadConfig::default();
        let article = resource(json!({
            "type": "articles", "id": "1",
            "attributes": {"title": "Rails is Omakase"},
            "relationships": {"comments": {"data": [{"type": "comments", "id": "5"}]}}
        }));

        let exported = Rehydrator::new(&store, &config).export_resource(&article);
        assert_eq!(
            Value::Object(exported),
            json!({
                "id": "1",
                "title": "Rails is Omakase",
                "comments": [{"id": "5", "body": "First!", "author": {"id": "9", "name": "Dan"}}]
            })
        );
    }

    #[test]
    fn test_export_skips_already_visited_targets() {
        let store = store(vec![
            json!({"type": "A", "id": 1, "relationships": {"b": {"data": {"type": "B", "id": 2}}}}),
            json!({"type": "B", "id": 2, "relationships": {"a": {"data": {"type": "A", "id": 1}}}}),
        ]);
        let config = PayloadConfig::default();
        let a = resource(json!({"type": "A", "id": 1, "relationships": {"b": {"data": {"type": "B", "id": 2}}}}));

        let exported = Rehydrator::new(&store, &config).export_resource(&a);
        assert_eq!(Value::Object(exported), json!({"id": 1, "b": {"id": 2}}));
    }

    #[test]
    fn test_export_null_and_missing_targets() {
        let store = Store::new();
        let config = PayloadConfig::default().with_type_key("posts", "uid");
        let post = resource(json!({
            "type": "posts", "id": 3,
            "relationships": {
                "cover": {"data": null},
                "author": {"data": {"type": "people", "id": 1}},
                "tags": {"data": [{"type": "Tag", "id": 1}]},
                "self": {"links": {"related": "/posts/3/self"}}
            }
        }));

        let exported = Rehydrator::new(&store, &config).export_resource(&post);
        assert_eq!(Value::Object(exported), json!({"uid": 3, "cover": null, "tags": []}));
        assert_eq!(post.id, Some(ResourceId::Int(3)));
    }
}
