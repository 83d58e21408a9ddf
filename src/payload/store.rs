//! Store Index: resources indexed by `(type, id)`
//!
//! Every related resource pushed while flattening, and every member of a
//! parsed `included` array, lands here exactly once. Attributes (merged with
//! the primary key) and relationships are cached separately so pointers can
//! be resolved back into nested objects.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::types::{Pointer, Relationships, ResourceId, ResourceObject};

/// Identity of an indexed resource. Ids compare by their string form, so `1`
/// and `"1"` name the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub resource_type: String,
    pub id: String,
}

impl StoreKey {
    pub fn new(resource_type: &str, id: &ResourceId) -> Self {
        StoreKey {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    pub fn of(resource: &ResourceObject) -> Option<Self> {
        resource
            .id
            .as_ref()
            .map(|id| StoreKey::new(&resource.resource_type, id))
    }

    pub fn of_pointer(pointer: &Pointer) -> Self {
        StoreKey::new(&pointer.resource_type, &pointer.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    records: HashMap<StoreKey, Map<String, Value>>,
    relationships: HashMap<StoreKey, Relationships>,
    included: Vec<ResourceObject>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `resource` and appends it to `included`.
    ///
    /// Returns `false` without touching the index when the resource has no
    /// id or its key is already indexed.
    pub fn store(&mut self, resource: ResourceObject, key_name: &str) -> bool {
        let (Some(key), Some(id)) = (StoreKey::of(&resource), resource.id.as_ref()) else {
            return false;
        };
        if self.records.contains_key(&key) {
            tracing::trace!(resource_type = %key.resource_type, id = %key.id, "already indexed");
            return false;
        }

        let mut record = Map::new();
        record.insert(key_name.to_string(), id.to_value());
        if let Some(attributes) = &resource.attributes {
            for (name, value) in attributes {
                if name != key_name {
                    record.insert(name.clone(), value.clone());
                }
            }
        }

        tracing::trace!(resource_type = %key.resource_type, id = %key.id, "indexed resource");
        if let Some(relationships) = &resource.relationships {
            self.relationships.insert(key.clone(), relationships.clone());
        }
        self.records.insert(key, record);
        self.included.push(resource);
        true
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.records.contains_key(key)
    }

    /// Stored attributes merged with the primary key.
    pub fn record(&self, key: &StoreKey) -> Option<&Map<String, Value>> {
        self.records.get(key)
    }

    pub fn relationships(&self, key: &StoreKey) -> Option<&Relationships> {
        self.relationships.get(key)
    }

    /// Indexed resources in the order they were stored.
    pub fn included(&self) -> &[ResourceObject] {
        &self.included
    }

    pub fn len(&self) -> usize {
        self.included.len()
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.relationships.clear();
        self.included.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Relationship;
    use serde_json::json;

    fn tag(id: i64, name: &str) -> ResourceObject {
        ResourceObject::new("Tag")
            .with_id(id)
            .with_exists(true)
            .with_attributes(serde_json::from_value(json!({"name": name})).unwrap())
    }

    #[test]
    fn test_store_merges_key_into_record() {
        let mut store = Store::new();
        assert!(store.store(tag(1, "Computer"), "id"));

        let record = store.record(&StoreKey::new("Tag", &ResourceId::Int(1))).unwrap();
        assert_eq!(Value::Object(record.clone()), json!({"id": 1, "name": "Computer"}));
    }

    #[test]
    fn test_store_deduplicates_by_type_and_id() {
        let mut store = Store::new();
        assert!(store.store(tag(1, "Computer"), "id"));
        assert!(!store.store(tag(1, "Computer"), "id"));
        assert!(store.store(tag(2, "Science"), "id"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_store_ids_compare_by_string_form() {
        let mut store = Store::new();
        store.store(tag(1, "Computer"), "id");
        assert!(store.contains(&StoreKey::new("Tag", &ResourceId::from("1"))));
    }

    #[test]
    fn test_store_skips_resources_without_id() {
        let mut store = Store::new();
        assert!(!store.store(ResourceObject::new("Tag"), "id"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_caches_relationships() {
        let mut store = Store::new();
        let mut comment = ResourceObject::new("comments").with_id("5");
        comment
            .relationships_mut()
            .insert("author", Relationship::to_one(Pointer::new("people", "2")));
        store.store(comment, "uid");

        let key = StoreKey::new("comments", &ResourceId::from("5"));
        assert!(store.relationships(&key).unwrap().get("author").is_some());
        assert_eq!(store.record(&key).unwrap().get("uid"), Some(&json!("5")));
    }
}
