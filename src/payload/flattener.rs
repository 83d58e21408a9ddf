use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{PayloadError, Result};
use crate::model::{Entity, LinkParams, RelationValue, Resource};
use crate::payload::store::{Store, StoreKey};
use crate::types::{PayloadConfig, Pointer, RelationshipData, ResourceObject};

/// Walks an entity graph and produces JSON-API resource objects.
///
/// Persisted related entities become pointers and are indexed into the
/// [`Store`]; new ones are embedded inline under `attributes`.
pub struct Flattener<'a> {
    config: &'a PayloadConfig,
    store: &'a mut Store,
    visiting: HashSet<StoreKey>,
}

impl<'a> Flattener<'a> {
    pub fn new(config: &'a PayloadConfig, store: &'a mut Store) -> Self {
        Flattener {
            config,
            store,
            visiting: HashSet::new(),
        }
    }

    /// Flatten one resource.
    ///
    /// With `as_related` the result is also indexed into the store. Anything
    /// other than an entity is rejected with [`PayloadError::UnsupportedInput`].
    pub fn flatten(&mut self, resource: Resource<'_>, as_related: bool) -> Result<ResourceObject> {
        match resource {
            Resource::Entity(entity) => {
                let object = self.flatten_entity(entity);
                if as_related {
                    let key_name = self.config.key_for(&object.resource_type).to_string();
                    self.store.store(object.clone(), &key_name);
                }
                Ok(object)
            }
            Resource::Collection(_) | Resource::Other(_) => Err(PayloadError::UnsupportedInput),
        }
    }

    /// `type` + `id` only, for delete-by-identity bodies.
    pub fn identify(entity: &dyn Entity) -> ResourceObject {
        ResourceObject {
            resource_type: entity.source_name().to_string(),
            id: entity.id(),
            ..Default::default()
        }
    }

    fn flatten_entity(&mut self, entity: &dyn Entity) -> ResourceObject {
        let mut object = Self::identify(entity);
        let exists = entity.exists().unwrap_or(false);
        object.exists = Some(exists);

        let key = entity.primary_key();
        let attributes: Map<String, Value> = self
            .config
            .exporter
            .export(entity)
            .into_iter()
            .filter(|(name, _)| name != key)
            .collect();
        object.attributes = Some(attributes);

        if let (Some(link), true, Some(id)) = (&self.config.link, exists, &object.id) {
            let href = link.link(&camelize(&object.resource_type), &LinkParams::Resource { id: id.clone() });
            object
                .links
                .get_or_insert_with(Map::new)
                .insert("self".to_string(), Value::String(href));
        }

        let entered = StoreKey::of(&object).map(|key| {
            self.visiting.insert(key.clone());
            key
        });
        self.populate_relationships(entity, &mut object);
        if let Some(key) = entered {
            self.visiting.remove(&key);
        }

        object
    }

    fn populate_relationships(&mut self, entity: &dyn Entity, object: &mut ResourceObject) {
        let relations = entity.declared_relations();
        let pivots: Vec<String> = relations
            .iter()
            .filter(|name| entity.relation_value(name).is_some())
            .filter_map(|name| entity.relation_kind(name)?.through)
            .collect();

        for name in relations {
            if pivots.iter().any(|pivot| pivot == name) {
                continue;
            }
            let Some(value) = entity.relation_value(name) else {
                continue;
            };

            if let (Some(link), Some(kind)) = (&self.config.link, entity.relation_kind(name)) {
                let params = LinkParams::Related {
                    relation: kind.counterpart.clone(),
                    rid: entity.id(),
                };
                let href = link.link(&kind.to, &params);
                object
                    .relationships_mut()
                    .entry(name)
                    .links_mut()
                    .insert("related".to_string(), Value::String(href));
            }

            match value {
                RelationValue::One(child) => match self.relate(child) {
                    Some(pointer) => {
                        object.relationships_mut().entry(name).data = Some(RelationshipData::One(pointer));
                    }
                    None => {
                        let inline = Value::Object(self.config.exporter.export(child));
                        object.attributes_mut().insert(name.to_string(), inline);
                    }
                },
                RelationValue::Many(children) => {
                    for child in children {
                        match self.relate(child) {
                            Some(pointer) => object.relationships_mut().entry(name).push(pointer),
                            None => {
                                let inline = Value::Object(self.config.exporter.export(child));
                                let slot = object
                                    .attributes_mut()
                                    .entry(name.to_string())
                                    .or_insert_with(|| Value::Array(Vec::new()));
                                if let Value::Array(items) = slot {
                                    items.push(inline);
                                }
                            }
                        }
                    }
                }
            }
        }

        if !pivots.is_empty() {
            if let Some(attributes) = object.attributes.as_mut() {
                attributes.retain(|name, _| !pivots.contains(name));
            }
            if let Some(relationships) = object.relationships.as_mut() {
                for pivot in &pivots {
                    relationships.remove(pivot);
                }
            }
        }
    }

    /// Pointer to a persisted related entity, indexing it on first sight.
    /// `None` when the entity is new and has to be embedded inline.
    fn relate(&mut self, child: &dyn Entity) -> Option<Pointer> {
        if child.exists() != Some(true) {
            return None;
        }
        let id = child.id()?;
        let pointer = Pointer::new(child.source_name(), id);

        let key = StoreKey::of_pointer(&pointer);
        if self.visiting.contains(&key) || self.store.contains(&key) {
            tracing::trace!(resource_type = %key.resource_type, id = %key.id, "pointer only");
            return Some(pointer);
        }

        let object = self.flatten_entity(child);
        let key_name = self.config.key_for(&object.resource_type).to_string();
        self.store.store(object, &key_name);
        Some(pointer)
    }
}

/// `images_tags` → `imagesTags`, `GalleryImage` → `galleryImage`.
pub(crate) fn camelize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_numeric();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut out = String::with_capacity(name.len());
    for (i, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Record, RelationKind, Related};
    use crate::types::ResourceId;
    use serde_json::json;

    fn gallery() -> Record {
        Record::new("Gallery").with_field("name", "Foo Gallery")
    }

    fn tag(id: i64, name: &str) -> Record {
        Record::new("Tag").with_id(id).with_field("name", name)
    }

    fn image(tags: Vec<Record>) -> Record {
        Record::new("Image")
            .with_id(1)
            .persisted()
            .with_field("title", "Amiga 1200")
            .with_one("gallery", gallery())
            .with_relation(
                "tags",
                RelationKind::new("Tag", "images").through("images_tags"),
                Related::Many(tags),
            )
            .declare("images_tags", RelationKind::new("ImageTag", "image"))
    }

    fn flatten(record: &Record, store: &mut Store) -> ResourceObject {
        let config = PayloadConfig::default();
        let mut flattener = Flattener::new(&config, store);
        flattener.flatten(record.into(), false).unwrap()
    }

    #[test]
    fn test_new_related_entities_are_embedded() {
        let record = image(vec![
            Record::new("Tag").with_field("name", "Computer"),
            Record::new("Tag").with_field("name", "Science"),
        ]);
        let mut store = Store::new();
        let object = flatten(&record, &mut store);

        assert_eq!(object.id, Some(ResourceId::Int(1)));
        assert!(object.relationships.is_none());
        assert_eq!(
            Value::Object(object.attributes.unwrap()),
            json!({
                "title": "Amiga 1200",
                "gallery": {"name": "Foo Gallery"},
                "tags": [{"name": "Computer"}, {"name": "Science"}]
            })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_persisted_related_entities_become_pointers() {
        let record = image(vec![tag(1, "Computer").persisted(), tag(2, "Science").persisted()]);
        let mut store = Store::new();
        let object = flatten(&record, &mut store);

        let tags = object.relationships.as_ref().unwrap().get("tags").unwrap();
        assert_eq!(
            serde_json::to_value(tags).unwrap(),
            json!({"data": [{"type": "Tag", "id": 1}, {"type": "Tag", "id": 2}]})
        );
        assert!(object.attributes.as_ref().unwrap().get("tags").is_none());
        assert_eq!(store.len(), 2);
        assert_eq!(
            serde_json::to_value(&store.included()[0]).unwrap(),
            json!({"type": "Tag", "id": 1, "exists": true, "attributes": {"name": "Computer"}})
        );
    }

    #[test]
    fn test_assigned_id_without_existence_is_inline() {
        let record = image(vec![tag(7, "Draft")]);
        let mut store = Store::new();
        let object = flatten(&record, &mut store);

        assert!(object.relationships.is_none());
        assert_eq!(
            object.attributes.unwrap().get("tags"),
            Some(&json!([{"id": 7, "name": "Draft"}]))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_mixed_sequence_splits_across_members() {
        let record = image(vec![tag(1, "Computer").persisted(), Record::new("Tag").with_field("name", "New")]);
        let mut store = Store::new();
        let object = flatten(&record, &mut store);

        let tags = object.relationships.as_ref().unwrap().get("tags").unwrap();
        assert_eq!(tags.data, Some(RelationshipData::Many(vec![Pointer::new("Tag", 1)])));
        assert_eq!(object.attributes.unwrap().get("tags"), Some(&json!([{"name": "New"}])));
    }

    #[test]
    fn test_pivot_relation_is_suppressed() {
        let pivot = Record::new("ImageTag").with_id(10).persisted().with_field("image_id", 1);
        let record = image(vec![tag(1, "Computer").persisted()]).with_relation(
            "images_tags",
            RelationKind::new("ImageTag", "image"),
            Related::Many(vec![pivot]),
        );
        let mut store = Store::new();
        let object = flatten(&record, &mut store);

        let relationships = object.relationships.unwrap();
        let names: Vec<&str> = relationships.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["tags"]);
        assert!(store.included().iter().all(|r| r.resource_type != "ImageTag"));
    }

    #[test]
    fn test_shared_entity_is_included_once() {
        let shared = tag(1, "Computer").persisted();
        let first = Record::new("Image").with_id(1).persisted().with_many("tags", "Tag", vec![shared.clone()]);
        let second = Record::new("Image").with_id(2).persisted().with_many("tags", "Tag", vec![shared]);

        let config = PayloadConfig::default();
        let mut store = Store::new();
        let mut flattener = Flattener::new(&config, &mut store);
        flattener.flatten((&first).into(), false).unwrap();
        flattener.flatten((&second).into(), false).unwrap();

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_related_entities_keep_their_relationships() {
        let author = Record::new("people").with_id("9").persisted().with_field("name", "Dan");
        let comment = Record::new("comments")
            .with_id("5")
            .persisted()
            .with_field("body", "First!")
            .with_one("author", author);
        let article = Record::new("articles")
            .with_id("1")
            .persisted()
            .with_many("comments", "comments", vec![comment]);

        let mut store = Store::new();
        flatten(&article, &mut store);

        let types: Vec<&str> = store.included().iter().map(|r| r.resource_type.as_str()).collect();
        assert_eq!(types, vec!["people", "comments"]);
        let comment = &store.included()[1];
        assert!(comment.relationships.as_ref().unwrap().get("author").is_some());
    }

    #[test]
    fn test_cycle_yields_pointer() {
        let back = Record::new("A").with_id(1).persisted();
        let b = Record::new("B").with_id(2).persisted().with_one("a", back);
        let a = Record::new("A").with_id(1).persisted().with_one("b", b);

        let mut store = Store::new();
        flatten(&a, &mut store);

        assert_eq!(store.len(), 1);
        let b = &store.included()[0];
        assert_eq!(
            b.relationships.as_ref().unwrap().get("a").unwrap().data,
            Some(RelationshipData::One(Pointer::new("A", 1)))
        );
    }

    #[test]
    fn test_links_are_built_when_configured() {
        let config = PayloadConfig::default().with_link(|name: &str, params: &LinkParams| match params {
            LinkParams::Resource { id } => format!("/{}/{}", name, id),
            LinkParams::Related { relation, rid } => format!(
                "/{}?{}={}",
                name,
                relation,
                rid.as_ref().map(|id| id.to_string()).unwrap_or_default()
            ),
        });
        let record = Record::new("GalleryImage")
            .with_id(3)
            .persisted()
            .with_many("tags", "Tag", vec![tag(1, "Computer").persisted()]);

        let mut store = Store::new();
        let mut flattener = Flattener::new(&config, &mut store);
        let object = flattener.flatten((&record).into(), false).unwrap();

        assert_eq!(object.links.unwrap().get("self"), Some(&json!("/galleryImage/3")));
        let tags = object.relationships.as_ref().unwrap().get("tags").unwrap();
        assert_eq!(
            tags.links.as_ref().unwrap().get("related"),
            Some(&json!("/Tag?GalleryImage=3"))
        );
    }

    #[test]
    fn test_declared_order_is_kept() {
        let record = Record::new("Image")
            .with_id(1)
            .persisted()
            .with_field("title", "Amiga 1200")
            .with_field("caption", "Boxed")
            .with_field("added", "2020-01-01")
            .with_many(
                "tags",
                "Tag",
                vec![
                    tag(3, "Science").persisted(),
                    tag(1, "Computer").persisted(),
                    tag(2, "Retro").persisted(),
                ],
            )
            .with_one("gallery", Record::new("Gallery").with_id(1).persisted());
        let mut store = Store::new();
        let object = flatten(&record, &mut store);

        let attributes: Vec<&str> = object.attributes.as_ref().unwrap().keys().map(String::as_str).collect();
        assert_eq!(attributes, vec!["title", "caption", "added"]);

        let relationships = object.relationships.as_ref().unwrap();
        let names: Vec<&str> = relationships.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["tags", "gallery"]);

        let Some(RelationshipData::Many(pointers)) = &relationships.get("tags").unwrap().data else {
            panic!("tags should hold a pointer sequence");
        };
        let ids: Vec<&ResourceId> = pointers.iter().map(|pointer| &pointer.id).collect();
        assert_eq!(ids, vec![&ResourceId::Int(3), &ResourceId::Int(1), &ResourceId::Int(2)]);
    }

    #[test]
    fn test_non_entity_is_rejected() {
        let config = PayloadConfig::default();
        let mut store = Store::new();
        let mut flattener = Flattener::new(&config, &mut store);
        let value = json!({"hello": "world"});

        let err = flattener.flatten((&value).into(), false).unwrap_err();
        assert!(matches!(err, PayloadError::UnsupportedInput));
    }

    #[test]
    fn test_camelize() {
        assert_eq!(camelize("images_tags"), "imagesTags");
        assert_eq!(camelize("GalleryImage"), "galleryImage");
        assert_eq!(camelize("Tag"), "tag");
    }
}
