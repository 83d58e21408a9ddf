use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{PayloadError, Result};
use crate::model::{Entity, Resource};
use crate::payload::flattener::Flattener;
use crate::payload::rehydrate::Rehydrator;
use crate::payload::store::Store;
use crate::types::{Document, ErrorObject, PayloadConfig, PrimaryData, ResourceId, ResourceObject};

/// Input accepted by [`Payload::parse`].
pub enum RawPayload<'a> {
    /// JSON text; empty text is an empty document
    Text(&'a str),
    Value(Value),
    Document(Document),
}

impl<'a> From<&'a str> for RawPayload<'a> {
    fn from(text: &'a str) -> Self {
        RawPayload::Text(text)
    }
}

impl<'a> From<&'a String> for RawPayload<'a> {
    fn from(text: &'a String) -> Self {
        RawPayload::Text(text)
    }
}

impl From<Value> for RawPayload<'_> {
    fn from(value: Value) -> Self {
        RawPayload::Value(value)
    }
}

impl From<Document> for RawPayload<'_> {
    fn from(document: Document) -> Self {
        RawPayload::Document(document)
    }
}

/// Borrowed view of the primary data: one resource when exactly one was set,
/// a sequence otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryRef<'a> {
    One(&'a ResourceObject),
    Many(&'a [ResourceObject]),
}

/// A JSON-API document being built from entities or read from the wire.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    config: PayloadConfig,
    jsonapi: Map<String, Value>,
    meta: Map<String, Value>,
    links: Map<String, Value>,
    data: Vec<ResourceObject>,
    /// id string → position in `data`
    indexed: HashMap<String, usize>,
    errors: Vec<ErrorObject>,
    validation_errors: Vec<Option<Map<String, Value>>>,
    store: Store,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PayloadConfig) -> Self {
        Payload {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &PayloadConfig {
        &self.config
    }

    /// Sets an entity or a collection as the payload.
    ///
    /// A collection's `meta` is copied first, then each member is pushed in
    /// order.
    pub fn set<'r>(&mut self, resource: impl Into<Resource<'r>>) -> &mut Self {
        self.validation_errors.clear();
        match resource.into() {
            Resource::Collection(collection) => {
                self.meta = collection.meta();
                for member in collection.members() {
                    self.push(member);
                }
            }
            resource => {
                self.push(resource);
            }
        }
        tracing::debug!(
            data = self.data.len(),
            included = self.store.len(),
            errors = self.errors.len(),
            "payload set"
        );
        self
    }

    /// Flattens one resource into the primary data.
    ///
    /// Non-entities are recorded as a payload error and leave the data
    /// untouched.
    pub fn push<'r>(&mut self, resource: impl Into<Resource<'r>>) -> &mut Self {
        let resource = resource.into();
        let Resource::Entity(entity) = resource else {
            self.record_unsupported(&PayloadError::UnsupportedInput);
            return self;
        };

        match Flattener::new(&self.config, &mut self.store).flatten(resource, false) {
            Ok(object) => {
                self.data.push(object);
                self.capture_validation_errors(entity);
                if entity.exists() == Some(true) {
                    if let Some(id) = entity.id() {
                        self.indexed.insert(id.to_string(), self.data.len() - 1);
                    }
                }
            }
            Err(err) => self.record_unsupported(&err),
        }
        self
    }

    /// Sets an entity or a collection as a delete-by-identity payload.
    pub fn delete<'r>(&mut self, resource: impl Into<Resource<'r>>) -> &mut Self {
        match resource.into() {
            Resource::Collection(collection) => {
                self.meta = collection.meta();
                for member in collection.members() {
                    self.push_identity(member);
                }
            }
            resource => self.push_identity(resource),
        }
        tracing::debug!(data = self.data.len(), "payload delete");
        self
    }

    fn push_identity(&mut self, resource: Resource<'_>) {
        match resource {
            Resource::Entity(entity) => self.data.push(Flattener::identify(entity)),
            _ => self.record_unsupported(&PayloadError::UnsupportedInput),
        }
    }

    fn record_unsupported(&mut self, err: &PayloadError) {
        tracing::warn!(error = %err, "unsupported input pushed to payload");
        self.errors.push(ErrorObject::unsupported_input());
    }

    fn capture_validation_errors(&mut self, entity: &dyn Entity) {
        let errors = entity.validation_errors();
        self.validation_errors
            .push(if errors.is_empty() { None } else { Some(errors) });
    }

    /// Ids of the indexed primary resources, in data order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<(&String, &usize)> = self.indexed.iter().collect();
        keys.sort_by_key(|(_, position)| **position);
        keys.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn data(&self) -> PrimaryRef<'_> {
        match self.data.as_slice() {
            [one] => PrimaryRef::One(one),
            many => PrimaryRef::Many(many),
        }
    }

    /// Primary resources as a sequence, regardless of count.
    pub fn resources(&self) -> &[ResourceObject] {
        &self.data
    }

    pub fn included(&self) -> &[ResourceObject] {
        self.store.included()
    }

    /// Recorded errors, followed by one aggregated validation error when any
    /// pushed entity carried field errors.
    pub fn errors(&self) -> Vec<ErrorObject> {
        let mut errors = self.errors.clone();
        if self.validation_errors.iter().any(Option::is_some) {
            errors.push(ErrorObject::validation(&self.validation_errors));
        }
        errors
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: Map<String, Value>) -> &mut Self {
        self.meta = meta;
        self
    }

    pub fn links(&self) -> &Map<String, Value> {
        &self.links
    }

    pub fn set_links(&mut self, links: Map<String, Value>) -> &mut Self {
        self.links = links;
        self
    }

    pub fn jsonapi(&self) -> &Map<String, Value> {
        &self.jsonapi
    }

    pub fn set_jsonapi(&mut self, jsonapi: Map<String, Value>) -> &mut Self {
        self.jsonapi = jsonapi;
        self
    }

    pub fn is_collection(&self) -> bool {
        self.data.len() != 1
    }

    /// Nested plain-object form of the primary data, or of the single entry
    /// indexed under `id`.
    pub fn export(&self, id: Option<&ResourceId>) -> Result<Vec<Map<String, Value>>> {
        let rehydrator = Rehydrator::new(&self.store, &self.config);
        let exported: Vec<Map<String, Value>> = match id {
            None => self.data.iter().map(|resource| rehydrator.export_resource(resource)).collect(),
            Some(id) => {
                let id = id.to_string();
                let position = self
                    .indexed
                    .get(&id)
                    .copied()
                    .ok_or(PayloadError::UnknownEntry { id })?;
                vec![rehydrator.export_resource(&self.data[position])]
            }
        };
        tracing::debug!(exported = exported.len(), "payload export");
        Ok(exported)
    }

    /// Wire form of the payload.
    ///
    /// Errors suppress `data` and `included`; empty envelope members and an
    /// empty singular `data` object are left out.
    pub fn serialize(&self) -> Document {
        let non_empty = |map: &Map<String, Value>| (!map.is_empty()).then(|| map.clone());
        let mut document = Document {
            jsonapi: non_empty(&self.jsonapi),
            meta: non_empty(&self.meta),
            links: non_empty(&self.links),
            ..Default::default()
        };

        let errors = self.errors();
        if !errors.is_empty() {
            document.errors = Some(errors);
            return document;
        }

        document.data = match self.data.as_slice() {
            [one] if one.is_empty() => None,
            [one] => Some(PrimaryData::One(Box::new(one.clone()))),
            many => Some(PrimaryData::Many(many.to_vec())),
        };
        if !self.store.is_empty() {
            document.included = Some(self.store.included().to_vec());
        }
        document
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.serialize())?)
    }

    /// Clears data, errors, envelope members and the store index. The
    /// configuration is kept.
    pub fn reset(&mut self) {
        self.jsonapi.clear();
        self.meta.clear();
        self.links.clear();
        self.data.clear();
        self.indexed.clear();
        self.errors.clear();
        self.validation_errors.clear();
        self.store.clear();
    }

    /// Reads a wire document with the default configuration.
    pub fn parse<'r>(raw: impl Into<RawPayload<'r>>) -> Result<Payload> {
        Self::parse_with(raw, PayloadConfig::default())
    }

    /// Reads a wire document; `config` supplies the key names used by
    /// [`Payload::export`].
    pub fn parse_with<'r>(raw: impl Into<RawPayload<'r>>, config: PayloadConfig) -> Result<Payload> {
        let document = match raw.into() {
            RawPayload::Text(text) if text.trim().is_empty() => Document::default(),
            RawPayload::Text(text) => {
                let mut bytes = text.as_bytes().to_vec();
                let value: Value = simd_json::serde::from_slice(&mut bytes)
                    .map_err(|err| PayloadError::Parse(err.to_string()))?;
                Document::from_value(value)?
            }
            RawPayload::Value(value) => Document::from_value(value)?,
            RawPayload::Document(document) => document,
        };
        Ok(Self::from_document(document, config))
    }

    pub fn from_document(document: Document, config: PayloadConfig) -> Payload {
        let mut payload = Payload::with_config(config);
        payload.jsonapi = document.jsonapi.unwrap_or_default();
        payload.meta = document.meta.unwrap_or_default();
        payload.links = document.links.unwrap_or_default();
        payload.errors = document.errors.unwrap_or_default();
        payload.data = document.data.map(PrimaryData::into_vec).unwrap_or_default();

        for (position, resource) in payload.data.iter().enumerate() {
            if let Some(id) = &resource.id {
                payload.indexed.insert(id.to_string(), position);
            }
        }
        for resource in document.included.unwrap_or_default() {
            let key_name = payload.config.key_for(&resource.resource_type).to_string();
            payload.store.store(resource, &key_name);
        }

        tracing::debug!(
            data = payload.data.len(),
            included = payload.store.len(),
            errors = payload.errors.len(),
            "payload parsed"
        );
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Record, RecordSet};
    use serde_json::json;

    fn tag(id: i64, name: &str) -> Record {
        Record::new("Tag").with_id(id).persisted().with_field("name", name)
    }

    #[test]
    fn test_non_entity_records_error() {
        let mut payload = Payload::new();
        let value = json!({"hello": "world"});
        payload.set(&value);

        assert_eq!(
            serde_json::to_value(payload.errors()).unwrap(),
            json!([{
                "status": 500,
                "code": 500,
                "message": "The JSON-API serializer only supports Chaos entities."
            }])
        );
        assert_eq!(payload.data(), PrimaryRef::Many(&[]));
    }

    #[test]
    fn test_foreign_members_do_not_stop_the_set() {
        let mut set = RecordSet::new(vec![tag(1, "Computer")]);
        set.push_foreign(json!("nope"));
        set.push(tag(2, "Science"));

        let mut payload = Payload::new();
        payload.set(&set);

        assert_eq!(payload.resources().len(), 2);
        assert_eq!(payload.errors().len(), 1);
    }

    #[test]
    fn test_validation_errors_are_aggregated() {
        let set = RecordSet::new(vec![
            Record::new("Tag").with_field("name", "Computer"),
            Record::new("Tag").with_error("name", json!(["is required"])),
        ]);
        let mut payload = Payload::new();
        payload.set(&set);

        assert_eq!(
            serde_json::to_value(payload.errors()).unwrap(),
            json!([{
                "status": 422,
                "code": 422,
                "title": "Validation Error",
                "meta": [null, {"name": ["is required"]}]
            }])
        );
        let document = payload.to_json().unwrap();
        assert!(document.get("data").is_none());
    }

    #[test]
    fn test_collection_meta_is_copied() {
        let set = RecordSet::new(vec![tag(1, "Computer")])
            .with_meta(serde_json::from_value(json!({"count": 13})).unwrap());
        let mut payload = Payload::new();
        payload.set(&set);

        assert_eq!(payload.meta().get("count"), Some(&json!(13)));
        assert_eq!(payload.to_json().unwrap()["meta"], json!({"count": 13}));
    }

    #[test]
    fn test_singular_and_collection_shapes() {
        let one = tag(1, "Computer");
        let mut payload = Payload::new();
        payload.set(&one);
        assert!(matches!(payload.data(), PrimaryRef::One(_)));
        assert!(!payload.is_collection());
        assert_eq!(payload.to_json().unwrap()["data"]["id"], json!(1));

        let mut payload = Payload::new();
        payload.set(&RecordSet::new(vec![tag(1, "Computer"), tag(2, "Science")]));
        assert!(matches!(payload.data(), PrimaryRef::Many(items) if items.len() == 2));

        let payload = Payload::new();
        assert_eq!(payload.to_json().unwrap(), json!({"data": []}));
    }

    #[test]
    fn test_delete_payload_carries_identity_only() {
        let set = RecordSet::new(vec![tag(1, "Computer"), tag(2, "Science")]);
        let mut payload = Payload::new();
        payload.delete(&set);

        assert_eq!(
            payload.to_json().unwrap(),
            json!({"data": [{"type": "Tag", "id": 1}, {"type": "Tag", "id": 2}]})
        );
    }

    #[test]
    fn test_keys_and_export_by_id() {
        let mut payload = Payload::new();
        payload.set(&RecordSet::new(vec![tag(4, "Computer"), tag(2, "Science")]));

        assert_eq!(payload.keys(), vec!["4".to_string(), "2".to_string()]);

        let exported = payload.export(Some(&ResourceId::Int(2))).unwrap();
        assert_eq!(Value::Object(exported[0].clone()), json!({"id": 2, "name": "Science"}));

        let err = payload.export(Some(&ResourceId::from("99"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unexisting data entry for id `99` in the JSON-API payload."
        );
    }

    #[test]
    fn test_reset_returns_to_empty_state() {
        let mut payload = Payload::new();
        let image = Record::new("Image")
            .with_id(1)
            .persisted()
            .with_many("tags", "Tag", vec![tag(1, "Computer")]);
        payload.set(&image);
        payload.set_links(serde_json::from_value(json!({"self": "/images/1"})).unwrap());
        assert_eq!(payload.included().len(), 1);

        payload.reset();
        assert!(payload.included().is_empty());
        assert!(payload.keys().is_empty());
        assert!(payload.errors().is_empty());
        assert_eq!(payload.to_json().unwrap(), json!({"data": []}));
    }

    #[test]
    fn test_parse_meta() {
        let payload = Payload::parse(r#"{"data":[],"meta":{"count":13}}"#).unwrap();
        assert_eq!(Value::Object(payload.meta().clone()), json!({"count": 13}));
    }

    #[test]
    fn test_empty_singular_data_is_dropped() {
        let payload = Payload::parse(json!({"data": {}})).unwrap();
        assert_eq!(payload.to_json().unwrap(), json!({}));

        let reparsed = Payload::parse(payload.to_json().unwrap()).unwrap();
        assert_eq!(reparsed.to_json().unwrap(), json!({"data": []}));
    }

    #[test]
    fn test_parse_empty_and_invalid_text() {
        let payload = Payload::parse("").unwrap();
        assert!(payload.resources().is_empty());

        assert!(matches!(Payload::parse("{not json"), Err(PayloadError::Parse(_))));
        assert!(matches!(Payload::parse("[1]"), Err(PayloadError::InvalidDocument(_))));
    }

    #[test]
    fn test_parse_then_export() {
        let payload = Payload::parse(json!({
            "data": [{"type": "Gallery", "id": 1, "attributes": {"name": "value"}}]
        }))
        .unwrap();

        let exported = payload.export(None).unwrap();
        assert_eq!(
            exported.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"id": 1, "name": "value"})]
        );
    }

    #[test]
    fn test_parse_with_type_keys() {
        let config = PayloadConfig::default().with_key("_id").with_type_key("posts", "uid");
        let payload = Payload::parse_with(
            json!({
                "data": {"type": "posts", "id": "p1", "relationships": {
                    "author": {"data": {"type": "people", "id": "9"}}
                }},
                "included": [{"type": "people", "id": "9", "attributes": {"name": "Dan"}}]
            }),
            config,
        )
        .unwrap();

        let exported = payload.export(None).unwrap();
        assert_eq!(
            Value::Object(exported[0].clone()),
            json!({"uid": "p1", "author": {"_id": "9", "name": "Dan"}})
        );
    }
}
