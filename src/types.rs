use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{PayloadError, Result};
use crate::model::{AttributeExporter, DefaultExporter, LinkBuilder};

/// Identifier of a resource on the wire.
///
/// JSON-API mandates string ids but plenty of backends send integers, so both
/// are kept exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Int(i64),
    Str(String),
}

impl ResourceId {
    /// Reads an id out of an arbitrary JSON value. `null`, empty strings and
    /// compound values carry no identity.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(
                n.as_i64()
                    .map(ResourceId::Int)
                    .unwrap_or_else(|| ResourceId::Str(n.to_string())),
            ),
            Value::String(s) if !s.is_empty() => Some(ResourceId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ResourceId::Int(i) => Value::from(*i),
            ResourceId::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Int(i) => write!(f, "{}", i),
            ResourceId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(id: i64) -> Self {
        ResourceId::Int(id)
    }
}

impl From<i32> for ResourceId {
    fn from(id: i32) -> Self {
        ResourceId::Int(i64::from(id))
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        ResourceId::Str(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        ResourceId::Str(id)
    }
}

/// Minimal `{type, id, exists}` reference used inside relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    #[serde(rename = "type")]
    pub resource_type: String,

    pub id: ResourceId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

impl Pointer {
    pub fn new(resource_type: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Pointer {
            resource_type: resource_type.into(),
            id: id.into(),
            exists: None,
        }
    }

    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }
}

/// Linkage carried by a relationship: `null`, one pointer, or many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    Null,
    One(Pointer),
    Many(Vec<Pointer>),
}

/// One entry of a resource's `relationships` member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// `None` when the member is absent (links-only relationship);
    /// `Some(RelationshipData::Null)` for an explicit `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<RelationshipData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<RelationshipData>, D::Error>
where
    D: Deserializer<'de>,
{
    RelationshipData::deserialize(deserializer).map(Some)
}

impl Relationship {
    pub fn to_one(pointer: Pointer) -> Self {
        Relationship {
            data: Some(RelationshipData::One(pointer)),
            ..Default::default()
        }
    }

    pub fn to_many(pointers: Vec<Pointer>) -> Self {
        Relationship {
            data: Some(RelationshipData::Many(pointers)),
            ..Default::default()
        }
    }

    /// Appends a pointer, turning the linkage into a sequence if needed.
    pub fn push(&mut self, pointer: Pointer) {
        match self.data {
            Some(RelationshipData::Many(ref mut pointers)) => pointers.push(pointer),
            _ => self.data = Some(RelationshipData::Many(vec![pointer])),
        }
    }

    pub fn links_mut(&mut self) -> &mut Map<String, Value> {
        self.links.get_or_insert_with(Map::new)
    }
}

/// Ordered `relationships` member. Keys keep the order in which relations
/// were declared (or read off the wire).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationships(Vec<(String, Relationship)>);

impl Relationships {
    pub fn new() -> Self {
        Relationships(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Relationship> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, rel)| rel)
    }

    /// Returns the named entry, inserting an empty one at the end if missing.
    pub fn entry(&mut self, name: &str) -> &mut Relationship {
        let position = match self.0.iter().position(|(key, _)| key == name) {
            Some(position) => position,
            None => {
                self.0.push((name.to_string(), Relationship::default()));
                self.0.len() - 1
            }
        };
        &mut self.0[position].1
    }

    /// Inserts or replaces an entry; a replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, relationship: Relationship) {
        let name = name.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = relationship,
            None => self.0.push((name, relationship)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Relationship> {
        let position = self.0.iter().position(|(key, _)| key == name)?;
        Some(self.0.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.0.iter().map(|(key, rel)| (key.as_str(), rel))
    }
}

impl Serialize for Relationships {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, relationship) in &self.0 {
            map.serialize_entry(name, relationship)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Relationships {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RelationshipsVisitor;

        impl<'de> Visitor<'de> for RelationshipsVisitor {
            type Value = Relationships;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of relationship objects")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Relationships, A::Error> {
                let mut relationships = Relationships::new();
                while let Some((name, relationship)) = access.next_entry::<String, Relationship>()? {
                    relationships.insert(name, relationship);
                }
                Ok(relationships)
            }
        }

        deserializer.deserialize_map(RelationshipsVisitor)
    }
}

/// One entity's wire representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    /// Source/collection name of the entity.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,

    /// Absent when the entity has no identity yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,

    /// Persisted flag, independent of `id` presence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Relationships>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ResourceObject {
    pub fn new(resource_type: impl Into<String>) -> Self {
        ResourceObject {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        self.attributes.get_or_insert_with(Map::new)
    }

    pub fn relationships_mut(&mut self) -> &mut Relationships {
        self.relationships.get_or_insert_with(Relationships::new)
    }

    /// A pointer to this resource, if it has an identity.
    pub fn pointer(&self) -> Option<Pointer> {
        let id = self.id.clone()?;
        Some(Pointer {
            resource_type: self.resource_type.clone(),
            id,
            exists: self.exists,
        })
    }

    /// True when the object would serialize to `{}`.
    pub fn is_empty(&self) -> bool {
        self.resource_type.is_empty()
            && self.id.is_none()
            && self.exists.is_none()
            && self.attributes.is_none()
            && self.relationships.is_none()
            && self.links.is_none()
            && self.meta.is_none()
    }
}

/// `status`/`code` of an error object: servers send either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Int(i64),
    Text(String),
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        ErrorCode::Int(code)
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        ErrorCode::Text(code.to_string())
    }
}

/// Message recorded when a non-entity value is pushed into a payload.
pub const UNSUPPORTED_INPUT_MESSAGE: &str = "The JSON-API serializer only supports Chaos entities.";

/// An entry of the top-level `errors` member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ErrorCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ErrorObject {
    /// The fixed-shape error recorded for a pushed non-entity value.
    pub fn unsupported_input() -> Self {
        ErrorObject {
            status: Some(ErrorCode::Int(500)),
            code: Some(ErrorCode::Int(500)),
            message: Some(UNSUPPORTED_INPUT_MESSAGE.to_string()),
            ..Default::default()
        }
    }

    /// Aggregated validation failure, one slot per pushed entity in push order.
    pub fn validation(entries: &[Option<Map<String, Value>>]) -> Self {
        let slots = entries
            .iter()
            .map(|entry| entry.clone().map(Value::Object).unwrap_or(Value::Null))
            .collect();
        ErrorObject {
            status: Some(ErrorCode::Int(422)),
            code: Some(ErrorCode::Int(422)),
            title: Some("Validation Error".to_string()),
            meta: Some(Value::Array(slots)),
            ..Default::default()
        }
    }
}

/// Primary content of a document: a single resource or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<ResourceObject>),
    One(Box<ResourceObject>),
}

impl PrimaryData {
    pub fn into_vec(self) -> Vec<ResourceObject> {
        match self {
            PrimaryData::Many(resources) => resources,
            PrimaryData::One(resource) => vec![*resource],
        }
    }
}

/// A JSON-API top-level document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonapi: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<ResourceObject>>,
}

impl Document {
    /// Normalizes an already-decoded value into a document.
    ///
    /// Envelope members of the wrong shape fall back to empty; resource and
    /// error objects that do not match the wire shape are reported.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            Value::Null => return Ok(Document::default()),
            other => {
                return Err(PayloadError::InvalidDocument(format!(
                    "expected a top-level object, found {}",
                    kind_of(&other)
                )))
            }
        };

        let data = match object.remove("data") {
            Some(Value::Array(items)) => Some(PrimaryData::Many(
                items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<_, _>>()?,
            )),
            Some(item @ Value::Object(_)) => {
                Some(PrimaryData::One(Box::new(serde_json::from_value(item)?)))
            }
            _ => None,
        };

        let included = match object.remove("included") {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<_, _>>()?,
            ),
            _ => None,
        };

        let errors = match object.remove("errors") {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<_, _>>()?,
            ),
            _ => None,
        };

        Ok(Document {
            jsonapi: take_object(&mut object, "jsonapi"),
            meta: take_object(&mut object, "meta"),
            links: take_object(&mut object, "links"),
            errors,
            data,
            included,
        })
    }
}

fn take_object(object: &mut Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    match object.remove(key) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Configuration for building and reading payloads
#[derive(Clone)]
pub struct PayloadConfig {
    /// Default primary key name used when exporting
    pub key: String,

    /// Primary key name per type; `key` is used for types not listed here
    pub keys: HashMap<String, String>,

    /// Produces an entity's attribute map
    pub exporter: Arc<dyn AttributeExporter>,

    /// Link generator; links are omitted when unset
    pub link: Option<Arc<dyn LinkBuilder>>,
}

impl PayloadConfig {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_type_key(mut self, resource_type: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(resource_type.into(), key.into());
        self
    }

    pub fn with_exporter(mut self, exporter: impl AttributeExporter + 'static) -> Self {
        self.exporter = Arc::new(exporter);
        self
    }

    pub fn with_link(mut self, link: impl LinkBuilder + 'static) -> Self {
        self.link = Some(Arc::new(link));
        self
    }

    /// Primary key name for `resource_type`.
    pub fn key_for(&self, resource_type: &str) -> &str {
        self.keys
            .get(resource_type)
            .map(String::as_str)
            .unwrap_or(&self.key)
    }
}

impl Default for PayloadConfig {
    fn default() -> Self {
        PayloadConfig {
            key: String::from("id"),
            keys: HashMap::new(),
            exporter: Arc::new(DefaultExporter),
            link: None,
        }
    }
}

impl fmt::Debug for PayloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadConfig")
            .field("key", &self.key)
            .field("keys", &self.keys)
            .field("link", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relationship_null_and_absent_data() {
        let null: Relationship = serde_json::from_value(json!({"data": null})).unwrap();
        assert_eq!(null.data, Some(RelationshipData::Null));
        assert_eq!(serde_json::to_value(&null).unwrap(), json!({"data": null}));

        let links_only: Relationship =
            serde_json::from_value(json!({"links": {"related": "/a/1/b"}})).unwrap();
        assert_eq!(links_only.data, None);
        assert_eq!(
            serde_json::to_value(&links_only).unwrap(),
            json!({"links": {"related": "/a/1/b"}})
        );
    }

    #[test]
    fn test_relationships_keep_wire_order() {
        let rels: Relationships = serde_json::from_value(json!({
            "comments": {"data": []},
            "author": {"data": {"type": "people", "id": "9"}}
        }))
        .unwrap();

        let names: Vec<&str> = rels.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["comments", "author"]);
        assert_eq!(
            rels.get("author").unwrap().data,
            Some(RelationshipData::One(Pointer::new("people", "9")))
        );
    }

    #[test]
    fn test_resource_id_from_value() {
        assert_eq!(ResourceId::from_value(&json!(3)), Some(ResourceId::Int(3)));
        assert_eq!(ResourceId::from_value(&json!("a")), Some(ResourceId::from("a")));
        assert_eq!(ResourceId::from_value(&json!("")), None);
        assert_eq!(ResourceId::from_value(&Value::Null), None);
    }

    #[test]
    fn test_document_defaults_malformed_envelope() {
        let doc = Document::from_value(json!({
            "jsonapi": "1.0",
            "meta": {"count": 2},
            "data": null
        }))
        .unwrap();

        assert_eq!(doc.jsonapi, None);
        assert_eq!(doc.meta.unwrap().get("count"), Some(&json!(2)));
        assert_eq!(doc.data, None);
    }

    #[test]
    fn test_document_rejects_non_object() {
        let err = Document::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidDocument(_)));
    }

    #[test]
    fn test_key_for_falls_back_to_default() {
        let config = PayloadConfig::default().with_type_key("posts", "uid");
        assert_eq!(config.key_for("posts"), "uid");
        assert_eq!(config.key_for("comments"), "id");
    }
}
