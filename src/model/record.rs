//! In-memory entities
//!
//! [`Record`] is a plain field map plus declared relations. It can be built
//! in code with the `with_*` methods or read from JSON through [`RecordDef`]:
//!
//! ```json
//! {
//!   "type": "Image",
//!   "exists": true,
//!   "attributes": {"id": 1, "title": "Amiga 1200"},
//!   "relations": [
//!     {"name": "gallery", "value": {"type": "Gallery", "attributes": {"name": "Foo"}}},
//!     {"name": "tags", "through": "images_tags", "value": []}
//!   ]
//! }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Collection, Entity, RelationKind, RelationValue, Resource};
use crate::types::ResourceId;

/// A loaded relation value owned by a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Box<Record>),
    Many(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq)]
struct RelationSlot {
    name: String,
    kind: RelationKind,
    value: Option<Related>,
}

/// A model entity held entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    source: String,
    model: Option<String>,
    key: String,
    exists: Option<bool>,
    fields: Map<String, Value>,
    relations: Vec<RelationSlot>,
    errors: Map<String, Value>,
}

impl Record {
    pub fn new(source: impl Into<String>) -> Self {
        Record {
            source: source.into(),
            model: None,
            key: String::from("id"),
            exists: None,
            fields: Map::new(),
            relations: Vec::new(),
            errors: Map::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Assigns the primary key field.
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        let id = id.into();
        self.fields.insert(self.key.clone(), id.to_value());
        self
    }

    /// Marks the record as persisted.
    pub fn persisted(self) -> Self {
        self.with_exists(true)
    }

    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_error(mut self, field: impl Into<String>, messages: impl Into<Value>) -> Self {
        self.errors.insert(field.into(), messages.into());
        self
    }

    /// Declares a relation without loading it.
    pub fn declare(mut self, name: impl Into<String>, kind: RelationKind) -> Self {
        self.set_slot(name.into(), kind, None);
        self
    }

    pub fn with_one(mut self, name: impl Into<String>, record: Record) -> Self {
        let kind = RelationKind::new(record.model_name(), self.source.clone());
        self.set_slot(name.into(), kind, Some(Related::One(Box::new(record))));
        self
    }

    pub fn with_many(self, name: impl Into<String>, model: impl Into<String>, records: Vec<Record>) -> Self {
        let kind = RelationKind::new(model, self.source.clone());
        self.with_relation(name, kind, Related::Many(records))
    }

    pub fn with_relation(mut self, name: impl Into<String>, kind: RelationKind, related: Related) -> Self {
        self.set_slot(name.into(), kind, Some(related));
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations
            .iter()
            .find(|slot| slot.name == name)
            .and_then(|slot| slot.value.as_ref())
    }

    fn set_slot(&mut self, name: String, kind: RelationKind, value: Option<Related>) {
        match self.relations.iter_mut().find(|slot| slot.name == name) {
            Some(slot) => {
                slot.kind = kind;
                slot.value = value;
            }
            None => self.relations.push(RelationSlot { name, kind, value }),
        }
    }
}

impl Entity for Record {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.source)
    }

    fn primary_key(&self) -> &str {
        &self.key
    }

    fn id(&self) -> Option<ResourceId> {
        self.fields.get(&self.key).and_then(ResourceId::from_value)
    }

    fn exists(&self) -> Option<bool> {
        self.exists
    }

    fn export_attributes(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    fn declared_relations(&self) -> Vec<&str> {
        self.relations.iter().map(|slot| slot.name.as_str()).collect()
    }

    fn relation_value(&self, name: &str) -> Option<RelationValue<'_>> {
        match self.related(name)? {
            Related::One(record) => Some(RelationValue::One(&**record)),
            Related::Many(records) => Some(RelationValue::Many(
                records.iter().map(|record| record as &dyn Entity).collect(),
            )),
        }
    }

    fn relation_kind(&self, name: &str) -> Option<RelationKind> {
        self.relations
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.kind.clone())
    }

    fn validation_errors(&self) -> Map<String, Value> {
        self.errors.clone()
    }
}

impl<'a> From<&'a Record> for Resource<'a> {
    fn from(record: &'a Record) -> Self {
        Resource::Entity(record)
    }
}

/// A member of a [`RecordSet`]. Sets coming from loosely typed input may hold
/// values that are not records.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Record(Record),
    Foreign(Value),
}

/// An ordered collection of records with collection-level `meta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    members: Vec<Member>,
    meta: Map<String, Value>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        RecordSet {
            members: records.into_iter().map(Member::Record).collect(),
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    pub fn push(&mut self, record: Record) {
        self.members.push(Member::Record(record));
    }

    pub fn push_foreign(&mut self, value: Value) {
        self.members.push(Member::Foreign(value));
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Collection for RecordSet {
    fn members(&self) -> Vec<Resource<'_>> {
        self.members
            .iter()
            .map(|member| match member {
                Member::Record(record) => Resource::Entity(record),
                Member::Foreign(value) => Resource::Other(value),
            })
            .collect()
    }

    fn meta(&self) -> Map<String, Value> {
        self.meta.clone()
    }
}

impl<'a> From<&'a RecordSet> for Resource<'a> {
    fn from(set: &'a RecordSet) -> Self {
        Resource::Collection(set)
    }
}

fn default_key() -> String {
    String::from("id")
}

/// JSON form of a [`Record`].
#[derive(Debug, Clone, Deserialize)]
pub struct RecordDef {
    #[serde(rename = "type")]
    pub source: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default)]
    pub exists: Option<bool>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub relations: Vec<RelationDef>,

    #[serde(default)]
    pub errors: Map<String, Value>,
}

/// JSON form of one declared relation.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationDef {
    pub name: String,

    /// Related model name; defaults to the type of the first loaded record
    #[serde(default)]
    pub to: Option<String>,

    #[serde(default)]
    pub counterpart: Option<String>,

    #[serde(default)]
    pub through: Option<String>,

    /// Unset when absent
    #[serde(default)]
    pub value: Option<RelatedDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelatedDef {
    Many(Vec<RecordDef>),
    One(Box<RecordDef>),
}

impl From<RecordDef> for Record {
    fn from(def: RecordDef) -> Self {
        let mut record = Record::new(def.source).with_key(def.key);
        record.model = def.model;
        record.exists = def.exists;
        record.fields = def.attributes;
        record.errors = def.errors;

        for relation in def.relations {
            let to = relation.to.clone().or_else(|| match &relation.value {
                Some(RelatedDef::One(one)) => Some(one.model.clone().unwrap_or_else(|| one.source.clone())),
                Some(RelatedDef::Many(many)) => many
                    .first()
                    .map(|first| first.model.clone().unwrap_or_else(|| first.source.clone())),
                None => None,
            });
            let mut kind = RelationKind::new(
                to.unwrap_or_else(|| relation.name.clone()),
                relation.counterpart.unwrap_or_else(|| record.source.clone()),
            );
            kind.through = relation.through;

            let value = relation.value.map(|related| match related {
                RelatedDef::One(one) => Related::One(Box::new(Record::from(*one))),
                RelatedDef::Many(many) => Related::Many(many.into_iter().map(Record::from).collect()),
            });
            record.set_slot(relation.name, kind, value);
        }

        record
    }
}
