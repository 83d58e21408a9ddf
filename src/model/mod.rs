//! Narrow interfaces onto the entity/model layer
//!
//! The payload engine never owns entities. It reads them through the
//! [`Entity`] and [`Collection`] traits, which any model framework can
//! implement. [`record`] provides an in-memory implementation used by the
//! command line tools and the tests.

pub mod record;

use serde_json::{Map, Value};

use crate::types::ResourceId;

pub use record::{Member, Record, RecordDef, RecordSet, Related, RelatedDef, RelationDef};

/// An entity of the model layer.
pub trait Entity {
    /// Declared source name; becomes the resource `type`.
    fn source_name(&self) -> &str;

    /// Model name used when building related links.
    fn model_name(&self) -> &str {
        self.source_name()
    }

    /// Name of the primary key field.
    fn primary_key(&self) -> &str {
        "id"
    }

    /// Identifier, if one has been assigned.
    fn id(&self) -> Option<ResourceId>;

    /// Persistence flag. `None` when the entity cannot tell.
    fn exists(&self) -> Option<bool>;

    /// Own scalar and compound fields, in declared order. Nested entities are
    /// not part of this map.
    fn export_attributes(&self) -> Map<String, Value>;

    /// Names of declared relations, in declared order.
    fn declared_relations(&self) -> Vec<&str>;

    /// Loaded value of a relation; `None` when unset.
    fn relation_value(&self, name: &str) -> Option<RelationValue<'_>>;

    fn relation_kind(&self, name: &str) -> Option<RelationKind>;

    /// Field name to error list; empty when the entity is valid.
    fn validation_errors(&self) -> Map<String, Value>;
}

/// An ordered set of entities with collection-level metadata.
pub trait Collection {
    /// Members in insertion order.
    fn members(&self) -> Vec<Resource<'_>>;

    fn meta(&self) -> Map<String, Value>;
}

/// Anything that can be handed to a payload.
#[derive(Clone, Copy)]
pub enum Resource<'a> {
    Entity(&'a dyn Entity),
    Collection(&'a dyn Collection),
    /// A value that is not an entity; recorded as an error when pushed.
    Other(&'a Value),
}

impl<'a> From<&'a dyn Entity> for Resource<'a> {
    fn from(entity: &'a dyn Entity) -> Self {
        Resource::Entity(entity)
    }
}

impl<'a> From<&'a dyn Collection> for Resource<'a> {
    fn from(collection: &'a dyn Collection) -> Self {
        Resource::Collection(collection)
    }
}

impl<'a> From<&'a Value> for Resource<'a> {
    fn from(value: &'a Value) -> Self {
        Resource::Other(value)
    }
}

/// Loaded value of a relation.
pub enum RelationValue<'a> {
    One(&'a dyn Entity),
    Many(Vec<&'a dyn Entity>),
}

/// Shape of a declared relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationKind {
    /// Model name of the related side
    pub to: String,

    /// Name of the inverse relation on the related side
    pub counterpart: String,

    /// Pivot relation this relation is realized through, if any
    pub through: Option<String>,
}

impl RelationKind {
    pub fn new(to: impl Into<String>, counterpart: impl Into<String>) -> Self {
        RelationKind {
            to: to.into(),
            counterpart: counterpart.into(),
            through: None,
        }
    }

    pub fn through(mut self, pivot: impl Into<String>) -> Self {
        self.through = Some(pivot.into());
        self
    }

    pub fn is_through_pivot(&self) -> bool {
        self.through.is_some()
    }
}

/// Produces the attribute map of an entity.
pub trait AttributeExporter: Send + Sync {
    fn export(&self, entity: &dyn Entity) -> Map<String, Value>;
}

/// Exports an entity's own fields without embedding relations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExporter;

impl AttributeExporter for DefaultExporter {
    fn export(&self, entity: &dyn Entity) -> Map<String, Value> {
        entity.export_attributes()
    }
}

impl<F> AttributeExporter for F
where
    F: Fn(&dyn Entity) -> Map<String, Value> + Send + Sync,
{
    fn export(&self, entity: &dyn Entity) -> Map<String, Value> {
        self(entity)
    }
}

/// What a link is being built for.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkParams {
    /// `self` link of a persisted resource
    Resource { id: ResourceId },
    /// `related` link of a relationship, scoped by the parent id
    Related {
        relation: String,
        rid: Option<ResourceId>,
    },
}

/// Builds absolute links for resources and relationships.
pub trait LinkBuilder: Send + Sync {
    fn link(&self, name: &str, params: &LinkParams) -> String;
}

impl<F> LinkBuilder for F
where
    F: Fn(&str, &LinkParams) -> String + Send + Sync,
{
    fn link(&self, name: &str, params: &LinkParams) -> String {
        self(name, params)
    }
}
