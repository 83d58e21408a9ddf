//! Query shaping for JSON-API resource requests
//!
//! A [`Query`] accumulates the request shape for one resource path: selected
//! fields, conditions, ordering, embedded relations and pagination. Only the
//! path and the `page` member reach the wire; the rest is kept for adapters
//! that know how to express it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

static ORDER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(.*?)\s+((?:a|de)sc)").unwrap());

/// Sort direction of an order entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive; anything but `desc` sorts ascending.
    pub fn parse(text: &str) -> Self {
        if text.eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// A relation name with the conditions attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationFilter {
    pub name: String,
    pub conditions: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    path: String,
    key: String,
    fields: Vec<String>,
    conditions: Vec<Map<String, Value>>,
    order: Vec<(String, Direction)>,
    embed: Vec<RelationFilter>,
    has: Vec<RelationFilter>,
    page: Option<u64>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl Query {
    /// `key` is the primary key name of the queried resource.
    pub fn new(path: impl Into<String>, key: impl Into<String>) -> Self {
        Query {
            path: path.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn where_(mut self, conditions: Map<String, Value>) -> Self {
        self.conditions.push(conditions);
        self
    }

    /// Adds order entries such as `"name"`, `"name desc"` or `"name ASC"`.
    /// A field ordered twice keeps its first position and its last direction.
    pub fn order<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            let (name, direction) = parse_order(field.as_ref());
            self.set_order(name, direction);
        }
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.set_order(field.into(), direction);
        self
    }

    fn set_order(&mut self, name: String, direction: Direction) {
        match self.order.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = direction,
            None => self.order.push((name, direction)),
        }
    }

    pub fn embed(self, relation: impl Into<String>) -> Self {
        self.embed_where(relation, Map::new())
    }

    pub fn embed_where(mut self, relation: impl Into<String>, conditions: Map<String, Value>) -> Self {
        self.embed.push(RelationFilter {
            name: relation.into(),
            conditions,
        });
        self
    }

    /// Requires the queried resources to have related rows matching
    /// `conditions`.
    pub fn has(mut self, relation: impl Into<String>, conditions: Map<String, Value>) -> Self {
        self.has.push(RelationFilter {
            name: relation.into(),
            conditions,
        });
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// `0` disables pagination.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn selected_fields(&self) -> &[String] {
        &self.fields
    }

    pub fn conditions(&self) -> &[Map<String, Value>] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[(String, Direction)] {
        &self.order
    }

    pub fn embedded(&self) -> &[RelationFilter] {
        &self.embed
    }

    pub fn relation_filters(&self) -> &[RelationFilter] {
        &self.has
    }

    /// Resource path, suffixed with `/<id>` when a condition targets the
    /// primary key. The last such condition wins.
    pub fn path(&self) -> String {
        let id = self
            .conditions
            .iter()
            .filter_map(|conditions| conditions.get(&self.key))
            .filter(|value| !value.is_null())
            .last();

        match id {
            Some(Value::String(id)) => format!("{}/{}", self.path, id),
            Some(id) => format!("{}/{}", self.path, id),
            None => self.path.clone(),
        }
    }

    /// Query parameters for the request: a `page` member with `offset` and
    /// `limit` when a limit is set, nothing otherwise. The page offset
    /// saturates at `u64::MAX`.
    pub fn query_string(&self) -> Map<String, Value> {
        let mut data = Map::new();
        let Some(limit) = self.limit.filter(|limit| *limit > 0) else {
            return data;
        };
        let offset = match self.page.filter(|page| *page > 0) {
            Some(page) => (page - 1).saturating_mul(limit),
            None => self.offset.unwrap_or(0),
        };
        data.insert("page".to_string(), json!({"offset": offset, "limit": limit}));
        data
    }
}

fn parse_order(field: &str) -> (String, Direction) {
    match ORDER_PATTERN.captures(field) {
        Some(captures) => (captures[1].to_string(), Direction::parse(&captures[2])),
        None => (field.to_string(), Direction::Asc),
    }
}

/// Encodes query parameters as `a=1&page[offset]=0&page[limit]=10`.
///
/// Nested objects become bracketed keys, arrays use their indexes, and every
/// key segment and value is percent-encoded.
pub fn encode_query(params: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (name, value) in params {
        encode_pair(&encode_component(name), value, &mut pairs);
    }
    pairs.join("&")
}

fn encode_pair(prefix: &str, value: &Value, pairs: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (name, nested) in map {
                encode_pair(&format!("{}[{}]", prefix, encode_component(name)), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                encode_pair(&format!("{}[{}]", prefix, index), nested, pairs);
            }
        }
        Value::String(text) => pairs.push(format!("{}={}", prefix, encode_component(text))),
        other => pairs.push(format!("{}={}", prefix, encode_component(&other.to_string()))),
    }
}

fn encode_component(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_order_parsing() {
        let query = Query::new("/galleries", "id")
            .order(["name", "created desc", "rank ASC"])
            .order(["name DESC"]);

        assert_eq!(
            query.ordering(),
            &[
                ("name".to_string(), Direction::Desc),
                ("created".to_string(), Direction::Desc),
                ("rank".to_string(), Direction::Asc),
            ]
        );
    }

    #[test]
    fn test_path_with_key_condition() {
        let query = Query::new("/galleries", "id");
        assert_eq!(query.path(), "/galleries");

        let query = query
            .where_(conditions(json!({"id": 1})))
            .where_(conditions(json!({"name": "Foo"})))
            .where_(conditions(json!({"id": "abc"})));
        assert_eq!(query.path(), "/galleries/abc");
    }

    #[test]
    fn test_query_string_pagination() {
        assert!(Query::new("/galleries", "id").page(3).query_string().is_empty());

        let paged = Query::new("/galleries", "id").page(3).limit(10);
        assert_eq!(
            Value::Object(paged.query_string()),
            json!({"page": {"offset": 20, "limit": 10}})
        );

        let offset = Query::new("/galleries", "id").offset(5).limit(10);
        assert_eq!(
            Value::Object(offset.query_string()),
            json!({"page": {"offset": 5, "limit": 10}})
        );
        assert!(Query::new("/galleries", "id").limit(0).query_string().is_empty());
    }

    #[test]
    fn test_query_string_large_page_saturates() {
        let query = Query::new("/galleries", "id").page(u64::MAX).limit(10);
        assert_eq!(
            Value::Object(query.query_string()),
            json!({"page": {"offset": u64::MAX, "limit": 10}})
        );
    }

    #[test]
    fn test_relation_accumulators() {
        let query = Query::new("/images", "id")
            .fields(["title", "gallery_id"])
            .embed("tags")
            .embed_where("gallery", conditions(json!({"name": "Foo"})))
            .has("tags", conditions(json!({"name": "Science"})));

        assert_eq!(query.selected_fields(), &["title".to_string(), "gallery_id".to_string()]);
        let names: Vec<&str> = query.embedded().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["tags", "gallery"]);
        assert_eq!(query.relation_filters()[0].conditions.get("name"), Some(&json!("Science")));
    }

    #[test]
    fn test_encode_query() {
        let params = conditions(json!({
            "page": {"offset": 0, "limit": 10},
            "filter": {"name": "Foo Bar", "ids": [1, 2]}
        }));
        assert_eq!(
            encode_query(&params),
            "page[offset]=0&page[limit]=10&filter[name]=Foo+Bar&filter[ids][0]=1&filter[ids][1]=2"
        );
    }
}
