//! Declarative provider schemas.
//!
//! A [`Schema`] describes the fields a provider accepts as data: their
//! primitive type, an optional format constraint, whether they take one value
//! or a non-empty list of values, the required set and the cross-field
//! dependencies. One generic [`validator`](crate::validator) interprets every
//! provider's schema.
//!
//! ```
//! use notifiers::schema::{Field, Format, Schema};
//!
//! let schema = Schema::new()
//!     .field(Field::string("message"))
//!     .field(Field::string("to").format(Format::Email).one_or_more())
//!     .field(Field::string("username"))
//!     .field(Field::string("password"))
//!     .required(["message", "to"])
//!     .dependency("username", ["password"])
//!     .dependency("password", ["username"]);
//!
//! assert!(schema.get("to").unwrap().is_one_or_more());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A request mapping: field name to value(s).
pub type Data = Map<String, Value>;

/// Primitive type of a field (or of each element of a one-or-more field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

impl FieldType {
    /// JSON-Schema name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// Check a single (non-list) value against the type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// Format constraint layered on top of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// An RFC 5322 address.
    Email,
    /// A DNS hostname or an IP literal.
    Hostname,
    /// A TCP port number, 0 through 65535.
    Port,
    /// A usable file path. Existence is checked when the file is read.
    ValidFile,
}

impl Format {
    /// JSON-Schema name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Hostname => "hostname",
            Self::Port => "port",
            Self::ValidFile => "valid_file",
        }
    }
}

/// Whether a field takes one value or a non-empty list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cardinality {
    #[default]
    One,
    OneOrMore,
}

/// A value supplied either on its own or as a list.
///
/// Callers may write `"to": "a@x.com"` or `"to": ["a@x.com", "b@x.com"]`;
/// both deserialize into this type and [`into_vec`](Self::into_vec) turns
/// either into a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMore<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> OneOrMore<T> {
    /// Collapse into a list; a single value becomes a one-element list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Single(value) => vec![value],
            Self::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> OneOrMore<&'a Value> {
    /// View a raw JSON value as one-or-more elements.
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Self::Many(items.iter().collect()),
            other => Self::Single(other),
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: &'static str,
    field_type: FieldType,
    format: Option<Format>,
    allowed: Option<Vec<Value>>,
    cardinality: Cardinality,
    title: Option<&'static str>,
    duplicate: bool,
}

impl Field {
    fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            format: None,
            allowed: None,
            cardinality: Cardinality::One,
            title: None,
            duplicate: false,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// Attach a format constraint.
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Restrict the value (or each element) to a fixed set.
    ///
    /// ```
    /// use notifiers::schema::Field;
    ///
    /// let priority = Field::string("priority").one_of(["low", "normal", "high"]);
    /// assert_eq!(priority.allowed_values().map(<[_]>::len), Some(3));
    /// ```
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Accept a single value or a non-empty list of values.
    pub fn one_or_more(mut self) -> Self {
        self.cardinality = Cardinality::OneOrMore;
        self
    }

    /// Human-readable description.
    pub fn title(mut self, title: &'static str) -> Self {
        self.title = Some(title);
        self
    }

    /// Mark the field as an alias of another field (e.g. `from_` for `from`).
    pub fn duplicate(mut self) -> Self {
        self.duplicate = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn format_constraint(&self) -> Option<Format> {
        self.format
    }

    pub fn allowed_values(&self) -> Option<&[Value]> {
        self.allowed.as_deref()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_one_or_more(&self) -> bool {
        self.cardinality == Cardinality::OneOrMore
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate
    }

    fn element_json(&self) -> Value {
        let mut element = Map::new();
        element.insert("type".into(), json!(self.field_type.as_str()));
        if let Some(format) = self.format {
            element.insert("format".into(), json!(format.as_str()));
        }
        if let Some(allowed) = &self.allowed {
            element.insert("enum".into(), Value::Array(allowed.clone()));
        }
        if let Some(title) = self.title {
            element.insert("title".into(), json!(title));
        }
        Value::Object(element)
    }

    fn to_json(&self) -> Value {
        let mut value = match self.cardinality {
            Cardinality::One => self.element_json(),
            Cardinality::OneOrMore => {
                let element = self.element_json();
                json!({
                    "oneOf": [
                        element,
                        {"type": "array", "items": element, "minItems": 1, "uniqueItems": true}
                    ]
                })
            }
        };
        if self.duplicate {
            if let Value::Object(map) = &mut value {
                map.insert("duplicate".into(), Value::Bool(true));
            }
        }
        value
    }
}

/// A provider's declared fields, required set and dependencies.
///
/// Unknown keys are always rejected (`additionalProperties: false`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    required: Vec<&'static str>,
    dependencies: Vec<(&'static str, Vec<&'static str>)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Redeclaring a name replaces the earlier declaration.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    /// Add fields to the required set.
    pub fn required<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        for name in names {
            if !self.required.contains(&name) {
                self.required.push(name);
            }
        }
        self
    }

    /// When `field` is present, every name in `requires` must be present too.
    ///
    /// Dependencies are one-directional; declare both directions for pairs.
    pub fn dependency<I>(mut self, field: &'static str, requires: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        let requires: Vec<_> = requires.into_iter().collect();
        match self.dependencies.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => existing.extend(requires),
            None => self.dependencies.push((field, requires)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn required_fields(&self) -> &[&'static str] {
        &self.required
    }

    pub fn dependencies(&self) -> &[(&'static str, Vec<&'static str>)] {
        &self.dependencies
    }

    /// Names of all declared fields, in declaration order.
    pub fn arguments(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Render as a JSON-Schema document.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.to_json()))
            .collect();
        let dependencies: Map<String, Value> = self
            .dependencies
            .iter()
            .map(|(name, requires)| (name.to_string(), json!(requires)))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "dependencies": dependencies,
            "additionalProperties": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new()
            .field(Field::string("message"))
            .field(Field::string("to").format(Format::Email).one_or_more())
            .field(Field::string("from_").format(Format::Email).duplicate())
            .field(Field::integer("port").format(Format::Port))
            .required(["message", "to"])
            .dependency("ssl", ["tls"])
    }

    #[test]
    fn test_field_lookup() {
        let schema = sample();
        let to = schema.get("to").unwrap();
        assert_eq!(to.field_type(), FieldType::String);
        assert_eq!(to.format_constraint(), Some(Format::Email));
        assert!(to.is_one_or_more());
        assert!(schema.get("nope").is_none());
    }

    #[test]
    fn test_redeclare_replaces() {
        let schema = Schema::new()
            .field(Field::string("port"))
            .field(Field::integer("port"));
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(schema.get("port").unwrap().field_type(), FieldType::Integer);
    }

    #[test]
    fn test_dependencies_merge() {
        let schema = Schema::new()
            .dependency("a", ["b"])
            .dependency("a", ["c"]);
        assert_eq!(schema.dependencies(), &[("a", vec!["b", "c"])]);
    }

    #[test]
    fn test_field_type_matches() {
        assert!(FieldType::Integer.matches(&json!(25)));
        assert!(!FieldType::Integer.matches(&json!(2.5)));
        assert!(!FieldType::Integer.matches(&json!("25")));
        assert!(FieldType::Boolean.matches(&json!(false)));
        assert!(!FieldType::String.matches(&json!(null)));
    }

    #[test]
    fn test_one_or_more() {
        let single: OneOrMore<String> = serde_json::from_value(json!("a@x.com")).unwrap();
        assert_eq!(single.into_vec(), vec!["a@x.com".to_string()]);

        let many: OneOrMore<String> = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many.into_vec(), vec!["a".to_string(), "b".to_string()]);

        let value = json!(["x"]);
        assert_eq!(OneOrMore::of(&value).into_vec(), vec![&json!("x")]);
    }

    #[test]
    fn test_json_schema_export() {
        let doc = sample().to_json_schema();
        assert_eq!(doc["additionalProperties"], json!(false));
        assert_eq!(doc["required"], json!(["message", "to"]));
        assert_eq!(doc["dependencies"]["ssl"], json!(["tls"]));
        assert_eq!(doc["properties"]["port"]["format"], json!("port"));
        assert_eq!(doc["properties"]["to"]["oneOf"][1]["minItems"], json!(1));
        assert_eq!(doc["properties"]["from_"]["duplicate"], json!(true));
    }

    #[test]
    fn test_json_schema_exports_enum() {
        let schema = Schema::new()
            .field(Field::string("priority").one_of(["low", "high"]))
            .field(Field::integer("retries").one_of([1, 3]).one_or_more());

        let doc = schema.to_json_schema();
        assert_eq!(doc["properties"]["priority"]["enum"], json!(["low", "high"]));
        assert_eq!(doc["properties"]["retries"]["oneOf"][1]["items"]["enum"], json!([1, 3]));
        assert_eq!(
            schema.get("priority").unwrap().allowed_values(),
            Some(&[json!("low"), json!("high")][..])
        );
    }
}
