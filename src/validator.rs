//! Generic schema validation.
//!
//! [`validate`] checks a (defaults-merged) request against a [`Schema`]:
//!
//! 1. Required fields. Any missing required field stops validation here.
//! 2. Unknown keys are rejected.
//! 3. Each present field is checked for type, format and allowed values.
//!    These are reported independently and every failing field is reported.
//! 4. Dependencies: a present field drags its declared counterparts in.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use email_address::EmailAddress;
use serde_json::Value;

use crate::schema::{Data, Field, FieldType, Format, OneOrMore, Schema};

/// A single reason a request failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A required field is absent.
    Required(String),
    /// The key is not declared in the schema.
    UnknownField(String),
    /// The value (or one of its elements) has the wrong primitive type.
    Type { field: String, expected: FieldType },
    /// The value (or one of its elements) fails the format constraint.
    Format {
        field: String,
        format: Format,
        value: String,
    },
    /// The value (or one of its elements) is not in the allowed set.
    Enum {
        field: String,
        value: String,
        allowed: Vec<Value>,
    },
    /// A one-or-more field was given an empty list.
    EmptyList(String),
    /// A one-or-more field was given the same element twice.
    DuplicateItems(String),
    /// `field` is present but `missing` is not.
    Dependency { field: String, missing: String },
}

impl Violation {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            Self::Required(field)
            | Self::UnknownField(field)
            | Self::EmptyList(field)
            | Self::DuplicateItems(field) => field,
            Self::Type { field, .. }
            | Self::Format { field, .. }
            | Self::Enum { field, .. }
            | Self::Dependency { field, .. } => field,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required(field) => write!(f, "'{field}' is a required property"),
            Self::UnknownField(field) => {
                write!(f, "Additional properties are not allowed ('{field}' was unexpected)")
            }
            Self::Type { field, expected } => {
                write!(f, "'{field}' is not of type '{}'", expected.as_str())
            }
            Self::Format {
                field,
                format,
                value,
            } => write!(f, "'{field}': {value} is not a '{}'", format.as_str()),
            Self::Enum {
                field,
                value,
                allowed,
            } => write!(f, "'{field}': {value} is not one of {}", Value::Array(allowed.clone())),
            Self::EmptyList(field) => write!(f, "'{field}' should be non-empty"),
            Self::DuplicateItems(field) => write!(f, "'{field}' has non-unique elements"),
            Self::Dependency { field, missing } => {
                write!(f, "'{missing}' is a dependency of '{field}'")
            }
        }
    }
}

/// The violations found in one request. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Validate `data` against `schema`. Pure; does not touch `data`.
pub fn validate(schema: &Schema, data: &Data) -> Result<(), ValidationError> {
    let missing: Vec<Violation> = schema
        .required_fields()
        .iter()
        .filter(|name| !data.contains_key(**name))
        .map(|name| Violation::Required(name.to_string()))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::new(missing));
    }

    let mut violations = Vec::new();

    for key in data.keys() {
        if schema.get(key).is_none() {
            violations.push(Violation::UnknownField(key.clone()));
        }
    }

    for field in schema.fields() {
        if let Some(value) = data.get(field.name()) {
            check_field(field, value, &mut violations);
        }
    }

    for (field, requires) in schema.dependencies() {
        if !data.contains_key(*field) {
            continue;
        }
        for counterpart in requires {
            if !data.contains_key(*counterpart) {
                violations.push(Violation::Dependency {
                    field: field.to_string(),
                    missing: counterpart.to_string(),
                });
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}

fn check_field(field: &Field, value: &Value, violations: &mut Vec<Violation>) {
    let name = field.name();

    let elements = if field.is_one_or_more() {
        let elements = OneOrMore::of(value).into_vec();
        if elements.is_empty() {
            violations.push(Violation::EmptyList(name.to_string()));
            return;
        }
        if value.is_array() && has_duplicates(&elements) {
            violations.push(Violation::DuplicateItems(name.to_string()));
        }
        elements
    } else {
        vec![value]
    };

    if elements.iter().any(|e| !field.field_type().matches(e)) {
        violations.push(Violation::Type {
            field: name.to_string(),
            expected: field.field_type(),
        });
    }

    if let Some(format) = field.format_constraint() {
        for element in &elements {
            if !format_matches(format, element) {
                violations.push(Violation::Format {
                    field: name.to_string(),
                    format,
                    value: element.to_string(),
                });
            }
        }
    }

    if let Some(allowed) = field.allowed_values() {
        for element in &elements {
            if !allowed.contains(*element) {
                violations.push(Violation::Enum {
                    field: name.to_string(),
                    value: element.to_string(),
                    allowed: allowed.to_vec(),
                });
            }
        }
    }
}

fn has_duplicates(elements: &[&Value]) -> bool {
    let mut seen = HashSet::new();
    elements.iter().any(|e| !seen.insert(e.to_string()))
}

/// Check one element against a format.
///
/// Like JSON-Schema, a format only constrains the value kinds it knows
/// about; anything else passes and is left to the type check.
pub fn format_matches(format: Format, value: &Value) -> bool {
    match (format, value) {
        (Format::Email, Value::String(s)) => EmailAddress::is_valid(s),
        (Format::Hostname, Value::String(s)) => is_hostname(s),
        (Format::Port, Value::Number(n)) => n.as_u64().is_some_and(|p| p <= u64::from(u16::MAX)),
        (Format::Port, Value::String(s)) => s.parse::<u16>().is_ok(),
        (Format::ValidFile, Value::String(s)) => !s.trim().is_empty() && !s.contains('\0'),
        _ => true,
    }
}

fn is_hostname(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }

    let Ok(ascii) = idna::domain_to_ascii(host) else {
        return false;
    };
    let ascii = ascii.strip_suffix('.').unwrap_or(&ascii);
    if ascii.is_empty() || ascii.len() > 253 {
        return false;
    }

    ascii.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
