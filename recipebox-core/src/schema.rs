//! Declarative field constraints and the validator that interprets them.
//!
//! A [`Schema`] is plain data: a list of fields, each with a kind and an
//! optional flag. Validation walks a JSON document against it and collects
//! every violation instead of stopping at the first one, so callers can
//! report all offending fields at once.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Pseudo field name used when the document itself (not one of its fields) is wrong.
pub const DOCUMENT_FIELD: &str = "(document)";

/// The type constraint attached to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A string, optionally bounded in characters.
    String { max_len: Option<usize> },
    /// A UUID in its canonical string form.
    Id,
    /// A string drawn from a closed set of values.
    OneOf(&'static [&'static str]),
    /// An array whose elements all satisfy `element`.
    Array {
        element: Box<FieldKind>,
        min_items: usize,
    },
}

impl FieldKind {
    pub fn string() -> Self {
        FieldKind::String { max_len: None }
    }

    pub fn bounded_string(max_len: usize) -> Self {
        FieldKind::String {
            max_len: Some(max_len),
        }
    }

    pub fn array_of(element: FieldKind) -> Self {
        FieldKind::Array {
            element: Box::new(element),
            min_items: 0,
        }
    }

    pub fn non_empty_array_of(element: FieldKind) -> Self {
        FieldKind::Array {
            element: Box::new(element),
            min_items: 1,
        }
    }

    fn check(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        match self {
            FieldKind::String { max_len } => match value.as_str() {
                Some(s) => {
                    if let Some(max) = max_len {
                        if s.chars().count() > *max {
                            out.push(Violation::new(path, ViolationKind::TooLong { max: *max }));
                        }
                    }
                }
                None => out.push(Violation::new(path, ViolationKind::ExpectedString)),
            },
            FieldKind::Id => match value.as_str() {
                Some(s) if Uuid::parse_str(s).is_ok() => {}
                _ => out.push(Violation::new(path, ViolationKind::InvalidId)),
            },
            FieldKind::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                Some(s) => out.push(Violation::new(
                    path,
                    ViolationKind::NotAllowed {
                        value: s.to_string(),
                    },
                )),
                None => out.push(Violation::new(path, ViolationKind::ExpectedString)),
            },
            FieldKind::Array { element, min_items } => match value.as_array() {
                Some(items) => {
                    if items.len() < *min_items {
                        out.push(Violation::new(
                            path,
                            ViolationKind::TooFewItems { min: *min_items },
                        ));
                    }
                    for (index, item) in items.iter().enumerate() {
                        element.check(&format!("{path}.{index}"), item, out);
                    }
                }
                None => out.push(Violation::new(path, ViolationKind::ExpectedArray)),
            },
        }
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Human-readable label, used in form-facing messages.
    pub label: &'static str,
    pub kind: FieldKind,
    pub optional: bool,
}

impl Field {
    pub fn required(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            optional: false,
        }
    }

    pub fn optional(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            optional: true,
        }
    }
}

/// Declared shape of the documents in one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub collection: &'static str,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(collection: &'static str, fields: Vec<Field>) -> Self {
        Self { collection, fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a complete document.
    ///
    /// Required fields must be present and non-null, present fields must
    /// match their kind, and keys the schema does not declare are rejected.
    pub fn validate(&self, document: &Value) -> Result<(), ValidationError> {
        let Some(object) = document.as_object() else {
            return Err(ValidationError::single(
                DOCUMENT_FIELD,
                ViolationKind::ExpectedObject,
            ));
        };

        let mut violations = Vec::new();

        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if !field.optional {
                        violations.push(Violation::new(field.name, ViolationKind::Required));
                    }
                }
                Some(value) => field.kind.check(field.name, value, &mut violations),
            }
        }

        self.reject_unknown(object, &mut violations);

        ValidationError::from_violations(violations)
    }

    /// Validate a partial update. Only the keys present are checked; a
    /// `null` value means "unset", which is only legal for optional fields.
    pub fn validate_patch(&self, patch: &Map<String, Value>) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        for (key, value) in patch {
            let Some(field) = self.field(key) else {
                continue;
            };
            if value.is_null() {
                if !field.optional {
                    violations.push(Violation::new(field.name, ViolationKind::Required));
                }
            } else {
                field.kind.check(field.name, value, &mut violations);
            }
        }

        self.reject_unknown(patch, &mut violations);

        ValidationError::from_violations(violations)
    }

    fn reject_unknown(&self, object: &Map<String, Value>, violations: &mut Vec<Violation>) {
        for key in object.keys() {
            if self.field(key).is_none() {
                violations.push(Violation::new(key, ViolationKind::UnknownField));
            }
        }
    }
}

/// What was wrong with a field.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    #[error("is required")]
    Required,
    #[error("must be an object")]
    ExpectedObject,
    #[error("must be a string")]
    ExpectedString,
    #[error("must be an array")]
    ExpectedArray,
    #[error("must be a valid id")]
    InvalidId,
    #[error("cannot exceed {max} characters")]
    TooLong { max: usize },
    #[error("must have at least {min} item(s)")]
    TooFewItems { min: usize },
    #[error("'{value}' is not an allowed value")]
    NotAllowed { value: String },
    #[error("is not allowed by the schema")]
    UnknownField,
    #[error("is malformed: {message}")]
    Malformed { message: String },
}

/// A single failed constraint, addressed by field path (`ingredients.2`).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{field} {kind}")]
pub struct Violation {
    pub field: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// The top-level field this violation belongs to (`ingredients` for `ingredients.2`).
    pub fn root_field(&self) -> &str {
        self.field
            .split_once('.')
            .map(|(root, _)| root)
            .unwrap_or(&self.field)
    }
}

/// A document or patch failed its schema. Never empty.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Validation failed: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            violations: vec![Violation::new(field, kind)],
        }
    }

    fn from_violations(violations: Vec<Violation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { violations })
        }
    }

    /// Offending top-level field names, in first-seen order, without duplicates.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for violation in &self.violations {
            let root = violation.root_field();
            if !fields.contains(&root) {
                fields.push(root);
            }
        }
        fields
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
