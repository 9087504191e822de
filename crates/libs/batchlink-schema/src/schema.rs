//! Immutable schemas and the verification walk.

use std::collections::{BTreeMap, BTreeSet};

use crate::builder::SchemaBuilder;
use crate::requirement::{Requirement, Violation};
use crate::value::{Value, ValueKind};

/// Shape of a schema entity.
#[derive(Debug, Clone)]
pub enum SchemaKind {
    Null,
    Boolean,
    Number,
    Text,
    Blob,
    List { elements: BTreeMap<usize, Schema>, default: Option<Box<Schema>> },
    Map { entries: BTreeMap<String, Schema>, default: Option<Box<Schema>> },
    Any,
}

impl SchemaKind {
    /// The value type this schema insists on, `None` for [`SchemaKind::Any`].
    pub fn declared(&self) -> Option<ValueKind> {
        match self {
            Self::Null => Some(ValueKind::Null),
            Self::Boolean => Some(ValueKind::Boolean),
            Self::Number => Some(ValueKind::Number),
            Self::Text => Some(ValueKind::Text),
            Self::Blob => Some(ValueKind::Blob),
            Self::List { .. } => Some(ValueKind::List),
            Self::Map { .. } => Some(ValueKind::Map),
            Self::Any => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.declared().map_or("any", ValueKind::as_str)
    }
}

/// A validated, immutable schema. Create one through the [`SchemaBuilder`]
/// returned by [`Schema::map`], [`Schema::number`] and friends.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) kind: SchemaKind,
    pub(crate) optional: bool,
    pub(crate) requirements: Vec<Requirement>,
}

impl Schema {
    pub fn null() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Null)
    }

    pub fn boolean() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Boolean)
    }

    pub fn number() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Number)
    }

    pub fn text() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Text)
    }

    pub fn blob() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Blob)
    }

    pub fn list() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::List { elements: BTreeMap::new(), default: None })
    }

    pub fn map() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Map { entries: BTreeMap::new(), default: None })
    }

    pub fn any() -> SchemaBuilder {
        SchemaBuilder::new(SchemaKind::Any)
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Hand `value` back if it satisfies the schema, otherwise every violation.
    pub fn verify(&self, value: Value) -> Result<Value, Vec<Violation>> {
        let violations = self.violations(&value);
        if violations.is_empty() {
            Ok(value)
        } else {
            Err(violations)
        }
    }

    pub fn violations(&self, value: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        self.check("", Some(value), &mut out);
        out
    }

    fn check(&self, path: &str, value: Option<&Value>, out: &mut Vec<Violation>) {
        let Some(value) = value else {
            if !self.optional {
                out.push(Violation::missing(path));
            }
            return;
        };

        if let Some(declared) = self.kind.declared() {
            if value.kind() != declared {
                out.push(Violation::new(path, "type", Value::from(declared.as_str())));
                return;
            }
        }

        let before = out.len();
        for requirement in &self.requirements {
            if !requirement.test(value) {
                out.push(Violation::of(path, requirement));
            }
        }
        // Children are only meaningful once the container itself is valid.
        if out.len() != before {
            return;
        }

        match (&self.kind, value) {
            (SchemaKind::List { elements, default }, Value::List(items)) => {
                let mut indices: BTreeSet<usize> = elements.keys().copied().collect();
                indices.extend(0..items.len());
                for index in indices {
                    let child = format!("{path}[{index}]");
                    check_child(
                        elements.get(&index),
                        default.as_deref(),
                        &child,
                        items.get(index),
                        out,
                    );
                }
            }
            (SchemaKind::Map { entries, default }, Value::Map(map)) => {
                let mut keys: BTreeSet<&str> = entries.keys().map(String::as_str).collect();
                keys.extend(map.keys().map(String::as_str));
                for key in keys {
                    let child =
                        if path.is_empty() { key.to_owned() } else { format!("{path}.{key}") };
                    check_child(entries.get(key), default.as_deref(), &child, map.get(key), out);
                }
            }
            _ => {}
        }
    }

    /// Describe the schema as a value, for documentation and introspection.
    pub fn describe(&self) -> Value {
        let mut out = BTreeMap::new();
        out.insert("type".to_owned(), Value::from(self.kind.name()));
        out.insert("optional".to_owned(), Value::Boolean(self.optional));
        out.insert(
            "requirements".to_owned(),
            Value::map(
                self.requirements
                    .iter()
                    .map(|requirement| (requirement.name(), requirement.expected().clone())),
            ),
        );
        match &self.kind {
            SchemaKind::List { elements, default } => {
                out.insert(
                    "elements".to_owned(),
                    Value::map(
                        elements.iter().map(|(index, schema)| (index.to_string(), schema.describe())),
                    ),
                );
                if let Some(default) = default {
                    out.insert("default".to_owned(), default.describe());
                }
            }
            SchemaKind::Map { entries, default } => {
                out.insert(
                    "entry".to_owned(),
                    Value::map(entries.iter().map(|(key, schema)| (key.as_str(), schema.describe()))),
                );
                if let Some(default) = default {
                    out.insert("default".to_owned(), default.describe());
                }
            }
            _ => {}
        }
        Value::Map(out)
    }
}

fn check_child(
    explicit: Option<&Schema>,
    default: Option<&Schema>,
    path: &str,
    value: Option<&Value>,
    out: &mut Vec<Violation>,
) {
    match (explicit, default) {
        (Some(schema), _) | (None, Some(schema)) => schema.check(path, value, out),
        (None, None) => out.push(Violation::unexpected(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Schema {
        Schema::map()
            .entry("name", Schema::text().build().expect("name"))
            .entry("age", Schema::number().minimum(0).build().expect("age"))
            .build()
            .expect("person")
    }

    #[test]
    fn missing_required_entry_is_reported_once() {
        let violations = person().violations(&Value::map([("name", Value::from("x"))]));
        assert_eq!(violations, vec![Violation::new("age", "optional", Value::Boolean(false))]);
    }

    #[test]
    fn unexpected_entry_is_rejected() {
        let value = Value::map([
            ("name", Value::from("x")),
            ("age", Value::from(5)),
            ("extra", Value::from(1)),
        ]);
        let violations = person().violations(&value);
        assert_eq!(violations, vec![Violation::new("extra", "expected", Value::Boolean(false))]);
    }

    #[test]
    fn minimum_bound_at_root() {
        let schema = Schema::number().minimum(10).build().expect("schema");
        assert_eq!(
            schema.violations(&Value::from(5)),
            vec![Violation::new("", "minimum", Value::from(10))]
        );
        assert!(schema.violations(&Value::from(10)).is_empty());
    }

    #[test]
    fn type_mismatch_skips_requirements() {
        let schema = Schema::number().minimum(10).maximum(20).build().expect("schema");
        assert_eq!(
            schema.violations(&Value::from("ten")),
            vec![Violation::new("", "type", Value::from("number"))]
        );
    }

    #[test]
    fn every_failing_requirement_is_reported() {
        let schema = Schema::text().min_length(3).pattern("[a-z]+").build().expect("schema");
        let violations = schema.violations(&Value::from("A"));
        let names: Vec<_> = violations.iter().map(|v| v.requirement.as_str()).collect();
        assert_eq!(names, ["min_length", "pattern"]);
    }

    #[test]
    fn invalid_container_is_not_descended() {
        let schema = Schema::list()
            .max_size(1)
            .default_schema(Schema::number().build().expect("element"))
            .build()
            .expect("schema");
        let value = Value::list([Value::from("a"), Value::from("b")]);
        assert_eq!(
            schema.violations(&value),
            vec![Violation::new("", "max_size", Value::from(1))]
        );
    }

    #[test]
    fn nested_paths_compose() {
        let schema = Schema::map()
            .entry(
                "batches",
                Schema::list()
                    .default_schema(
                        Schema::map()
                            .entry("id", Schema::number().integer().build().expect("id"))
                            .build()
                            .expect("batch"),
                    )
                    .build()
                    .expect("batches"),
            )
            .build()
            .expect("schema");
        let value = Value::map([(
            "batches",
            Value::list([Value::map([("id", Value::from(1))]), Value::map([("id", Value::from(1.5))])]),
        )]);
        assert_eq!(
            schema.violations(&value),
            vec![Violation::new("batches[1].id", "integer", Value::Boolean(true))]
        );
    }

    #[test]
    fn explicit_list_elements_are_required_unless_optional() {
        let schema = Schema::list()
            .element(0, Schema::text().build().expect("head"))
            .element(1, Schema::number().optional().build().expect("tail"))
            .build()
            .expect("schema");
        assert!(schema.violations(&Value::list([Value::from("a")])).is_empty());
        assert_eq!(
            schema.violations(&Value::list([])),
            vec![Violation::new("[0]", "optional", Value::Boolean(false))]
        );
        assert_eq!(
            schema.violations(&Value::list([Value::from("a"), Value::from(1), Value::Null])),
            vec![Violation::new("[2]", "expected", Value::Boolean(false))]
        );
    }

    #[test]
    fn any_accepts_every_kind() {
        let schema = Schema::any().build().expect("schema");
        for value in [Value::Null, Value::from(1), Value::from("x"), Value::list([])] {
            assert!(schema.verify(value).is_ok());
        }
    }

    #[test]
    fn describe_lists_shape() {
        let described = person().describe();
        assert_eq!(described.get("type"), Some(&Value::from("map")));
        assert_eq!(described.get("optional"), Some(&Value::Boolean(false)));
        let age = described.get("entry").and_then(|entry| entry.get("age")).expect("age");
        assert_eq!(age.get("requirements").and_then(|r| r.get("minimum")), Some(&Value::from(0)));
        assert!(described.get("default").is_none());
    }
}
