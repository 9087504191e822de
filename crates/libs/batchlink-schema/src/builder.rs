use regex::Regex;

use crate::error::SchemaBuildError;
use crate::requirement::Requirement;
use crate::schema::{Schema, SchemaKind};
use crate::value::{Number, Value, ValueKind};

const RESERVED_NAMES: [&str; 2] = ["type", "optional"];

/// Fluent builder for [`Schema`].
///
/// Setters never fail on the spot; the first mistake (a duplicate
/// requirement, a second schema for the same key, a constraint that does not
/// fit the schema's type) is remembered and returned by [`build`](Self::build).
#[derive(Debug)]
pub struct SchemaBuilder {
    kind: SchemaKind,
    optional: bool,
    requirements: Vec<Requirement>,
    error: Option<SchemaBuildError>,
}

impl SchemaBuilder {
    pub(crate) fn new(kind: SchemaKind) -> Self {
        Self { kind, optional: false, requirements: Vec::new(), error: None }
    }

    fn fail(&mut self, error: SchemaBuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn applies(&mut self, constraint: &'static str, kinds: &[ValueKind]) -> bool {
        let fits = self.kind.declared().is_some_and(|declared| kinds.contains(&declared));
        if !fits {
            self.fail(SchemaBuildError::NotApplicable { constraint, kind: self.kind.name() });
        }
        fits
    }

    pub fn optional(self) -> Self {
        self.set_optional(true)
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Attach a requirement. Names must be unique and must not be `type` or
    /// `optional`.
    pub fn requirement(mut self, requirement: Requirement) -> Self {
        let name = requirement.name();
        if RESERVED_NAMES.contains(&name) {
            self.fail(SchemaBuildError::ReservedName(name.to_owned()));
        } else if self.requirements.iter().any(|existing| existing.name() == name) {
            self.fail(SchemaBuildError::DuplicateRequirement(name.to_owned()));
        } else {
            self.requirements.push(requirement);
        }
        self
    }

    pub fn minimum(mut self, bound: impl Into<Number>) -> Self {
        if !self.applies("minimum", &[ValueKind::Number]) {
            return self;
        }
        self.requirement(Requirement::minimum(bound.into()))
    }

    pub fn maximum(mut self, bound: impl Into<Number>) -> Self {
        if !self.applies("maximum", &[ValueKind::Number]) {
            return self;
        }
        self.requirement(Requirement::maximum(bound.into()))
    }

    pub fn integer(mut self) -> Self {
        if !self.applies("integer", &[ValueKind::Number]) {
            return self;
        }
        self.requirement(Requirement::integer())
    }

    /// Whole-string regular expression match.
    pub fn pattern(mut self, pattern: &str) -> Self {
        if !self.applies("pattern", &[ValueKind::Text]) {
            return self;
        }
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(regex) => self.requirement(Requirement::pattern(pattern, regex)),
            Err(err) => {
                self.fail(SchemaBuildError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    message: err.to_string(),
                });
                self
            }
        }
    }

    pub fn min_length(mut self, length: usize) -> Self {
        if !self.applies("min_length", &[ValueKind::Text]) {
            return self;
        }
        self.requirement(Requirement::min_length(length))
    }

    pub fn max_length(mut self, length: usize) -> Self {
        if !self.applies("max_length", &[ValueKind::Text]) {
            return self;
        }
        self.requirement(Requirement::max_length(length))
    }

    /// Exact byte count for blobs, element count for lists and maps.
    pub fn size(mut self, size: usize) -> Self {
        if !self.applies("size", &[ValueKind::Blob, ValueKind::List, ValueKind::Map]) {
            return self;
        }
        self.requirement(Requirement::size(size))
    }

    pub fn min_size(mut self, size: usize) -> Self {
        if !self.applies("min_size", &[ValueKind::Blob, ValueKind::List, ValueKind::Map]) {
            return self;
        }
        self.requirement(Requirement::min_size(size))
    }

    pub fn max_size(mut self, size: usize) -> Self {
        if !self.applies("max_size", &[ValueKind::Blob, ValueKind::List, ValueKind::Map]) {
            return self;
        }
        self.requirement(Requirement::max_size(size))
    }

    pub fn one_of<I, V>(self, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.requirement(Requirement::one_of(allowed.into_iter().map(Into::into).collect()))
    }

    /// Schema for the list element at `index`.
    pub fn element(mut self, index: usize, schema: Schema) -> Self {
        match &mut self.kind {
            SchemaKind::List { elements, .. } => {
                if elements.contains_key(&index) {
                    self.fail(SchemaBuildError::DuplicateElement(index));
                } else {
                    elements.insert(index, schema);
                }
            }
            kind => {
                let kind = kind.name();
                self.fail(SchemaBuildError::NotApplicable { constraint: "element", kind });
            }
        }
        self
    }

    /// Schema for the map entry under `key`.
    pub fn entry(mut self, key: impl Into<String>, schema: Schema) -> Self {
        let key = key.into();
        match &mut self.kind {
            SchemaKind::Map { entries, .. } => {
                if entries.contains_key(&key) {
                    self.fail(SchemaBuildError::DuplicateEntry(key));
                } else {
                    entries.insert(key, schema);
                }
            }
            kind => {
                let kind = kind.name();
                self.fail(SchemaBuildError::NotApplicable { constraint: "entry", kind });
            }
        }
        self
    }

    /// Schema for list elements or map entries without an explicit schema.
    /// Without one, such elements are rejected.
    pub fn default_schema(mut self, schema: Schema) -> Self {
        match &mut self.kind {
            SchemaKind::List { default, .. } | SchemaKind::Map { default, .. } => {
                if default.is_some() {
                    self.fail(SchemaBuildError::DefaultAlreadySet);
                } else {
                    *default = Some(Box::new(schema));
                }
            }
            kind => {
                let kind = kind.name();
                self.fail(SchemaBuildError::NotApplicable { constraint: "default", kind });
            }
        }
        self
    }

    pub fn build(self) -> Result<Schema, SchemaBuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Schema { kind: self.kind, optional: self.optional, requirements: self.requirements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_requirement_fails_at_build() {
        let err = Schema::number().minimum(1).minimum(2).build().expect_err("duplicate");
        assert_eq!(err, SchemaBuildError::DuplicateRequirement("minimum".to_owned()));
    }

    #[test]
    fn custom_requirement_names_are_checked() {
        let even = Requirement::new("even", true, |value| {
            value.as_i64().is_some_and(|n| n % 2 == 0)
        });
        let err = Schema::number()
            .requirement(even.clone())
            .requirement(even)
            .build()
            .expect_err("duplicate");
        assert_eq!(err, SchemaBuildError::DuplicateRequirement("even".to_owned()));

        let err = Schema::number()
            .requirement(Requirement::new("type", "number", |_| true))
            .build()
            .expect_err("reserved");
        assert_eq!(err, SchemaBuildError::ReservedName("type".to_owned()));
    }

    #[test]
    fn duplicate_keys_and_defaults_fail() {
        let text = || Schema::text().build().expect("text");
        assert_eq!(
            Schema::map().entry("a", text()).entry("a", text()).build().expect_err("dup"),
            SchemaBuildError::DuplicateEntry("a".to_owned())
        );
        assert_eq!(
            Schema::list().element(0, text()).element(0, text()).build().expect_err("dup"),
            SchemaBuildError::DuplicateElement(0)
        );
        assert_eq!(
            Schema::list().default_schema(text()).default_schema(text()).build().expect_err("dup"),
            SchemaBuildError::DefaultAlreadySet
        );
    }

    #[test]
    fn first_error_wins() {
        let err = Schema::text().minimum(1).pattern("(").build().expect_err("invalid");
        assert_eq!(
            err,
            SchemaBuildError::NotApplicable { constraint: "minimum", kind: "text" }
        );
    }

    #[test]
    fn invalid_pattern_is_a_build_error() {
        let err = Schema::text().pattern("(").build().expect_err("invalid");
        assert!(matches!(err, SchemaBuildError::InvalidPattern { .. }));
    }

    #[test]
    fn pattern_matches_whole_string() {
        let schema = Schema::text().pattern("[a-z]+").build().expect("schema");
        assert!(schema.violations(&Value::from("abc")).is_empty());
        assert_eq!(schema.violations(&Value::from("abc1")).len(), 1);
    }
}
