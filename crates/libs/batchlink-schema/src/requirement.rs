//! Requirements attached to schemas and the violations they produce.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::value::{Number, Value};

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A named predicate over a [`Value`] plus the expected value reported when it
/// fails.
#[derive(Clone)]
pub struct Requirement {
    name: String,
    expected: Value,
    predicate: Predicate,
}

impl Requirement {
    pub fn new<N, E, F>(name: N, expected: E, predicate: F) -> Self
    where
        N: Into<String>,
        E: Into<Value>,
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self { name: name.into(), expected: expected.into(), predicate: Arc::new(predicate) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected(&self) -> &Value {
        &self.expected
    }

    pub fn test(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }

    pub fn minimum(bound: Number) -> Self {
        Self::new("minimum", bound, move |value| {
            value.as_number().is_some_and(|n| n >= bound)
        })
    }

    pub fn maximum(bound: Number) -> Self {
        Self::new("maximum", bound, move |value| {
            value.as_number().is_some_and(|n| n <= bound)
        })
    }

    pub fn integer() -> Self {
        Self::new("integer", true, |value| value.as_number().is_some_and(Number::is_integer))
    }

    /// `regex` must already be anchored; `source` is what gets reported.
    pub(crate) fn pattern(source: &str, regex: Regex) -> Self {
        Self::new("pattern", source, move |value| {
            value.as_str().is_some_and(|text| regex.is_match(text))
        })
    }

    pub fn min_length(length: usize) -> Self {
        Self::new("min_length", length, move |value| value.len().is_some_and(|len| len >= length))
    }

    pub fn max_length(length: usize) -> Self {
        Self::new("max_length", length, move |value| value.len().is_some_and(|len| len <= length))
    }

    pub fn size(size: usize) -> Self {
        Self::new("size", size, move |value| value.len() == Some(size))
    }

    pub fn min_size(size: usize) -> Self {
        Self::new("min_size", size, move |value| value.len().is_some_and(|len| len >= size))
    }

    pub fn max_size(size: usize) -> Self {
        Self::new("max_size", size, move |value| value.len().is_some_and(|len| len <= size))
    }

    pub fn one_of(allowed: Vec<Value>) -> Self {
        let expected = Value::List(allowed.clone());
        Self::new("one_of", expected, move |value| allowed.contains(value))
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requirement")
            .field("name", &self.name)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

/// A value failing one requirement at `path`.
///
/// Besides the schema's own requirements, three synthetic names occur:
/// `type` (expected is the declared type name), `optional` (a required value
/// is absent, expected `false`) and `expected` (the key is not permitted,
/// expected `false`).
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub path: String,
    pub requirement: String,
    pub expected: Value,
}

impl Violation {
    pub fn new(path: impl Into<String>, requirement: impl Into<String>, expected: Value) -> Self {
        Self { path: path.into(), requirement: requirement.into(), expected }
    }

    pub(crate) fn of(path: &str, requirement: &Requirement) -> Self {
        Self::new(path, requirement.name(), requirement.expected().clone())
    }

    pub(crate) fn missing(path: &str) -> Self {
        Self::new(path, "optional", Value::Boolean(false))
    }

    pub(crate) fn unexpected(path: &str) -> Self {
        Self::new(path, "expected", Value::Boolean(false))
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { self.path.as_str() };
        write!(f, "{path}: {}={}", self.requirement, self.expected)
    }
}
