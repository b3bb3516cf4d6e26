//! Validation error types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// A failed rule on one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Name of the failed rule
    pub code: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: "validation_failed".to_string(),
        }
    }

    pub fn with_code(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Failed rules grouped by field, in the order they were found
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Error)]
pub struct ValidationErrors {
    pub errors: IndexMap<String, Vec<ValidationError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.entry(error.field.clone()).or_default().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of fields with errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn total_errors(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn get_field_errors(&self, field: &str) -> Option<&Vec<ValidationError>> {
        self.errors.get(field)
    }

    pub fn has_field_errors(&self, field: &str) -> bool {
        self.errors.get(field).is_some_and(|errors| !errors.is_empty())
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, errors) in other.errors {
            self.errors.entry(field).or_default().extend(errors);
        }
    }

    /// Messages per field, the shape documents keep
    pub fn messages(&self) -> IndexMap<String, Vec<String>> {
        self.errors
            .iter()
            .map(|(field, errors)| {
                (
                    field.clone(),
                    errors.iter().map(|error| error.message.clone()).collect(),
                )
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "No validation errors")
        } else {
            write!(f, "Validation failed for {} field(s):", self.errors.len())?;
            for (field, field_errors) in &self.errors {
                for error in field_errors {
                    write!(f, "\n  {}: {}", field, error.message)?;
                }
            }
            Ok(())
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        let mut errors = Self::new();
        errors.add(error);
        errors
    }
}

/// A rule that can't be built from its textual form
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("Unknown validation rule `{0}`")]
    UnknownRule(String),

    #[error("Invalid argument `{argument}` for rule `{rule}`")]
    InvalidArgument { rule: String, argument: String },

    #[error("Invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collection() {
        let mut errors = ValidationErrors::new();
        errors.add(ValidationError::new("email", "Invalid format"));
        errors.add(ValidationError::new("age", "Must be positive"));
        errors.add(ValidationError::new("email", "Already exists"));

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.total_errors(), 3);
        assert!(errors.has_field_errors("email"));
        assert!(!errors.has_field_errors("name"));
        assert_eq!(
            errors.messages()["email"],
            vec!["Invalid format".to_string(), "Already exists".to_string()]
        );
    }

    #[test]
    fn test_merge() {
        let mut first = ValidationErrors::from(ValidationError::new("field1", "Error 1"));
        let mut second = ValidationErrors::new();
        second.add(ValidationError::new("field2", "Error 2"));
        second.add(ValidationError::new("field1", "Error 3"));

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get_field_errors("field1").unwrap().len(), 2);
    }

    #[test]
    fn test_display() {
        let errors = ValidationErrors::from(ValidationError::with_code("title", "is required", "required"));
        assert_eq!(errors.to_string(), "Validation failed for 1 field(s):\n  title: is required");
    }
}
