//! Rule-based validator for models

use async_trait::async_trait;
use docweave_orm::{OrmResult, ValidateOptions, ValidationOutcome, Validator};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{RuleError, ValidationErrors, ValidationResult};
use crate::rules::{lookup, Rule};

/// Rules per field, checked in declaration order. The errors of the last
/// run are kept and can be read back with [`RuleValidator::errors`].
#[derive(Debug, Default)]
pub struct RuleValidator {
    rules: IndexMap<String, Vec<Rule>>,
    errors: Mutex<ValidationErrors>,
}

impl RuleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named rule on `field`, a dotted path into the data
    pub fn rule(self, field: impl Into<String>, spec: &str) -> Result<Self, RuleError> {
        Ok(self.with(field, Rule::parse(spec)?))
    }

    /// Add an already built rule
    pub fn with(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.rules.entry(field.into()).or_default().push(rule);
        self
    }

    /// Add a predicate on `field`, `message` is reported when it fails
    pub fn custom<F>(self, field: impl Into<String>, name: &str, message: &str, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.with(field, Rule::custom(name, message, check))
    }

    /// Fields with at least one rule
    pub fn fields(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    fn run(&self, data: &Value) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for (field, rules) in &self.rules {
            let value = lookup(data, field);
            for rule in rules {
                if let Err(error) = rule.check(field, value) {
                    errors.add(error);
                }
            }
        }
        *self.errors.lock() = errors.clone();
        errors
    }

    /// Check `data` against every rule
    pub fn validate(&self, data: &Value) -> bool {
        self.run(data).is_empty()
    }

    pub fn check(&self, data: &Value) -> ValidationResult<()> {
        let errors = self.run(data);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Errors of the last run
    pub fn errors(&self) -> ValidationErrors {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl Validator for RuleValidator {
    async fn validate(&self, data: &Value, _options: &ValidateOptions) -> OrmResult<ValidationOutcome> {
        Ok(ValidationOutcome {
            errors: self.run(data).messages(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn validator() -> RuleValidator {
        RuleValidator::new()
            .rule("title", "required")
            .and_then(|v| v.rule("title", "length:3,20"))
            .and_then(|v| v.rule("author.email", "email"))
            .unwrap()
    }

    #[test]
    fn test_validate() {
        let validator = validator();
        assert!(validator.validate(&json!({"title": "Rust", "author": {"email": "a@b.io"}})));
        assert!(validator.errors().is_empty());

        assert!(!validator.validate(&json!({"title": "ab", "author": {"email": "nope"}})));
        let errors = validator.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get_field_errors("title").unwrap()[0].code, "length");
        assert!(errors.has_field_errors("author.email"));
    }

    #[test]
    fn test_missing_optional_field() {
        let validator = validator();
        assert!(validator.check(&json!({"title": "Rust"})).is_ok());
        let errors = validator.check(&json!({})).unwrap_err();
        assert_eq!(errors.messages()["title"], vec!["title is required".to_string()]);
    }

    #[test]
    fn test_unknown_rule() {
        let err = RuleValidator::new().rule("title", "uppercase").unwrap_err();
        assert_eq!(err, RuleError::UnknownRule("uppercase".into()));
    }

    #[tokio::test]
    async fn test_orm_validator() {
        let validator = RuleValidator::new().custom("count", "even", "count must be even", |value| {
            value.as_i64().is_some_and(|n| n % 2 == 0)
        });
        let outcome = Validator::validate(&validator, &json!({"count": 3}), &ValidateOptions::default())
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.errors["count"], vec!["count must be even".to_string()]);
    }
}
