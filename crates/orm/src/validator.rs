//! Pluggable validation
//!
//! A validator is registered per model on the [`Registry`](crate::registry::Registry).
//! It receives the exported data of an entity and reports messages per
//! field. A failed validation is an outcome, not an error.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::OrmResult;
use crate::model::ValidateOptions;

/// Per-field messages of a validation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub errors: IndexMap<String, Vec<String>>,
}

impl ValidationOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a message for `field`
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, data: &serde_json::Value, options: &ValidateOptions) -> OrmResult<ValidationOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome() {
        let mut outcome = ValidationOutcome::success();
        assert!(outcome.is_success());
        outcome.add("title", "is required");
        outcome.add("title", "is too short");
        assert!(!outcome.is_success());
        assert_eq!(outcome.errors["title"].len(), 2);
    }
}
