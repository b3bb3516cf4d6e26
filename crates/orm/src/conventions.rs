//! Naming conventions
//!
//! A convention set maps a rule name (`source`, `key`, `reference`,
//! `references`, `field`, `multiple`, `single`) to a pure naming function.
//! Schemas and relationships use it to derive source names, default
//! relation names and foreign key columns that were not configured.

use heck::ToSnakeCase;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{OrmError, OrmResult};

/// A single naming rule
pub type Convention = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Named set of naming rules
#[derive(Clone)]
pub struct Conventions {
    rules: IndexMap<String, Convention>,
}

impl fmt::Debug for Conventions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conventions")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Conventions {
    fn default() -> Self {
        let mut conventions = Self::empty();
        conventions.set("source", |name| name.to_snake_case());
        conventions.set("key", |_| "id".to_string());
        conventions.set("reference", |name| format!("{}_id", singular(&name.to_snake_case())));
        conventions.set("references", |name| format!("{}_ids", singular(&name.to_snake_case())));
        conventions.set("field", |name| singular(&name.to_snake_case()));
        conventions.set("multiple", plural);
        conventions.set("single", singular);
        conventions
    }
}

impl Conventions {
    /// A convention set without any rule
    pub fn empty() -> Self {
        Self {
            rules: IndexMap::new(),
        }
    }

    /// Define or override a rule
    pub fn set<F>(&mut self, name: impl Into<String>, rule: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.rules.insert(name.into(), Arc::new(rule));
        self
    }

    /// Get a rule by name
    pub fn get(&self, name: &str) -> OrmResult<Convention> {
        self.rules
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownConvention(name.to_string()))
    }

    /// Apply a rule to a value
    pub fn apply(&self, name: &str, value: &str) -> OrmResult<String> {
        let rule = self
            .rules
            .get(name)
            .ok_or_else(|| OrmError::UnknownConvention(name.to_string()))?;
        Ok(rule(value))
    }

    /// Names of the defined rules
    pub fn names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }
}

fn plural(word: &str) -> String {
    pluralizer::pluralize(word, 2, false)
}

fn singular(word: &str) -> String {
    pluralizer::pluralize(word, 1, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let conventions = Conventions::default();
        assert_eq!(conventions.apply("source", "ImageTag").unwrap(), "image_tag");
        assert_eq!(conventions.apply("key", "Gallery").unwrap(), "id");
        assert_eq!(conventions.apply("reference", "Gallery").unwrap(), "gallery_id");
        assert_eq!(conventions.apply("references", "Tags").unwrap(), "tag_ids");
        assert_eq!(conventions.apply("field", "Images").unwrap(), "image");
        assert_eq!(conventions.apply("multiple", "image").unwrap(), "images");
        assert_eq!(conventions.apply("single", "galleries").unwrap(), "gallery");
    }

    #[test]
    fn test_unknown_convention() {
        let conventions = Conventions::default();
        assert_eq!(
            conventions.apply("plural", "image").unwrap_err(),
            OrmError::UnknownConvention("plural".into())
        );
        assert!(Conventions::empty().get("key").is_err());
    }

    #[test]
    fn test_override_rule() {
        let mut conventions = Conventions::default();
        conventions.set("key", |name| format!("{}_key", name.to_snake_case()));
        assert_eq!(conventions.apply("key", "Gallery").unwrap(), "gallery_key");
        assert_eq!(conventions.names().len(), 7);
    }
}
