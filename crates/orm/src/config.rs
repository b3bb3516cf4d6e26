//! Mapper configuration shared by a registry and the schemas it builds

use serde::{Deserialize, Serialize};

use crate::error::OrmResult;

/// Configuration for schemas and their formatters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    /// Whether new schemas reject undeclared fields
    pub locked: bool,
    /// Export format for `date` columns
    pub date_format: String,
    /// Export format for `datetime` columns
    pub datetime_format: String,
    /// Precision used for `decimal` columns that don't declare one
    pub decimal_precision: u32,
    /// Primary key name used when a schema doesn't declare one
    pub primary_key: String,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            locked: true,
            date_format: "%Y-%m-%d".to_string(),
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            decimal_precision: 2,
            primary_key: "id".to_string(),
        }
    }
}

impl OrmConfig {
    /// Load a configuration from a JSON document, missing keys keep their defaults
    pub fn from_json(source: &str) -> OrmResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Load a configuration from a YAML document, missing keys keep their defaults
    pub fn from_yaml(source: &str) -> OrmResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Builder-style override of the locked flag
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }
}
