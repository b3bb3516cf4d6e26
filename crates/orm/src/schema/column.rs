//! Column definitions

use std::fmt;
use std::sync::Arc;

use crate::document::Document;
use crate::value::Value;

/// Computes the value read from a field
pub type Getter = Arc<dyn Fn(&Document, Value) -> Value + Send + Sync>;

/// Transforms raw data before it's cast into a field
pub type Setter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Definition of a single (possibly dotted) field
#[derive(Clone)]
pub struct Column {
    pub kind: String,
    pub array: bool,
    pub nullable: bool,
    pub default: Option<Value>,
    pub length: Option<usize>,
    pub precision: Option<u32>,
    pub is_virtual: bool,
    pub private: bool,
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
    /// Export format overriding the configured one (dates)
    pub format: Option<String>,
}

impl Column {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            array: false,
            nullable: false,
            default: None,
            length: None,
            precision: None,
            is_virtual: false,
            private: false,
            getter: None,
            setter: None,
            format: None,
        }
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Computed field, never sent to the datasource
    pub fn virtual_field(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Field left out of exports
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Document, Value) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Whether values of this column are nested documents
    pub fn is_object(&self) -> bool {
        self.kind == "object"
    }
}

impl From<&str> for Column {
    fn from(kind: &str) -> Self {
        Column::new(kind)
    }
}

impl From<String> for Column {
    fn from(kind: String) -> Self {
        Column::new(kind)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("kind", &self.kind)
            .field("array", &self.array)
            .field("nullable", &self.nullable)
            .field("default", &self.default)
            .field("virtual", &self.is_virtual)
            .field("private", &self.private)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}
