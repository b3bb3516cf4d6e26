//! Named validation rules
//!
//! Rules are written the way they are registered on a validator:
//! `required`, `length:3,20`, `in:draft,published`, `pattern:^[a-z]+$`.
//! Every rule except `required` lets a missing or null value through.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{RuleError, ValidationError};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._%+-]*[a-zA-Z0-9])?@[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?\.[a-zA-Z]{2,}$")
        .expect("email pattern is valid")
});

/// Predicate used by custom rules
pub type CustomCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Rule {
    Required,
    NotEmpty,
    Email,
    Numeric,
    Integer,
    Boolean,
    /// Length of a string (in characters) or of a list
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Min(f64),
    Max(f64),
    In(Vec<String>),
    Pattern(Regex),
    Custom {
        name: String,
        message: String,
        check: CustomCheck,
    },
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Length { min, max } => f.debug_struct("Length").field("min", min).field("max", max).finish(),
            Rule::Min(n) => f.debug_tuple("Min").field(n).finish(),
            Rule::Max(n) => f.debug_tuple("Max").field(n).finish(),
            Rule::In(values) => f.debug_tuple("In").field(values).finish(),
            Rule::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Rule::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl Rule {
    /// Build a rule from its textual form, `name` or `name:arguments`
    pub fn parse(spec: &str) -> Result<Self, RuleError> {
        let (name, argument) = match spec.split_once(':') {
            Some((name, argument)) => (name.trim(), Some(argument)),
            None => (spec.trim(), None),
        };
        let invalid = |argument: &str| RuleError::InvalidArgument {
            rule: name.to_string(),
            argument: argument.to_string(),
        };

        let rule = match (name, argument) {
            ("required", None) => Rule::Required,
            ("not_empty", None) => Rule::NotEmpty,
            ("email", None) => Rule::Email,
            ("numeric", None) => Rule::Numeric,
            ("integer", None) => Rule::Integer,
            ("boolean", None) => Rule::Boolean,
            ("length", Some(argument)) => {
                let (min, max) = argument.split_once(',').unwrap_or((argument, ""));
                let bound = |text: &str| -> Result<Option<usize>, RuleError> {
                    let text = text.trim();
                    if text.is_empty() {
                        return Ok(None);
                    }
                    text.parse().map(Some).map_err(|_| invalid(argument))
                };
                let (min, max) = (bound(min)?, bound(max)?);
                if min.is_none() && max.is_none() {
                    return Err(invalid(argument));
                }
                Rule::Length { min, max }
            }
            ("min", Some(argument)) => Rule::Min(argument.trim().parse().map_err(|_| invalid(argument))?),
            ("max", Some(argument)) => Rule::Max(argument.trim().parse().map_err(|_| invalid(argument))?),
            ("in", Some(argument)) => Rule::In(argument.split(',').map(|value| value.trim().to_string()).collect()),
            ("pattern", Some(argument)) => Rule::Pattern(Regex::new(argument).map_err(|e| RuleError::InvalidPattern {
                pattern: argument.to_string(),
                reason: e.to_string(),
            })?),
            ("required" | "not_empty" | "email" | "numeric" | "integer" | "boolean", Some(argument)) => {
                return Err(invalid(argument))
            }
            ("length" | "min" | "max" | "in" | "pattern", None) => return Err(invalid("")),
            _ => return Err(RuleError::UnknownRule(name.to_string())),
        };
        Ok(rule)
    }

    pub fn custom<F>(name: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Rule::Custom {
            name: name.into(),
            message: message.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::Required => "required",
            Rule::NotEmpty => "not_empty",
            Rule::Email => "email",
            Rule::Numeric => "numeric",
            Rule::Integer => "integer",
            Rule::Boolean => "boolean",
            Rule::Length { .. } => "length",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::In(_) => "in",
            Rule::Pattern(_) => "pattern",
            Rule::Custom { name, .. } => name,
        }
    }

    /// Check `value`, the value of `field` or `None` when absent
    pub fn check(&self, field: &str, value: Option<&Value>) -> Result<(), ValidationError> {
        let value = match value {
            Some(value) if !value.is_null() => value,
            _ if matches!(self, Rule::Required) => return Err(self.error(field, format!("{} is required", field))),
            _ => return Ok(()),
        };

        let message = match self {
            Rule::Required => None,
            Rule::NotEmpty => is_empty(value).then(|| format!("{} must not be empty", field)),
            Rule::Email => (!value.as_str().is_some_and(|s| EMAIL.is_match(s)))
                .then(|| format!("{} must be a valid email address", field)),
            Rule::Numeric => number(value).is_none().then(|| format!("{} must be numeric", field)),
            Rule::Integer => (!is_integer(value)).then(|| format!("{} must be an integer", field)),
            Rule::Boolean => (!value.is_boolean()).then(|| format!("{} must be a boolean", field)),
            Rule::Length { min, max } => match length(value) {
                None => Some(format!("{} must be a string or a list", field)),
                Some(len) => {
                    let short = min.is_some_and(|min| len < min);
                    let long = max.is_some_and(|max| len > max);
                    (short || long).then(|| match (min, max) {
                        (Some(min), Some(max)) => format!("{} must be between {} and {} long", field, min, max),
                        (Some(min), None) => format!("{} must be at least {} long", field, min),
                        (None, Some(max)) => format!("{} must be at most {} long", field, max),
                        (None, None) => format!("{} has an invalid length", field),
                    })
                }
            },
            Rule::Min(min) => match number(value) {
                Some(n) if n >= *min => None,
                Some(_) => Some(format!("{} must be at least {}", field, min)),
                None => Some(format!("{} must be numeric", field)),
            },
            Rule::Max(max) => match number(value) {
                Some(n) if n <= *max => None,
                Some(_) => Some(format!("{} must be at most {}", field, max)),
                None => Some(format!("{} must be numeric", field)),
            },
            Rule::In(allowed) => {
                let found = scalar(value).is_some_and(|text| allowed.contains(&text));
                (!found).then(|| format!("{} must be one of: {}", field, allowed.join(", ")))
            }
            Rule::Pattern(regex) => (!value.as_str().is_some_and(|s| regex.is_match(s)))
                .then(|| format!("{} does not match the expected format", field)),
            Rule::Custom { message, check, .. } => (!check(value)).then(|| message.clone()),
        };

        match message {
            Some(message) => Err(self.error(field, message)),
            None => Ok(()),
        }
    }

    fn error(&self, field: &str, message: String) -> ValidationError {
        ValidationError::with_code(field, message, self.name())
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Value at a dotted path, list entries are addressed by index
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(fields) => fields.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}
