//! Type formatters per mode
//!
//! Three modes are known: `cast` turns raw data into typed values,
//! `array` exports typed values to plain data and `datasource` prepares
//! them for the backend. Each mode maps a column type to a formatter, with
//! `_default_` as the fallback.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use std::sync::Arc;

use super::column::Column;
use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Converts a value of a column
pub type Formatter = Arc<dyn Fn(&Value, &Column) -> OrmResult<Value> + Send + Sync>;

/// Fallback type key
pub const DEFAULT_TYPE: &str = "_default_";

/// Formatters indexed by mode, then by type
#[derive(Clone, Default)]
pub struct Formatters {
    modes: IndexMap<String, IndexMap<String, Formatter>>,
}

impl Formatters {
    /// The built-in formatters
    pub fn builtin(config: &OrmConfig) -> Self {
        let mut formatters = Self::default();

        let identity = |value: &Value, _: &Column| Ok(value.clone());
        for mode in ["cast", "array", "datasource"] {
            formatters.set(mode, DEFAULT_TYPE, identity);
        }

        formatters.set("cast", "integer", |value, _| Ok(to_integer(value)));
        formatters.set("cast", "serial", |value, _| Ok(to_integer(value)));
        formatters.set("cast", "id", |value, _| Ok(to_id(value)));
        formatters.set("cast", "float", |value, _| Ok(to_float(value)));
        formatters.set("cast", "decimal", |value, _| Ok(to_float(value)));
        formatters.set("cast", "boolean", |value, _| Ok(to_boolean(value)));
        formatters.set("cast", "date", |value, _| Ok(to_date(value)));
        formatters.set("cast", "datetime", |value, _| Ok(to_date(value)));
        formatters.set("cast", "null", |_, _| Ok(Value::Null));
        formatters.set("cast", "string", |value, _| Ok(to_string(value)));
        formatters.set("cast", "json", |value, _| match value {
            Value::String(raw) => Ok(serde_json::from_str::<serde_json::Value>(raw)
                .map(Value::from)
                .unwrap_or_else(|_| value.clone())),
            _ => Ok(value.clone()),
        });

        let precision = config.decimal_precision;
        for mode in ["array", "datasource"] {
            let date_format = config.date_format.clone();
            formatters.set(mode, "date", move |value, column| {
                export_date(value, column.format.as_deref().unwrap_or(&date_format))
            });
            let datetime_format = config.datetime_format.clone();
            formatters.set(mode, "datetime", move |value, column| {
                export_date(value, column.format.as_deref().unwrap_or(&datetime_format))
            });
            formatters.set(mode, "decimal", move |value, column| {
                Ok(match to_float(value) {
                    Value::Float(number) => {
                        let digits = column.precision.unwrap_or(precision) as usize;
                        Value::String(format!("{number:.digits$}"))
                    }
                    other => other,
                })
            });
        }
        formatters.set("datasource", "boolean", |value, _| Ok(to_boolean(value)));
        formatters.set("datasource", "json", |value, _| match value {
            Value::Null | Value::String(_) => Ok(value.clone()),
            other => Ok(Value::String(other.to_json().to_string())),
        });

        formatters
    }

    pub fn set<F>(&mut self, mode: &str, kind: &str, formatter: F)
    where
        F: Fn(&Value, &Column) -> OrmResult<Value> + Send + Sync + 'static,
    {
        self.modes
            .entry(mode.to_string())
            .or_default()
            .insert(kind.to_string(), Arc::new(formatter));
    }

    /// Formatter for `kind` in `mode`, falling back to the mode default
    pub fn get(&self, mode: &str, kind: &str) -> Option<Formatter> {
        let formatters = self.modes.get(mode)?;
        formatters
            .get(kind)
            .or_else(|| formatters.get(DEFAULT_TYPE))
            .cloned()
    }

    pub fn modes(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }
}

fn leading_number(raw: &str, allow_fraction: bool) -> Option<&str> {
    let raw = raw.trim();
    let bytes = raw.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end = 1;
    }
    let digits_start = end;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if allow_fraction && !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    let digits = &raw[digits_start..end];
    if digits.is_empty() || digits == "." {
        None
    } else {
        Some(&raw[..end])
    }
}

/// Integer coercion reading the leading digits of strings
pub fn to_integer(value: &Value) -> Value {
    match value {
        Value::Integer(_) | Value::Null => value.clone(),
        Value::Float(number) if number.is_finite() => Value::Integer(number.trunc() as i64),
        Value::Bool(flag) => Value::Integer(i64::from(*flag)),
        Value::String(raw) => leading_number(raw, false)
            .and_then(|digits| digits.parse::<i64>().ok())
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        Value::Date(date) => Value::Integer(date.timestamp()),
        _ => Value::Null,
    }
}

/// Float coercion reading the leading number of strings
pub fn to_float(value: &Value) -> Value {
    match value {
        Value::Float(_) | Value::Null => value.clone(),
        Value::Integer(number) => Value::Float(*number as f64),
        Value::Bool(flag) => Value::Float(if *flag { 1.0 } else { 0.0 }),
        Value::String(raw) => leading_number(raw, true)
            .and_then(|digits| digits.parse::<f64>().ok())
            .map(Value::Float)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Truthiness, numeric strings compare against zero
pub fn to_boolean(value: &Value) -> Value {
    match value {
        Value::Bool(_) | Value::Null => value.clone(),
        Value::Integer(number) => Value::Bool(*number != 0),
        Value::Float(number) => Value::Bool(*number != 0.0),
        Value::String(raw) => match raw.trim().parse::<f64>() {
            Ok(number) => Value::Bool(number != 0.0),
            Err(_) => Value::Bool(!raw.is_empty()),
        },
        _ => Value::Bool(true),
    }
}

/// Identifier coercion, numeric strings become integers
fn to_id(value: &Value) -> Value {
    match value {
        Value::String(raw) => match raw.parse::<i64>() {
            Ok(number) => Value::Integer(number),
            Err(_) => value.clone(),
        },
        Value::Float(number) if number.fract() == 0.0 => Value::Integer(*number as i64),
        _ => value.clone(),
    }
}

pub fn to_string(value: &Value) -> Value {
    match value {
        Value::Null | Value::String(_) => value.clone(),
        Value::Bool(flag) => Value::String(flag.to_string()),
        Value::Integer(number) => Value::String(number.to_string()),
        Value::Float(number) => Value::String(number.to_string()),
        Value::Date(date) => Value::String(date.to_rfc3339()),
        other => Value::String(other.to_json().to_string()),
    }
}

/// Parse a date from a string or a unix timestamp
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(date) => Some(*date),
        Value::Integer(seconds) => Utc.timestamp_opt(*seconds, 0).single(),
        Value::String(raw) => {
            let raw = raw.trim();
            DateTime::parse_from_rfc3339(raw)
                .map(|date| date.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc())
                })
        }
        _ => None,
    }
}

fn to_date(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        other => parse_date(other).map(Value::Date).unwrap_or(Value::Null),
    }
}

fn export_date(value: &Value, format: &str) -> OrmResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        other => parse_date(other)
            .map(|date| Value::String(date.format(format).to_string()))
            .ok_or_else(|| OrmError::InvalidDate(other.to_json().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(formatters: &Formatters, mode: &str, kind: &str, value: Value) -> OrmResult<Value> {
        let column = Column::new(kind);
        let formatter = formatters.get(mode, kind).unwrap();
        formatter(&value, &column)
    }

    #[test]
    fn test_numeric_casts() {
        let formatters = Formatters::builtin(&OrmConfig::default());
        assert_eq!(convert(&formatters, "cast", "float", "8.9".into()).unwrap(), Value::Float(8.9));
        assert_eq!(convert(&formatters, "cast", "integer", "42px".into()).unwrap(), Value::Integer(42));
        assert_eq!(convert(&formatters, "cast", "integer", "abc".into()).unwrap(), Value::Null);
        assert_eq!(convert(&formatters, "cast", "integer", 3.7.into()).unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_boolean_cast() {
        let formatters = Formatters::builtin(&OrmConfig::default());
        assert_eq!(convert(&formatters, "cast", "boolean", "0".into()).unwrap(), Value::Bool(false));
        assert_eq!(convert(&formatters, "cast", "boolean", "1".into()).unwrap(), Value::Bool(true));
        assert_eq!(convert(&formatters, "cast", "boolean", "".into()).unwrap(), Value::Bool(false));
        assert_eq!(convert(&formatters, "cast", "boolean", "yes".into()).unwrap(), Value::Bool(true));
        assert_eq!(convert(&formatters, "cast", "boolean", 0.into()).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_dates() {
        let formatters = Formatters::builtin(&OrmConfig::default());
        let date = convert(&formatters, "cast", "date", "2014-11-21".into()).unwrap();
        assert!(date.as_date().is_some());
        assert_eq!(convert(&formatters, "cast", "date", "not a date".into()).unwrap(), Value::Null);

        let exported = convert(&formatters, "array", "date", date).unwrap();
        assert_eq!(exported, Value::from("2014-11-21"));

        let stamp = convert(&formatters, "array", "datetime", Value::Integer(0)).unwrap();
        assert_eq!(stamp, Value::from("1970-01-01 00:00:00"));

        let err = convert(&formatters, "array", "date", "garbage".into()).unwrap_err();
        assert!(matches!(err, OrmError::InvalidDate(_)));
    }

    #[test]
    fn test_decimal_export_and_json() {
        let formatters = Formatters::builtin(&OrmConfig::default());
        assert_eq!(convert(&formatters, "array", "decimal", 1.5.into()).unwrap(), Value::from("1.50"));

        let parsed = convert(&formatters, "cast", "json", r#"{"a":[1]}"#.into()).unwrap();
        assert_eq!(parsed.to_json(), serde_json::json!({"a": [1]}));
        let stored = convert(&formatters, "datasource", "json", parsed).unwrap();
        assert_eq!(stored, Value::from(r#"{"a":[1]}"#));
    }

    #[test]
    fn test_default_fallback() {
        let formatters = Formatters::builtin(&OrmConfig::default());
        assert_eq!(convert(&formatters, "array", "custom", "x".into()).unwrap(), Value::from("x"));
        assert!(formatters.get("unknown", "integer").is_none());
    }
}
