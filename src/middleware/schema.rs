//! Declarative options schemas for middleware types.
//!
//! An [`OptionsSchema`] lists the keys a middleware accepts, their types,
//! whether they are required, and optional enum or regex constraints.
//! Options are first [coerced](OptionsSchema::coerce) (label-sourced
//! options arrive as strings) and then [validated](OptionsSchema::validate)
//! before the typed options model is deserialized.

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Integer,
    StringList,
    StringMap,
    /// A string that must compile as a regular expression.
    Regex,
}

impl FieldKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Bool => "a boolean",
            Self::Integer => "an integer",
            Self::StringList => "a list of strings",
            Self::StringMap => "a map of strings",
            Self::Regex => "a regular expression",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub one_of: &'static [&'static str],
    pub pattern: Option<&'static str>,
}

impl Field {
    #[must_use]
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            one_of: &[],
            pattern: None,
        }
    }

    #[must_use]
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            one_of: &[],
            pattern: None,
        }
    }

    #[must_use]
    pub const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = values;
        self
    }

    /// Every string (or list item) must match `pattern`.
    #[must_use]
    pub const fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptionsSchema {
    fields: Vec<Field>,
}

impl OptionsSchema {
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Convert string values to the declared type where that is
    /// unambiguous. `null` becomes an empty map. Anything that does not
    /// convert is left alone for [`validate`](Self::validate) to report.
    #[must_use]
    pub fn coerce(&self, options: Value) -> Value {
        let mut map = match options {
            Value::Null => return Value::Object(Map::new()),
            Value::Object(map) => map,
            other => return other,
        };

        for (key, value) in &mut map {
            let Some(field) = self.field(key) else {
                continue;
            };
            let Value::String(ref s) = *value else {
                continue;
            };
            let coerced = match field.kind {
                FieldKind::Bool => match s.trim() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                FieldKind::Integer => s.trim().parse::<i64>().ok().map(Value::from),
                FieldKind::StringList => Some(Value::Array(
                    s.split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(|item| Value::String(item.to_string()))
                        .collect(),
                )),
                FieldKind::String | FieldKind::StringMap | FieldKind::Regex => None,
            };
            if let Some(coerced) = coerced {
                *value = coerced;
            }
        }

        Value::Object(map)
    }

    pub fn validate(&self, scope: &str, options: &Value) -> Result<(), Vec<ValidationError>> {
        let empty = Map::new();
        let map = match options {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(vec![ValidationError::new(
                    scope,
                    "options",
                    "options must be a map",
                )]);
            }
        };

        let mut errors = Vec::new();

        for key in map.keys() {
            if self.field(key).is_none() {
                let known: Vec<&str> = self.fields.iter().map(|f| f.name).collect();
                let error = ValidationError::new(scope, format!("options.{key}"), "unknown option");
                errors.push(if known.is_empty() {
                    error
                } else {
                    error.with_suggestion(format!("expected one of: {}", known.join(", ")))
                });
            }
        }

        for field in &self.fields {
            let field_path = format!("options.{}", field.name);
            match map.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(ValidationError::new(scope, &field_path, "required option is missing"));
                    }
                }
                Some(value) => {
                    if let Err(message) = check_value(field, value) {
                        errors.push(ValidationError::new(scope, &field_path, message));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_value(field: &Field, value: &Value) -> Result<(), String> {
    let type_error = || format!("expected {}", field.kind.describe());

    match field.kind {
        FieldKind::String => check_string(field, value.as_str().ok_or_else(type_error)?),
        FieldKind::Regex => {
            let s = value.as_str().ok_or_else(type_error)?;
            Regex::new(s).map_err(|e| format!("invalid regular expression: {e}"))?;
            check_string(field, s)
        }
        FieldKind::Bool => value.as_bool().map(|_| ()).ok_or_else(type_error),
        FieldKind::Integer => value.as_i64().map(|_| ()).ok_or_else(type_error),
        FieldKind::StringList => {
            let items = value.as_array().ok_or_else(type_error)?;
            for item in items {
                check_string(field, item.as_str().ok_or_else(type_error)?)?;
            }
            Ok(())
        }
        FieldKind::StringMap => {
            let map = value.as_object().ok_or_else(type_error)?;
            if map.values().all(Value::is_string) {
                Ok(())
            } else {
                Err(type_error())
            }
        }
    }
}

fn check_string(field: &Field, s: &str) -> Result<(), String> {
    if !field.one_of.is_empty() && !field.one_of.contains(&s) {
        return Err(format!(
            "'{s}' is not one of: {}",
            field.one_of.join(", ")
        ));
    }
    if let Some(pattern) = field.pattern {
        let re = Regex::new(pattern).map_err(|e| format!("bad schema pattern: {e}"))?;
        if !re.is_match(s) {
            return Err(format!("'{s}' does not match {pattern}"));
        }
    }
    Ok(())
}
