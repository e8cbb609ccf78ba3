use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::wizard::documents::DocumentSet;

/// Current values for every field of a wizard, keyed by field name.
pub type WizardState = BTreeMap<String, FieldValue>;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Documents(DocumentSet),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Numbers, or text that parses as one (after dropping thousands separators).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(text) => text.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_documents(&self) -> Option<&DocumentSet> {
        match self {
            FieldValue::Documents(set) => Some(set),
            _ => None,
        }
    }

    /// Whether the value counts as "not provided".
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Number(value) => value.is_nan(),
            FieldValue::Bool(_) => false,
            FieldValue::Documents(set) => set.is_empty(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.trim().to_string()),
            FieldValue::Number(value) => number_to_json(*value),
            FieldValue::Bool(value) => Value::Bool(*value),
            FieldValue::Documents(set) => {
                let mut object = Map::new();
                for (slot, file) in set.iter() {
                    object.insert(slot.key().to_string(), Value::String(file.name.clone()));
                }
                Value::Object(object)
            }
        }
    }

    /// Short human-readable rendering.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Number(value) => format_amount(*value),
            FieldValue::Bool(true) => "yes".into(),
            FieldValue::Bool(false) => "no".into(),
            FieldValue::Documents(set) => format!("{} of 4 documents", set.len()),
        }
    }
}

fn number_to_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub fn format_amount(value: f64) -> String {
    if (value.fract()).abs() < f64::EPSILON {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DocumentSet> for FieldValue {
    fn from(value: DocumentSet) -> Self {
        FieldValue::Documents(value)
    }
}
