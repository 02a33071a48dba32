//! Field types and the per-type settings document.
//!
//! The `settings` column is schema-free JSONB. On the Rust side it is a tagged
//! variant keyed by [`FieldType`]: known types get a typed payload, anything
//! else falls back to an opaque key/value bag. Keys a typed payload does not
//! recognise are kept in its `extra` map so nothing a client stores is lost.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Date,
    Select,
    Radio,
    Checkbox,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::Other(s) => s,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio | FieldType::Checkbox)
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Ok(match lowered.as_str() {
            "" => return Err("field type must not be empty".to_string()),
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "number" => FieldType::Number,
            "date" => FieldType::Date,
            "select" => FieldType::Select,
            "radio" => FieldType::Radio,
            "checkbox" => FieldType::Checkbox,
            _ => FieldType::Other(lowered),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSettings {
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSettings {
    #[serde(default, rename = "maxLength", alias = "max_length", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSettings {
    Choice(ChoiceSettings),
    Numeric(NumericSettings),
    Text(TextSettings),
    Opaque(Map<String, Value>),
}

impl Default for FieldSettings {
    fn default() -> Self {
        FieldSettings::Opaque(Map::new())
    }
}

impl FieldSettings {
    /// Interpret a settings document for the given field type.
    pub fn from_document(field_type: &FieldType, doc: Map<String, Value>) -> Result<Self, String> {
        let value = Value::Object(doc);
        let settings = match field_type {
            t if t.is_choice() => FieldSettings::Choice(
                serde_json::from_value(value).map_err(|e| format!("invalid choice settings: {}", e))?,
            ),
            FieldType::Number => FieldSettings::Numeric(
                serde_json::from_value(value).map_err(|e| format!("invalid number settings: {}", e))?,
            ),
            FieldType::Text | FieldType::Textarea => FieldSettings::Text(
                serde_json::from_value(value).map_err(|e| format!("invalid text settings: {}", e))?,
            ),
            _ => match value {
                Value::Object(map) => FieldSettings::Opaque(map),
                _ => FieldSettings::default(),
            },
        };
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), String> {
        match self {
            FieldSettings::Choice(c) => {
                if let Some(i) = c.options.iter().position(|o| o.value.is_null()) {
                    return Err(format!("options[{}].value is required", i));
                }
            }
            FieldSettings::Numeric(n) => {
                if let (Some(min), Some(max)) = (n.min, n.max) {
                    if min > max {
                        return Err(format!("min ({}) must not exceed max ({})", min, max));
                    }
                }
            }
            FieldSettings::Text(_) | FieldSettings::Opaque(_) => {}
        }
        Ok(())
    }

    /// Serialize back to the persisted JSON document.
    pub fn to_document(&self) -> Value {
        let result = match self {
            FieldSettings::Choice(c) => serde_json::to_value(c),
            FieldSettings::Numeric(n) => serde_json::to_value(n),
            FieldSettings::Text(t) => serde_json::to_value(t),
            FieldSettings::Opaque(map) => return Value::Object(map.clone()),
        };
        result.unwrap_or_else(|_| Value::Object(Map::new()))
    }
}
