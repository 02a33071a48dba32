//! Field normalization: machine names and settings flattening.
//!
//! The machine name is the data-capture key of a field. It is derived at write
//! time and only changes when the field is re-saved with a different label.

use serde_json::{Map, Value};

use crate::settings::{FieldSettings, FieldType};

/// Settings keys that map onto the `placeholder` column.
const PLACEHOLDER_KEYS: &[&str] = &["placeholder"];
/// Settings keys that map onto the `help_text` column.
const HELP_TEXT_KEYS: &[&str] = &["description", "helpText", "help_text"];
/// Settings keys that map onto the `help_image` column.
const HELP_IMAGE_KEYS: &[&str] = &["helpImageUrl", "help_image_url", "helpImage", "help_image"];

/// Derive the canonical machine name: trim, upper-case, and collapse each
/// whitespace run into a single underscore.
pub fn machine_name(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Column values pulled out of a client settings document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedSettings {
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub help_image: Option<String>,
    pub settings: FieldSettings,
}

/// Split a client settings document into dedicated columns and the remaining
/// typed settings document.
///
/// Dedicated keys are removed from the document; blank string values map to
/// `None`. Everything else is interpreted per [`FieldType`].
pub fn flatten_settings(
    field_type: &FieldType,
    mut doc: Map<String, Value>,
) -> Result<FlattenedSettings, String> {
    let placeholder = take_text(&mut doc, PLACEHOLDER_KEYS)?;
    let help_text = take_text(&mut doc, HELP_TEXT_KEYS)?;
    let help_image = take_text(&mut doc, HELP_IMAGE_KEYS)?;
    let settings = FieldSettings::from_document(field_type, doc)?;
    Ok(FlattenedSettings {
        placeholder,
        help_text,
        help_image,
        settings,
    })
}

/// Remove every alias of a column from the document, returning the first
/// non-blank value in alias order.
fn take_text(doc: &mut Map<String, Value>, keys: &[&str]) -> Result<Option<String>, String> {
    let mut found = None;
    for key in keys {
        match doc.remove(*key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if found.is_none() && !trimmed.is_empty() {
                    found = Some(trimmed.to_string());
                }
            }
            Some(other) => return Err(format!("{} must be a string, got {}", key, other)),
        }
    }
    Ok(found)
}
