// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Requirements form normalisation
//
// The agent platform describes its input form as a loosely shaped list
// (`user_input_form`) whose entries come in two layouts and whose labels may
// be plain strings or per-locale maps. This module reduces that to one flat,
// typed field list the client can render, and sanitises the answers sent
// back with every chat turn.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Locale keys tried in order when a label is a per-locale map.
const PREFERRED_LOCALES: &[&str] = &["zh_Hans", "zh_CN", "zh", "en_US", "en"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    TextInput,
    SecretInput,
    Paragraph,
    Number,
    Select,
    Options,
    Radio,
    Switch,
}

impl FieldType {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "text-input" => Self::TextInput,
            "secret-input" => Self::SecretInput,
            "paragraph" => Self::Paragraph,
            "number" => Self::Number,
            "select" => Self::Select,
            "options" => Self::Options,
            "radio" => Self::Radio,
            "switch" => Self::Switch,
            _ => return None,
        })
    }

    /// Whether the field offers a fixed list of choices.
    pub fn has_options(self) -> bool {
        matches!(self, Self::Select | Self::Options | Self::Radio)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormOption {
    pub label: String,
    pub value: String,
}

/// A field's default: a flag for switches, text for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub variable: String,
    pub required: bool,
    pub default_value: DefaultValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FormOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// Normalised agent parameters, as served to chat clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentParameters {
    #[serde(default)]
    pub user_input_form: Vec<FormField>,
    #[serde(default)]
    pub opening_statement: Option<String>,
}

/// Form answers sent with each chat turn: string, number, bool, or null.
pub type FormInputs = Map<String, Value>;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Normalise a raw `/v1/parameters` payload. Unusable fields are skipped.
pub fn normalize_parameters(payload: &Value) -> AgentParameters {
    let user_input_form = payload
        .get("user_input_form")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(normalize_field).collect())
        .unwrap_or_default();

    let opening_statement = payload
        .get("opening_statement")
        .and_then(Value::as_str)
        .map(str::to_string);

    AgentParameters {
        user_input_form,
        opening_statement,
    }
}

/// Normalise one raw form field.
///
/// Accepts `{ "type": "select", ... }` as well as `{ "select": { ... } }`.
/// Returns `None` for unsupported types or a missing variable name.
pub fn normalize_field(raw: &Value) -> Option<FormField> {
    let record = raw.as_object()?;

    let (field_type, config) = match record.get("type").and_then(Value::as_str) {
        Some(name) => (FieldType::parse(name)?, record),
        None => record.iter().find_map(|(key, value)| {
            let field_type = FieldType::parse(key)?;
            value.as_object().map(|config| (field_type, config))
        })?,
    };

    let variable = config
        .get("variable")
        .or_else(|| config.get("name"))
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())?
        .to_string();

    let label = non_empty(localize_text(config.get("label"))).unwrap_or_else(|| variable.clone());

    let options = field_type
        .has_options()
        .then(|| normalize_options(config.get("options")));

    let max_length = config
        .get("max_length")
        .filter(|v| v.is_number())
        .or_else(|| config.get("maxLength"))
        .and_then(positive_length);

    Some(FormField {
        field_type,
        label,
        variable,
        required: truthy(config.get("required")),
        default_value: normalize_default(field_type, config.get("default")),
        options,
        max_length,
        placeholder: non_empty(localize_text(config.get("placeholder"))),
    })
}

/// Pick display text from a string or a per-locale map.
pub fn localize_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(map)) => PREFERRED_LOCALES
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|text| !text.trim().is_empty())
            .or_else(|| map.values().find_map(Value::as_str))
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn normalize_options(raw: Option<&Value>) -> Vec<FormOption> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(FormOption {
                label: text.clone(),
                value: text.clone(),
            }),
            Value::Object(record) => {
                let value = scalar_to_string(record.get("value")?)?;
                let label = non_empty(localize_text(record.get("label")))
                    .unwrap_or_else(|| value.clone());
                Some(FormOption { label, value })
            }
            _ => None,
        })
        .collect()
}

fn normalize_default(field_type: FieldType, raw: Option<&Value>) -> DefaultValue {
    if field_type == FieldType::Switch {
        return DefaultValue::Flag(truthy(raw));
    }
    DefaultValue::Text(raw.and_then(scalar_to_string).unwrap_or_default())
}

fn positive_length(value: &Value) -> Option<u64> {
    value
        .as_f64()
        .filter(|n| *n > 0.0)
        .map(|n| n as u64)
        .filter(|n| *n > 0)
}

/// Loose truthiness for flags coming from untyped config.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ---------------------------------------------------------------------------
// Chat inputs
// ---------------------------------------------------------------------------

/// Sanitise the `inputs` object of a chat request.
///
/// Scalars and null pass through; nested values are flattened to their JSON
/// text. Anything other than an object yields an empty map.
pub fn normalize_inputs(value: Option<&Value>) -> FormInputs {
    let Some(Value::Object(raw)) = value else {
        return FormInputs::new();
    };

    raw.iter()
        .map(|(key, field)| {
            let normalized = match field {
                Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => field.clone(),
                nested => Value::String(nested.to_string()),
            };
            (key.clone(), normalized)
        })
        .collect()
}
