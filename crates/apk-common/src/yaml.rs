//! YAML decoding for artifact documents
//!
//! Project files exported by the control plane are YAML or JSON. Both are
//! normalised into `serde_json::Value` (YAML through yaml-rust2) and then
//! deserialized into typed structs with serde.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::Error;

/// Error type for YAML parsing
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct YamlError(String);

/// Parse a YAML string into a serde_json::Value.
///
/// For multi-document YAML, returns only the first document.
/// Returns `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

/// Parse a multi-document YAML string into one Value per document.
///
/// Empty documents (e.g. a trailing `---`) are dropped.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    docs.into_iter()
        .map(yaml_to_json)
        .filter(|v| !matches!(v, Ok(Value::Null)))
        .collect()
}

/// Decode a YAML or JSON document into `T`.
///
/// JSON is detected by a leading `{` or `[`. `kind` names the document in
/// error messages (e.g. "api.yaml").
pub fn decode_document<T: DeserializeOwned>(bytes: &[u8], kind: &str) -> Result<T, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::serialization_for_kind(kind, format!("not valid UTF-8: {}", e)))?;
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();

    let value: Value = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| Error::serialization_for_kind(kind, format!("invalid JSON: {}", e)))?
    } else {
        parse_yaml(trimmed)
            .map_err(|e| Error::serialization_for_kind(kind, format!("invalid YAML: {}", e)))?
    };

    serde_json::from_value(value).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, YamlError> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| YamlError(e.to_string()))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(YamlError("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(YamlError("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(YamlError("bad YAML value".to_string())),
    }
}
