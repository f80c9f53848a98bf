// ABOUTME: Serialization codecs shared by the argument marshaller, driver script and result reader
// ABOUTME: One Codec value selects both the Rust-side encoder/decoder and the Python module used in the script

use serde::{Deserialize, Serialize};

use super::error::{IsolationError, Result};
use crate::value::Value;

/// Format used for `script.in` and `script.out`.
///
/// The same value decides how arguments are written, how the generated
/// script loads them and dumps the result, and how the result is read back.
/// There is no way to pick the encoder and decoder independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Conservative default. Uses the interpreter's stdlib `json` module.
    #[default]
    Json,
    /// Extended codec backed by PyYAML. Accepts non-string mapping keys,
    /// non-finite floats and tagged values, but the environment must provide
    /// the `pyyaml` package.
    Yaml,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Yaml => "yaml",
        }
    }

    /// Module imported by the generated script.
    pub fn module(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Yaml => "yaml",
        }
    }

    /// Package that must be installed in the isolated environment, if any.
    pub fn required_package(&self) -> Option<&'static str> {
        match self {
            Codec::Json => None,
            Codec::Yaml => Some("pyyaml"),
        }
    }

    /// Python expression that reads one document from the open handle `file`.
    pub fn load_expr(&self) -> &'static str {
        match self {
            Codec::Json => "json.load(file)",
            Codec::Yaml => "yaml.safe_load(file)",
        }
    }

    /// Python expression that writes `res` to the open handle `file`.
    ///
    /// JSON output refuses non-finite floats in the child, so a `nan` result
    /// fails there instead of producing a document that cannot be decoded.
    pub fn dump_expr(&self) -> &'static str {
        match self {
            Codec::Json => "json.dump(res, file, allow_nan=False)",
            Codec::Yaml => "yaml.safe_dump(res, file)",
        }
    }

    /// Whether a requirement list names the package this codec needs.
    pub fn is_satisfied_by(&self, requirements: &[String]) -> bool {
        match self.required_package() {
            None => true,
            Some(package) => requirements
                .iter()
                .any(|requirement| requirement.trim().to_lowercase().starts_with(package)),
        }
    }

    pub fn encode(&self, what: &str, value: &Value) -> Result<Vec<u8>> {
        let serialization_error = |reason: String| IsolationError::Serialization {
            what: what.to_string(),
            codec: self.name().to_string(),
            reason,
        };

        match self {
            Codec::Json => {
                ensure_json_compatible(value, "$").map_err(serialization_error)?;
                serde_json::to_vec(value).map_err(|e| serialization_error(e.to_string()))
            }
            Codec::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| serialization_error(e.to_string())),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let decoded = match self {
            Codec::Json => serde_json::from_slice::<Value>(bytes).map_err(|e| e.to_string()),
            Codec::Yaml => serde_yaml::from_slice::<Value>(bytes).map_err(|e| e.to_string()),
        };

        decoded.map_err(|reason| IsolationError::Decode {
            codec: self.name().to_string(),
            reason,
        })
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn ensure_json_compatible(value: &Value, path: &str) -> std::result::Result<(), String> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(format!("{} is a non-finite float", path)),
            _ => Ok(()),
        },
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| ensure_json_compatible(item, &format!("{}[{}]", path, i))),
        Value::Mapping(map) => map.iter().try_for_each(|(key, item)| match key {
            Value::String(key) => ensure_json_compatible(item, &format!("{}.{}", path, key)),
            other => Err(format!(
                "{} has a non-string key {}",
                path,
                crate::value::describe(other)
            )),
        }),
        Value::Tagged(tagged) => Err(format!("{} carries the tag {}", path, tagged.tag)),
    }
}
