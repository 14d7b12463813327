//! Typed tool contracts
//!
//! A `ToolOutput` is a structured result the model returns by calling a
//! named tool. The tool's parameter schema is generated from the Rust type.

use super::types::ToolDefinition;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub trait ToolOutput: DeserializeOwned + JsonSchema + Send {
    const TOOL_NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// Semantic checks beyond what decoding enforces. May normalize fields.
    fn validate(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: Self::TOOL_NAME.to_string(),
            description: Self::DESCRIPTION.to_string(),
            parameters: parameters_schema::<Self>(),
        }
    }

    /// Decode and validate tool-call arguments.
    fn from_arguments(arguments: &str) -> Result<Self, String> {
        let mut output: Self = serde_json::from_str(arguments).map_err(|e| e.to_string())?;
        output.validate()?;
        Ok(output)
    }
}

/// JSON schema for `T` with every `$ref` inlined.
///
/// Chat endpoints resolve references inconsistently, so the parameters block
/// is sent self-contained.
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = match &value {
        Value::Object(map) => map
            .get("$defs")
            .or_else(|| map.get("definitions"))
            .cloned(),
        _ => None,
    };
    if let Some(defs) = definitions {
        inline_refs(&mut value, &defs);
    }
    if let Value::Object(map) = &mut value {
        map.remove("$defs");
        map.remove("definitions");
        map.remove("$schema");
        map.remove("title");
    }
    value
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref").cloned() {
                let name = path
                    .strip_prefix("#/$defs/")
                    .or_else(|| path.strip_prefix("#/definitions/"));
                if let Some(def) = name.and_then(|n| definitions.get(n)) {
                    *value = def.clone();
                    inline_refs(value, definitions);
                    return;
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}
