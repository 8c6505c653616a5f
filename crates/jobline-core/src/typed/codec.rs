//! Wire codec for task payloads.
//!
//! Wire format: a JSON object `{"func": "<name>", "args": [...]}`. `args` is
//! optional and defaults to an empty list; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use crate::domain::{DecodeError, FunctionName, TaskDescriptor};

#[derive(Deserialize)]
struct WireTask {
    #[serde(default)]
    func: Option<String>,
    #[serde(default)]
    args: Option<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct WireTaskRef<'a> {
    func: &'a str,
    args: &'a [serde_json::Value],
}

/// Parse a raw queue payload into a `TaskDescriptor`.
///
/// - not JSON, not an object, or fields of the wrong type → `Syntax`
/// - `func` absent, null or `""` → `MissingField`
pub fn decode(payload: &[u8]) -> Result<TaskDescriptor, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| DecodeError::syntax(e.to_string()))?;

    if !value.is_object() {
        return Err(DecodeError::syntax(format!(
            "expected a JSON object, found {}",
            json_type_name(&value)
        )));
    }

    let wire: WireTask =
        serde_json::from_value(value).map_err(|e| DecodeError::syntax(e.to_string()))?;

    let func = match wire.func {
        Some(func) if !func.is_empty() => func,
        _ => return Err(DecodeError::missing_field("func")),
    };

    Ok(TaskDescriptor::new(
        FunctionName::from_wire(func),
        wire.args.unwrap_or_default(),
    ))
}

/// Serialize a descriptor into the wire format (producer side).
pub fn encode(task: &TaskDescriptor) -> Vec<u8> {
    let wire = WireTaskRef {
        func: task.function_name().as_str(),
        args: task.arguments(),
    };
    // String keys and already-valid JSON values: serialization cannot fail.
    serde_json::to_vec(&wire).unwrap_or_default()
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
