use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/generate`.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

impl GenerateRequest {
    pub fn streaming(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
        }
    }
}

/// One newline-delimited record of a generate response body.
///
/// The server sends either a token record (`response` + `done`) or a single
/// `error` record. Unknown fields such as `model` or `created_at` are ignored.
#[derive(Debug, Deserialize, Default)]
pub struct GenerateRecord {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<Value>,
}

impl GenerateRecord {
    /// Human-readable text of the `error` field, if the record carries one.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let message = match error {
            Value::String(text) => text.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string()),
            Value::Null => return None,
            other => other.to_string(),
        };
        Some(message)
    }
}
