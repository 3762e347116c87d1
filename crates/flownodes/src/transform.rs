use async_trait::async_trait;
use flowcore::{ConfigExt, Context, Handler, HandlerError, HandlerMetadata, Value, ValueMap};

/// Parse a JSON string
pub struct JsonParse;

#[async_trait]
impl Handler for JsonParse {
    fn handler_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn execute(&self, config: ValueMap, _context: &mut Context) -> Result<Value, HandlerError> {
        let input = config.require_str("json")?;

        serde_json::from_str(input)
            .map_err(|e| HandlerError::ExecutionFailed(format!("JSON parse error: {}", e)))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("transform", "Parse JSON string")
    }
}

/// Render a value as JSON text
pub struct JsonStringify;

#[async_trait]
impl Handler for JsonStringify {
    fn handler_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn execute(&self, config: ValueMap, _context: &mut Context) -> Result<Value, HandlerError> {
        let value = config.require("value")?;

        let text = if config.get("pretty").and_then(Value::as_bool).unwrap_or(false) {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| HandlerError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(Value::String(text))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("transform", "Convert value to JSON string")
    }
}
