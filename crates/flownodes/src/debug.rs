use async_trait::async_trait;
use flowcore::{Context, Handler, HandlerError, HandlerMetadata, Value, ValueExt, ValueMap};
use serde_json::json;

/// Writes its resolved `message` to the log and passes it on
pub struct DebugLog;

#[async_trait]
impl Handler for DebugLog {
    fn handler_type(&self) -> &str {
        "debug.log"
    }

    async fn execute(&self, config: ValueMap, _context: &mut Context) -> Result<Value, HandlerError> {
        let message = config
            .get("message")
            .map(ValueExt::to_display_string)
            .unwrap_or_else(|| "(no message)".to_string());

        match config.get("level").and_then(Value::as_str).unwrap_or("info") {
            "debug" => tracing::debug!("DEBUG: {}", message),
            "warn" => tracing::warn!("DEBUG: {}", message),
            "error" => tracing::error!("DEBUG: {}", message),
            _ => tracing::info!("DEBUG: {}", message),
        }

        Ok(json!({ "message": message }))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("debug", "Logs a message for debugging")
    }
}
