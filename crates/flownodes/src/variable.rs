use async_trait::async_trait;
use flowcore::{Context, Handler, HandlerError, HandlerMetadata, Value, ValueExt, ValueMap};

/// Copies config entries into `$vars`
///
/// Accepts either a `variables` object or bare top-level keys. `on_error` is
/// a node policy and never becomes a variable.
pub struct SetVariable;

#[async_trait]
impl Handler for SetVariable {
    fn handler_type(&self) -> &str {
        "variable.set"
    }

    async fn execute(&self, mut config: ValueMap, context: &mut Context) -> Result<Value, HandlerError> {
        let assignments = match config.remove("variables") {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(HandlerError::InvalidConfig {
                    field: "variables".to_string(),
                    expected: "object".to_string(),
                    actual: other.type_name().to_string(),
                })
            }
            None => {
                config.remove("on_error");
                config
            }
        };

        for (name, value) in &assignments {
            tracing::debug!("Setting variable {}", name);
            context.set_var(name.clone(), value.clone());
        }

        Ok(Value::Object(assignments))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("data", "Set workflow variables")
    }
}
