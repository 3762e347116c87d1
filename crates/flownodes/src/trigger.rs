use async_trait::async_trait;
use flowcore::{Context, Handler, HandlerError, HandlerMetadata, Value, ValueMap};

/// Entry node: emits the run's trigger data unchanged
pub struct ManualTrigger;

#[async_trait]
impl Handler for ManualTrigger {
    fn handler_type(&self) -> &str {
        "trigger.manual"
    }

    async fn execute(&self, _config: ValueMap, context: &mut Context) -> Result<Value, HandlerError> {
        Ok(context.trigger().clone())
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("trigger", "Start a workflow with the data it was triggered with")
    }
}
