use async_trait::async_trait;
use flowcore::{ConfigExt, Context, Handler, HandlerError, HandlerMetadata, Value, ValueMap};
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration, then pass `$prev` through
pub struct Delay;

#[async_trait]
impl Handler for Delay {
    fn handler_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, config: ValueMap, context: &mut Context) -> Result<Value, HandlerError> {
        let delay_ms = config.f64_or("delay_ms", 1000.0);
        if !delay_ms.is_finite() || delay_ms < 0.0 {
            return Err(HandlerError::InvalidConfig {
                field: "delay_ms".to_string(),
                expected: "non-negative number".to_string(),
                actual: delay_ms.to_string(),
            });
        }

        tracing::debug!("Delaying for {}ms", delay_ms);
        sleep(Duration::from_millis(delay_ms as u64)).await;

        Ok(context.prev().clone())
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("time", "Delay execution for specified milliseconds")
    }
}
