//! Standard handler library
//!
//! A small catalog of built-in handlers for common steps

mod debug;
mod http;
mod time;
mod transform;
mod trigger;
mod variable;

pub use debug::DebugLog;
pub use http::HttpRequest;
pub use time::Delay;
pub use transform::{JsonParse, JsonStringify};
pub use trigger::ManualTrigger;
pub use variable::SetVariable;
use flowruntime::HandlerRegistry;

use std::sync::Arc;

/// Register all standard handlers with a registry
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(Arc::new(trigger::ManualTrigger));
    registry.register(Arc::new(variable::SetVariable));
    registry.register(Arc::new(debug::DebugLog));
    registry.register(Arc::new(http::HttpRequest::new()));
    registry.register(Arc::new(transform::JsonParse));
    registry.register(Arc::new(transform::JsonStringify));
    registry.register(Arc::new(time::Delay));
}

/// A registry holding every standard handler
pub fn standard_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_all(&mut registry);
    registry
}
