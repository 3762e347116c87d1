use flowcore::{Handler, HandlerMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available handler types
///
/// Filled once at process start, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its `handler_type()`; a later registration
    /// for the same type replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        let handler_type = handler.handler_type().to_string();
        tracing::info!("Registering handler type: {}", handler_type);
        if self.handlers.insert(handler_type.clone(), handler).is_some() {
            tracing::warn!("Handler type {} was registered twice", handler_type);
        }
    }

    pub fn get_handler(&self, handler_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(handler_type).cloned()
    }

    pub fn contains(&self, handler_type: &str) -> bool {
        self.handlers.contains_key(handler_type)
    }

    /// Get all registered handler types, sorted
    pub fn list_handler_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, handler_type: &str) -> Option<HandlerMetadata> {
        self.handlers.get(handler_type).map(|h| h.metadata())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.list_handler_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowcore::{Context, HandlerError, Value, ValueMap};

    struct Echo(&'static str);

    #[async_trait]
    impl Handler for Echo {
        fn handler_type(&self) -> &str {
            self.0
        }

        async fn execute(&self, config: ValueMap, _context: &mut Context) -> Result<Value, HandlerError> {
            Ok(Value::Object(config))
        }

        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata::new("test", "echoes its config")
        }
    }

    #[test]
    fn lookup_by_type() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Echo("b.echo")));
        registry.register(Arc::new(Echo("a.echo")));

        assert!(registry.get_handler("a.echo").is_some());
        assert!(registry.get_handler("missing").is_none());
        assert_eq!(registry.list_handler_types(), vec!["a.echo", "b.echo"]);
        assert_eq!(registry.get_metadata("a.echo").unwrap().category, "test");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Echo("echo")));
        registry.register(Arc::new(Echo("echo")));
        assert_eq!(registry.len(), 1);
    }
}
