use crate::{Context, HandlerError, Value, ValueMap, ValueExt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Core trait that every step implementation provides.
///
/// The engine treats handlers opaquely: it resolves the node's config,
/// hands it over together with the shared run context, and records whatever
/// comes back.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique type identifier (e.g., "http.request", "variable.set")
    fn handler_type(&self) -> &str;

    /// Execute the step with its resolved config.
    ///
    /// No time limit is imposed by the engine; a handler that talks to the
    /// network owns its own timeouts.
    async fn execute(&self, config: ValueMap, context: &mut Context) -> Result<Value, HandlerError>;

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Descriptive information about a handler type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

impl HandlerMetadata {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Config accessors for handler implementations.
pub trait ConfigExt {
    fn require(&self, key: &str) -> Result<&Value, HandlerError>;
    fn require_str(&self, key: &str) -> Result<&str, HandlerError>;
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
    fn f64_or(&self, key: &str, default: f64) -> f64;
}

impl ConfigExt for ValueMap {
    fn require(&self, key: &str) -> Result<&Value, HandlerError> {
        self.get(key)
            .ok_or_else(|| HandlerError::MissingConfig(key.to_string()))
    }

    fn require_str(&self, key: &str) -> Result<&str, HandlerError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| HandlerError::InvalidConfig {
            field: key.to_string(),
            expected: "string".to_string(),
            actual: value.type_name().to_string(),
        })
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(|v| v.as_str()).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.coerce_f64()).unwrap_or(default)
    }
}
