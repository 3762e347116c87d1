use async_trait::async_trait;
use flowcore::{ConfigExt, Context, Handler, HandlerError, HandlerMetadata, Value, ValueExt, ValueMap};
use reqwest::Method;
use serde_json::json;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: f64 = 30_000.0;

/// HTTP request handler
///
/// Config: `url` (required), `method` (default GET), `headers`, `query`,
/// `body` (objects and arrays are sent as JSON, anything else as text),
/// `timeout_ms`. Non-2xx responses are returned, not raised, unless
/// `fail_on_status` is true.
pub struct HttpRequest {
    client: reqwest::Client,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_method(raw: &str) -> Result<Method, HandlerError> {
    match raw.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        other => Err(HandlerError::InvalidConfig {
            field: "method".to_string(),
            expected: "one of GET, POST, PUT, PATCH, DELETE, HEAD".to_string(),
            actual: other.to_string(),
        }),
    }
}

#[async_trait]
impl Handler for HttpRequest {
    fn handler_type(&self) -> &str {
        "http.request"
    }

    async fn execute(&self, config: ValueMap, _context: &mut Context) -> Result<Value, HandlerError> {
        let url = config.require_str("url")?;
        let method = parse_method(config.str_or("method", "GET"))?;
        let timeout_ms = config.f64_or("timeout_ms", DEFAULT_TIMEOUT_MS).max(0.0) as u64;

        tracing::info!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(Value::Object(headers)) = config.get("headers") {
            for (key, value) in headers {
                request = request.header(key.as_str(), value.to_display_string());
            }
        }

        if let Some(Value::Object(query)) = config.get("query") {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| (k.clone(), v.to_display_string()))
                .collect();
            request = request.query(&pairs);
        }

        match config.get("body") {
            None | Some(Value::Null) => {}
            Some(body @ (Value::Object(_) | Value::Array(_))) => request = request.json(body),
            Some(body) => request = request.body(body.to_display_string()),
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let headers: ValueMap = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let text = response
            .text()
            .await
            .map_err(|e| HandlerError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        tracing::info!("Response status: {}", status.as_u16());

        if !status.is_success() && config.get("fail_on_status").is_some_and(ValueExt::truthy) {
            return Err(HandlerError::ExecutionFailed(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            )));
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(json!({
            "status": status.as_u16(),
            "ok": status.is_success(),
            "headers": headers,
            "body": body,
        }))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::new("http", "Make HTTP requests")
    }
}
