//! `{{ ... }}` placeholder resolution for node configuration.
//!
//! A string that is exactly one placeholder evaluates to the expression's
//! value with its type intact; any other string containing placeholders is
//! rendered as text. Lookups are lenient: missing keys resolve to `null`.

mod eval;
mod functions;
mod lexer;
mod parser;

pub use functions::Function;

use crate::{ExpressionError, Value, ValueExt, ValueMap};
use eval::Evaluator;
use functions::FunctionTable;
use std::sync::Arc;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Parses and evaluates placeholder expressions against a run context.
#[derive(Clone)]
pub struct ExpressionEngine {
    functions: FunctionTable,
}

impl ExpressionEngine {
    /// Engine with the full built-in function table.
    pub fn new() -> Self {
        Self {
            functions: functions::builtins(),
        }
    }

    /// Register (or replace) a function callable as `name(...)`.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value], &ValueMap) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Evaluate a bare expression (without the `{{ }}` delimiters).
    ///
    /// # Errors
    /// Only function calls fail: an unregistered name, or a builtin that
    /// rejects its arguments. Text that doesn't parse is looked up as a plain
    /// context key.
    pub fn evaluate(&self, expr: &str, context: &ValueMap) -> Result<Value, ExpressionError> {
        let ast = match parser::parse(expr) {
            Ok(ast) => ast,
            Err(reason) => {
                tracing::debug!(expression = expr, %reason, "unparseable expression, treating as key");
                return Ok(context.get(expr.trim()).cloned().unwrap_or(Value::Null));
            }
        };
        Evaluator {
            context,
            functions: &self.functions,
        }
        .eval(&ast)
    }

    /// Resolve every placeholder inside `value`, walking maps and sequences.
    pub fn resolve(&self, value: &Value, context: &ValueMap) -> Result<Value, ExpressionError> {
        match value {
            Value::String(s) => self.resolve_str(s, context),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => self.resolve_map(map, context).map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    pub fn resolve_map(&self, map: &ValueMap, context: &ValueMap) -> Result<ValueMap, ExpressionError> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve(value, context)?)))
            .collect()
    }

    pub fn resolve_str(&self, s: &str, context: &ValueMap) -> Result<Value, ExpressionError> {
        let spans = placeholders(s);
        let Some(first) = spans.first() else {
            return Ok(Value::String(s.to_string()));
        };

        if spans.len() == 1 && s[..first.start].trim().is_empty() && s[first.end..].trim().is_empty() {
            return self.evaluate(&s[first.inner.clone()], context);
        }

        let mut out = String::with_capacity(s.len());
        let mut cursor = 0;
        for span in &spans {
            out.push_str(&s[cursor..span.start]);
            let value = self.evaluate(&s[span.inner.clone()], context)?;
            out.push_str(&value.to_display_string());
            cursor = span.end;
        }
        out.push_str(&s[cursor..]);
        Ok(Value::String(out))
    }

    /// Render a template to text regardless of placeholder layout.
    pub fn render(&self, template: &str, context: &ValueMap) -> Result<String, ExpressionError> {
        Ok(self.resolve_str(template, context)?.to_display_string())
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("functions", &self.functions.len())
            .finish()
    }
}

/// Does the string contain at least one complete placeholder?
pub fn contains_expression(s: &str) -> bool {
    !placeholders(s).is_empty()
}

struct Span {
    start: usize,
    end: usize,
    inner: std::ops::Range<usize>,
}

/// Locate `{{ ... }}` spans. A `}}` inside a quoted string does not close the
/// placeholder; an unterminated `{{` is left as literal text.
fn placeholders(s: &str) -> Vec<Span> {
    let bytes = s.as_bytes();
    let mut spans = Vec::new();
    let mut search = 0;

    while let Some(offset) = s[search..].find(OPEN) {
        let start = search + offset;
        let inner_start = start + OPEN.len();
        let mut quote: Option<u8> = None;
        let mut i = inner_start;
        let mut close = None;

        while i < bytes.len() {
            match (quote, bytes[i]) {
                (Some(_), b'\\') => i += 1,
                (Some(q), b) if b == q => quote = None,
                (None, b'"' | b'\'') => quote = Some(bytes[i]),
                (None, b'}') if s[i..].starts_with(CLOSE) => {
                    close = Some(i);
                    break;
                }
                _ => {}
            }
            i += 1;
        }

        let Some(inner_end) = close else { break };
        spans.push(Span {
            start,
            end: inner_end + CLOSE.len(),
            inner: inner_start..inner_end,
        });
        search = inner_end + CLOSE.len();
    }

    spans
}

/// Float literal that keeps its float type.
pub(crate) fn number_literal(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
