use serde_json::Number;

/// Dynamic value type flowing through node configs, outputs and the context.
pub type Value = serde_json::Value;

/// String-keyed map of values (node config, handler output objects, context).
pub type ValueMap = serde_json::Map<String, Value>;

/// Loose coercions shared by the expression engine and handlers.
pub trait ValueExt {
    /// Python-like truthiness: null, false, 0, "", [] and {} are falsy.
    fn truthy(&self) -> bool;

    /// Numeric view of the value; numeric strings and booleans coerce.
    fn coerce_f64(&self) -> Option<f64>;

    /// Integer view of the value, only when it is integral.
    fn coerce_i64(&self) -> Option<i64>;

    /// Text used when a value is substituted into a template.
    fn to_display_string(&self) -> String;

    /// Short type label used by `typeof` and error messages.
    fn type_name(&self) -> &'static str;
}

impl ValueExt for Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn coerce_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::Bool(b) => Some(*b as i64),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Build a JSON number from a float, collapsing integral results to integers.
///
/// Non-finite floats have no JSON representation and become `null`.
pub fn number_from_f64(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}
