//! Built-in functions callable from expressions.
//!
//! Every function receives its evaluated positional arguments and keyword
//! arguments and returns a value or a plain error message; the caller wraps
//! failures in `ExpressionError::Function` with the function name.

use super::eval::{compare, loose_eq};
use crate::value::number_from_f64;
use crate::{Value, ValueExt, ValueMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Callable registered under a name in the function table.
pub type Function = Arc<dyn Fn(&[Value], &ValueMap) -> Result<Value, String> + Send + Sync>;

pub(crate) type FunctionTable = HashMap<String, Function>;

/// Upper bound on `range()` output to keep a typo from allocating gigabytes.
const MAX_RANGE_LEN: i64 = 100_000;

/// Positional argument `index`, overridable by keyword `name`.
fn param<'a>(args: &'a [Value], kwargs: &'a ValueMap, index: usize, name: &str) -> Option<&'a Value> {
    kwargs.get(name).or_else(|| args.get(index))
}

fn text(args: &[Value], kwargs: &ValueMap, index: usize, name: &str) -> String {
    param(args, kwargs, index, name)
        .map(ValueExt::to_display_string)
        .unwrap_or_default()
}

fn number(args: &[Value], kwargs: &ValueMap, index: usize, name: &str) -> Result<f64, String> {
    let value = param(args, kwargs, index, name).unwrap_or(&Value::Null);
    value
        .coerce_f64()
        .ok_or_else(|| format!("expected a number for '{}', got {}", name, value.type_name()))
}

fn list<'a>(args: &'a [Value], kwargs: &'a ValueMap, index: usize, name: &str) -> Result<&'a Vec<Value>, String> {
    match param(args, kwargs, index, name) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(format!("expected an array for '{}', got {}", name, other.type_name())),
        None => Err(format!("missing argument '{}'", name)),
    }
}

/// Numbers of a list; varargs calls like `max(1, 5, 3)` are accepted too.
fn numbers(args: &[Value], kwargs: &ValueMap) -> Result<Vec<f64>, String> {
    let items: &[Value] = match args {
        [Value::Array(items)] => items,
        _ if kwargs.contains_key("items") => list(args, kwargs, 0, "items")?,
        _ => args,
    };
    items
        .iter()
        .map(|v| v.coerce_f64().ok_or_else(|| format!("non-numeric item {}", v)))
        .collect()
}

fn all_integers(args: &[Value]) -> bool {
    let items: &[Value] = match args {
        [Value::Array(items)] => items,
        _ => args,
    };
    items.iter().all(|v| v.is_i64() || v.is_u64())
}

fn register(table: &mut FunctionTable, names: &[&str], f: impl Fn(&[Value], &ValueMap) -> Result<Value, String> + Send + Sync + 'static) {
    let f: Function = Arc::new(f);
    for name in names {
        table.insert((*name).to_string(), f.clone());
    }
}

pub(crate) fn builtins() -> FunctionTable {
    let mut t = FunctionTable::new();

    // time and identifiers
    register(&mut t, &["now"], |args, kwargs| {
        let now = Utc::now();
        let Some(fmt) = param(args, kwargs, 0, "format") else {
            return Ok(Value::String(now.to_rfc3339()));
        };
        let fmt = fmt.to_display_string();
        let mut out = String::new();
        write!(out, "{}", now.format(&fmt)).map_err(|_| format!("invalid time format '{}'", fmt))?;
        Ok(Value::String(out))
    });
    register(&mut t, &["today"], |_, _| Ok(Value::String(Utc::now().format("%Y-%m-%d").to_string())));
    register(&mut t, &["timestamp"], |_, _| Ok(Value::from(Utc::now().timestamp())));
    register(&mut t, &["uuid"], |_, _| Ok(Value::String(uuid::Uuid::new_v4().to_string())));

    // json
    register(&mut t, &["json_encode", "to_json"], |args, kwargs| {
        let value = param(args, kwargs, 0, "value").cloned().unwrap_or(Value::Null);
        let pretty = param(args, kwargs, 1, "indent").is_some_and(|v| v.truthy());
        let encoded = if pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        encoded.map(Value::String).map_err(|e| e.to_string())
    });
    register(&mut t, &["json_decode", "from_json"], |args, kwargs| {
        serde_json::from_str(&text(args, kwargs, 0, "text")).map_err(|e| e.to_string())
    });

    // strings
    register(&mut t, &["lower"], |args, kwargs| Ok(Value::String(text(args, kwargs, 0, "text").to_lowercase())));
    register(&mut t, &["upper"], |args, kwargs| Ok(Value::String(text(args, kwargs, 0, "text").to_uppercase())));
    register(&mut t, &["trim"], |args, kwargs| Ok(Value::String(text(args, kwargs, 0, "text").trim().to_string())));
    register(&mut t, &["str", "string"], |args, kwargs| Ok(Value::String(text(args, kwargs, 0, "value"))));
    register(&mut t, &["split"], |args, kwargs| {
        let s = text(args, kwargs, 0, "text");
        let parts: Vec<Value> = match param(args, kwargs, 1, "sep") {
            Some(sep) if !sep.to_display_string().is_empty() => s
                .split(sep.to_display_string().as_str())
                .map(|p| Value::String(p.to_string()))
                .collect(),
            _ => s.split_whitespace().map(|p| Value::String(p.to_string())).collect(),
        };
        Ok(Value::Array(parts))
    });
    register(&mut t, &["join"], |args, kwargs| {
        let items = list(args, kwargs, 0, "items")?;
        let sep = param(args, kwargs, 1, "sep").map(ValueExt::to_display_string).unwrap_or_else(|| ",".to_string());
        Ok(Value::String(items.iter().map(ValueExt::to_display_string).collect::<Vec<_>>().join(&sep)))
    });
    register(&mut t, &["replace"], |args, kwargs| {
        let s = text(args, kwargs, 0, "text");
        let old = text(args, kwargs, 1, "old");
        let new = text(args, kwargs, 2, "new");
        if old.is_empty() {
            return Ok(Value::String(s));
        }
        Ok(Value::String(s.replace(&old, &new)))
    });
    register(&mut t, &["starts_with"], |args, kwargs| {
        Ok(Value::Bool(text(args, kwargs, 0, "text").starts_with(&text(args, kwargs, 1, "prefix"))))
    });
    register(&mut t, &["ends_with"], |args, kwargs| {
        Ok(Value::Bool(text(args, kwargs, 0, "text").ends_with(&text(args, kwargs, 1, "suffix"))))
    });
    register(&mut t, &["contains"], |args, kwargs| {
        let needle = param(args, kwargs, 1, "item").cloned().unwrap_or(Value::Null);
        Ok(Value::Bool(match param(args, kwargs, 0, "value") {
            Some(Value::Array(items)) => items.iter().any(|v| loose_eq(v, &needle)),
            Some(Value::Object(map)) => map.contains_key(&needle.to_display_string()),
            Some(other) => other.to_display_string().contains(&needle.to_display_string()),
            None => false,
        }))
    });
    register(&mut t, &["format"], |args, kwargs| {
        let template = text(args, kwargs, 0, "template");
        Ok(Value::String(format_template(&template, args.get(1..).unwrap_or_default(), kwargs)))
    });

    // sequences
    register(&mut t, &["length", "len"], |args, kwargs| {
        Ok(match param(args, kwargs, 0, "value") {
            Some(Value::String(s)) => Value::from(s.chars().count()),
            Some(Value::Array(a)) => Value::from(a.len()),
            Some(Value::Object(o)) => Value::from(o.len()),
            Some(Value::Null) | None => Value::from(0),
            Some(other) => return Err(format!("{} has no length", other.type_name())),
        })
    });
    register(&mut t, &["first"], |args, kwargs| {
        Ok(match param(args, kwargs, 0, "value") {
            Some(Value::Array(a)) => a.first().cloned().unwrap_or(Value::Null),
            Some(Value::String(s)) => s.chars().next().map(|c| Value::String(c.into())).unwrap_or(Value::Null),
            _ => Value::Null,
        })
    });
    register(&mut t, &["last"], |args, kwargs| {
        Ok(match param(args, kwargs, 0, "value") {
            Some(Value::Array(a)) => a.last().cloned().unwrap_or(Value::Null),
            Some(Value::String(s)) => s.chars().last().map(|c| Value::String(c.into())).unwrap_or(Value::Null),
            _ => Value::Null,
        })
    });
    register(&mut t, &["reverse"], |args, kwargs| {
        Ok(match param(args, kwargs, 0, "value") {
            Some(Value::Array(a)) => Value::Array(a.iter().rev().cloned().collect()),
            Some(Value::String(s)) => Value::String(s.chars().rev().collect()),
            Some(other) => return Err(format!("cannot reverse {}", other.type_name())),
            None => Value::Null,
        })
    });
    register(&mut t, &["sort"], |args, kwargs| {
        let mut items = list(args, kwargs, 0, "items")?.clone();
        let key = kwargs.get("key").map(ValueExt::to_display_string);
        let sort_key = |v: &Value| match &key {
            Some(k) => v.get(k).cloned().unwrap_or(Value::Null),
            None => v.clone(),
        };
        items.sort_by(|a, b| compare(&sort_key(a), &sort_key(b)).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))));
        if kwargs.get("reverse").is_some_and(ValueExt::truthy) {
            items.reverse();
        }
        Ok(Value::Array(items))
    });
    register(&mut t, &["unique"], |args, kwargs| {
        let mut seen: Vec<Value> = Vec::new();
        for item in list(args, kwargs, 0, "items")? {
            if !seen.iter().any(|s| loose_eq(s, item)) {
                seen.push(item.clone());
            }
        }
        Ok(Value::Array(seen))
    });
    register(&mut t, &["slice"], |args, kwargs| {
        let start = param(args, kwargs, 1, "start").and_then(ValueExt::coerce_i64).unwrap_or(0);
        let end = param(args, kwargs, 2, "end").and_then(ValueExt::coerce_i64);
        match param(args, kwargs, 0, "value") {
            Some(Value::Array(a)) => {
                let (from, to) = slice_bounds(a.len(), start, end);
                Ok(Value::Array(a[from..to].to_vec()))
            }
            Some(Value::String(s)) => {
                let chars: Vec<char> = s.chars().collect();
                let (from, to) = slice_bounds(chars.len(), start, end);
                Ok(Value::String(chars[from..to].iter().collect()))
            }
            Some(other) => Err(format!("cannot slice {}", other.type_name())),
            None => Ok(Value::Null),
        }
    });
    register(&mut t, &["range"], |args, kwargs| {
        if args.len() + kwargs.len() > 3 || (args.is_empty() && !kwargs.contains_key("stop")) {
            return Err("range() takes 1 to 3 arguments".to_string());
        }
        let int = |value: Option<&Value>, default: i64| match value {
            None => Ok(default),
            Some(v) => v
                .coerce_i64()
                .ok_or_else(|| format!("range() expects integers, got {}", v)),
        };
        // A lone positional is the stop bound, as with range(5).
        let (start, stop) = if args.len() == 1 && !kwargs.contains_key("stop") {
            (int(kwargs.get("start"), 0)?, int(args.first(), 0)?)
        } else {
            (int(param(args, kwargs, 0, "start"), 0)?, int(param(args, kwargs, 1, "stop"), 0)?)
        };
        let step = int(param(args, kwargs, 2, "step"), 1)?;
        if step == 0 {
            return Err("range() step must not be zero".to_string());
        }
        let len = (stop.saturating_sub(start) as f64 / step as f64).ceil().max(0.0) as i64;
        if len > MAX_RANGE_LEN {
            return Err(format!("range() of {} items exceeds limit of {}", len, MAX_RANGE_LEN));
        }
        Ok(Value::Array((0..len).map(|i| Value::from(start + i * step)).collect()))
    });
    register(&mut t, &["sum"], |args, kwargs| {
        let values = numbers(args, kwargs)?;
        let total: f64 = values.iter().sum();
        Ok(if all_integers(args) { number_from_f64(total) } else { float(total) })
    });
    register(&mut t, &["avg"], |args, kwargs| {
        let values = numbers(args, kwargs)?;
        if values.is_empty() {
            return Ok(Value::Null);
        }
        Ok(float(values.iter().sum::<f64>() / values.len() as f64))
    });
    register(&mut t, &["min"], |args, kwargs| extreme(args, kwargs, Ordering::Less));
    register(&mut t, &["max"], |args, kwargs| extreme(args, kwargs, Ordering::Greater));

    // maps
    register(&mut t, &["keys"], |args, kwargs| match param(args, kwargs, 0, "value") {
        Some(Value::Object(o)) => Ok(Value::Array(o.keys().cloned().map(Value::String).collect())),
        Some(Value::Null) | None => Ok(Value::Array(Vec::new())),
        Some(other) => Err(format!("keys() expects an object, got {}", other.type_name())),
    });
    register(&mut t, &["values"], |args, kwargs| match param(args, kwargs, 0, "value") {
        Some(Value::Object(o)) => Ok(Value::Array(o.values().cloned().collect())),
        Some(Value::Null) | None => Ok(Value::Array(Vec::new())),
        Some(other) => Err(format!("values() expects an object, got {}", other.type_name())),
    });

    // numbers and conversions
    register(&mut t, &["abs"], |args, kwargs| {
        let value = param(args, kwargs, 0, "value").unwrap_or(&Value::Null);
        match value.as_i64() {
            Some(n) => Ok(n.checked_abs().map(Value::from).unwrap_or(Value::Null)),
            None => Ok(float(number(args, kwargs, 0, "value")?.abs())),
        }
    });
    register(&mut t, &["round"], |args, kwargs| {
        let x = number(args, kwargs, 0, "value")?;
        let digits = param(args, kwargs, 1, "digits").and_then(ValueExt::coerce_i64).unwrap_or(0);
        if digits <= 0 {
            return Ok(number_from_f64(x.round()));
        }
        let factor = 10f64.powi(digits.min(15) as i32);
        Ok(float((x * factor).round() / factor))
    });
    register(&mut t, &["floor"], |args, kwargs| Ok(number_from_f64(number(args, kwargs, 0, "value")?.floor())));
    register(&mut t, &["ceil"], |args, kwargs| Ok(number_from_f64(number(args, kwargs, 0, "value")?.ceil())));
    register(&mut t, &["int"], |args, kwargs| {
        let value = param(args, kwargs, 0, "value").unwrap_or(&Value::Null);
        if let Some(n) = value.coerce_i64() {
            return Ok(Value::from(n));
        }
        value
            .coerce_f64()
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| format!("cannot convert {} to int", value))
    });
    register(&mut t, &["number", "float"], |args, kwargs| {
        let value = param(args, kwargs, 0, "value").unwrap_or(&Value::Null);
        value
            .coerce_f64()
            .map(float)
            .ok_or_else(|| format!("cannot convert {} to number", value))
    });
    register(&mut t, &["bool"], |args, kwargs| {
        Ok(Value::Bool(match param(args, kwargs, 0, "value") {
            Some(Value::String(s)) => !matches!(s.trim().to_ascii_lowercase().as_str(), "" | "false" | "0" | "no" | "off"),
            Some(other) => other.truthy(),
            None => false,
        }))
    });

    // hashing and encoding
    register(&mut t, &["md5"], |args, kwargs| {
        Ok(Value::String(format!("{:x}", Md5::digest(text(args, kwargs, 0, "text").as_bytes()))))
    });
    register(&mut t, &["sha256"], |args, kwargs| {
        Ok(Value::String(format!("{:x}", Sha256::digest(text(args, kwargs, 0, "text").as_bytes()))))
    });
    register(&mut t, &["base64_encode"], |args, kwargs| Ok(Value::String(BASE64.encode(text(args, kwargs, 0, "text")))));
    register(&mut t, &["base64_decode"], |args, kwargs| {
        let bytes = BASE64.decode(text(args, kwargs, 0, "text").trim()).map_err(|e| e.to_string())?;
        String::from_utf8(bytes).map(Value::String).map_err(|e| e.to_string())
    });

    // introspection and control
    register(&mut t, &["typeof"], |args, kwargs| {
        Ok(Value::String(param(args, kwargs, 0, "value").unwrap_or(&Value::Null).type_name().to_string()))
    });
    register(&mut t, &["empty"], |args, kwargs| Ok(Value::Bool(is_empty(param(args, kwargs, 0, "value")))));
    register(&mut t, &["not_empty"], |args, kwargs| Ok(Value::Bool(!is_empty(param(args, kwargs, 0, "value")))));
    register(&mut t, &["ternary"], |args, kwargs| {
        let condition = param(args, kwargs, 0, "condition").is_some_and(ValueExt::truthy);
        let (index, name) = if condition { (1, "then") } else { (2, "otherwise") };
        Ok(param(args, kwargs, index, name).cloned().unwrap_or(Value::Null))
    });
    register(&mut t, &["default"], |args, kwargs| {
        let value = param(args, kwargs, 0, "value").cloned().unwrap_or(Value::Null);
        let missing = matches!(&value, Value::Null) || value.as_str() == Some("");
        Ok(if missing {
            param(args, kwargs, 1, "fallback").cloned().unwrap_or(Value::Null)
        } else {
            value
        })
    });

    t
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

/// Ordering across types for `sort` when values aren't comparable.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn extreme(args: &[Value], kwargs: &ValueMap, wanted: Ordering) -> Result<Value, String> {
    let items: &[Value] = match args {
        [Value::Array(items)] => items,
        _ => args,
    };
    if let Some(key) = kwargs.get("items") {
        return extreme(std::slice::from_ref(key), &ValueMap::new(), wanted);
    }
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            None => Some(item),
            Some(current) => match compare(item, current) {
                Some(ord) if ord == wanted => Some(item),
                Some(_) => Some(current),
                None => return Err(format!("cannot compare {} with {}", item, current)),
            },
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn slice_bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let resolved = if i < 0 { len as i64 + i } else { i };
        resolved.clamp(0, len as i64) as usize
    };
    let from = clamp(start);
    let to = end.map(clamp).unwrap_or(len);
    (from, to.max(from))
}

/// `{}` consumes positional arguments in order, `{0}` picks by index and
/// `{name}` reads keyword arguments. Unknown placeholders are left as-is.
fn format_template(template: &str, positional: &[Value], named: &ValueMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after[..close].trim();
        let replacement = if key.is_empty() {
            let value = positional.get(next);
            next += 1;
            value.map(ValueExt::to_display_string)
        } else if let Ok(i) = key.parse::<usize>() {
            positional.get(i).map(ValueExt::to_display_string)
        } else {
            named.get(key).map(ValueExt::to_display_string)
        };
        match replacement {
            Some(text) => out.push_str(&text),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Result<Value, String> {
        let table = builtins();
        table[name](args, &ValueMap::new())
    }

    fn call_kw(name: &str, args: &[Value], kwargs: Value) -> Result<Value, String> {
        let table = builtins();
        let kwargs = kwargs.as_object().cloned().unwrap_or_default();
        table[name](args, &kwargs)
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("upper", &[json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(call("split", &[json!("a,b,c"), json!(",")]).unwrap(), json!(["a", "b", "c"]));
        assert_eq!(call("split", &[json!(" a  b ")]).unwrap(), json!(["a", "b"]));
        assert_eq!(call("join", &[json!([1, "x", true]), json!("-")]).unwrap(), json!("1-x-true"));
        assert_eq!(call("replace", &[json!("aXbX"), json!("X"), json!("_")]).unwrap(), json!("a_b_"));
        assert_eq!(call("contains", &[json!([1, 2]), json!(2.0)]).unwrap(), json!(true));
        assert_eq!(call("contains", &[json!({"k": 1}), json!("k")]).unwrap(), json!(true));
    }

    #[test]
    fn format_positional_indexed_and_named() {
        let out = call_kw(
            "format",
            &[json!("{} and {1}, {name}! {missing}"), json!("a"), json!("b")],
            json!({"name": "Ann"}),
        )
        .unwrap();
        assert_eq!(out, json!("a and b, Ann! {missing}"));
    }

    #[test]
    fn sequence_functions() {
        assert_eq!(call("sort", &[json!([3, 1, 2])]).unwrap(), json!([1, 2, 3]));
        assert_eq!(
            call_kw("sort", &[json!([{"n": 2}, {"n": 1}])], json!({"key": "n", "reverse": true})).unwrap(),
            json!([{"n": 2}, {"n": 1}])
        );
        assert_eq!(call("unique", &[json!([1, 1, 2, 1])]).unwrap(), json!([1, 2]));
        assert_eq!(call("slice", &[json!([1, 2, 3, 4]), json!(1), json!(-1)]).unwrap(), json!([2, 3]));
        assert_eq!(call("slice", &[json!("hello"), json!(-3)]).unwrap(), json!("llo"));
        assert_eq!(call("range", &[json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(call("range", &[json!(5), json!(0), json!(-2)]).unwrap(), json!([5, 3, 1]));
        assert!(call("range", &[json!(0), json!(5), json!(0)]).is_err());
        assert_eq!(call_kw("range", &[], json!({"stop": 3})).unwrap(), json!([0, 1, 2]));
        assert_eq!(call_kw("range", &[json!(4)], json!({"step": 2})).unwrap(), json!([0, 2]));
        assert_eq!(
            call_kw("range", &[json!(1)], json!({"stop": 7, "step": 3})).unwrap(),
            json!([1, 4])
        );
        assert!(call_kw("range", &[], json!({"step": 2})).is_err());
        assert!(call("range", &[json!("x")]).is_err());
        assert_eq!(call("reverse", &[json!("abc")]).unwrap(), json!("cba"));
    }

    #[test]
    fn aggregates() {
        assert_eq!(call("sum", &[json!([1, 2, 3])]).unwrap(), json!(6));
        assert_eq!(call("sum", &[json!([1.5, 2])]).unwrap(), json!(3.5));
        assert_eq!(call("avg", &[json!([1, 2])]).unwrap(), json!(1.5));
        assert_eq!(call("avg", &[json!([])]).unwrap(), Value::Null);
        assert_eq!(call("max", &[json!(1), json!(5), json!(3)]).unwrap(), json!(5));
        assert_eq!(call("min", &[json!(["b", "a"])]).unwrap(), json!("a"));
        assert!(call("sum", &[json!(["x"])]).is_err());
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(call("int", &[json!("42")]).unwrap(), json!(42));
        assert_eq!(call("int", &[json!(3.9)]).unwrap(), json!(3));
        assert!(call("int", &[json!("abc")]).is_err());
        assert_eq!(call("number", &[json!("2.5")]).unwrap(), json!(2.5));
        assert_eq!(call_kw("round", &[json!(2.346)], json!({"digits": 2})).unwrap(), json!(2.35));
        assert_eq!(call("round", &[json!(2.5)]).unwrap(), json!(3));
        assert_eq!(call("abs", &[json!(-4)]).unwrap(), json!(4));
        assert_eq!(call("bool", &[json!("false")]).unwrap(), json!(false));
        assert_eq!(call("bool", &[json!(1)]).unwrap(), json!(true));
    }

    #[test]
    fn hashing_and_encoding() {
        assert_eq!(call("md5", &[json!("")]).unwrap(), json!("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(
            call("sha256", &[json!("")]).unwrap(),
            json!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(call("base64_encode", &[json!("hi")]).unwrap(), json!("aGk="));
        assert_eq!(call("base64_decode", &[json!("aGk=")]).unwrap(), json!("hi"));
        assert!(call("base64_decode", &[json!("***")]).is_err());
    }

    #[test]
    fn control_functions() {
        assert_eq!(call("ternary", &[json!(0), json!("yes"), json!("no")]).unwrap(), json!("no"));
        assert_eq!(call("default", &[json!(null), json!("fallback")]).unwrap(), json!("fallback"));
        assert_eq!(call("default", &[json!(0), json!("fallback")]).unwrap(), json!(0));
        assert_eq!(call("empty", &[json!([])]).unwrap(), json!(true));
        assert_eq!(call("not_empty", &[json!("x")]).unwrap(), json!(true));
        assert_eq!(call("typeof", &[json!(1.5)]).unwrap(), json!("float"));
    }

    #[test]
    fn json_round_trip_functions() {
        assert_eq!(call("json_decode", &[json!("{\"a\": [1]}")]).unwrap(), json!({"a": [1]}));
        assert_eq!(call("json_encode", &[json!({"a": 1})]).unwrap(), json!("{\"a\":1}"));
        assert!(call("json_decode", &[json!("{")]).is_err());
    }
}
