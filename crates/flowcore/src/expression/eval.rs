//! Tree-walking evaluation against a context map.

use super::functions::FunctionTable;
use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::context::{NODES, NODE_NAMES};
use crate::value::number_from_f64;
use crate::{ExpressionError, Value, ValueExt, ValueMap};
use std::cmp::Ordering;

pub(crate) struct Evaluator<'a> {
    pub(crate) context: &'a ValueMap,
    pub(crate) functions: &'a FunctionTable,
}

impl Evaluator<'_> {
    pub(crate) fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => Ok(self.root(name)),
            Expr::Member(base, segment) => self.member(base, &Value::String(segment.clone())),
            Expr::Index(base, index) => {
                let key = self.eval(index)?;
                self.member(base, &key)
            }
            Expr::Call { name, args, kwargs } => self.call(name, args, kwargs),
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!self.eval(operand)?.truthy())),
            Expr::Unary(UnaryOp::Neg, operand) => {
                let value = self.eval(operand)?;
                Ok(match (&value, value.coerce_f64()) {
                    (Value::Number(n), _) if n.is_i64() => {
                        n.as_i64().and_then(i64::checked_neg).map(Value::from).unwrap_or(Value::Null)
                    }
                    (_, Some(f)) => number_from_f64(-f),
                    _ => Value::Null,
                })
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(Value::Bool(self.eval(lhs)?.truthy() && self.eval(rhs)?.truthy()))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(Value::Bool(self.eval(lhs)?.truthy() || self.eval(rhs)?.truthy()))
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                Ok(binary(*op, &left, &right))
            }
        }
    }

    fn root(&self, name: &str) -> Value {
        match name {
            // `$env` alone would expose the whole environment; only `$env.X` resolves.
            "$env" => Value::Null,
            "$node" => self.context.get(NODES).cloned().unwrap_or(Value::Null),
            other => self.context.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    fn member(&self, base: &Expr, key: &Value) -> Result<Value, ExpressionError> {
        if let Expr::Variable(root) = base {
            match root.as_str() {
                "$env" => {
                    return Ok(std::env::var(key.to_display_string())
                        .map(Value::String)
                        .unwrap_or(Value::Null));
                }
                "$node" | "$nodes" => return Ok(self.node_output(key)),
                _ => {}
            }
        }
        let value = self.eval(base)?;
        Ok(access(&value, key))
    }

    /// Node outputs are addressed by id first, then by node name.
    fn node_output(&self, key: &Value) -> Value {
        let key = key.to_display_string();
        let nodes = self.context.get(NODES).and_then(Value::as_object);
        if let Some(output) = nodes.and_then(|n| n.get(&key)) {
            return output.clone();
        }
        self.context
            .get(NODE_NAMES)
            .and_then(|names| names.get(&key))
            .and_then(Value::as_str)
            .and_then(|id| nodes.and_then(|n| n.get(id)))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn call(
        &self,
        name: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, ExpressionError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;

        let args = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let mut named = ValueMap::new();
        for (key, expr) in kwargs {
            named.insert(key.clone(), self.eval(expr)?);
        }

        function(&args, &named).map_err(|cause| ExpressionError::Function {
            name: name.to_string(),
            cause,
        })
    }
}

/// Generic map/sequence/string access, then the special accessors.
pub(crate) fn access(value: &Value, key: &Value) -> Value {
    let key_str = key.to_display_string();
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(&key_str) {
                return found.clone();
            }
        }
        Value::Array(items) => {
            if let Some(found) = key.coerce_i64().and_then(|i| nth(items.len(), i)).map(|i| &items[i]) {
                return found.clone();
            }
        }
        Value::String(s) if key.coerce_i64().is_some() => {
            let chars: Vec<char> = s.chars().collect();
            if let Some(i) = key.coerce_i64().and_then(|i| nth(chars.len(), i)) {
                return Value::String(chars[i].to_string());
            }
        }
        _ => {}
    }
    accessor(value, &key_str)
}

fn accessor(value: &Value, name: &str) -> Value {
    match (name, value) {
        ("length", Value::String(s)) => Value::from(s.chars().count()),
        ("length", Value::Array(a)) => Value::from(a.len()),
        ("length", Value::Object(o)) => Value::from(o.len()),
        ("first", Value::Array(a)) => a.first().cloned().unwrap_or(Value::Null),
        ("last", Value::Array(a)) => a.last().cloned().unwrap_or(Value::Null),
        ("first", Value::String(s)) => s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
        ("last", Value::String(s)) => s.chars().last().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
        ("keys", Value::Object(o)) => Value::Array(o.keys().cloned().map(Value::String).collect()),
        ("values", Value::Object(o)) => Value::Array(o.values().cloned().collect()),
        _ => Value::Null,
    }
}

/// Resolve a possibly negative index against a length.
pub(crate) fn nth(len: usize, index: i64) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(left, right)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::GtEq => Value::Bool(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal))),
        BinaryOp::LtEq => Value::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Add => match (left.coerce_f64(), right.coerce_f64()) {
            (Some(_), Some(_)) => arithmetic(op, left, right),
            _ => Value::String(format!("{}{}", left.to_display_string(), right.to_display_string())),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, left, right),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit in eval"),
    }
}

/// Integer operand: JSON integers, booleans and integer strings.
fn int_operand(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Bool(b) => Some(*b as i64),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if let (Some(a), Some(b)) = (int_operand(left), int_operand(right)) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div if b != 0 && a.checked_rem(b) == Some(0) => a.checked_div(b),
            BinaryOp::Mod if b != 0 => a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r }),
            BinaryOp::Div | BinaryOp::Mod if b == 0 => return Value::Null,
            _ => None,
        };
        if let Some(n) = exact {
            return Value::from(n);
        }
    }

    let (Some(a), Some(b)) = (left.coerce_f64(), right.coerce_f64()) else {
        return Value::Null;
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Value::Null,
        BinaryOp::Div => a / b,
        BinaryOp::Mod if b == 0.0 => return Value::Null,
        BinaryOp::Mod => a - b * (a / b).floor(),
        _ => return Value::Null,
    };
    if result.fract() == 0.0 && !(left.is_f64() || right.is_f64()) && op != BinaryOp::Div {
        number_from_f64(result)
    } else {
        serde_json::Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub(crate) fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Ordering used by comparisons and `sort`/`min`/`max`.
pub(crate) fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        _ => match (left.coerce_f64(), right.coerce_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}
