//! Tree-walking evaluator for template expressions

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

use super::ast::*;
use super::value::Value;
use crate::error::EvalError;
use crate::template::datefmt;

/// Name resolution for the evaluator
pub trait Scope {
    /// Value bound to `name`, if any
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Object of every binding, the value of `this`
    fn globals(&self) -> Value;

    /// Timestamp used by `date(...)`
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Evaluate an expression against a scope
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Ident(name) => scope
            .lookup(name)
            .ok_or_else(|| EvalError::Reference(name.clone())),

        Expr::This => Ok(scope.globals()),

        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),

        Expr::Object(fields) => {
            let mut object = BTreeMap::new();
            for (key, value) in fields {
                object.insert(key.clone(), evaluate(value, scope)?);
            }
            Ok(Value::Object(object))
        }

        Expr::Member { object, property } => {
            let object = evaluate(object, scope)?;
            let property = evaluate(property, scope)?;
            get_member(&object, &property)
        }

        Expr::Call { function, args } => {
            let args = eval_args(args, scope)?;
            call_function(function, &args, scope)
        }

        Expr::Method {
            object,
            method,
            args,
        } => {
            let object = evaluate(object, scope)?;
            let args = eval_args(args, scope)?;
            call_method(&object, method, &args)
        }

        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            eval_unary(*op, &value)
        }

        Expr::Binary { left, op, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            eval_binary(&left, *op, &right)
        }

        Expr::Logical { left, op, right } => {
            let left = evaluate(left, scope)?;
            match (op, left.is_truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                _ => evaluate(right, scope),
            }
        }

        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            if evaluate(condition, scope)?.is_truthy() {
                evaluate(then_expr, scope)
            } else {
                evaluate(else_expr, scope)
            }
        }

        Expr::Coalesce { exprs } => {
            for e in exprs {
                // A missing name on the left of ?? counts as null
                match evaluate(e, scope) {
                    Ok(Value::Null) => continue,
                    Ok(value) => return Ok(value),
                    Err(err) if err.is_lookup_failure() => continue,
                    Err(err) => return Err(err),
                }
            }
            // All values were null
            Ok(Value::Null)
        }
    }
}

fn eval_args(args: &[Expr], scope: &dyn Scope) -> Result<Vec<Value>, EvalError> {
    args.iter().map(|arg| evaluate(arg, scope)).collect()
}

fn as_f64(value: &Value) -> f64 {
    value.to_number().unwrap_or(f64::NAN)
}

/// Integer index for array/string access, if the property is one
fn as_index(property: &Value) -> Option<usize> {
    match property {
        Value::Int(i) if *i >= 0 => Some(*i as usize),
        Value::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as usize),
        Value::String(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

/// Property access; unknown properties are null
fn get_member(object: &Value, property: &Value) -> Result<Value, EvalError> {
    let name = property.to_string();
    match object {
        Value::Null => Err(EvalError::Type(format!(
            "cannot read property \"{}\" of null",
            name
        ))),
        Value::String(s) => {
            if name == "length" {
                return Ok(Value::Int(s.chars().count() as i64));
            }
            Ok(as_index(property)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null))
        }
        Value::Array(items) => {
            if name == "length" {
                return Ok(Value::Int(items.len() as i64));
            }
            Ok(as_index(property)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null))
        }
        Value::Object(fields) => Ok(fields.get(&name).cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

/// Built-in global functions
fn call_function(name: &str, args: &[Value], scope: &dyn Scope) -> Result<Value, EvalError> {
    let first = args.first().unwrap_or(&Value::Null);
    match name {
        "date" => {
            if args.is_empty() {
                return Err(EvalError::Runtime("date() requires a pattern".to_string()));
            }
            datefmt::format_timestamp(&scope.now(), &first.to_string())
                .map(Value::String)
                .map_err(EvalError::Runtime)
        }
        "String" => Ok(Value::String(if args.is_empty() {
            String::new()
        } else {
            first.to_string()
        })),
        "Number" => Ok(first
            .to_number()
            .map(Value::number)
            .unwrap_or(Value::Float(f64::NAN))),
        "parseInt" => Ok(parse_int_prefix(&first.to_string())
            .map(Value::Int)
            .unwrap_or(Value::Float(f64::NAN))),
        _ if scope.lookup(name).is_some() => {
            Err(EvalError::Type(format!("{} is not a function", name)))
        }
        _ => Err(EvalError::Reference(name.to_string())),
    }
}

/// Leading optionally-signed digits, ignoring surrounding whitespace
fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits_start = usize::from(s.starts_with('-') || s.starts_with('+'));
    let digits_end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| i + digits_start)
        .unwrap_or(s.len());
    if digits_end == digits_start {
        return None;
    }
    s[..digits_end].parse().ok()
}

/// Clamp a script-style string index into `0..=len`
fn clamp_index(value: Option<&Value>, default: usize, len: usize) -> usize {
    match value.map(as_f64) {
        None => default,
        Some(n) if n.is_nan() || n < 0.0 => 0,
        Some(n) => (n as usize).min(len),
    }
}

fn string_arg(args: &[Value], index: usize) -> String {
    args.get(index).map(|v| v.to_string()).unwrap_or_default()
}

/// Built-in string and array methods
fn call_method(object: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    match object {
        Value::Null => Err(EvalError::Type(format!(
            "cannot read property \"{}\" of null",
            method
        ))),
        Value::String(s) => string_method(s, method, args),
        Value::Array(items) => array_method(items, method, args),
        other => Err(not_a_function(other, method)),
    }
}

fn not_a_function(object: &Value, method: &str) -> EvalError {
    EvalError::Type(format!("{}.{} is not a function", object.type_name(), method))
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let value = match method {
        "split" => match args.first() {
            None | Some(Value::Null) => Value::Array(vec![Value::from(s)]),
            Some(sep) => {
                let sep = sep.to_string();
                if sep.is_empty() {
                    Value::Array(s.chars().map(|c| Value::String(c.to_string())).collect())
                } else {
                    Value::Array(s.split(sep.as_str()).map(Value::from).collect())
                }
            }
        },
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let mut start = clamp_index(args.first(), 0, chars.len());
            let mut end = clamp_index(args.get(1), chars.len(), chars.len());
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Value::String(chars[start..end].iter().collect())
        }
        "indexOf" => {
            let needle = string_arg(args, 0);
            match s.find(&needle) {
                Some(byte) => Value::Int(s[..byte].chars().count() as i64),
                None => Value::Int(-1),
            }
        }
        "includes" => Value::Bool(s.contains(&string_arg(args, 0))),
        "startsWith" => Value::Bool(s.starts_with(&string_arg(args, 0))),
        "endsWith" => Value::Bool(s.ends_with(&string_arg(args, 0))),
        "replace" => Value::String(s.replacen(&string_arg(args, 0), &string_arg(args, 1), 1)),
        _ => return Err(not_a_function(&Value::from(s), method)),
    };
    Ok(value)
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let value = match method {
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(sep) => sep.to_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|item| if item.is_null() { String::new() } else { item.to_string() })
                .collect();
            Value::String(parts.join(&sep))
        }
        "includes" => {
            let needle = args.first().unwrap_or(&Value::Null);
            Value::Bool(items.iter().any(|item| strict_eq(item, needle)))
        }
        "indexOf" => {
            let needle = args.first().unwrap_or(&Value::Null);
            Value::Int(
                items
                    .iter()
                    .position(|item| strict_eq(item, needle))
                    .map(|i| i as i64)
                    .unwrap_or(-1),
            )
        }
        _ => return Err(not_a_function(&Value::Array(Vec::new()), method)),
    };
    Ok(value)
}

fn eval_unary(op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Negate => match value {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::Runtime("integer overflow".to_string())),
            other => Ok(Value::number(-as_f64(other))),
        },
    }
}

fn is_text_like(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_))
}

/// Evaluate a binary operation
fn eval_binary(left: &Value, op: BinaryOp, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add if is_text_like(left) || is_text_like(right) => {
            Ok(Value::String(format!("{}{}", left, right)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            eval_math(left, op, right)
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(left, right))),
        BinaryOp::StrictNe => Ok(Value::Bool(!strict_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(left, right);
            Ok(Value::Bool(match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
                (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }))
        }
    }
}

/// Evaluate a math operation
fn eval_math(left: &Value, op: BinaryOp, right: &Value) -> Result<Value, EvalError> {
    let overflow = || EvalError::Runtime("integer overflow".to_string());
    let zero = || EvalError::Runtime("division by zero".to_string());

    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div if b == 0 => Err(zero()),
            BinaryOp::Div => match a.checked_rem(b) {
                Some(0) => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
                Some(_) => Ok(Value::Float(a as f64 / b as f64)),
                None => Err(overflow()),
            },
            BinaryOp::Rem if b == 0 => Err(zero()),
            BinaryOp::Rem => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
            _ => Err(not_arithmetic(op)),
        };
    }

    let (a, b) = (as_f64(left), as_f64(right));
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(zero()),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(not_arithmetic(op)),
    };
    Ok(Value::number(result))
}

fn not_arithmetic(op: BinaryOp) -> EvalError {
    EvalError::Runtime(format!("'{}' is not an arithmetic operator", op))
}

/// `==`: numbers, strings and booleans compare numerically when their types differ
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(_) | Value::Object(_), Value::String(s))
        | (Value::String(s), Value::Array(_) | Value::Object(_)) => {
            let other = if left.as_str().is_some() { right } else { left };
            other.to_string() == *s
        }
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            left == right
        }
        _ => as_f64(left) == as_f64(right),
    }
}

/// `===`: same type and value; `1 === 1.0`
fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_f64(left) == as_f64(right)
        }
        _ => left == right,
    }
}

/// Two strings compare lexically, anything else numerically (NaN is unordered)
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => as_f64(left).partial_cmp(&as_f64(right)),
    }
}
