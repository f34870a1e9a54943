//! Expression context: per-row bindings, evaluation and type coercion

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use super::datefmt;
use super::expr::{self, Expr, Scope, Value};
use super::rows::Row;
use super::scanner::{self, Scanner};
use crate::config::{ExpanderConfig, IntFallback};
use crate::error::{EvalError, ExpandError};

/// `date('pattern')` / `date("pattern")`, answered without the parser
static DATE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^date\((?:'([^']*)'|"([^"]*)")\)$"#).expect("valid regex"));

/// Strings that coerce to `false`
static FALSY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:no|none|na|false|)$").expect("valid regex"));

/// Trailing `:int` / `:boolean` / `:array` / `:string` on a singleton expression
static TYPE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(.*?)\s*:(int|boolean|array|string)\s*$").expect("valid regex")
});

/// Pluggable expression evaluator
pub trait Evaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvalError>;
}

/// Default evaluator backed by the built-in expression language.
/// Parsed expressions are cached since the same template text is
/// evaluated for every row.
#[derive(Debug, Default)]
pub struct ExprEvaluator {
    cache: RefCell<HashMap<String, Rc<Expr>>>,
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(&self, expression: &str) -> Result<Rc<Expr>, EvalError> {
        if let Some(parsed) = self.cache.borrow().get(expression) {
            return Ok(Rc::clone(parsed));
        }

        let parsed = Rc::new(expr::parse_expression(expression)?);
        log::trace!(
            "Parsed expression \"{}\" (references {:?})",
            expression,
            parsed.identifiers()
        );
        self.cache
            .borrow_mut()
            .insert(expression.to_string(), Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Number of distinct expressions parsed so far
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvalError> {
        let parsed = self.parse(expression)?;
        expr::evaluate(&parsed, bindings)
    }
}

/// Named values visible to expressions
#[derive(Debug, Clone)]
pub struct Bindings {
    values: HashMap<String, Value>,
    /// Values restored by `reset(true)`; row writes only shadow them
    reserved: HashMap<String, Value>,
    /// Row column names in order, plus `var` and loop names
    columns: Vec<String>,
    now: DateTime<FixedOffset>,
}

impl Bindings {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            values: HashMap::new(),
            reserved: HashMap::new(),
            columns: Vec::new(),
            now,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Bind a value that survives row resets
    pub fn reserve(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.reserved.insert(name.clone(), value.clone());
        self.values.insert(name, value);
    }

    /// Record a name in the row's column list
    pub fn add_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Clear row bindings; reserved ones are kept when `preserve_reserved` is set
    pub fn reset(&mut self, preserve_reserved: bool) {
        if preserve_reserved {
            self.values.clone_from(&self.reserved);
        } else {
            self.values.clear();
            self.reserved.clear();
        }
        self.columns.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Scope for Bindings {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn globals(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }
}

/// Output node type requested by a singleton suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    Int,
    Boolean,
    Array,
    String,
}

fn split_suffix(expression: &str) -> (&str, Option<NodeType>) {
    let Some(caps) = TYPE_SUFFIX.captures(expression) else {
        return (expression, None);
    };
    let (Some(body), Some(suffix)) = (caps.get(1), caps.get(2)) else {
        return (expression, None);
    };
    let node_type = match suffix.as_str() {
        "int" => NodeType::Int,
        "boolean" => NodeType::Boolean,
        "array" => NodeType::Array,
        _ => NodeType::String,
    };
    (body.as_str(), Some(node_type))
}

/// Bindings plus an evaluator, reused across rows
pub struct ExpressionContext {
    bindings: Bindings,
    evaluator: Box<dyn Evaluator>,
    int_fallback: IntFallback,
}

impl Default for ExpressionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionContext {
    /// Context with default configuration and the current local time
    pub fn new() -> Self {
        Self::with_config(&ExpanderConfig::default())
    }

    pub fn with_config(config: &ExpanderConfig) -> Self {
        let now = config
            .timestamp
            .unwrap_or_else(|| Local::now().fixed_offset());

        let mut bindings = Bindings::new(now);
        bindings.reserve("now", Value::String(now.to_rfc3339()));
        for (name, value) in &config.reserved {
            bindings.reserve(name.clone(), Value::String(value.clone()));
        }

        Self {
            bindings,
            evaluator: Box::new(ExprEvaluator::new()),
            int_fallback: config.int_fallback,
        }
    }

    /// Replace the evaluator
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn reset(&mut self, preserve_reserved: bool) {
        self.bindings.reset(preserve_reserved);
    }

    pub fn reserve(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.reserve(name, value.into());
    }

    /// Evaluate `expression` against the current bindings and reserve the result
    pub fn reserve_evaluated(
        &mut self,
        name: impl Into<String>,
        expression: &str,
    ) -> Result<(), EvalError> {
        let value = self.evaluate(expression)?;
        self.bindings.reserve(name, value);
        Ok(())
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.set(name, value.into());
    }

    /// Bind a row variable and append it to the column list (`var` and loop names)
    pub fn define(&mut self, name: &str, value: impl Into<Value>) {
        self.bindings.set(name, value.into());
        self.bindings.add_column(name);
    }

    /// Column names of the current row, including defined variables
    pub fn columns(&self) -> &[String] {
        self.bindings.columns()
    }

    /// Reset and bind one input row
    pub fn load_row(&mut self, row: &Row) {
        self.reset(true);
        match row {
            Row::Columns(columns) => {
                let mut column = BTreeMap::new();
                for (name, value) in columns {
                    // Null columns stay unbound
                    if let Some(value) = value {
                        self.bindings.set(name.clone(), Value::from(value.as_str()));
                        self.bindings.add_column(name);
                        column.insert(name.clone(), Value::from(value.as_str()));
                    }
                }
                self.bindings.set("column", Value::Object(column));
            }
            Row::Object(fields) => {
                for (name, value) in fields {
                    self.bindings.set(name.clone(), Value::from_json(value));
                    self.bindings.add_column(name);
                }
                self.bindings
                    .set("data", Value::from_json(&JsonValue::Object(fields.clone())));
            }
        }
    }

    /// Answer bound text values and `date(...)` calls without evaluation
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(Value::String(s)) = self.bindings.get(name) {
            return Some(Value::String(s.clone()));
        }

        let caps = DATE_CALL.captures(name)?;
        let pattern = caps.get(1).or_else(|| caps.get(2))?.as_str();
        // Invalid patterns fall through so the evaluator reports them
        datefmt::format_timestamp(&self.bindings.now, pattern)
            .ok()
            .map(Value::String)
    }

    /// Evaluate an expression; undefined names and member access on null give null
    pub fn evaluate(&self, expression: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.lookup(expression) {
            return Ok(value);
        }

        match self.evaluator.evaluate(expression, &self.bindings) {
            Err(err) if err.is_lookup_failure() => {
                log::debug!("\"{}\" resolved to null: {}", expression, err);
                Ok(Value::Null)
            }
            result => result,
        }
    }

    pub fn is_true(&self, expression: &str) -> Result<bool, EvalError> {
        Ok(to_bool(&self.evaluate(expression)?))
    }

    pub fn as_int(&self, expression: &str) -> Result<i64, ExpandError> {
        let value = self
            .evaluate(expression)
            .map_err(|err| ExpandError::evaluation(expression, err))?;

        match to_int(&value) {
            Some(n) => Ok(n),
            None => match self.int_fallback {
                IntFallback::Zero => {
                    log::warn!(
                        "\"{}\" evaluated to \"{}\", which is not an integer; using 0",
                        expression,
                        value
                    );
                    Ok(0)
                }
                IntFallback::Error => Err(ExpandError::InvalidInteger {
                    expression: expression.to_string(),
                    value: value.to_string(),
                }),
            },
        }
    }

    pub fn as_array(&self, expression: &str) -> Result<Option<Vec<String>>, EvalError> {
        Ok(to_array(&self.evaluate(expression)?))
    }

    pub fn as_text(&self, expression: &str) -> Result<String, EvalError> {
        Ok(to_text(&self.evaluate(expression)?))
    }

    /// Evaluate to a JSON node using the result's own type
    pub fn as_node(&self, expression: &str) -> Result<Option<JsonValue>, EvalError> {
        let value = self.evaluate(expression)?;
        let node = match value {
            Value::Null => None,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {
                Some(value.to_json()).filter(|json| !json.is_null())
            }
            Value::Array(_) | Value::Object(_) => Some(JsonValue::String(value.to_string())),
        };
        Ok(node)
    }

    /// Expand one template string.
    ///
    /// A singleton `${expr}` (optionally suffixed with a type) yields a typed
    /// node; anything else yields text with every span interpolated.
    /// `None` means the value is absent.
    pub fn expand(&self, input: &str) -> Result<Option<JsonValue>, ExpandError> {
        if let Some(expression) = scanner::singleton(input) {
            let (expression, node_type) = split_suffix(expression);
            let wrap = |err| ExpandError::evaluation(expression, err);

            return match node_type {
                Some(NodeType::Int) => Ok(Some(JsonValue::from(self.as_int(expression)?))),
                Some(NodeType::Boolean) => {
                    Ok(Some(JsonValue::Bool(self.is_true(expression).map_err(wrap)?)))
                }
                Some(NodeType::Array) => Ok(self
                    .as_array(expression)
                    .map_err(wrap)?
                    .map(|items| JsonValue::Array(items.into_iter().map(JsonValue::String).collect()))),
                Some(NodeType::String) => {
                    Ok(Some(JsonValue::String(self.as_text(expression).map_err(wrap)?)))
                }
                None => self.as_node(expression).map_err(wrap),
            };
        }

        if !scanner::has_expression(input) {
            return Ok(Some(JsonValue::String(input.to_string())));
        }

        let text = Scanner::replace_all(input, |expression| {
            self.as_text(expression)
                .map_err(|err| ExpandError::evaluation(expression, err))
        })?;
        Ok(Some(JsonValue::String(text)))
    }
}

/// Boolean coercion: "no", "none", "na", "false" and "" (any case) are false
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !FALSY.is_match(s),
        Value::Int(n) => *n != 0,
        Value::Float(n) => *n != 0.0,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Integer coercion; `None` when a string or NaN cannot be converted
pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Null => Some(0),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int(n) => Some(*n),
        Value::Float(n) if n.is_finite() => Some(n.trunc() as i64),
        Value::Float(_) => None,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(|n| n.trunc() as i64)
            })
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Array coercion: elements as text with empty ones dropped; empty means absent
pub fn to_array(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Null => return None,
        Value::Array(items) => items.iter().map(to_text).collect(),
        scalar => vec![to_text(scalar)],
    };
    let items: Vec<String> = items.into_iter().filter(|item| !item.is_empty()).collect();
    if items.is_empty() { None } else { Some(items) }
}

/// Text coercion: null is empty
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
