//! Template expander: rewrites a JSON template tree against one row
//!
//! Strings go through [`ExpressionContext::expand`]. Arrays and objects are
//! walked in declaration order so `var` bindings are visible to later
//! siblings only. Each array or object level has its own conditional chain.
//! An array or object that expands to nothing collapses to `None`, which
//! the parent omits.

use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use super::context::ExpressionContext;
use super::directive::{self, ConditionalChain, Directive, Entry, LoopDirective, LoopSource};
use super::rows::{Row, RowExpansion};
use crate::error::ExpandError;

/// An immutable template, expanded once per row
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateExpander {
    template: JsonValue,
}

impl TemplateExpander {
    pub fn new(template: JsonValue) -> Self {
        Self { template }
    }

    /// Load a template authored as YAML (or JSON, which YAML accepts)
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let template: JsonValue = serde_yaml::from_str(content)?;
        Ok(Self::new(template))
    }

    pub fn template(&self) -> &JsonValue {
        &self.template
    }

    /// Expand the template against the rows already loaded in `ctx`
    pub fn expand(&self, ctx: &mut ExpressionContext) -> Result<Option<JsonValue>, ExpandError> {
        expand_node(&self.template, ctx)
    }

    /// Expand the template once per row, yielding one result per row
    pub fn expand_rows<'a, I>(
        &'a self,
        ctx: &'a mut ExpressionContext,
        rows: I,
    ) -> RowExpansion<'a, I::IntoIter>
    where
        I: IntoIterator<Item = Row>,
    {
        RowExpansion::new(self, ctx, rows.into_iter())
    }
}

fn expand_node(node: &JsonValue, ctx: &mut ExpressionContext) -> Result<Option<JsonValue>, ExpandError> {
    match node {
        JsonValue::String(text) => ctx.expand(text),
        JsonValue::Array(items) => expand_array(items, ctx),
        JsonValue::Object(fields) => expand_object(fields, ctx),
        other => Ok(Some(other.clone())),
    }
}

fn expand_array(items: &[JsonValue], ctx: &mut ExpressionContext) -> Result<Option<JsonValue>, ExpandError> {
    let mut result = Vec::new();
    let mut chain = ConditionalChain::new();

    for item in items {
        match directive::classify(item) {
            Entry::Directive { directive, body } => match directive {
                Directive::Loop(looping) => {
                    for value in loop_values(&looping, ctx)? {
                        ctx.define(&looping.variable, value);
                        merge_into_array(&mut result, expand_node(body, ctx)?);
                    }
                }
                Directive::Conditional(branch) => {
                    if chain.step(&branch, |expr| condition(ctx, expr))? {
                        merge_into_array(&mut result, expand_node(body, ctx)?);
                    }
                }
                Directive::Var(name) => bind_var(&name, body, ctx)?,
                Directive::Error(text) => return Err(user_error(text, body, ctx)),
            },
            Entry::Plain(entry) => {
                if let Some(expanded) = expand_node(entry, ctx)? {
                    result.push(expanded);
                }
            }
        }
    }

    Ok(if result.is_empty() {
        None
    } else {
        Some(JsonValue::Array(result))
    })
}

fn expand_object(
    fields: &Map<String, JsonValue>,
    ctx: &mut ExpressionContext,
) -> Result<Option<JsonValue>, ExpandError> {
    let mut result = Map::new();
    let mut chain = ConditionalChain::new();

    for (key, value) in fields {
        match directive::classify_key(key) {
            Some(Directive::Conditional(branch)) => {
                if chain.step(&branch, |expr| condition(ctx, expr))? {
                    merge_into_object(&mut result, key, expand_node(value, ctx)?)?;
                }
            }
            Some(Directive::Loop(looping)) => {
                for item in loop_values(&looping, ctx)? {
                    ctx.define(&looping.variable, item);
                    merge_into_object(&mut result, key, expand_node(value, ctx)?)?;
                }
            }
            Some(Directive::Var(name)) => bind_var(&name, value, ctx)?,
            Some(Directive::Error(text)) => return Err(user_error(text, value, ctx)),
            None => {
                // Keys may interpolate too
                let name = node_text(ctx.expand(key)?);
                if let Some(expanded) = expand_node(value, ctx)? {
                    result.insert(name, expanded);
                }
            }
        }
    }

    Ok(if result.is_empty() {
        None
    } else {
        Some(JsonValue::Object(result))
    })
}

fn condition(ctx: &ExpressionContext, expr: &str) -> Result<bool, ExpandError> {
    let taken = ctx
        .is_true(expr)
        .map_err(|err| ExpandError::evaluation(expr, err))?;
    log::debug!("Condition \"{}\" is {}", expr.trim(), taken);
    Ok(taken)
}

/// Values a loop iterates over
fn loop_values(looping: &LoopDirective, ctx: &ExpressionContext) -> Result<Vec<String>, ExpandError> {
    let values = match &looping.source {
        LoopSource::Expression(expr) => ctx
            .as_array(expr)
            .map_err(|err| ExpandError::evaluation(expr.as_str(), err))?
            .unwrap_or_default(),
        LoopSource::Columns(pattern) => {
            let matcher = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                ExpandError::Directive(format!("invalid column pattern \"{}\": {}", pattern, e))
            })?;
            let has_group = matcher.captures_len() > 1;
            ctx.columns()
                .iter()
                .filter_map(|column| {
                    let caps = matcher.captures(column)?;
                    if has_group {
                        Some(caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default())
                    } else {
                        Some(column.clone())
                    }
                })
                .collect()
        }
    };
    log::debug!("Loop \"{}\" over {} values", looping.variable, values.len());
    Ok(values)
}

fn bind_var(name: &str, body: &JsonValue, ctx: &mut ExpressionContext) -> Result<(), ExpandError> {
    let text = node_text(expand_node(body, ctx)?);
    log::debug!("var {} = \"{}\"", name, text);
    ctx.define(name, text);
    Ok(())
}

/// The expanded body is the message; the key's own text is the fallback
fn user_error(text: Option<String>, body: &JsonValue, ctx: &mut ExpressionContext) -> ExpandError {
    let message = match expand_node(body, ctx) {
        Ok(message) => node_text(message),
        Err(err) => return err,
    };
    match text {
        Some(text) if message.is_empty() => ExpandError::User(text),
        _ => ExpandError::User(message),
    }
}

/// Arrays splice into the parent, other values append, absent adds nothing
fn merge_into_array(result: &mut Vec<JsonValue>, expanded: Option<JsonValue>) {
    match expanded {
        None => {}
        Some(JsonValue::Array(items)) => result.extend(items),
        Some(other) => result.push(other),
    }
}

/// Object bodies of object-key directives merge by field overwrite
fn merge_into_object(
    result: &mut Map<String, JsonValue>,
    key: &str,
    expanded: Option<JsonValue>,
) -> Result<(), ExpandError> {
    match expanded {
        None => Ok(()),
        Some(JsonValue::Object(fields)) => {
            result.extend(fields);
            Ok(())
        }
        Some(_) => Err(ExpandError::Directive(format!(
            "\"{}\" must contain a nested object when used as an object key",
            key
        ))),
    }
}

/// Text form of an expanded node; absent and null are empty
fn node_text(node: Option<JsonValue>) -> String {
    match node {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s,
        Some(other) => other.to_string(),
    }
}
