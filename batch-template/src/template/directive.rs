//! Directive classification and conditional chain tracking
//!
//! A directive is a singleton `${...}` key in one of these forms:
//! - `${for id: expression}` / `${for column id: regex}`
//! - `${if: expression}` / `${else if: expression}` / `${else}`
//! - `${var name}`
//! - `${error ...}`
//!
//! Inside arrays a directive is a wrapper object with exactly one field;
//! inside objects it is the field key itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use super::scanner;
use crate::error::ExpandError;

static LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\$\{for\s+(column\s+)?([a-zA-Z_]\w*)\s*:(.*)\}$").expect("valid regex")
});

static CONDITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\$\{(?:(else\s+)?if(?:\s[^:]*)?:(.*)|else(?:\s.*)?)\}$").expect("valid regex")
});

static VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{var\s+([a-zA-Z_]\w*)\s*\}$").expect("valid regex"));

static ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\$\{error(?:\s+(.*?))?\s*\}$").expect("valid regex"));

/// Where loop values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopSource {
    /// Expression evaluated as an array
    Expression(String),
    /// Regex matched against the current row's column names
    Columns(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDirective {
    pub variable: String,
    pub source: LoopSource,
}

/// One link of an if / else if / else chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    If(String),
    ElseIf(String),
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Loop(LoopDirective),
    Conditional(Branch),
    Var(String),
    /// Text after `error`, used when the body expands to nothing
    Error(Option<String>),
}

/// Recognize a directive key
pub fn classify_key(key: &str) -> Option<Directive> {
    scanner::singleton(key)?;

    if let Some(caps) = LOOP.captures(key) {
        let variable = caps.get(2)?.as_str().to_string();
        let source = caps.get(3)?.as_str().to_string();
        let source = if caps.get(1).is_some() {
            LoopSource::Columns(source.trim().to_string())
        } else {
            LoopSource::Expression(source)
        };
        return Some(Directive::Loop(LoopDirective { variable, source }));
    }

    if let Some(caps) = CONDITIONAL.captures(key) {
        let branch = match (caps.get(1), caps.get(2)) {
            (_, None) => Branch::Else,
            (None, Some(expr)) => Branch::If(expr.as_str().to_string()),
            (Some(_), Some(expr)) => Branch::ElseIf(expr.as_str().to_string()),
        };
        return Some(Directive::Conditional(branch));
    }

    if let Some(caps) = VAR.captures(key) {
        return Some(Directive::Var(caps.get(1)?.as_str().to_string()));
    }

    if let Some(caps) = ERROR.captures(key) {
        let text = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .filter(|text| !text.is_empty());
        return Some(Directive::Error(text));
    }

    None
}

/// A classified array entry
#[derive(Debug, Clone, PartialEq)]
pub enum Entry<'a> {
    Directive {
        directive: Directive,
        body: &'a JsonValue,
    },
    Plain(&'a JsonValue),
}

/// Classify an array entry: a single-field object with a directive key is a directive
pub fn classify(entry: &JsonValue) -> Entry<'_> {
    if let JsonValue::Object(fields) = entry {
        if fields.len() == 1 {
            if let Some((key, body)) = fields.iter().next() {
                if let Some(directive) = classify_key(key) {
                    return Entry::Directive { directive, body };
                }
            }
        }
    }
    Entry::Plain(entry)
}

/// State of a conditional chain within one array or object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainState {
    /// No `if` seen, or the last `else` closed it
    #[default]
    Closed,
    Open { satisfied: bool },
}

/// Tracks if / else if / else across the entries of one scope
#[derive(Debug, Default)]
pub struct ConditionalChain {
    state: ChainState,
}

impl ConditionalChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Advance the chain by one branch and report whether its body is taken.
    /// `test` evaluates a branch condition and is only called when the
    /// outcome depends on it.
    pub fn step<F>(&mut self, branch: &Branch, test: F) -> Result<bool, ExpandError>
    where
        F: FnOnce(&str) -> Result<bool, ExpandError>,
    {
        match (branch, self.state) {
            (Branch::If(expr), _) => {
                let taken = test(expr)?;
                self.state = ChainState::Open { satisfied: taken };
                Ok(taken)
            }
            (Branch::ElseIf(_), ChainState::Closed) => Err(ExpandError::Directive(
                "${if} required before ${else if}".to_string(),
            )),
            (Branch::ElseIf(_), ChainState::Open { satisfied: true }) => Ok(false),
            (Branch::ElseIf(expr), ChainState::Open { satisfied: false }) => {
                let taken = test(expr)?;
                self.state = ChainState::Open { satisfied: taken };
                Ok(taken)
            }
            (Branch::Else, ChainState::Closed) => Err(ExpandError::Directive(
                "${if} required before ${else}".to_string(),
            )),
            (Branch::Else, ChainState::Open { satisfied }) => {
                self.state = ChainState::Closed;
                Ok(!satisfied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_loops() {
        assert_eq!(
            classify_key("${for i:['a','b']}"),
            Some(Directive::Loop(LoopDirective {
                variable: "i".into(),
                source: LoopSource::Expression("['a','b']".into()),
            }))
        );
        assert_eq!(
            classify_key("${for column c: tp(\\d+)}"),
            Some(Directive::Loop(LoopDirective {
                variable: "c".into(),
                source: LoopSource::Columns("tp(\\d+)".into()),
            }))
        );
        assert_eq!(classify_key("${for 1x:y}"), None);
    }

    #[test]
    fn test_classify_conditionals() {
        assert_eq!(
            classify_key("${if:a > 1}"),
            Some(Directive::Conditional(Branch::If("a > 1".into())))
        );
        assert_eq!(
            classify_key("${if labelled:true}"),
            Some(Directive::Conditional(Branch::If("true".into())))
        );
        assert_eq!(
            classify_key("${else if:b}"),
            Some(Directive::Conditional(Branch::ElseIf("b".into())))
        );
        assert_eq!(classify_key("${else}"), Some(Directive::Conditional(Branch::Else)));
        assert_eq!(classify_key("${else otherwise}"), Some(Directive::Conditional(Branch::Else)));
        assert_eq!(classify_key("${elsewhere}"), None);
        assert_eq!(classify_key("${iffy}"), None);
    }

    #[test]
    fn test_classify_var_and_error() {
        assert_eq!(classify_key("${var total}"), Some(Directive::Var("total".into())));
        assert_eq!(classify_key("${var}"), None);
        assert_eq!(classify_key("${error}"), Some(Directive::Error(None)));
        assert_eq!(
            classify_key("${error bad row }"),
            Some(Directive::Error(Some("bad row".into())))
        );
        assert_eq!(classify_key("${errors}"), None);
    }

    #[test]
    fn test_classify_requires_singleton() {
        assert_eq!(classify_key(" ${if:true}"), None);
        assert_eq!(classify_key("${if:true}x"), None);
        assert_eq!(classify_key("plain"), None);
    }

    #[test]
    fn test_classify_entry_shape() {
        let wrapper = json!({"${if:true}": [1, 2]});
        assert!(matches!(
            classify(&wrapper),
            Entry::Directive { directive: Directive::Conditional(Branch::If(_)), .. }
        ));

        // Two fields: a plain object, even with a directive key
        let two = json!({"${if:true}": 1, "other": 2});
        assert_eq!(classify(&two), Entry::Plain(&two));

        let scalar = json!("${x}");
        assert_eq!(classify(&scalar), Entry::Plain(&scalar));
    }

    fn constant(value: bool) -> impl FnOnce(&str) -> Result<bool, ExpandError> {
        move |_| Ok(value)
    }

    #[test]
    fn test_chain_if_else() {
        let mut chain = ConditionalChain::new();
        assert!(chain.step(&Branch::If("t".into()), constant(true)).unwrap());
        assert!(!chain.step(&Branch::Else, constant(true)).unwrap());
        assert_eq!(chain.state(), ChainState::Closed);

        assert!(!chain.step(&Branch::If("f".into()), constant(false)).unwrap());
        assert!(chain.step(&Branch::Else, constant(false)).unwrap());
    }

    #[test]
    fn test_chain_else_if_skips_after_match() {
        let mut chain = ConditionalChain::new();
        chain.step(&Branch::If("a".into()), constant(true)).unwrap();
        let taken = chain
            .step(&Branch::ElseIf("b".into()), |_| panic!("must not evaluate"))
            .unwrap();
        assert!(!taken);
        assert_eq!(chain.state(), ChainState::Open { satisfied: true });
    }

    #[test]
    fn test_chain_else_if_evaluates_when_open() {
        let mut chain = ConditionalChain::new();
        chain.step(&Branch::If("a".into()), constant(false)).unwrap();
        assert!(chain.step(&Branch::ElseIf("b".into()), constant(true)).unwrap());
        assert!(!chain.step(&Branch::Else, constant(true)).unwrap());
    }

    #[test]
    fn test_chain_if_restarts_mid_scope() {
        let mut chain = ConditionalChain::new();
        chain.step(&Branch::If("a".into()), constant(true)).unwrap();
        assert!(!chain.step(&Branch::If("b".into()), constant(false)).unwrap());
        assert!(chain.step(&Branch::Else, constant(false)).unwrap());
    }

    #[test]
    fn test_chain_violations() {
        let mut chain = ConditionalChain::new();
        assert!(matches!(
            chain.step(&Branch::Else, constant(true)),
            Err(ExpandError::Directive(_))
        ));
        assert!(matches!(
            chain.step(&Branch::ElseIf("x".into()), constant(true)),
            Err(ExpandError::Directive(_))
        ));

        chain.step(&Branch::If("a".into()), constant(false)).unwrap();
        chain.step(&Branch::Else, constant(false)).unwrap();
        assert!(chain.step(&Branch::Else, constant(false)).is_err());
    }
}
