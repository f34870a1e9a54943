//! Template expansion: scanner, expression language, context and expander

pub mod context;
pub mod datefmt;
pub mod directive;
pub mod expander;
pub mod expr;
pub mod rows;
pub mod scanner;

pub use context::{
    Bindings, Evaluator, ExprEvaluator, ExpressionContext, to_array, to_bool, to_int, to_text,
};
pub use directive::{Branch, ChainState, ConditionalChain, Directive, LoopDirective, LoopSource};
pub use expander::TemplateExpander;
pub use rows::{
    ExpansionResult, Row, RowExpansion, parse_csv_rows, parse_json_rows, read_csv_rows,
};
pub use scanner::{ExpressionSpan, Scanner};
