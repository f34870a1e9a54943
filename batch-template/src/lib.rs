//! Row-driven JSON template expansion
//!
//! A template is a JSON tree (usually authored in YAML) whose strings may
//! embed `${expression}` spans and whose keys may be directives:
//!
//! ```yaml
//! - "${if: data.active}":
//!     id: "${data.id:int}"
//!     tags:
//!       - "${for t: data.tags}": "${t.toUpperCase()}"
//! - "${else}":
//!     skipped: "${data.id}"
//! ```
//!
//! [`template::TemplateExpander`] walks the tree once per row against a
//! [`template::ExpressionContext`] that is reset between rows.

pub mod config;
pub mod error;
pub mod template;

pub use config::{ExpanderConfig, IntFallback};
pub use error::{EvalError, ExpandError, RowError};
pub use template::{ExpansionResult, ExpressionContext, Row, TemplateExpander};
