//! Expression language used inside `${...}`
//!
//! Supports:
//! - Identifiers and paths: `${name}`, `${data.user.email}`, `${this['TP#']}`
//! - Math: `${a + b}`, `${n % 2}`, string concatenation with `+`
//! - Comparisons: `${a == b}`, `${a === b}`, `${x.length > 0}`
//! - Logic: `${a && b}`, `${!a}`, `${cond ? then : else}`, `${a ?? 'default'}`
//! - Literals: `${['a', 'b']}`, `${{key: 1}}`
//! - Methods: `${name.split(' ')}`, `${name.toUpperCase()}`, `${tags.join(',')}`
//! - Functions: `${date('yyyy-MM-dd')}`, `${parseInt(n)}`

mod ast;
mod eval;
mod parser;
mod value;

pub use ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
pub use eval::{Scope, evaluate};
pub use parser::{ParseError, parse_expression};
pub use value::Value;
