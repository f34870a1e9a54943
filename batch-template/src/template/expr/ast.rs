//! AST types for template expressions

use super::value::Value;

/// An expression inside `${...}`
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant: `'text'`, `12`, `true`, `null`
    Literal(Value),
    /// A variable reference: `name`
    Ident(String),
    /// The object of all current bindings: `this`
    This,
    /// Array literal: `['a', b]`
    Array(Vec<Expr>),
    /// Object literal: `{key: value}`
    Object(Vec<(String, Expr)>),
    /// Property access: `a.b` or `a['b']`
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    /// Global helper call: `date('yyyy')`
    Call { function: String, args: Vec<Expr> },
    /// Method call: `name.split(' ')`
    Method {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Short-circuit `&&` / `||`, yielding the deciding operand
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// Ternary conditional: `cond ? then : else`
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Null coalesce: `a ?? b ?? c`
    Coalesce { exprs: Vec<Expr> },
}

impl Expr {
    /// Collect the free variable names referenced by this expression
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_identifiers(self, &mut names);
        names
    }
}

fn collect_identifiers<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    match expr {
        Expr::Ident(name) => names.push(name),
        Expr::Literal(_) | Expr::This => {}
        Expr::Array(items) | Expr::Call { args: items, .. } | Expr::Coalesce { exprs: items } => {
            for item in items {
                collect_identifiers(item, names);
            }
        }
        Expr::Object(fields) => {
            for (_, value) in fields {
                collect_identifiers(value, names);
            }
        }
        Expr::Member { object, property } => {
            collect_identifiers(object, names);
            collect_identifiers(property, names);
        }
        Expr::Method { object, args, .. } => {
            collect_identifiers(object, names);
            for arg in args {
                collect_identifiers(arg, names);
            }
        }
        Expr::Unary { operand, .. } => collect_identifiers(operand, names),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect_identifiers(left, names);
            collect_identifiers(right, names);
        }
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            collect_identifiers(condition, names);
            collect_identifiers(then_expr, names);
            collect_identifiers(else_expr, names);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Negate => write!(f, "-"),
        }
    }
}

/// Arithmetic and comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl std::fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
        }
    }
}
