//! Lexer and recursive descent parser for template expressions

use thiserror::Error;

use super::ast::*;
use super::value::Value;

/// Parse error with position information
#[derive(Error, Debug, Clone, PartialEq)]
#[error("at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
    pub context: String,
}

/// Token types for the expression lexer
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Ident(String),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    This,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Question,
    DoubleQuestion, // ??
    Colon,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // End of input
    Eof,
}

/// Lexer for expression tokens
struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn current_pos(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len())
    }

    fn error(&self, message: impl Into<String>, pos: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position: pos,
            context: self.input[pos..].chars().take(20).collect(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    /// Consume `next` if it is the upcoming character
    fn eat(&mut self, next: char) -> bool {
        if let Some(&(_, c)) = self.chars.peek() {
            if c == next {
                self.chars.next();
                return true;
            }
        }
        false
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();

        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        // Single-char tokens
        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            _ => None,
        };
        if let Some(token) = single {
            self.chars.next();
            return Ok(token);
        }

        // Multi-char operators
        match ch {
            '?' => {
                self.chars.next();
                return Ok(if self.eat('?') {
                    Token::DoubleQuestion
                } else {
                    Token::Question
                });
            }
            '=' => {
                self.chars.next();
                if self.eat('=') {
                    return Ok(if self.eat('=') {
                        Token::StrictEq
                    } else {
                        Token::Eq
                    });
                }
                return Err(self.error("expected '==' for equality comparison", pos));
            }
            '!' => {
                self.chars.next();
                if self.eat('=') {
                    return Ok(if self.eat('=') {
                        Token::StrictNe
                    } else {
                        Token::Ne
                    });
                }
                return Ok(Token::Not);
            }
            '<' => {
                self.chars.next();
                return Ok(if self.eat('=') { Token::Le } else { Token::Lt });
            }
            '>' => {
                self.chars.next();
                return Ok(if self.eat('=') { Token::Ge } else { Token::Gt });
            }
            '&' => {
                self.chars.next();
                if self.eat('&') {
                    return Ok(Token::And);
                }
                return Err(self.error("expected '&&'", pos));
            }
            '|' => {
                self.chars.next();
                if self.eat('|') {
                    return Ok(Token::Or);
                }
                return Err(self.error("expected '||'", pos));
            }
            _ => {}
        }

        // String literal
        if ch == '\'' || ch == '"' {
            return self.string_literal(ch, pos);
        }

        // Number
        if ch.is_ascii_digit() {
            return self.number(pos);
        }

        // Identifier or keyword
        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            let start = pos;
            while let Some(&(_, c)) = self.chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '$' {
                    self.chars.next();
                } else {
                    break;
                }
            }
            let end = self.current_pos();
            let ident = &self.input[start..end];

            return Ok(match ident {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                "null" | "undefined" => Token::Null,
                "this" => Token::This,
                _ => Token::Ident(ident.to_string()),
            });
        }

        Err(self.error(format!("unexpected character: '{}'", ch), pos))
    }

    fn string_literal(&mut self, quote: char, pos: usize) -> Result<Token, ParseError> {
        self.chars.next(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, '0')) => s.push('\0'),
                    Some((_, c)) => s.push(c),
                    None => return Err(self.error("unclosed string literal", pos)),
                },
                Some((_, c)) => s.push(c),
                None => return Err(self.error("unclosed string literal", pos)),
            }
        }
        Ok(Token::String(s))
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut has_dot = false;

        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.chars.next();
            } else if c == '.' && !has_dot {
                // A dot followed by a digit is a decimal point, otherwise member access
                let next_is_digit = self.input[i + 1..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit());
                if next_is_digit {
                    has_dot = true;
                    self.chars.next();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let end = self.current_pos();
        let num_str = &self.input[start..end];

        if has_dot {
            let n: f64 = num_str
                .parse()
                .map_err(|_| self.error(format!("invalid float: {}", num_str), start))?;
            Ok(Token::Float(n))
        } else {
            match num_str.parse::<i64>() {
                Ok(n) => Ok(Token::Int(n)),
                // Too large for i64: keep it as a float like a script engine would
                Err(_) => num_str
                    .parse::<f64>()
                    .map(Token::Float)
                    .map_err(|_| self.error(format!("invalid integer: {}", num_str), start)),
            }
        }
    }
}

/// Expression parser
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn unexpected(&mut self, what: &str) -> ParseError {
        ParseError {
            message: format!("{}, found {:?}", what, self.current),
            position: self.lexer.current_pos(),
            context: String::new(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.current == expected {
            self.advance()
        } else {
            Err(self.unexpected(&format!("expected {:?}", expected)))
        }
    }

    /// Parse the full expression
    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_ternary()?;

        if self.current != Token::Eof {
            return Err(self.unexpected("unexpected token after expression"));
        }

        Ok(expr)
    }

    /// ternary = coalesce ("?" ternary ":" ternary)?
    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.parse_coalesce()?;

        if self.current == Token::Question {
            self.advance()?;
            let then_expr = self.parse_ternary()?; // Right-associative
            self.expect(Token::Colon)?;
            let else_expr = self.parse_ternary()?;

            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            });
        }

        Ok(condition)
    }

    /// coalesce = or ("??" or)*
    fn parse_coalesce(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_or()?;

        if self.current == Token::DoubleQuestion {
            let mut exprs = vec![expr];
            while self.current == Token::DoubleQuestion {
                self.advance()?;
                exprs.push(self.parse_or()?);
            }
            expr = Expr::Coalesce { exprs };
        }

        Ok(expr)
    }

    /// or = and ("||" and)*
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.current == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// and = equality ("&&" equality)*
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.current == Token::And {
            self.advance()?;
            let right = self.parse_equality()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// equality = comparison (("==" | "!=" | "===" | "!==") comparison)*
    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match &self.current {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::StrictEq => BinaryOp::StrictEq,
                Token::StrictNe => BinaryOp::StrictNe,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_comparison()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// comparison = additive (("<" | "<=" | ">" | ">=") additive)*
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// additive = multiplicative (("+"|"-") multiplicative)*
    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// multiplicative = unary (("*"|"/"|"%") unary)*
    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// unary = ("!" | "-") unary | postfix
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.current {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance()?;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// postfix = primary ("." ident call? | "[" expression "]")*
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            match &self.current {
                Token::Dot => {
                    self.advance()?;
                    let name = match &self.current {
                        Token::Ident(name) => name.clone(),
                        _ => return Err(self.unexpected("expected property name after '.'")),
                    };
                    self.advance()?;

                    if self.current == Token::LParen {
                        let args = self.parse_args()?;
                        expr = Expr::Method {
                            object: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property: Box::new(Expr::Literal(Value::String(name))),
                        };
                    }
                }
                Token::LBracket => {
                    self.advance()?;
                    let property = self.parse_ternary()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// args = "(" (expression ("," expression)*)? ")"
    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(Token::LParen)?;
        self.parse_list(Token::RParen)
    }

    /// Comma separated expressions up to `close` (trailing comma allowed)
    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while self.current != close {
            items.push(self.parse_ternary()?);
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    /// primary = "(" expression ")" | literal | array | object | identifier call?
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current.clone();
        match token {
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_ternary()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance()?;
                Ok(Expr::Array(self.parse_list(Token::RBracket)?))
            }
            Token::LBrace => {
                self.advance()?;
                self.parse_object()
            }
            Token::Int(n) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Int(n)))
            }
            Token::Float(n) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Float(n)))
            }
            Token::String(s) => {
                self.advance()?;
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Bool(b) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Bool(b)))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expr::Literal(Value::Null))
            }
            Token::This => {
                self.advance()?;
                Ok(Expr::This)
            }
            Token::Ident(name) => {
                self.advance()?;
                if self.current == Token::LParen {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call {
                        function: name,
                        args,
                    });
                }
                Ok(Expr::Ident(name))
            }
            _ => Err(self.unexpected("unexpected token")),
        }
    }

    /// object = "{" (key ":" expression ("," key ":" expression)*)? "}"
    fn parse_object(&mut self) -> Result<Expr, ParseError> {
        let mut fields = Vec::new();
        while self.current != Token::RBrace {
            let key = match &self.current {
                Token::Ident(s) | Token::String(s) => s.clone(),
                Token::Int(n) => n.to_string(),
                _ => return Err(self.unexpected("expected object key")),
            };
            self.advance()?;
            self.expect(Token::Colon)?;
            fields.push((key, self.parse_ternary()?));
            if self.current == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::Object(fields))
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Parse the text of one `${...}` expression
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input)?;
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    #[test]
    fn test_parse_simple_ident() {
        assert_eq!(parse_expression("name").unwrap(), ident("name"));
    }

    #[test]
    fn test_parse_member_chain() {
        let expr = parse_expression("data.user.email").unwrap();
        if let Expr::Member { object, property } = expr {
            assert!(matches!(*object, Expr::Member { .. }));
            assert_eq!(*property, Expr::Literal(Value::from("email")));
        } else {
            panic!("expected member expression");
        }
    }

    #[test]
    fn test_parse_index_access() {
        let expr = parse_expression("this['TP#']").unwrap();
        assert_eq!(
            expr,
            Expr::Member {
                object: Box::new(Expr::This),
                property: Box::new(Expr::Literal(Value::from("TP#"))),
            }
        );
    }

    #[test]
    fn test_parse_method_call() {
        let expr = parse_expression("'foo bar'.split(' ')").unwrap();
        if let Expr::Method { object, method, args } = expr {
            assert_eq!(*object, Expr::Literal(Value::from("foo bar")));
            assert_eq!(method, "split");
            assert_eq!(args, vec![Expr::Literal(Value::from(" "))]);
        } else {
            panic!("expected method call");
        }
    }

    #[test]
    fn test_parse_global_call() {
        let expr = parse_expression("date(\"yyyy-MM-dd\")").unwrap();
        assert!(matches!(expr, Expr::Call { ref function, ref args } if function == "date" && args.len() == 1));
    }

    #[test]
    fn test_parse_math_precedence() {
        // a + b * c should parse as a + (b * c)
        let expr = parse_expression("a + b * c").unwrap();
        if let Expr::Binary { left, op, right } = expr {
            assert_eq!(*left, ident("a"));
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
        } else {
            panic!("expected binary expression");
        }
    }

    #[test]
    fn test_parse_logical_precedence() {
        // a || b && c should parse as a || (b && c)
        let expr = parse_expression("a || b && c").unwrap();
        if let Expr::Logical { op, right, .. } = expr {
            assert_eq!(op, LogicalOp::Or);
            assert!(matches!(*right, Expr::Logical { op: LogicalOp::And, .. }));
        } else {
            panic!("expected logical expression");
        }
    }

    #[test]
    fn test_parse_comparison_binds_tighter_than_and() {
        let expr = parse_expression("x.length>0 && true").unwrap();
        if let Expr::Logical { left, .. } = expr {
            assert!(matches!(*left, Expr::Binary { op: BinaryOp::Gt, .. }));
        } else {
            panic!("expected logical expression");
        }
    }

    #[test]
    fn test_parse_ternary_and_coalesce() {
        let expr = parse_expression("a ?? b ? 'Yes' : 'No'").unwrap();
        if let Expr::Ternary { condition, .. } = expr {
            assert!(matches!(*condition, Expr::Coalesce { ref exprs } if exprs.len() == 2));
        } else {
            panic!("expected ternary expression");
        }
    }

    #[test]
    fn test_parse_array_literal() {
        let expr = parse_expression("['a', 'b', 'c',]").unwrap();
        assert!(matches!(expr, Expr::Array(ref items) if items.len() == 3));
        assert_eq!(parse_expression("[]").unwrap(), Expr::Array(vec![]));
    }

    #[test]
    fn test_parse_object_literal() {
        let expr = parse_expression("{a: 1, 'b c': 2}.a").unwrap();
        if let Expr::Member { object, .. } = expr {
            assert!(matches!(*object, Expr::Object(ref fields) if fields.len() == 2));
        } else {
            panic!("expected member expression");
        }
    }

    #[test]
    fn test_parse_string_escapes() {
        assert_eq!(
            parse_expression(r#""a\"b\n""#).unwrap(),
            Expr::Literal(Value::from("a\"b\n"))
        );
        assert_eq!(
            parse_expression(r"'it\'s'").unwrap(),
            Expr::Literal(Value::from("it's"))
        );
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_expression("42").unwrap(), Expr::Literal(Value::Int(42)));
        assert_eq!(parse_expression("4.5").unwrap(), Expr::Literal(Value::Float(4.5)));
        assert!(matches!(
            parse_expression("-1").unwrap(),
            Expr::Unary { op: UnaryOp::Negate, .. }
        ));
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_expression("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(parse_expression("undefined").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(parse_expression("true").unwrap(), Expr::Literal(Value::Bool(true)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("'unclosed").is_err());
        assert!(parse_expression("a =").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("else").is_ok()); // a plain identifier
        let err = parse_expression("a & b").unwrap_err();
        assert!(err.message.contains("&&"));
    }
}
