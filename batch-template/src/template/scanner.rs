//! Scanner for embedded `${expression}` spans
//!
//! The closing brace is located with expression-aware rules:
//! - unquoted `{`/`}` pairs nest, so `${ {a: 1}.a }` is one span
//! - `'...'` and `"..."` literals are opaque, so `${ a + '}' }` is one span
//! - inside a literal a backslash escapes the next character (quotes included)
//! - a `$` not followed by `{` is plain text
//!
//! An unterminated `${` never produces a span; the text is left untouched.
//!
//! The scanner follows the find / append-replacement / append-tail protocol:
//!
//! ```ignore
//! let mut scanner = Scanner::new(input);
//! let mut out = String::new();
//! while let Some(span) = scanner.find() {
//!     scanner.append_replacement(&mut out, &evaluate(span.expression));
//! }
//! scanner.append_tail(&mut out);
//! ```

/// A matched `${...}` span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressionSpan<'a> {
    /// Byte offset of the opening `$`
    pub start: usize,
    /// Byte offset just past the closing `}`
    pub end: usize,
    /// Raw text between `${` and `}`
    pub expression: &'a str,
    /// True when the span is the entire input
    pub singleton: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Dollar,
    Expression,
    Quoted(u8),
}

/// Incremental `${...}` scanner over a borrowed string
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    input: &'a str,
    /// End of the previous match (start of the text not yet appended)
    mark: usize,
    start: usize,
    end: usize,
}

impl<'a> Scanner<'a> {
    /// Create a scanner positioned at the start of `input`
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            mark: 0,
            start: 0,
            end: 0,
        }
    }

    /// Find the next span after the previous match
    pub fn find(&mut self) -> Option<ExpressionSpan<'a>> {
        self.mark = self.end;
        let bytes = self.input.as_bytes();
        let mut mode = Mode::Text;
        let mut nesting = 0usize;
        let mut start = self.end;
        let mut i = self.end;

        while i < bytes.len() {
            let c = bytes[i];
            match mode {
                Mode::Text => {
                    if c == b'$' {
                        mode = Mode::Dollar;
                        start = i;
                    }
                }
                Mode::Dollar => {
                    if c == b'{' {
                        mode = Mode::Expression;
                    } else if c == b'$' {
                        start = i;
                    } else {
                        mode = Mode::Text;
                    }
                }
                Mode::Expression => match c {
                    b'{' => nesting += 1,
                    b'}' if nesting == 0 => {
                        self.start = start;
                        self.end = i + 1;
                        return Some(self.span());
                    }
                    b'}' => nesting -= 1,
                    b'\'' | b'"' => mode = Mode::Quoted(c),
                    _ => {}
                },
                Mode::Quoted(quote) => {
                    if c == b'\\' {
                        i += 1;
                    } else if c == quote {
                        mode = Mode::Expression;
                    }
                }
            }
            i += 1;
        }

        None
    }

    fn span(&self) -> ExpressionSpan<'a> {
        ExpressionSpan {
            start: self.start,
            end: self.end,
            expression: &self.input[self.start + 2..self.end - 1],
            singleton: self.start == 0 && self.end == self.input.len(),
        }
    }

    /// Append the text between the previous match and the current one,
    /// followed by `replacement`. Call only after `find` returned a span.
    pub fn append_replacement(&self, out: &mut String, replacement: &str) {
        out.push_str(&self.input[self.mark..self.start]);
        out.push_str(replacement);
    }

    /// Append the text following the last match. Call after `find` returned `None`.
    pub fn append_tail(&self, out: &mut String) {
        out.push_str(&self.input[self.mark..]);
    }

    /// Replace every span with the result of `replace`, stopping at the first error
    pub fn replace_all<E, F>(input: &str, mut replace: F) -> Result<String, E>
    where
        F: FnMut(&str) -> Result<String, E>,
    {
        let mut scanner = Scanner::new(input);
        let mut out = String::with_capacity(input.len());
        while let Some(span) = scanner.find() {
            let replacement = replace(span.expression)?;
            scanner.append_replacement(&mut out, &replacement);
        }
        scanner.append_tail(&mut out);
        Ok(out)
    }
}

/// Return the inner expression if `text` is exactly one `${...}` span
pub fn singleton(text: &str) -> Option<&str> {
    Scanner::new(text)
        .find()
        .filter(|span| span.singleton)
        .map(|span| span.expression)
}

/// Check whether `text` contains at least one span
pub fn has_expression(text: &str) -> bool {
    Scanner::new(text).find().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(input: &str) -> Vec<&str> {
        let mut scanner = Scanner::new(input);
        let mut found = Vec::new();
        while let Some(span) = scanner.find() {
            found.push(span.expression);
        }
        found
    }

    #[test]
    fn test_plain_text_has_no_spans() {
        assert!(spans("just some text").is_empty());
        assert!(!has_expression("cost: $100"));
    }

    #[test]
    fn test_simple_spans() {
        assert_eq!(spans("${a} and ${b.c}"), vec!["a", "b.c"]);
    }

    #[test]
    fn test_quoted_brace_does_not_close() {
        assert_eq!(spans("${ a + '}' }"), vec![" a + '}' "]);
        assert_eq!(spans("x${\"}\"}y"), vec!["\"}\""]);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        assert_eq!(spans(r"${'it\'s }'}"), vec![r"'it\'s }'"]);
    }

    #[test]
    fn test_nested_braces() {
        assert_eq!(spans("${ {a: 1}.a }!"), vec![" {a: 1}.a "]);
    }

    #[test]
    fn test_unterminated_is_literal() {
        assert!(spans("${a").is_empty());
        let out: Result<String, ()> = Scanner::replace_all("x ${a", |_| Ok("?".to_string()));
        assert_eq!(out.unwrap(), "x ${a");
    }

    #[test]
    fn test_double_dollar() {
        let out: Result<String, ()> = Scanner::replace_all("$${a}", |e| Ok(e.to_uppercase()));
        assert_eq!(out.unwrap(), "$A");
    }

    #[test]
    fn test_singleton() {
        assert_eq!(singleton("${x.length:int}"), Some("x.length:int"));
        assert_eq!(singleton("${}"), Some(""));
        assert_eq!(singleton(" ${x}"), None);
        assert_eq!(singleton("${x}${y}"), None);
        assert_eq!(singleton("plain"), None);
    }

    #[test]
    fn test_span_offsets() {
        let mut scanner = Scanner::new("ab${c}d");
        let span = scanner.find().unwrap();
        assert_eq!((span.start, span.end), (2, 6));
        assert!(!span.singleton);
        assert!(scanner.find().is_none());
    }

    #[test]
    fn test_rebuild_protocol() {
        let mut scanner = Scanner::new("<${a}|${b}>");
        let mut out = String::new();
        while let Some(span) = scanner.find() {
            scanner.append_replacement(&mut out, &span.expression.repeat(2));
        }
        scanner.append_tail(&mut out);
        assert_eq!(out, "<aa|bb>");
    }

    #[test]
    fn test_multibyte_text_around_spans() {
        let out: Result<String, ()> = Scanner::replace_all("é${x}ü", |_| Ok("ß".to_string()));
        assert_eq!(out.unwrap(), "éßü");
    }
}
