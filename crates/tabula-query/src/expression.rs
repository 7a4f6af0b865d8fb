//! The filter expression language.
//!
//! An expression filters one field:
//!
//! ```text
//! expr      := and ('|' and)*
//! and       := term ('&' term)*
//! term      := '(' expr ')' | condition
//! condition := [op] operand | operand '..' [operand] | '..' operand
//! op        := '=' | '<>' | '>' | '>=' | '<' | '<='
//! operand   := literal | 'quoted literal' | %n
//! ```
//!
//! Literals are resolved through the field's `evaluate`, so `"10..20"` on a date
//! field parses both bounds as dates. `%n` takes the n-th argument (1-based) and
//! checks it against the field type. An unquoted literal containing `*` under `=`
//! or `<>` becomes a `LIKE` / `NOT LIKE` pattern on text fields.
//!
//! Parsing yields a tree of already-resolved values; placeholders for a concrete
//! dialect are assigned later, when the WHERE clause is rendered.

use std::cmp::Ordering;

use tabula_core::{Error, Field, FieldType, Result, Value};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `LIKE` with a `%`/`_` pattern and `\` escapes.
    Like,
    /// `NOT LIKE`
    NotLike,
}

impl CompareOp {
    /// SQL operator text.
    pub const fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
        }
    }

    /// True for `LIKE` and `NOT LIKE`.
    pub const fn is_pattern(self) -> bool {
        matches!(self, CompareOp::Like | CompareOp::NotLike)
    }
}

/// A parsed, value-resolved filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `field <op> value`
    Compare {
        /// Operator.
        op: CompareOp,
        /// Logical value, or the LIKE pattern as text.
        value: Value,
    },
    /// All sub-expressions hold.
    And(Vec<FilterExpr>),
    /// Any sub-expression holds.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Evaluate the expression against a logical value.
    ///
    /// Pattern matches are ASCII case-insensitive, like the default collations of
    /// the supported databases.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FilterExpr::Compare { op, value: target } => match op {
                CompareOp::Like | CompareOp::NotLike => {
                    let hit = match (value.as_str(), target.as_str()) {
                        (Some(text), Some(pattern)) => like_match(text, pattern),
                        _ => false,
                    };
                    hit == (*op == CompareOp::Like)
                }
                _ => match value.compare(target) {
                    Some(ord) => match op {
                        CompareOp::Eq => ord == Ordering::Equal,
                        CompareOp::Ne => ord != Ordering::Equal,
                        CompareOp::Gt => ord == Ordering::Greater,
                        CompareOp::Ge => ord != Ordering::Less,
                        CompareOp::Lt => ord == Ordering::Less,
                        CompareOp::Le => ord != Ordering::Greater,
                        CompareOp::Like | CompareOp::NotLike => false,
                    },
                    None => false,
                },
            },
            FilterExpr::And(items) => items.iter().all(|e| e.matches(value)),
            FilterExpr::Or(items) => items.iter().any(|e| e.matches(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(CompareOp),
    DotDot,
    Literal { text: String, quoted: bool },
    Placeholder(usize),
}

#[derive(Debug, Clone)]
enum Operand {
    Literal { text: String, quoted: bool },
    Placeholder(usize),
}

/// Parse a filter expression for `field`.
///
/// Fails with [`Error::Filter`] on malformed syntax and with a validation error
/// when a literal does not evaluate for the field type. Nothing is retained on
/// failure.
pub fn parse(field: &Field, expression: &str, args: &[Value]) -> Result<FilterExpr> {
    let fail = |message: String| Error::Filter {
        field: field.name().to_string(),
        expression: expression.to_string(),
        message,
    };

    let tokens = tokenize(expression).map_err(&fail)?;
    if tokens.is_empty() {
        return Ok(FilterExpr::Compare {
            op: CompareOp::Eq,
            value: field.evaluate("")?,
        });
    }

    let mut parser = Parser {
        field,
        args,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or().map_err(|e| match e {
        ParseError::Syntax(message) => fail(message),
        ParseError::Value(err) => err,
    })?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(fail(format!("unexpected {token:?}")));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    fn flush(literal: &mut String, tokens: &mut Vec<Token>) {
        let text = literal.trim();
        if !text.is_empty() {
            tokens.push(Token::Literal {
                text: text.to_string(),
                quoted: false,
            });
        }
        literal.clear();
    }

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '(' | ')' | '&' | '|' => {
                flush(&mut literal, &mut tokens);
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '&' => Token::And,
                    _ => Token::Or,
                });
            }
            '=' => {
                flush(&mut literal, &mut tokens);
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '<' => {
                flush(&mut literal, &mut tokens);
                match next {
                    Some('=') => {
                        tokens.push(Token::Op(CompareOp::Le));
                        i += 1;
                    }
                    Some('>') => {
                        tokens.push(Token::Op(CompareOp::Ne));
                        i += 1;
                    }
                    _ => tokens.push(Token::Op(CompareOp::Lt)),
                }
            }
            '>' => {
                flush(&mut literal, &mut tokens);
                if next == Some('=') {
                    tokens.push(Token::Op(CompareOp::Ge));
                    i += 1;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                }
            }
            '.' if next == Some('.') => {
                flush(&mut literal, &mut tokens);
                tokens.push(Token::DotDot);
                i += 1;
            }
            '\'' => {
                if !literal.trim().is_empty() {
                    return Err(format!("unexpected quote at position {i}"));
                }
                literal.clear();
                let mut text = String::new();
                let mut closed = false;
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            text.push('\'');
                            i += 2;
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    text.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err("unterminated quoted literal".to_string());
                }
                tokens.push(Token::Literal { text, quoted: true });
            }
            '%' if next.is_some_and(|n| n.is_ascii_digit()) => {
                flush(&mut literal, &mut tokens);
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let digits: String = chars[start..end].iter().collect();
                let n: usize = digits
                    .parse()
                    .map_err(|_| format!("invalid placeholder %{digits}"))?;
                if n == 0 {
                    return Err("placeholders are numbered from %1".to_string());
                }
                tokens.push(Token::Placeholder(n));
                i = end - 1;
            }
            _ => literal.push(c),
        }
        i += 1;
    }
    flush(&mut literal, &mut tokens);
    Ok(tokens)
}

enum ParseError {
    Syntax(String),
    Value(Error),
}

impl From<Error> for ParseError {
    fn from(err: Error) -> Self {
        ParseError::Value(err)
    }
}

type ParseResult<T> = std::result::Result<T, ParseError>;

struct Parser<'a> {
    field: &'a Field,
    args: &'a [Value],
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> ParseResult<FilterExpr> {
        let mut items = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            FilterExpr::Or(items)
        })
    }

    fn parse_and(&mut self) -> ParseResult<FilterExpr> {
        let mut items = vec![self.parse_term()?];
        while self.eat(&Token::And) {
            items.push(self.parse_term()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            FilterExpr::And(items)
        })
    }

    fn parse_term(&mut self) -> ParseResult<FilterExpr> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            if !self.eat(&Token::RParen) {
                return Err(ParseError::Syntax("missing ')'".to_string()));
            }
            return Ok(inner);
        }
        self.parse_condition()
    }

    fn operand(&mut self) -> Option<Operand> {
        let operand = match self.peek()? {
            Token::Literal { text, quoted } => Operand::Literal {
                text: text.clone(),
                quoted: *quoted,
            },
            Token::Placeholder(n) => Operand::Placeholder(*n),
            _ => return None,
        };
        self.pos += 1;
        Some(operand)
    }

    fn parse_condition(&mut self) -> ParseResult<FilterExpr> {
        if self.eat(&Token::DotDot) {
            let upper = self
                .operand()
                .ok_or_else(|| ParseError::Syntax("missing upper bound after '..'".to_string()))?;
            return self.resolve(CompareOp::Le, upper);
        }

        let op = match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        };
        let operand = self.operand();

        if self.eat(&Token::DotDot) {
            if op.is_some() {
                return Err(ParseError::Syntax(
                    "an operator cannot prefix a range".to_string(),
                ));
            }
            let lower = operand
                .ok_or_else(|| ParseError::Syntax("missing lower bound".to_string()))?;
            let lower = self.resolve(CompareOp::Ge, lower)?;
            return match self.operand() {
                Some(upper) => Ok(FilterExpr::And(vec![
                    lower,
                    self.resolve(CompareOp::Le, upper)?,
                ])),
                None => Ok(lower),
            };
        }

        match (op, operand) {
            (op, Some(operand)) => self.resolve(op.unwrap_or(CompareOp::Eq), operand),
            (Some(op @ (CompareOp::Eq | CompareOp::Ne)), None) => self.resolve(
                op,
                Operand::Literal {
                    text: String::new(),
                    quoted: true,
                },
            ),
            (Some(op), None) => Err(ParseError::Syntax(format!(
                "missing value after '{}'",
                op.sql()
            ))),
            (None, None) => Err(ParseError::Syntax(match self.peek() {
                Some(token) => format!("unexpected {token:?}"),
                None => "empty condition".to_string(),
            })),
        }
    }

    fn resolve(&self, op: CompareOp, operand: Operand) -> ParseResult<FilterExpr> {
        let value = match operand {
            Operand::Placeholder(n) => {
                let arg = self.args.get(n - 1).ok_or_else(|| {
                    ParseError::Syntax(format!("placeholder %{n} has no argument"))
                })?;
                self.field.check_value(arg.clone())?
            }
            Operand::Literal { text, quoted } if !quoted && text.contains('*') => {
                let like = match op {
                    CompareOp::Eq => CompareOp::Like,
                    CompareOp::Ne => CompareOp::NotLike,
                    _ => {
                        return Err(ParseError::Syntax(format!(
                            "wildcard not allowed with '{}'",
                            op.sql()
                        )));
                    }
                };
                if !self.field.field_type().is_text() {
                    return Err(ParseError::Syntax(format!(
                        "wildcard not allowed on a {} field",
                        self.field.field_type().name()
                    )));
                }
                let text = if matches!(self.field.field_type(), FieldType::Code(_)) {
                    text.to_uppercase()
                } else {
                    text
                };
                return Ok(FilterExpr::Compare {
                    op: like,
                    value: Value::Text(like_pattern(&text)),
                });
            }
            Operand::Literal { text, .. } => self.field.evaluate(&text)?,
        };
        Ok(FilterExpr::Compare { op, value })
    }
}

/// Convert a `*` wildcard to a LIKE pattern, escaping `%`, `_` and `\` with `\`.
pub fn like_pattern(wildcard: &str) -> String {
    let mut out = String::with_capacity(wildcard.len() + 4);
    for c in wildcard.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let mut pat: Vec<(char, bool)> = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                pat.push((escaped.to_ascii_lowercase(), true));
            }
        } else {
            pat.push((c.to_ascii_lowercase(), false));
        }
    }

    // Iterative wildcard match with backtracking to the last '%'.
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pat.get(p) {
            Some(('%', false)) => {
                star = Some((p, t));
                p += 1;
            }
            Some(('_', false)) => {
                t += 1;
                p += 1;
            }
            Some((c, _)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pat[p..].iter().all(|(c, escaped)| *c == '%' && !escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn int_field() -> Field {
        Field::new("Qty", FieldType::Integer)
    }

    fn text_field() -> Field {
        Field::new("Name", FieldType::Text(50))
    }

    #[test]
    fn test_range_operators() {
        let expr = parse(&int_field(), ">=10&<=20", &[]).unwrap();
        for v in [10, 15, 20] {
            assert!(expr.matches(&Value::Int(v)), "{v} should match");
        }
        for v in [9, 21] {
            assert!(!expr.matches(&Value::Int(v)), "{v} should not match");
        }
    }

    #[test]
    fn test_dotdot_range_expands() {
        let expr = parse(&int_field(), "10..20", &[]).unwrap();
        assert_eq!(
            expr,
            FilterExpr::And(vec![
                FilterExpr::Compare {
                    op: CompareOp::Ge,
                    value: Value::Int(10)
                },
                FilterExpr::Compare {
                    op: CompareOp::Le,
                    value: Value::Int(20)
                },
            ])
        );
        let open = parse(&int_field(), "10..", &[]).unwrap();
        assert!(open.matches(&Value::Int(1000)));
        let upto = parse(&int_field(), "..5", &[]).unwrap();
        assert!(upto.matches(&Value::Int(-3)));
        assert!(!upto.matches(&Value::Int(6)));
    }

    #[test]
    fn test_wildcard_becomes_like() {
        let expr = parse(&text_field(), "*ab*", &[]).unwrap();
        assert_eq!(
            expr,
            FilterExpr::Compare {
                op: CompareOp::Like,
                value: Value::from("%ab%")
            }
        );
        assert!(expr.matches(&Value::from("xaby")));
        assert!(!expr.matches(&Value::from("xy")));

        let not = parse(&text_field(), "<>a*", &[]).unwrap();
        assert!(not.matches(&Value::from("ba")));
        assert!(!not.matches(&Value::from("abc")));
    }

    #[test]
    fn test_like_escapes_metacharacters() {
        assert_eq!(like_pattern("50%_*"), "50\\%\\_%");
        let expr = parse(&text_field(), "50%*", &[]).unwrap();
        assert!(expr.matches(&Value::from("50% off")));
        assert!(!expr.matches(&Value::from("500 off")));
    }

    #[test]
    fn test_or_and_parentheses() {
        let expr = parse(&int_field(), "1|(5..7&<>6)", &[]).unwrap();
        assert!(expr.matches(&Value::Int(1)));
        assert!(expr.matches(&Value::Int(5)));
        assert!(!expr.matches(&Value::Int(6)));
        assert!(!expr.matches(&Value::Int(3)));
    }

    #[test]
    fn test_placeholders() {
        let expr = parse(&int_field(), ">%1&<%2", &[Value::Int(1), Value::Int(4)]).unwrap();
        assert!(expr.matches(&Value::Int(3)));
        assert!(!expr.matches(&Value::Int(4)));
        assert!(parse(&int_field(), "%3", &[Value::Int(1)]).is_err());
    }

    #[test]
    fn test_empty_literal_equals_empty_text() {
        let expr = parse(&text_field(), "=''", &[]).unwrap();
        assert!(expr.matches(&Value::from("")));
        assert!(!expr.matches(&Value::from("a")));
        let bare = parse(&text_field(), "=", &[]).unwrap();
        assert_eq!(bare, expr);
    }

    #[test]
    fn test_quoted_literal_keeps_operators() {
        let expr = parse(&text_field(), "'a&b'|c", &[]).unwrap();
        assert!(expr.matches(&Value::from("a&b")));
        assert!(expr.matches(&Value::from("c")));
    }

    #[test]
    fn test_literals_use_field_evaluation() {
        let date = Field::new("Date", FieldType::Date);
        let expr = parse(&date, "010124..310124", &[]).unwrap();
        let jan15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert!(expr.matches(&Value::Date(jan15)));
    }

    #[test]
    fn test_malformed_expressions_fail() {
        for bad in ["(1", "1)", ">=", "1&&2", "'abc", ">1..2", "1..2..3"] {
            let err = parse(&int_field(), bad, &[]).unwrap_err();
            assert!(matches!(err, Error::Filter { .. }), "{bad}: {err:?}");
        }
        assert!(matches!(
            parse(&int_field(), "abc", &[]).unwrap_err(),
            Error::Validation(_)
        ));
        assert!(parse(&int_field(), "*1", &[]).is_err());
    }
}
