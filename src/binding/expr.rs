//! Deferred expressions - late-bound argument values
//!
//! A [`Deferred`] holds expression text that is evaluated against the results
//! snapshot at the moment its owning task runs. The language is a small,
//! sandboxed expression grammar, not free-form code:
//!
//! ```text
//! expr     := coalesce
//! coalesce := compare ( "??" compare )*
//! compare  := additive ( ("=="|"!="|"<"|"<="|">"|">=") additive )?
//! additive := term ( ("+"|"-") term )*
//! term     := unary ( ("*"|"/"|"%") unary )*
//! unary    := "-" unary | "!" unary | postfix
//! postfix  := primary ( "." ident | "." digits | "[" digits "]" | "[" string "]" )*
//! primary  := number | string | true | false | null | ident | "(" expr ")"
//! ```
//!
//! The root identifier of a path names a result (`method[0] + 1`). The
//! prefixes `this.` and `$.` are accepted and ignored.
//!
//! Nesting deeper than [`MAX_EXPRESSION_DEPTH`] is a parse error.
//!
//! Parsing never fails at construction: a malformed expression is kept with
//! its parse error and reported when the owning task runs.

use std::sync::Arc;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::error::FluidError;
use crate::store::Results;
use crate::util::constants::MAX_EXPRESSION_DEPTH;

use super::path::{self, Segment};

/// Parse failure with byte position in the source text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at position {position}: {details}")]
pub struct ParseError {
    pub position: usize,
    pub details: String,
}

/// Evaluation failure against a results snapshot
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("no result named '{0}'")]
    UnknownResult(String),

    #[error("path '{0}' not found")]
    MissingPath(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot apply '{op}' to {operand}")]
    InvalidOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

impl EvalError {
    /// Lookup failures are the ones `??` falls back on
    fn is_lookup(&self) -> bool {
        matches!(self, Self::UnknownResult(_) | Self::MissingPath(_))
    }
}

/// Why a deferred expression could not produce a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeferredError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Coalesce,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Coalesce => "??",
        }
    }
}

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Result lookup: root name followed by field/index segments
    Path {
        root: String,
        segments: Vec<Segment>,
    },
    /// Segment access on a computed value, e.g. `(a ?? b).field`
    Access {
        target: Box<Expr>,
        segment: Segment,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Parse expression text
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        match parser.peek() {
            (Token::End, _) => Ok(expr),
            (token, position) => Err(ParseError {
                position,
                details: format!("unexpected {}", token.describe()),
            }),
        }
    }

    /// Evaluate against a results snapshot
    pub fn eval(&self, results: &Results) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path { root, segments } => {
                let value = results
                    .get(root)
                    .ok_or_else(|| EvalError::UnknownResult(root.clone()))?;
                path::apply(value, segments).cloned().ok_or_else(|| {
                    let rendered: String = segments.iter().map(ToString::to_string).collect();
                    EvalError::MissingPath(format!("{}{}", root, rendered))
                })
            }
            Expr::Access { target, segment } => {
                let value = target.eval(results)?;
                path::apply(&value, std::slice::from_ref(segment))
                    .cloned()
                    .ok_or_else(|| EvalError::MissingPath(segment.to_string()))
            }
            Expr::Unary { op, operand } => {
                let value = operand.eval(results)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => negate(&value),
                }
            }
            Expr::Binary {
                op: BinaryOp::Coalesce,
                left,
                right,
            } => match left.eval(results) {
                Ok(value) if !value.is_null() => Ok(value),
                Ok(_) => right.eval(results),
                Err(e) if e.is_lookup() => right.eval(results),
                Err(e) => Err(e),
            },
            Expr::Binary { op, left, right } => {
                let left = left.eval(results)?;
                let right = right.eval(results)?;
                binary(*op, &left, &right)
            }
        }
    }
}

/// Late-bound argument expression
///
/// Cheap to clone; the parsed AST is shared.
#[derive(Debug, Clone)]
pub struct Deferred {
    source: Arc<str>,
    parsed: Result<Arc<Expr>, ParseError>,
}

impl Deferred {
    /// Create a deferred expression, keeping any parse error for run time
    pub fn new(source: impl AsRef<str>) -> Self {
        let source = source.as_ref();
        Self {
            source: Arc::from(source),
            parsed: Expr::parse(source).map(Arc::new),
        }
    }

    /// Create a deferred expression, rejecting malformed text immediately
    pub fn parse(source: impl AsRef<str>) -> Result<Self, FluidError> {
        let deferred = Self::new(source);
        match &deferred.parsed {
            Ok(_) => Ok(deferred),
            Err(e) => Err(FluidError::ExpressionParse {
                expression: deferred.source.to_string(),
                position: e.position,
                details: e.details.clone(),
            }),
        }
    }

    /// Original expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check if the text parsed successfully
    pub fn is_valid(&self) -> bool {
        self.parsed.is_ok()
    }

    /// Parsed AST, if valid
    pub fn expr(&self) -> Option<&Expr> {
        self.parsed.as_deref().ok()
    }

    /// Evaluate against a results snapshot
    pub fn evaluate(&self, results: &Results) -> Result<Value, DeferredError> {
        let expr = self.parsed.as_ref().map_err(|e| e.clone())?;
        Ok(expr.eval(results)?)
    }
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl std::fmt::Display for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Create a deferred expression (see [`Deferred::new`])
pub fn deferred(source: impl AsRef<str>) -> Deferred {
    Deferred::new(source)
}

// ═══════════════════════════════════════════════════════════════
// Evaluation helpers
// ═══════════════════════════════════════════════════════════════

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number_value(f: f64) -> Result<Value, EvalError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(EvalError::NonFinite)
}

fn negate(value: &Value) -> Result<Value, EvalError> {
    let Value::Number(n) = value else {
        return Err(EvalError::InvalidOperand {
            op: "-",
            operand: type_name(value),
        });
    };
    if let Some(negated) = n.as_i64().and_then(i64::checked_neg) {
        return Ok(Value::from(negated));
    }
    number_value(-n.as_f64().ok_or(EvalError::NonFinite)?)
}

fn arithmetic(op: BinaryOp, left: &Number, right: &Number) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
            return Err(EvalError::DivisionByZero);
        }
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
            BinaryOp::Div => None,
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::from(v));
        }
    }

    let a = left.as_f64().ok_or(EvalError::NonFinite)?;
    let b = right.as_f64().ok_or(EvalError::NonFinite)?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => unreachable!("non-arithmetic operator"),
    };
    number_value(result)
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.symbol(),
        left: type_name(left),
        right: type_name(right),
    };

    match op {
        BinaryOp::Add if left.is_string() || right.is_string() => {
            Ok(Value::String(to_text(left) + &to_text(right)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (left, right) {
                (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
                _ => Err(mismatch()),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(mismatch)?;

            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Coalesce => Ok(if left.is_null() {
            right.clone()
        } else {
            left.clone()
        }),
    }
}

// ═══════════════════════════════════════════════════════════════
// Tokenizer
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Str(String),
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Coalesce,
    Dollar,
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number '{}'", n),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::End => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Dot => ".",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Coalesce => "??",
            Token::Dollar => "$",
            Token::Number(_) | Token::Str(_) | Token::Ident(_) | Token::End => "",
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut i = 0;

    let error = |position: usize, details: String| ParseError { position, details };

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = |token: Token| (token, 2usize);
        let one = |token: Token| (token, 1usize);
        let simple = match (c, next) {
            ('?', Some('?')) => Some(two(Token::Coalesce)),
            ('=', Some('=')) => Some(two(Token::EqEq)),
            ('!', Some('=')) => Some(two(Token::NotEq)),
            ('<', Some('=')) => Some(two(Token::Le)),
            ('>', Some('=')) => Some(two(Token::Ge)),
            ('<', _) => Some(one(Token::Lt)),
            ('>', _) => Some(one(Token::Gt)),
            ('!', _) => Some(one(Token::Bang)),
            ('.', _) => Some(one(Token::Dot)),
            ('[', _) => Some(one(Token::LBracket)),
            (']', _) => Some(one(Token::RBracket)),
            ('(', _) => Some(one(Token::LParen)),
            (')', _) => Some(one(Token::RParen)),
            ('+', _) => Some(one(Token::Plus)),
            ('-', _) => Some(one(Token::Minus)),
            ('*', _) => Some(one(Token::Star)),
            ('/', _) => Some(one(Token::Slash)),
            ('%', _) => Some(one(Token::Percent)),
            ('$', _) => Some(one(Token::Dollar)),
            _ => None,
        };
        if let Some((token, width)) = simple {
            tokens.push((token, pos));
            i += width;
            continue;
        }

        if c.is_ascii_digit() {
            // After a dot only an integer segment is allowed: `a.0.1` is two indices
            let after_dot = matches!(tokens.last(), Some((Token::Dot, _)));
            let start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            let mut is_float = false;
            if !after_dot
                && i + 1 < chars.len()
                && chars[i].1 == '.'
                && chars[i + 1].1.is_ascii_digit()
            {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            if !after_dot && i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }

            let end = chars.get(i).map(|(p, _)| *p).unwrap_or(source.len());
            let text = &source[pos..end];
            let number = if is_float {
                text.parse::<f64>().ok().and_then(Number::from_f64)
            } else {
                text.parse::<u64>().ok().map(Number::from)
            };
            let number =
                number.ok_or_else(|| error(chars[start].0, format!("invalid number '{}'", text)))?;
            tokens.push((Token::Number(number), pos));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                let Some(&(_, ch)) = chars.get(i) else {
                    return Err(error(pos, "unterminated string".to_string()));
                };
                i += 1;
                match ch {
                    '\\' => {
                        let Some(&(_, escaped)) = chars.get(i) else {
                            return Err(error(pos, "unterminated string".to_string()));
                        };
                        i += 1;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                    ch if ch == quote => break,
                    ch => text.push(ch),
                }
            }
            tokens.push((Token::Str(text), pos));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let end = chars.get(i).map(|(p, _)| *p).unwrap_or(source.len());
            tokens.push((Token::Ident(source[start..end].to_string()), start));
            continue;
        }

        return Err(error(pos, format!("unexpected character '{}'", c)));
    }

    tokens.push((Token::End, source.len()));
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════
// Parser (recursive descent)
// ═══════════════════════════════════════════════════════════════

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    /// Open parentheses, unary operators and chained binary operators
    depth: usize,
}

impl Parser {
    fn peek(&self) -> (Token, usize) {
        self.tokens
            .get(self.pos)
            .cloned()
            .unwrap_or((Token::End, usize::MAX))
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn advance(&mut self) -> (Token, usize) {
        let current = self.peek();
        self.pos += 1;
        current
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_at(0) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        let (token, position) = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(ParseError {
                position,
                details: format!(
                    "expected '{}', found {}",
                    expected.symbol(),
                    token.describe()
                ),
            })
        }
    }

    /// Enter one nesting level; bounds both parser recursion and tree height
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ParseError {
                position: self.peek().1,
                details: format!(
                    "expression nested too deeply (limit {})",
                    MAX_EXPRESSION_DEPTH
                ),
            });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.compare()?;
        while self.peek_at(0) == Some(&Token::Coalesce) {
            self.descend()?;
            self.pos += 1;
            let right = self.compare()?;
            left = binary_node(BinaryOp::Coalesce, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn compare(&mut self) -> Result<Expr, ParseError> {
        let left = self.additive()?;
        let op = match self.peek_at(0) {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(binary_node(op, left, right))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek_at(0) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.descend()?;
            self.pos += 1;
            let right = self.term()?;
            left = binary_node(op, left, right);
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_at(0) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.descend()?;
            self.pos += 1;
            let right = self.unary()?;
            left = binary_node(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_at(0) {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.descend()?;
        self.pos += 1;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let segment = if self.eat(&Token::Dot) {
                self.dot_segment()?
            } else if self.eat(&Token::LBracket) {
                let segment = self.bracket_segment()?;
                self.expect(Token::RBracket)?;
                segment
            } else {
                return Ok(expr);
            };

            expr = match expr {
                Expr::Path { root, mut segments } => {
                    segments.push(segment);
                    Expr::Path { root, segments }
                }
                other => Expr::Access {
                    target: Box::new(other),
                    segment,
                },
            };
        }
    }

    fn dot_segment(&mut self) -> Result<Segment, ParseError> {
        match self.advance() {
            (Token::Ident(name), _) => Ok(Segment::Field(name)),
            (Token::Number(n), position) => n
                .as_u64()
                .map(|idx| Segment::Index(idx as usize))
                .ok_or_else(|| ParseError {
                    position,
                    details: format!("invalid index '{}'", n),
                }),
            (token, position) => Err(ParseError {
                position,
                details: format!("expected field name after '.', found {}", token.describe()),
            }),
        }
    }

    fn bracket_segment(&mut self) -> Result<Segment, ParseError> {
        match self.advance() {
            (Token::Str(key), _) => Ok(Segment::Field(key)),
            (Token::Number(n), position) => n
                .as_u64()
                .map(|idx| Segment::Index(idx as usize))
                .ok_or_else(|| ParseError {
                    position,
                    details: format!("invalid index '{}'", n),
                }),
            (token, position) => Err(ParseError {
                position,
                details: format!("expected index or quoted key, found {}", token.describe()),
            }),
        }
    }

    /// Root of a path after `this` / `$`: `.name` or `["name"]`
    fn receiver_root(&mut self) -> Result<Expr, ParseError> {
        let root = match self.dot_or_bracket_root()? {
            Segment::Field(name) => name,
            Segment::Index(idx) => idx.to_string(),
        };
        Ok(Expr::Path {
            root,
            segments: Vec::new(),
        })
    }

    fn dot_or_bracket_root(&mut self) -> Result<Segment, ParseError> {
        if self.eat(&Token::Dot) {
            return self.dot_segment();
        }
        self.expect(Token::LBracket)?;
        let segment = self.bracket_segment()?;
        self.expect(Token::RBracket)?;
        Ok(segment)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            (Token::Number(n), _) => Ok(Expr::Literal(Value::Number(n))),
            (Token::Str(s), _) => Ok(Expr::Literal(Value::String(s))),
            (Token::Dollar, _) => self.receiver_root(),
            (Token::Ident(name), _) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "this" if matches!(self.peek_at(0), Some(Token::Dot | Token::LBracket)) => {
                    self.receiver_root()
                }
                _ => Ok(Expr::Path {
                    root: name,
                    segments: Vec::new(),
                }),
            },
            (Token::LParen, _) => {
                self.descend()?;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            (token, position) => Err(ParseError {
                position,
                details: format!("unexpected {}", token.describe()),
            }),
        }
    }
}

fn binary_node(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn results(value: Value) -> Results {
        match value {
            Value::Object(map) => Results::from(map),
            _ => Results::from(Map::new()),
        }
    }

    fn eval(source: &str, value: Value) -> Result<Value, DeferredError> {
        deferred(source).evaluate(&results(value))
    }

    #[test]
    fn previous_result_plus_one() {
        let value = eval("this.method[0] + 1", json!({"method": [1, null]})).unwrap();
        assert_eq!(value, json!(2));
    }

    #[test]
    fn bare_and_dollar_roots_are_equivalent() {
        let data = json!({"method": [5, 6]});
        assert_eq!(eval("method[1]", data.clone()).unwrap(), json!(6));
        assert_eq!(eval("$.method.1", data.clone()).unwrap(), json!(6));
        assert_eq!(eval(r#"$["method"][0]"#, data).unwrap(), json!(5));
    }

    #[test]
    fn nested_fields_and_indices() {
        let data = json!({"user": {"tags": ["a", "b"], "name": "Ada"}});
        assert_eq!(eval("user.tags.1", data.clone()).unwrap(), json!("b"));
        assert_eq!(eval(r#"user["name"]"#, data).unwrap(), json!("Ada"));
    }

    #[test]
    fn malformed_expression_reports_position() {
        let d = deferred("BAD CODE");
        assert!(!d.is_valid());
        let err = d.evaluate(&Results::default()).unwrap_err();
        match err {
            DeferredError::Parse(ParseError { position, details }) => {
                assert_eq!(position, 4);
                assert!(details.contains("CODE"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn strict_parse_rejects_malformed_text() {
        let err = Deferred::parse("1 +").unwrap_err();
        assert_eq!(err.code(), "FLUID-022");
        assert!(err.to_string().contains("1 +"));
        assert!(Deferred::parse("a + 1").is_ok());
    }

    #[test]
    fn unknown_result_fails() {
        let err = eval("missing + 1", json!({})).unwrap_err();
        assert_eq!(
            err,
            DeferredError::Eval(EvalError::UnknownResult("missing".to_string()))
        );
    }

    #[test]
    fn missing_path_names_full_path() {
        let err = eval("a.b[3]", json!({"a": {"b": [1]}})).unwrap_err();
        assert_eq!(err.to_string(), "path 'a.b[3]' not found");
    }

    #[test]
    fn integer_and_float_arithmetic() {
        let data = json!({});
        assert_eq!(eval("2 + 3 * 4", data.clone()).unwrap(), json!(14));
        assert_eq!(eval("(2 + 3) * 4", data.clone()).unwrap(), json!(20));
        assert_eq!(eval("7 / 2", data.clone()).unwrap(), json!(3.5));
        assert_eq!(eval("8 / 2", data.clone()).unwrap(), json!(4));
        assert_eq!(eval("7 % 4", data.clone()).unwrap(), json!(3));
        assert_eq!(eval("1.5 + 1", data.clone()).unwrap(), json!(2.5));
        assert_eq!(eval("-3 - -1", data.clone()).unwrap(), json!(-2));
        assert_eq!(eval("1e3", data).unwrap(), json!(1000.0));
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(
            eval("1 / 0", json!({})).unwrap_err(),
            DeferredError::Eval(EvalError::DivisionByZero)
        );
        assert_eq!(
            eval("1.5 % 0", json!({})).unwrap_err(),
            DeferredError::Eval(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn i64_min_by_minus_one_falls_back_to_float() {
        let data = json!({"min": i64::MIN});
        assert_eq!(
            eval("(-9223372036854775807 - 1) / -1", data.clone()).unwrap(),
            json!(9.223372036854775807e18)
        );
        assert_eq!(
            eval("min / -1", data.clone()).unwrap(),
            json!(9.223372036854775807e18)
        );
        let rem = eval("min % -1", data).unwrap();
        assert_eq!(rem.as_f64(), Some(0.0));
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let negations = format!("{}1", "-".repeat(10_000));
        let nots = format!("{}true", "!".repeat(10_000));
        let chain = vec!["1"; 10_000].join(" + ");

        for source in [&parens, &negations, &nots, &chain] {
            let d = deferred(source);
            assert!(!d.is_valid());
            match d.evaluate(&Results::default()).unwrap_err() {
                DeferredError::Parse(err) => assert!(err.details.contains("nested too deeply")),
                other => panic!("expected parse error, got {:?}", other),
            }
        }
    }

    #[test]
    fn nesting_within_limit_parses() {
        let depth = MAX_EXPRESSION_DEPTH / 2;
        let parens = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(eval(&parens, json!({})).unwrap(), json!(1));
        assert_eq!(eval(&format!("{}2", "--".repeat(depth / 2)), json!({})).unwrap(), json!(2));
    }

    #[test]
    fn string_concatenation() {
        let data = json!({"name": "Ada", "n": 3});
        assert_eq!(
            eval(r#""hi " + name + "!""#, data.clone()).unwrap(),
            json!("hi Ada!")
        );
        assert_eq!(eval("'#' + n", data).unwrap(), json!("#3"));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let err = eval("a * 2", json!({"a": "x"})).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply '*' to string and number");
        let err = eval("-a", json!({"a": true})).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply '-' to boolean");
    }

    #[test]
    fn comparisons_and_negation() {
        let data = json!({"n": 2, "s": "b"});
        assert_eq!(eval("n == 2.0", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("n != 2", data.clone()).unwrap(), json!(false));
        assert_eq!(eval("n < 3", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("s >= 'a'", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("!n", data.clone()).unwrap(), json!(false));
        assert_eq!(eval("!missing ?? true", data.clone()).unwrap(), json!(true));
        assert!(eval("n < s", data).is_err());
    }

    #[test]
    fn coalesce_recovers_from_lookup_failures_and_null() {
        let data = json!({"pending": null, "v": 1});
        assert_eq!(eval("pending ?? 5", data.clone()).unwrap(), json!(5));
        assert_eq!(eval("nope.x ?? 'dflt'", data.clone()).unwrap(), json!("dflt"));
        assert_eq!(eval("v ?? 5", data.clone()).unwrap(), json!(1));
        // Non-lookup errors still propagate
        assert!(eval("(1 / 0) ?? 5", data).is_err());
    }

    #[test]
    fn access_on_parenthesized_expression() {
        let data = json!({"a": null, "b": {"x": [7]}});
        assert_eq!(eval("(a ?? b).x[0]", data).unwrap(), json!(7));
    }

    #[test]
    fn literals() {
        let data = json!({});
        assert_eq!(eval("null", data.clone()).unwrap(), Value::Null);
        assert_eq!(eval("true", data.clone()).unwrap(), json!(true));
        assert_eq!(eval(r#""a\"b""#, data).unwrap(), json!("a\"b"));
    }

    #[test]
    fn tokenizer_errors() {
        assert!(!deferred("a @ b").is_valid());
        assert!(!deferred("'open").is_valid());
        assert!(!deferred("a[").is_valid());
        assert!(!deferred("a.").is_valid());
        assert!(!deferred("(1 + 2").is_valid());
    }

    #[test]
    fn deferred_equality_and_display() {
        assert_eq!(deferred("a + 1"), deferred("a + 1"));
        assert_ne!(deferred("a + 1"), deferred("a + 2"));
        assert_eq!(deferred("a + 1").to_string(), "a + 1");
        assert_eq!(deferred("a + 1").source(), "a + 1");
    }

    #[test]
    fn deferred_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Deferred>();
    }
}
