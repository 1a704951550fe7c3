//! A small boolean expression language over state keys.
//!
//! Expressions are compiled once into an AST and evaluated against each
//! [`State`]. The grammar only knows literals, state keys, comparison,
//! arithmetic and logical operators, so nothing but those can run:
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | compare
//! compare := sum (("==" | "!=" | "<" | "<=" | ">" | ">=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | primary
//! primary := number | string | true | false | null | key | "(" or ")"
//! ```

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Number, Value};

use crate::error::ConditionError;
use crate::state::State;

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
    keys: BTreeSet<String>,
}

impl Expression {
    /// Compile `source` into an expression.
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            depth: 0,
        };
        let ast = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error_at(token.offset, "unexpected trailing input"));
        }
        let mut keys = BTreeSet::new();
        ast.collect_keys(&mut keys);
        Ok(Self {
            source: source.to_string(),
            ast,
            keys,
        })
    }

    /// The source text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// State keys referenced by the expression.
    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    /// Evaluate against `state` and reduce the result to its truthiness.
    pub fn evaluate(&self, state: &State) -> Result<bool, ConditionError> {
        self.ast.eval(state).map(|v| truthy(&v))
    }

    /// Evaluate against `state`, returning the raw value.
    pub fn evaluate_value(&self, state: &State) -> Result<Value, ConditionError> {
        self.ast.eval(state)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Key(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn collect_keys(&self, keys: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Key(key) => {
                keys.insert(key.clone());
            }
            Expr::Not(inner) | Expr::Neg(inner) => inner.collect_keys(keys),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Compare(_, l, r) | Expr::Arith(_, l, r) => {
                l.collect_keys(keys);
                r.collect_keys(keys);
            }
        }
    }

    fn eval(&self, state: &State) -> Result<Value, ConditionError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Key(key) => state
                .get(key)
                .cloned()
                .ok_or_else(|| ConditionError::MissingKey { key: key.clone() }),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(state)?))),
            Expr::Neg(inner) => negate(inner.eval(state)?),
            // Python-style: yield the deciding operand, short-circuiting.
            Expr::And(l, r) => {
                let left = l.eval(state)?;
                if truthy(&left) {
                    r.eval(state)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(l, r) => {
                let left = l.eval(state)?;
                if truthy(&left) {
                    Ok(left)
                } else {
                    r.eval(state)
                }
            }
            Expr::Compare(op, l, r) => compare(*op, &l.eval(state)?, &r.eval(state)?).map(Value::Bool),
            Expr::Arith(op, l, r) => arith(*op, &l.eval(state)?, &r.eval(state)?),
        }
    }
}

/// Dynamic truthiness: false, null, zero, and empty containers are falsy.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Structural equality with numeric equality across integers and floats.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => return Ok(values_equal(left, right)),
        CompareOp::Ne => return Ok(!values_equal(left, right)),
        _ => {}
    }
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(ConditionError::TypeMismatch {
                op: op.symbol(),
                left: type_name(left),
                right: type_name(right),
            })
        }
    };
    // NaN compares false to everything.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
    })
}

/// Wrap a float result; infinities and NaN have no JSON representation.
fn float_value(op: &'static str, f: f64) -> Result<Value, ConditionError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(ConditionError::Overflow { op })
}

/// Remainder taking the sign of the divisor, as Python's `%` does.
fn floor_rem_i64(x: i64, y: i64) -> Option<i64> {
    let r = x.checked_rem(y)?;
    if r != 0 && (r < 0) != (y < 0) {
        r.checked_add(y)
    } else {
        Some(r)
    }
}

fn floor_rem_f64(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && (r < 0.0) != (y < 0.0) {
        r + y
    } else {
        r
    }
}

fn negate(value: Value) -> Result<Value, ConditionError> {
    match &value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                Ok(Value::from(i))
            } else {
                float_value("-", -n.as_f64().unwrap_or(f64::NAN))
            }
        }
        _ => Err(ConditionError::TypeMismatch {
            op: "-",
            left: type_name(&value),
            right: "nothing",
        }),
    }
}

fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value, ConditionError> {
    let mismatch = || ConditionError::TypeMismatch {
        op: op.symbol(),
        left: type_name(left),
        right: type_name(right),
    };
    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        (Value::String(a), Value::String(b)) if op == ArithOp::Add => {
            return Ok(Value::String(format!("{a}{b}")));
        }
        _ => return Err(mismatch()),
    };

    if op != ArithOp::Div {
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            let result = match op {
                ArithOp::Add => x.checked_add(y),
                ArithOp::Sub => x.checked_sub(y),
                ArithOp::Mul => x.checked_mul(y),
                ArithOp::Rem if y == 0 => return Err(ConditionError::DivisionByZero),
                ArithOp::Rem => floor_rem_i64(x, y),
                ArithOp::Div => unreachable!("division is always float"),
            };
            if let Some(result) = result {
                return Ok(Value::from(result));
            }
        }
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(mismatch()),
    };
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div | ArithOp::Rem if y == 0.0 => return Err(ConditionError::DivisionByZero),
        ArithOp::Div => x / y,
        ArithOp::Rem => floor_rem_f64(x, y),
    };
    float_value(op.symbol(), result)
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ConditionError {
        ConditionError::Parse {
            expr: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ConditionError> {
        let mut tokens = Vec::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                '=' => self.pair('=', TokenKind::EqEq, None, offset, "expected '=='")?,
                '!' => self.pair('=', TokenKind::NotEq, Some(TokenKind::Bang), offset, "")?,
                '<' => self.pair('=', TokenKind::Le, Some(TokenKind::Lt), offset, "")?,
                '>' => self.pair('=', TokenKind::Ge, Some(TokenKind::Gt), offset, "")?,
                '&' => self.pair('&', TokenKind::AndAnd, None, offset, "expected '&&'")?,
                '|' => self.pair('|', TokenKind::OrOr, None, offset, "expected '||'")?,
                '"' | '\'' => self.string(c, offset)?,
                c if c.is_ascii_digit() => self.number(offset)?,
                c if c.is_alphabetic() || c == '_' => self.ident(),
                other => return Err(self.error(offset, format!("unexpected character {other:?}"))),
            };
            tokens.push(Token { kind, offset });
        }
        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.chars.next();
        kind
    }

    /// Lex a one- or two-character operator whose second character is `second`.
    fn pair(
        &mut self,
        second: char,
        double: TokenKind,
        alone: Option<TokenKind>,
        offset: usize,
        message: &str,
    ) -> Result<TokenKind, ConditionError> {
        self.chars.next();
        if self.chars.peek().is_some_and(|&(_, c)| c == second) {
            self.chars.next();
            return Ok(double);
        }
        alone.ok_or_else(|| self.error(offset, message))
    }

    fn string(&mut self, quote: char, offset: usize) -> Result<TokenKind, ConditionError> {
        self.chars.next();
        let mut text = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                c if c == quote => return Ok(TokenKind::Str(text)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => text.push('\n'),
                    Some((_, 't')) => text.push('\t'),
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                },
                c => text.push(c),
            }
        }
        Err(self.error(offset, "unterminated string literal"))
    }

    fn number(&mut self, offset: usize) -> Result<TokenKind, ConditionError> {
        let mut end = offset;
        let mut is_float = false;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                end = i + 1;
            } else if c == '.' && !is_float {
                is_float = true;
                end = i + 1;
            } else {
                break;
            }
            self.chars.next();
        }
        let text: String = self.source[offset..end].chars().filter(|&c| c != '_').collect();
        if is_float {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(TokenKind::Float)
                .ok_or_else(|| self.error(offset, format!("invalid number {text:?}")))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(offset, format!("invalid number {text:?}")))
        }
    }

    fn ident(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        TokenKind::Ident(name)
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Bound on syntax tree depth, so hostile input cannot exhaust the stack.
const MAX_DEPTH: usize = 128;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Upper bound on the depth of the node being parsed.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ConditionError {
        ConditionError::Parse {
            expr: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn end_offset(&self) -> usize {
        self.source.len()
    }

    /// Account for one more level of nesting at the token just consumed.
    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let offset = self.tokens.get(self.pos.saturating_sub(1)).map_or(0, |t| t.offset);
            return Err(self.error_at(offset, "expression nested too deeply"));
        }
        Ok(())
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Ident(name), .. }) if name == word)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // Each operator in a left-associative chain wraps the tree one level
    // deeper, so the chains count toward the depth bound as well.

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        loop {
            if self.is_keyword("or") || self.peek().is_some_and(|t| t.kind == TokenKind::OrOr) {
                self.pos += 1;
                self.descend()?;
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                self.depth = base;
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        loop {
            if self.is_keyword("and") || self.peek().is_some_and(|t| t.kind == TokenKind::AndAnd) {
                self.pos += 1;
                self.descend()?;
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                self.depth = base;
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.is_keyword("not") || self.peek().is_some_and(|t| t.kind == TokenKind::Bang) {
            self.pos += 1;
            self.descend()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self.peek()?.kind {
            TokenKind::EqEq => Some(CompareOp::Eq),
            TokenKind::NotEq => Some(CompareOp::Ne),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Le => Some(CompareOp::Le),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Ge => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_sum()?;
        let Some(op) = self.compare_op() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_sum()?;
        if self.compare_op().is_some() {
            let offset = self.peek().map_or(self.end_offset(), |t| t.offset);
            return Err(self.error_at(offset, "chained comparisons are not supported"));
        }
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_sum(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.pos += 1;
            self.descend()?;
            let right = self.parse_product()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_product(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                Some(TokenKind::Percent) => ArithOp::Rem,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.pos += 1;
            self.descend()?;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.eat(&TokenKind::Minus) {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let Some(token) = self.advance() else {
            return Err(self.error_at(self.end_offset(), "unexpected end of expression"));
        };
        match token.kind {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::from(i))),
            TokenKind::Float(f) => Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| self.error_at(token.offset, "number out of range")),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::LParen => {
                self.descend()?;
                let inner = self.parse_or()?;
                if !self.eat(&TokenKind::RParen) {
                    let offset = self.peek().map_or(self.end_offset(), |t| t.offset);
                    return Err(self.error_at(offset, "expected ')'"));
                }
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" | "not" => {
                    Err(self.error_at(token.offset, format!("unexpected keyword {name:?}")))
                }
                _ => {
                    if self.peek().is_some_and(|t| t.kind == TokenKind::LParen) {
                        return Err(self.error_at(token.offset, "function calls are not supported"));
                    }
                    Ok(Expr::Key(name))
                }
            },
            other => Err(self.error_at(token.offset, format!("unexpected token {other:?}"))),
        }
    }
}
