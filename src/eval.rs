use std::{borrow::Cow, collections::HashMap, fmt::Display, io::Write};

use miette::{LabeledSpan, SourceSpan};
use tracing::{debug, trace};

use crate::{
    error::Error,
    lex::{KEYWORDS, Token, TokenKind},
    types::{Type, Variable},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'de> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Cow<'de, str>),
}

impl Value<'_> {
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Bool(_) => Type::Bool,
            Value::Str(_) => Type::String,
        }
    }
}

impl Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write_float(f, *n),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Integral floats keep a `.0`; very large or very small magnitudes switch to
/// exponent form with a signed, two-digit exponent (`1e+20`, `2.5e-07`).
fn write_float(f: &mut std::fmt::Formatter<'_>, n: f64) -> std::fmt::Result {
    let magnitude = n.abs();
    if !n.is_finite() {
        return write!(f, "{n}");
    }
    if magnitude >= 1e16 || (magnitude != 0.0 && magnitude < 1e-4) {
        let exponent_form = format!("{n:e}");
        let (mantissa, exponent) = exponent_form
            .split_once('e')
            .unwrap_or((exponent_form.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return write!(f, "{mantissa}e{sign}{:02}", exponent.abs());
    }
    if n == n.trunc() {
        write!(f, "{n}.0")
    } else {
        write!(f, "{n}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    FDiv,
    Pow,
}

impl Op {
    fn from_kind(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Add => Op::Add,
            TokenKind::Sub => Op::Sub,
            TokenKind::Mul => Op::Mul,
            TokenKind::Div => Op::Div,
            TokenKind::FDiv => Op::FDiv,
            TokenKind::Pow => Op::Pow,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::FDiv => "fdiv",
            Op::Pow => "pow",
        }
    }
}

/// Computes `a OP b`.
///
/// Booleans must be rejected by the caller. Any pair the numeric rules do not
/// cover (that is, anything involving a string) becomes the concatenation of
/// `a` and `b`, whatever the operator.
pub fn apply<'de>(op: Op, a: Value<'de>, b: Value<'de>) -> Result<Value<'de>, &'static str> {
    match (&a, &b) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_op(op, as_float(&a), as_float(&b))
        }
        _ => Ok(Value::Str(Cow::Owned(format!("{a}{b}")))),
    }
}

fn as_float(value: &Value<'_>) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(n) => *n,
        Value::Bool(_) | Value::Str(_) => f64::NAN,
    }
}

fn int_op(op: Op, a: i64, b: i64) -> Result<Value<'static>, &'static str> {
    const OVERFLOW: &str = "integer overflow";
    const ZERO: &str = "division by zero";

    let n = match op {
        Op::Add => a.checked_add(b).ok_or(OVERFLOW)?,
        Op::Sub => a.checked_sub(b).ok_or(OVERFLOW)?,
        Op::Mul => a.checked_mul(b).ok_or(OVERFLOW)?,
        Op::Div => {
            if b == 0 {
                return Err(ZERO);
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        Op::FDiv => {
            if b == 0 {
                return Err(ZERO);
            }
            let quotient = a.checked_div(b).ok_or(OVERFLOW)?;
            let remainder = a.checked_rem(b).ok_or(OVERFLOW)?;
            // round toward negative infinity
            if remainder != 0 && (remainder < 0) != (b < 0) {
                quotient - 1
            } else {
                quotient
            }
        }
        Op::Pow if b < 0 => return Ok(Value::Float((a as f64).powf(b as f64))),
        // exact for any exponent, however large
        Op::Pow if a == 0 || a == 1 => {
            if b == 0 {
                1
            } else {
                a
            }
        }
        Op::Pow if a == -1 => {
            if b % 2 == 0 {
                1
            } else {
                -1
            }
        }
        Op::Pow => {
            let exp = u32::try_from(b).map_err(|_| OVERFLOW)?;
            a.checked_pow(exp).ok_or(OVERFLOW)?
        }
    };
    Ok(Value::Int(n))
}

fn float_op(op: Op, a: f64, b: f64) -> Result<Value<'static>, &'static str> {
    Ok(Value::Float(match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div | Op::FDiv if b == 0.0 => return Err("division by zero"),
        Op::Div => a / b,
        Op::FDiv => (a / b).floor(),
        Op::Pow => a.powf(b),
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Halted,
}

/// Single-pass evaluator over a lexed program.
///
/// Each call to [`Iterator::next`] executes one instruction. The iterator ends
/// after the first error or once the end-of-input checks pass.
pub struct Interpreter<'de, W> {
    tokens: std::vec::IntoIter<Token<'de>>,
    stack: Vec<Value<'de>>,
    scope: HashMap<&'de str, Variable<'de>>,
    out: W,
    state: State,
    line: usize,
    span: SourceSpan,
}

impl<'de, W: Write> Iterator for Interpreter<'de, W> {
    type Item = Result<(), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Halted {
            return None;
        }
        let step = self.step();
        if step.is_err() {
            self.state = State::Halted;
        }
        Some(step)
    }
}

impl<'de, W: Write> Interpreter<'de, W> {
    pub fn new(tokens: Vec<Token<'de>>, out: W) -> Self {
        Self {
            tokens: tokens.into_iter(),
            stack: Vec::new(),
            scope: HashMap::new(),
            out,
            state: State::Running,
            line: 0,
            span: SourceSpan::from(0..0),
        }
    }

    /// Runs every remaining instruction, stopping at the first error.
    pub fn evaluate(&mut self) -> Result<(), Error> {
        self.try_for_each(|step| step)
    }

    pub fn stack(&self) -> &[Value<'de>] {
        &self.stack
    }

    pub fn variable(&self, name: &str) -> Option<&Variable<'de>> {
        self.scope.get(name)
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn advance(&mut self) -> Result<Token<'de>, Error> {
        let Some(token) = self.tokens.next() else {
            return Err(Error::runtime(
                self.line,
                self.span,
                "ran out of instructions, expected another token",
            ));
        };
        self.line = token.line;
        self.span = token.span;
        Ok(token)
    }

    fn step(&mut self) -> Result<(), Error> {
        let token = self.advance()?;
        debug!(line = token.line, kind = %token.kind, "executing");

        if let Some(op) = Op::from_kind(token.kind) {
            return self.arithmetic(op, &token);
        }

        match token.kind {
            TokenKind::Push | TokenKind::PushD => {
                let operand = self.advance()?;
                let value = match operand.kind {
                    TokenKind::Ident if token.kind == TokenKind::Push => {
                        let name = self.ident(&token, &operand)?;
                        self.value_of(&operand, name)?.clone()
                    }
                    TokenKind::Ident => {
                        let name = self.ident(&token, &operand)?;
                        let variable = self
                            .scope
                            .remove(name)
                            .ok_or_else(|| Error::unknown_variable(token.line, token.span, name))?;
                        variable.value.ok_or_else(|| unassigned(&operand, name))?
                    }
                    TokenKind::Type => self.literal(&operand)?,
                    _ => return Err(unexpected(&token, &operand)),
                };
                self.push(value);
            }
            TokenKind::Drop => {
                let operand = self.advance()?;
                if operand.kind != TokenKind::Ident {
                    return Err(unexpected(&token, &operand));
                }
                let name = self.ident(&token, &operand)?;
                if self.scope.remove(name).is_none() {
                    return Err(Error::unknown_variable(token.line, token.span, name));
                }
            }
            TokenKind::Pop => {
                if self.stack.is_empty() {
                    return Err(underflow(&token, "pop", 1));
                }
                let operand = self.advance()?;
                match operand.kind {
                    TokenKind::Drop => {
                        self.pop();
                    }
                    TokenKind::Ident => {
                        let Some(name) = operand.text() else {
                            return Err(Error::runtime(
                                token.line,
                                token.span,
                                "missing variable name after pop",
                            ));
                        };
                        if !self.scope.contains_key(name) {
                            return Err(Error::unknown_variable(token.line, token.span, name));
                        }
                        if let Some(value) = self.pop() {
                            let variable = Variable::holding(name, value, operand.line, operand.span);
                            self.scope.insert(name, variable);
                        }
                    }
                    _ => return Err(unexpected(&token, &operand)),
                }
            }
            TokenKind::Var => self.declare(&token)?,
            TokenKind::Move => self.assign(&token)?,
            TokenKind::Print => {
                let value = if token.is_sentinel(TokenKind::Ident) {
                    let operand = self.advance()?;
                    let name = self.ident(&token, &operand)?;
                    self.value_of(&operand, name)?.clone()
                } else {
                    self.pop().ok_or_else(|| underflow(&token, "print", 1))?
                };
                writeln!(self.out, "{value}").map_err(Error::Output)?;
            }
            TokenKind::Eof => {
                self.finish(&token)?;
                self.state = State::Halted;
            }
            TokenKind::Type | TokenKind::Value | TokenKind::Ident => {
                return Err(Error::syntax(
                    token.line,
                    token.span,
                    format!("{} is not an instruction", token.kind),
                ));
            }
            TokenKind::Add
            | TokenKind::Sub
            | TokenKind::Mul
            | TokenKind::Div
            | TokenKind::FDiv
            | TokenKind::Pow => unreachable!("arithmetic is dispatched above"),
        }
        Ok(())
    }

    fn push(&mut self, value: Value<'de>) {
        trace!(%value, depth = self.stack.len() + 1, "push");
        self.stack.push(value);
    }

    fn pop(&mut self) -> Option<Value<'de>> {
        let value = self.stack.pop();
        trace!(depth = self.stack.len(), "pop");
        value
    }

    /// The name carried by an IDENT operand of `instruction`.
    fn ident(&self, instruction: &Token<'de>, operand: &Token<'de>) -> Result<&'de str, Error> {
        if operand.kind != TokenKind::Ident {
            return Err(unexpected(instruction, operand));
        }
        operand.text().ok_or_else(|| {
            Error::runtime(
                instruction.line,
                instruction.span,
                format!("missing variable name after {}", instruction.kind),
            )
        })
    }

    fn value_of(&self, at: &Token<'de>, name: &str) -> Result<&Value<'de>, Error> {
        let variable = self
            .scope
            .get(name)
            .ok_or_else(|| Error::unknown_variable(at.line, at.span, name))?;
        variable.value.as_ref().ok_or_else(|| unassigned(at, name))
    }

    fn arithmetic(&mut self, op: Op, token: &Token<'de>) -> Result<(), Error> {
        if self.stack.len() < 2 {
            return Err(underflow(token, op.name(), 2));
        }
        let (Some(a), Some(b)) = (self.pop(), self.pop()) else {
            return Err(underflow(token, op.name(), 2));
        };
        if matches!(a, Value::Bool(_)) || matches!(b, Value::Bool(_)) {
            return Err(Error::type_mismatch(
                token.line,
                token.span,
                format!("cannot {} bools", op.name()),
            ));
        }
        let result = apply(op, a, b)
            .map_err(|message| Error::runtime(token.line, token.span, message))?;
        self.push(result);
        Ok(())
    }

    /// Reads the VALUE token after `type_token` and converts it.
    fn literal(&mut self, type_token: &Token<'de>) -> Result<Value<'de>, Error> {
        let value_token = self.advance()?;
        let (Some(ty), Some(text)) = (type_token.ty(), value_token.text()) else {
            return Err(Error::runtime(
                type_token.line,
                type_token.span,
                "failed to parse types",
            ));
        };
        if value_token.kind != TokenKind::Value {
            return Err(unexpected(type_token, &value_token));
        }
        self.materialize(ty, text, &value_token)
    }

    /// Converts raw source text into a value of type `ty`.
    pub fn materialize(&self, ty: Type, text: &'de str, at: &Token<'de>) -> Result<Value<'de>, Error> {
        let mismatch = |message: &str| {
            Error::type_mismatch(at.line, at.span, format!("{message} -> {text:?}"))
        };

        match ty {
            Type::Int | Type::UInt => {
                if text.contains('.') {
                    return Err(mismatch("value incompatible with type"));
                }
                let n: i64 = text
                    .parse()
                    .map_err(|_| mismatch("value incompatible with type"))?;
                if ty == Type::UInt && n < 0 {
                    return Err(mismatch("unsigned int can not be negative"));
                }
                Ok(Value::Int(n))
            }
            Type::Float | Type::UFloat => {
                let n: f64 = text
                    .parse()
                    .map_err(|_| mismatch("value incompatible with type"))?;
                if ty == Type::UFloat && n < 0.0 {
                    return Err(mismatch("unsigned float can not be negative"));
                }
                Ok(Value::Float(n))
            }
            Type::Bool => {
                if text.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(mismatch("invalid boolean value"))
                }
            }
            Type::String => {
                if !text.starts_with('"') {
                    return Err(Error::syntax(at.line, at.span, "missing opening `\"`"));
                }
                if text.len() < 2 || !text.ends_with('"') {
                    return Err(Error::syntax(at.line, at.span, "missing closing `\"`"));
                }
                self.interpolate(&text[1..text.len() - 1], at)
                    .map(Value::Str)
            }
        }
    }

    /// Replaces every `${name}` with the current value of `name`.
    fn interpolate(&self, text: &'de str, at: &Token<'de>) -> Result<Cow<'de, str>, Error> {
        if !text.contains("${") {
            return Ok(Cow::Borrowed(text));
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                break;
            };
            let name = &after[..end];
            let value = self.value_of(at, name)?;
            out.push_str(&rest[..start]);
            out.push_str(&value.to_string());
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(Cow::Owned(out))
    }

    fn declare(&mut self, token: &Token<'de>) -> Result<(), Error> {
        let type_token = self.advance()?;
        let ident_token = self.advance()?;
        let (TokenKind::Type, Some(ty), TokenKind::Ident, Some(name)) = (
            type_token.kind,
            type_token.ty(),
            ident_token.kind,
            ident_token.text(),
        ) else {
            return Err(Error::syntax(
                token.line,
                token.span,
                "var must be followed by type and then name",
            ));
        };

        if KEYWORDS.iter().any(|kw| name.eq_ignore_ascii_case(kw)) {
            return Err(Error::Redefinition {
                line: token.line,
                message: format!("{name:?} is a reserved keyword"),
                span: token.span,
            });
        }
        if name.contains([' ', '(', ')', '{', '}', '[', ']']) {
            return Err(Error::syntax(
                token.line,
                token.span,
                format!("bad variable name -> {name:?} can not contain spaces or brackets"),
            ));
        }
        if let Some(existing) = self.scope.get(name) {
            return Err(Error::Redefinition {
                line: token.line,
                message: format!(
                    "{name:?} is already defined on line {}",
                    existing.line
                ),
                span: token.span,
            });
        }

        debug!(name, %ty, line = token.line, "declare");
        self.scope.insert(
            name,
            Variable::declare(name, ty, ident_token.line, ident_token.span),
        );
        Ok(())
    }

    fn assign(&mut self, token: &Token<'de>) -> Result<(), Error> {
        let ident_token = self.advance()?;
        let value_token = self.advance()?;
        let (TokenKind::Ident, Some(name), TokenKind::Value, Some(text)) = (
            ident_token.kind,
            ident_token.text(),
            value_token.kind,
            value_token.text(),
        ) else {
            return Err(Error::syntax(
                token.line,
                token.span,
                "move requires a variable and a value to move",
            ));
        };

        let ty = self
            .scope
            .get(name)
            .map(|variable| variable.ty)
            .ok_or_else(|| Error::unknown_variable(token.line, token.span, name))?;
        let value = self.materialize(ty, text, &value_token)?;
        if let Some(variable) = self.scope.get_mut(name) {
            variable.value = Some(value);
        }
        Ok(())
    }

    /// End-of-input checks: nothing may be left on the stack or in scope.
    fn finish(&mut self, eof: &Token<'de>) -> Result<(), Error> {
        debug!(
            stack = self.stack.len(),
            variables = self.scope.len(),
            "end of input"
        );

        if !self.stack.is_empty() {
            let items: Vec<String> = self.stack.iter().rev().map(ToString::to_string).collect();
            return Err(Error::runtime(
                eof.line,
                eof.span,
                format!(
                    "unhandled data on the stack -> {} items (top first: {})",
                    items.len(),
                    items.join(", ")
                ),
            ));
        }

        if !self.scope.is_empty() {
            let mut leftover: Vec<&Variable<'de>> = self.scope.values().collect();
            leftover.sort_by(|a, b| a.line.cmp(&b.line).then(a.name.cmp(b.name)));
            let names: Vec<String> = leftover
                .iter()
                .map(|variable| format!("line {} -> {:?}", variable.line, variable.name))
                .collect();
            return Err(Error::Runtime {
                line: eof.line,
                message: format!("variables not dropped: {}", names.join(", ")),
                span: eof.span,
                related: leftover
                    .iter()
                    .map(|variable| {
                        LabeledSpan::new_with_span(
                            Some(format!("`{}` declared here", variable.name)),
                            variable.span,
                        )
                    })
                    .collect(),
            });
        }

        Ok(())
    }
}

fn unexpected(instruction: &Token<'_>, found: &Token<'_>) -> Error {
    Error::syntax(
        instruction.line,
        instruction.span,
        format!("invalid token after {} -> {}", instruction.kind, found.kind),
    )
}

fn unassigned(at: &Token<'_>, name: &str) -> Error {
    Error::runtime(at.line, at.span, format!("{name:?} has no value yet"))
}

fn underflow(token: &Token<'_>, instruction: &'static str, needed: usize) -> Error {
    Error::StackUnderflow {
        line: token.line,
        instruction,
        needed,
        span: token.span,
    }
}
