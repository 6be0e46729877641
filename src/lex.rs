use std::{collections::VecDeque, fmt::Display};

use miette::SourceSpan;
use tracing::debug;

use crate::{error::Error, types::Type};

/// Words that can never name a variable.
///
/// Besides the instructions this holds words set aside for constructs the
/// language does not have yet.
pub const KEYWORDS: &[&str] = &[
    "push", "pushd", "add", "sub", "print", "pop", "drop", "var", "move", "mul", "div", "fdiv",
    "pow", "new", "//", "in", "if", "loop", "for", "end", "start", "funk",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub line: usize,
    /// The trimmed source line this token was lexed from.
    pub span: SourceSpan,
    pub value: Option<Payload<'de>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Push,
    PushD,
    Add,
    Sub,
    Mul,
    Div,
    FDiv,
    Pow,
    Pop,
    Drop,
    Var,
    Move,
    Print,
    Type,
    Value,
    Ident,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'de> {
    /// Raw, unconverted source text: a literal or a variable name.
    Text(&'de str),
    Type(Type),
    /// Marks a token whose meaning depends on the kind of the next token,
    /// e.g. a `print` followed by the name to print.
    Sentinel(TokenKind),
}

impl<'de> Token<'de> {
    pub fn text(&self) -> Option<&'de str> {
        match self.value {
            Some(Payload::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn ty(&self) -> Option<Type> {
        match self.value {
            Some(Payload::Type(ty)) => Some(ty),
            _ => None,
        }
    }

    pub fn is_sentinel(&self, kind: TokenKind) -> bool {
        self.value == Some(Payload::Sentinel(kind))
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Push => "PUSH",
            TokenKind::PushD => "PUSHD",
            TokenKind::Add => "ADD",
            TokenKind::Sub => "SUB",
            TokenKind::Mul => "MUL",
            TokenKind::Div => "DIV",
            TokenKind::FDiv => "FDIV",
            TokenKind::Pow => "POW",
            TokenKind::Pop => "POP",
            TokenKind::Drop => "DROP",
            TokenKind::Var => "VAR",
            TokenKind::Move => "MOVE",
            TokenKind::Print => "PRINT",
            TokenKind::Type => "TYPE",
            TokenKind::Value => "VALUE",
            TokenKind::Ident => "IDENT",
            TokenKind::Eof => "EOF",
        };
        f.write_str(name)
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (line, kind) = (self.line, self.kind);
        match self.value {
            Some(Payload::Text(text)) => write!(f, "{line:>4} {kind} {text}"),
            Some(Payload::Type(ty)) => write!(f, "{line:>4} {kind} {ty}"),
            Some(Payload::Sentinel(sentinel)) => write!(f, "{line:>4} {kind} <{sentinel}>"),
            None => write!(f, "{line:>4} {kind} null"),
        }
    }
}

/// Line-oriented lexer.
///
/// Every non-blank line yields one instruction token followed by its operand
/// tokens; the stream always ends with a single [`TokenKind::Eof`]. Iteration
/// stops after the first error.
pub struct Lexer<'de> {
    whole: &'de str,
    rest: &'de str,
    byte: usize,
    line: usize,
    pending: VecDeque<Token<'de>>,
    finished: bool,
}

/// The operand of `push`, `pushd` and `var`.
enum Operand<'de> {
    Ident(Option<&'de str>),
    Typed(Type, &'de str),
}

impl<'de> Lexer<'de> {
    pub fn new(input: &'de str) -> Self {
        Lexer {
            whole: input,
            rest: input,
            byte: 0,
            line: 0,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn emit(&mut self, kind: TokenKind, value: Option<Payload<'de>>, span: SourceSpan) {
        self.pending.push_back(Token {
            kind,
            line: self.line,
            span,
            value,
        });
    }

    fn emit_ident(&mut self, name: &'de str, span: SourceSpan) {
        let value = (!name.is_empty()).then_some(Payload::Text(name));
        self.emit(TokenKind::Ident, value, span);
    }

    fn lex_line(&mut self, text: &'de str, span: SourceSpan) -> Result<(), Error> {
        debug!(line = self.line, text, "lexing line");

        if let Some(rest) = keyword(text, "pushd") {
            self.emit(TokenKind::PushD, None, span);
            return self.lex_operand(rest, span);
        }
        if let Some(rest) = keyword(text, "push") {
            self.emit(TokenKind::Push, None, span);
            return self.lex_operand(rest, span);
        }

        const OPERATORS: [(&str, TokenKind); 6] = [
            ("add", TokenKind::Add),
            ("sub", TokenKind::Sub),
            ("mul", TokenKind::Mul),
            ("div", TokenKind::Div),
            ("fdiv", TokenKind::FDiv),
            ("pow", TokenKind::Pow),
        ];
        for (word, kind) in OPERATORS {
            if keyword(text, word).is_some() {
                self.emit(kind, None, span);
                return Ok(());
            }
        }

        if let Some(rest) = keyword(text, "pop") {
            self.emit(TokenKind::Pop, None, span);
            if rest == "drop" {
                self.emit(TokenKind::Drop, None, span);
            } else {
                self.emit_ident(rest, span);
            }
            return Ok(());
        }

        if let Some(rest) = keyword(text, "drop") {
            self.emit(TokenKind::Drop, None, span);
            self.emit_ident(rest, span);
            return Ok(());
        }

        if let Some(rest) = keyword(text, "var") {
            self.emit(TokenKind::Var, None, span);
            return match self.operand(rest, span)? {
                Operand::Typed(ty, name) => {
                    self.emit(TokenKind::Type, Some(Payload::Type(ty)), span);
                    self.emit(TokenKind::Ident, Some(Payload::Text(name)), span);
                    Ok(())
                }
                Operand::Ident(_) => Err(Error::syntax(
                    self.line,
                    span,
                    "var must be followed by type and then name",
                )),
            };
        }

        if let Some(rest) = keyword(text, "move") {
            let Some((ident, value)) = rest.split_once(char::is_whitespace) else {
                return Err(Error::syntax(
                    self.line,
                    span,
                    "move requires a variable and a value to move",
                ));
            };
            if ident.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::syntax(
                    self.line,
                    span,
                    "variables can not contain only numbers",
                ));
            }
            self.emit(TokenKind::Move, None, span);
            self.emit(TokenKind::Ident, Some(Payload::Text(ident)), span);
            self.emit(TokenKind::Value, Some(Payload::Text(value.trim())), span);
            return Ok(());
        }

        if let Some(rest) = keyword(text, "print") {
            if rest.is_empty() {
                self.emit(TokenKind::Print, None, span);
            } else {
                self.emit(
                    TokenKind::Print,
                    Some(Payload::Sentinel(TokenKind::Ident)),
                    span,
                );
                self.emit(TokenKind::Ident, Some(Payload::Text(rest)), span);
            }
            return Ok(());
        }

        Err(Error::syntax(
            self.line,
            span,
            format!("invalid syntax -> {text}"),
        ))
    }

    fn lex_operand(&mut self, rest: &'de str, span: SourceSpan) -> Result<(), Error> {
        match self.operand(rest, span)? {
            Operand::Ident(name) => {
                self.emit(TokenKind::Ident, name.map(Payload::Text), span);
            }
            Operand::Typed(ty, value) => {
                self.emit(TokenKind::Type, Some(Payload::Type(ty)), span);
                self.emit(TokenKind::Value, Some(Payload::Text(value)), span);
            }
        }
        Ok(())
    }

    /// Splits `<type> <value>` from a bare `<ident>`.
    fn operand(&self, rest: &'de str, span: SourceSpan) -> Result<Operand<'de>, Error> {
        let Some((word, value)) = rest.split_once(char::is_whitespace) else {
            return Ok(Operand::Ident((!rest.is_empty()).then_some(rest)));
        };
        let value = value.trim_start();
        let ty = word
            .parse()
            .map_err(|()| Error::syntax(self.line, span, format!("invalid type -> {rest}")))?;
        Ok(Operand::Typed(ty, value))
    }
}

/// Strips a case-insensitive keyword prefix, returning the trimmed remainder.
fn keyword<'de>(line: &'de str, word: &str) -> Option<&'de str> {
    line.get(..word.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(word))
        .map(|_| line[word.len()..].trim_start())
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.finished {
                return None;
            }
            if self.rest.is_empty() {
                self.finished = true;
                let end = self.whole.len();
                return Some(Ok(Token {
                    kind: TokenKind::Eof,
                    line: self.line,
                    span: SourceSpan::from(end..end),
                    value: None,
                }));
            }

            let end = self.rest.find('\n').map_or(self.rest.len(), |at| at + 1);
            let raw = &self.rest[..end];
            let start = self.byte;
            self.rest = &self.rest[end..];
            self.byte += end;
            self.line += 1;

            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            let leading = raw.len() - raw.trim_start().len();
            let span = SourceSpan::from(start + leading..start + leading + text.len());

            if let Err(e) = self.lex_line(text, span) {
                self.finished = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}
