//! Scry: a line-oriented, stack-based scripting language.
//!
//! A program is lexed into a flat token stream by [`Lexer`] and executed in a
//! single forward pass by [`Interpreter`]. There is no syntax tree.
//!
//! ```text
//! var int x
//! move x 5
//! push x
//! push int 2
//! mul
//! print
//! drop x
//! ```

use std::{io::Write, path::Path};

pub mod error;
pub mod eval;
pub mod lex;
pub mod types;

pub use error::Error;
pub use eval::{Interpreter, Value};
pub use lex::{Lexer, Token, TokenKind};
pub use types::{Type, Variable};

/// Reads a source file into memory.
pub fn read_source(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Lexes a whole program, failing on the first malformed line.
pub fn lex(source: &str) -> Result<Vec<Token<'_>>, Error> {
    Lexer::new(source).collect()
}

/// Executes `tokens`, writing every `print` to `out`.
pub fn evaluate<W: Write>(tokens: Vec<Token<'_>>, out: W) -> Result<(), Error> {
    Interpreter::new(tokens, out).evaluate()
}

/// Lexes and runs a program.
pub fn run<W: Write>(source: &str, out: W) -> Result<(), Error> {
    evaluate(lex(source)?, out)
}
