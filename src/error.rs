use miette::{Diagnostic, LabeledSpan, SourceSpan};
use thiserror::Error;

/// Everything that can stop a scry run.
///
/// Language errors carry the 1-indexed line they were raised on and the span of
/// that (trimmed) source line, so the CLI can render them against the file with
/// [`miette::Report::with_source_code`].
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("syntax error, line {line} -> {message}")]
    #[diagnostic(code(scry::syntax))]
    Syntax {
        line: usize,
        message: String,
        #[label("this line")]
        span: SourceSpan,
    },

    #[error("runtime error, line {line} -> {message}")]
    #[diagnostic(code(scry::runtime))]
    Runtime {
        line: usize,
        message: String,
        #[label("here")]
        span: SourceSpan,
        #[label(collection)]
        related: Vec<LabeledSpan>,
    },

    #[error("not enough data on the stack, line {line} -> `{instruction}` needs {needed} value(s)")]
    #[diagnostic(
        code(scry::stack_underflow),
        help("push more values before `{instruction}`")
    )]
    StackUnderflow {
        line: usize,
        instruction: &'static str,
        needed: usize,
        #[label("stack is too short here")]
        span: SourceSpan,
    },

    #[error("unknown variable, line {line} -> {name:?}")]
    #[diagnostic(
        code(scry::unknown_variable),
        help("declare it first with `var <type> {name}`")
    )]
    UnknownVariable {
        line: usize,
        name: String,
        #[label("not in scope")]
        span: SourceSpan,
    },

    #[error("cannot redefine, line {line} -> {message}")]
    #[diagnostic(code(scry::redefinition))]
    Redefinition {
        line: usize,
        message: String,
        #[label("declared here")]
        span: SourceSpan,
    },

    #[error("type mismatch, line {line} -> {message}")]
    #[diagnostic(code(scry::type_mismatch))]
    TypeMismatch {
        line: usize,
        message: String,
        #[label("this value")]
        span: SourceSpan,
    },

    #[error("reading `{path}` failed")]
    #[diagnostic(code(scry::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing program output failed")]
    #[diagnostic(code(scry::output))]
    Output(#[source] std::io::Error),
}

impl Error {
    pub fn syntax(line: usize, span: SourceSpan, message: impl Into<String>) -> Self {
        Error::Syntax {
            line,
            message: message.into(),
            span,
        }
    }

    pub fn runtime(line: usize, span: SourceSpan, message: impl Into<String>) -> Self {
        Error::Runtime {
            line,
            message: message.into(),
            span,
            related: Vec::new(),
        }
    }

    pub fn type_mismatch(line: usize, span: SourceSpan, message: impl Into<String>) -> Self {
        Error::TypeMismatch {
            line,
            message: message.into(),
            span,
        }
    }

    pub fn unknown_variable(line: usize, span: SourceSpan, name: &str) -> Self {
        Error::UnknownVariable {
            line,
            name: name.to_string(),
            span,
        }
    }

    /// The source line the error points at, if it came from the program itself.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Syntax { line, .. }
            | Error::Runtime { line, .. }
            | Error::StackUnderflow { line, .. }
            | Error::UnknownVariable { line, .. }
            | Error::Redefinition { line, .. }
            | Error::TypeMismatch { line, .. } => Some(*line),
            Error::Io { .. } | Error::Output(_) => None,
        }
    }

    /// Process exit status for this error, following the sysexits convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Syntax { .. } => 65,
            Error::Io { .. } => 66,
            _ => 70,
        }
    }
}
