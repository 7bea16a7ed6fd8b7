//! Error types shared by the whole binding layer.
//!
//! `ErrorKind` is the structured category; factory functions below are the
//! public way to build errors and fill both `kind` and `message`. Failures
//! reported by the engine keep the engine's diagnostic text in `message`.

use crate::value::Value;

/// Result alias used across the binding layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Category of a binding error.
///
/// `RunTime`, `File`, `Syntax`, `Memory` and `Handler` correspond one to one
/// with the engine's non-zero status codes. The remaining kinds are raised on
/// the host side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised by host code that has no better category.
    Generic,
    /// Error while running a chunk or a called function.
    RunTime,
    /// A script file could not be opened or read.
    File,
    /// A chunk failed to compile.
    Syntax,
    /// The engine ran out of memory, or its stack could not grow.
    Memory,
    /// The message handler itself failed.
    Handler,
    /// A value has no host representation, or the engine rejected an operation
    /// for the type of one of its operands.
    Type,
    /// A value of one type was found where another was required.
    TypeMismatch { expected: String, found: String },
    /// Strict table lookup for a key that is not present.
    NoSuchKey { key: Value },
}

impl ErrorKind {
    /// Short lowercase label, used by diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::RunTime => "runtime",
            Self::File => "file",
            Self::Syntax => "syntax",
            Self::Memory => "memory",
            Self::Handler => "handler",
            Self::Type => "type",
            Self::TypeMismatch { .. } => "type mismatch",
            Self::NoSuchKey { .. } => "no such key",
        }
    }
}

/// Binding error: a kind plus a human-readable message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    /// Structured category for programmatic matching.
    pub kind: ErrorKind,
    /// Human-readable message. For engine errors this is the engine's text.
    pub message: String,
}

impl Error {
    /// Create an error of the given kind with an explicit message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Prefix the message with extra context, keeping the kind.
    #[must_use]
    pub fn context(mut self, context: impl std::fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }
}

/// Error raised by host code.
#[cold]
pub fn generic(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Generic, message)
}

/// Error while running guest code.
#[cold]
pub fn runtime(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::RunTime, message)
}

/// File could not be loaded.
#[cold]
pub fn file(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::File, message)
}

/// Chunk failed to compile.
#[cold]
pub fn syntax(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Syntax, message)
}

/// Memory exhaustion in the engine or on its stack.
#[cold]
pub fn memory(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Memory, message)
}

/// Failure inside the message handler.
#[cold]
pub fn handler(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Handler, message)
}

/// Value that cannot cross the binding boundary.
#[cold]
pub fn type_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Type, message)
}

/// A value of type `found` where `expected` was required.
#[cold]
pub fn type_mismatch(expected: &str, found: &str) -> Error {
    Error::new(
        ErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        },
        format!("type mismatch: '{expected}' was expected but '{found}' was found"),
    )
}

/// Strict lookup of an absent key.
#[cold]
pub fn no_such_key(key: &Value) -> Error {
    Error::new(
        ErrorKind::NoSuchKey { key: key.clone() },
        format!("no such key: {key}"),
    )
}

/// Wrong number of arguments passed to an exported function.
#[cold]
pub fn wrong_arg_count(expected: usize, got: usize) -> Error {
    let arg_word = if expected == 1 {
        "argument"
    } else {
        "arguments"
    };
    runtime(format!("expected {expected} {arg_word}, got {got}"))
}

/// A host panic caught at the binding boundary.
#[cold]
pub fn unknown_exception() -> Error {
    runtime("unknown exception caught by wrapper")
}
