use std::fmt;

use crate::ast::Value;
use thiserror::Error;

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";
pub const WARN_TAG: &str = "\x1b[33m[WARN]\x1b[0m";

/// Snapshot of the interpreter call stack, captured at raise time.
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    pub trace: Vec<String>,
}

impl ErrorContext {
    fn set_trace(&mut self, trace: Vec<String>) {
        if self.trace.is_empty() && !trace.is_empty() {
            self.trace = trace;
        }
    }
}

#[derive(Clone, Debug)]
pub struct ErrorData {
    pub message: String,
    pub context: ErrorContext,
}

impl ErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Every runtime failure carries a human-readable message and a
/// machine-readable info tag so interpreted `try*`/`catch` clauses can
/// pattern-match on it. The tail-call trampoline is deliberately NOT a
/// variant here; it travels through `eval::Flow` instead.
#[derive(Error, Debug, Clone)]
pub enum AniseError {
    #[error("Syntax error: {0}")]
    Syntax(ErrorData),

    #[error("Symbol not found: {0}")]
    UnboundSymbol(ErrorData),

    #[error("Arity mismatch: {0}")]
    Arity(ErrorData),

    #[error("Type error: {0}")]
    Type(ErrorData),

    #[error("Generic function error: {0}")]
    Reimplementation(ErrorData),

    #[error("Already defined: {0}")]
    AlreadyDefined(ErrorData),

    #[error("Runtime error: {0}")]
    Application(ErrorData),

    #[error("Parse error: {0}")]
    Parse(ErrorData),

    #[error("Error: {0}")]
    Custom(ErrorData, Value),

    #[error("Stack overflow: {0}")]
    StackOverflow(ErrorData),
}

impl AniseError {
    pub fn syntax(message: impl Into<String>) -> Self {
        AniseError::Syntax(ErrorData::new(message))
    }

    pub fn unbound_symbol(name: &str) -> Self {
        AniseError::UnboundSymbol(ErrorData::new(name.to_string()))
    }

    pub fn arity(message: impl Into<String>) -> Self {
        AniseError::Arity(ErrorData::new(message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        AniseError::Type(ErrorData::new(message))
    }

    pub fn reimplementation(message: impl Into<String>) -> Self {
        AniseError::Reimplementation(ErrorData::new(message))
    }

    pub fn already_defined(name: &str) -> Self {
        AniseError::AlreadyDefined(ErrorData::new(name.to_string()))
    }

    pub fn application(message: impl Into<String>) -> Self {
        AniseError::Application(ErrorData::new(message))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AniseError::Parse(ErrorData::new(message))
    }

    pub fn custom(message: impl Into<String>, info: Value) -> Self {
        AniseError::Custom(ErrorData::new(message), info)
    }

    pub fn stack_overflow(message: impl Into<String>) -> Self {
        AniseError::StackOverflow(ErrorData::new(message))
    }

    pub fn message(&self) -> &str {
        &self.data_ref().message
    }

    /// The tag an interpreted `catch` clause sees via `error-info`.
    pub fn info_tag(&self) -> Value {
        let name = match self {
            AniseError::Syntax(_) => "syntax-error",
            AniseError::UnboundSymbol(_) => "unbound-symbol",
            AniseError::Arity(_) => "arity-error",
            AniseError::Type(_) => "type-error",
            AniseError::Reimplementation(_) => "reimplementation-error",
            AniseError::AlreadyDefined(_) => "already-defined",
            AniseError::Application(_) => "runtime-error",
            AniseError::Parse(_) => "parse-error",
            AniseError::Custom(_, info) => return info.clone(),
            AniseError::StackOverflow(_) => "stack-overflow",
        };
        Value::Symbol(name.to_string())
    }

    /// Stack overflow is fatal: it unwinds past every `try*`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AniseError::StackOverflow(_))
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.data_mut().context.set_trace(trace);
        self
    }

    pub fn trace(&self) -> &[String] {
        &self.data_ref().context.trace
    }

    fn data_ref(&self) -> &ErrorData {
        match self {
            AniseError::Syntax(data)
            | AniseError::UnboundSymbol(data)
            | AniseError::Arity(data)
            | AniseError::Type(data)
            | AniseError::Reimplementation(data)
            | AniseError::AlreadyDefined(data)
            | AniseError::Application(data)
            | AniseError::Parse(data)
            | AniseError::Custom(data, _)
            | AniseError::StackOverflow(data) => data,
        }
    }

    fn data_mut(&mut self) -> &mut ErrorData {
        match self {
            AniseError::Syntax(data)
            | AniseError::UnboundSymbol(data)
            | AniseError::Arity(data)
            | AniseError::Type(data)
            | AniseError::Reimplementation(data)
            | AniseError::AlreadyDefined(data)
            | AniseError::Application(data)
            | AniseError::Parse(data)
            | AniseError::Custom(data, _)
            | AniseError::StackOverflow(data) => data,
        }
    }
}

pub fn format_error(err: &AniseError) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("{} {}", ERROR_TAG, err));
    for frame in err.trace().iter().rev() {
        lines.push(format!("  in {}", frame));
    }
    lines
}

impl From<String> for AniseError {
    fn from(s: String) -> Self {
        AniseError::application(s)
    }
}

impl From<&str> for AniseError {
    fn from(s: &str) -> Self {
        AniseError::application(s.to_string())
    }
}
