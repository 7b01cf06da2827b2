//! Evaluation failures
//!
//! A `Failure` is what an evaluator hands back when a snippet could not be
//! parsed or raised while running. The session records it as the cycle's
//! result, so it has to be cheap to clone and printable without the
//! evaluator that produced it.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Broad classification of a failure, displayed like an exception class name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Syntax,
    Name,
    Type,
    ZeroDivision,
    Runtime,
    Other(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Syntax => write!(f, "SyntaxError"),
            FailureKind::Name => write!(f, "NameError"),
            FailureKind::Type => write!(f, "TypeError"),
            FailureKind::ZeroDivision => write!(f, "ZeroDivisionError"),
            FailureKind::Runtime => write!(f, "RuntimeError"),
            FailureKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A recoverable failure raised by an evaluator
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// Frames active when the failure was raised, innermost first.
    /// Each frame reads `path:line[:in name]`.
    pub backtrace: Vec<String>,
    /// Source file of the first backtrace frame, filled in by [`Failure::locate`]
    pub file: Option<String>,
    /// Source line of the first backtrace frame, filled in by [`Failure::locate`]
    pub line: Option<usize>,
}

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*):(\d+)").expect("frame pattern is valid"))
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Failure {
            kind,
            message: message.into(),
            backtrace: Vec::new(),
            file: None,
            line: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Syntax, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Runtime, message)
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == FailureKind::Syntax
    }

    /// Extract `file` and `line` from the first backtrace frame.
    /// Leaves both unset when there is no frame or it doesn't look like `path:line`.
    pub fn locate(&mut self) {
        let Some(frame) = self.backtrace.first() else {
            return;
        };
        if let Some(caps) = frame_pattern().captures(frame) {
            self.file = caps.get(1).map(|m| m.as_str().to_string());
            self.line = caps.get(2).and_then(|m| m.as_str().parse().ok());
        }
    }
}
