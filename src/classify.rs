//! Incomplete-input detection
//!
//! When evaluation of the pending buffer fails, the session asks a
//! [`FailureClassifier`] whether the failure only means "the user hasn't
//! finished typing". The default classifier requires two things:
//!
//! 1. the message looks like a premature end of input from the REPL's own
//!    source (unterminated string, missing `end`, unexpected end-of-input...)
//! 2. the failure didn't come from deeper inside evaluated code: the number
//!    of backtrace frames that belong to REPL input must not exceed the
//!    number the caller already had on its stack
//!
//! The second check keeps `eval("1 +")` typed at the prompt from being
//! mistaken for a request for more lines.

use crate::failure::Failure;
use regex::RegexSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Keep reading lines
    Incomplete,
    /// Surface the failure
    Genuine,
}

pub trait FailureClassifier {
    /// `caller` is the evaluator's backtrace taken at the evaluation site,
    /// `eval_path` the virtual path REPL input is evaluated under
    fn classify(&self, failure: &Failure, caller: &[String], eval_path: &str) -> Classification;
}

/// Messages that mean the input ended before a construct was closed
const INCOMPLETE_PATTERNS: &[&str] = &[
    r"unexpected (\$end|end-of-file|end-of-input|END_OF_FILE)",
    r"unterminated (quoted string|string|regexp) meets end of file",
    r"missing 'end' for",
    r"(?m): expecting '[})\]]'$",
    r#"can't find string ".*" anywhere before EOF"#,
];

fn default_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| RegexSet::new(INCOMPLETE_PATTERNS).expect("incomplete-input patterns are valid"))
}

/// Message pattern plus backtrace depth comparison
#[derive(Debug, Clone, Default)]
pub struct PatternClassifier {
    extra: Option<RegexSet>,
}

impl PatternClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat messages matching `patterns` as incomplete input
    pub fn with_patterns<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(PatternClassifier {
            extra: Some(RegexSet::new(patterns)?),
        })
    }

    fn looks_incomplete(&self, message: &str) -> bool {
        default_patterns().is_match(message)
            || self.extra.as_ref().is_some_and(|set| set.is_match(message))
    }
}

fn from_input(text: &str, eval_path: &str) -> bool {
    text.starts_with(eval_path)
}

impl FailureClassifier for PatternClassifier {
    fn classify(&self, failure: &Failure, caller: &[String], eval_path: &str) -> Classification {
        // Multi-line messages are checked line by line, the location prefix
        // isn't always on the first one.
        let raised_by_input = failure.message.lines().any(|line| from_input(line, eval_path));
        if !failure.is_syntax() || !raised_by_input || !self.looks_incomplete(&failure.message) {
            return Classification::Genuine;
        }

        let failure_depth = failure.backtrace.iter().filter(|f| from_input(f, eval_path)).count();
        let caller_depth = caller.iter().filter(|f| from_input(f, eval_path)).count();
        if failure_depth <= caller_depth {
            Classification::Incomplete
        } else {
            Classification::Genuine
        }
    }
}
