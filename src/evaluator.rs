//! The evaluator capability the session drives
//!
//! The engine never parses or runs source text itself. Anything that can
//! run a snippet against a context, and bind a named value into that
//! context, can sit behind a [`crate::Session`].

use crate::failure::Failure;
use crate::history::{HistoryBuffer, Output};
use crate::session::SessionInfo;
use std::fmt;

/// A session-side value handed to [`Evaluator::bind`]
#[derive(Debug)]
pub enum SessionValue<'a, V> {
    /// Neutral default (nothing recorded yet)
    Nil,
    Value(&'a V),
    Exception(&'a Failure),
    Text(&'a str),
    Inputs(&'a HistoryBuffer<Option<String>>),
    Outputs(&'a HistoryBuffer<Output<V>>),
    Session(&'a SessionInfo),
}

pub trait Evaluator {
    /// Scope that source text is evaluated against
    type Context;
    /// Result of a successful evaluation
    type Value: Clone + fmt::Debug + fmt::Display;

    /// Run `source` in `context`. `path` and `line` name where the text came
    /// from so failures can point back at it.
    fn evaluate(
        &mut self,
        source: &str,
        context: &mut Self::Context,
        path: &str,
        line: usize,
    ) -> Result<Self::Value, Failure>;

    /// Make `value` visible to later evaluations in `context` under `name`
    fn bind(
        &mut self,
        name: &str,
        value: SessionValue<'_, Self::Value>,
        context: &mut Self::Context,
    ) -> Result<(), Failure>;

    /// Remove a binding made with [`Evaluator::bind`]
    fn unbind(&mut self, name: &str, context: &mut Self::Context);

    /// Frames currently executing inside the evaluator, innermost first.
    /// Empty when nothing is running, which is the usual case at the
    /// point the session calls `evaluate`.
    fn backtrace(&self) -> Vec<String> {
        Vec::new()
    }

    /// Short description of what `context` evaluates against, for prompts
    fn describe(&self, context: &Self::Context) -> String;

    /// Build a nested context from `source` evaluated in `context`
    fn enter(
        &mut self,
        source: &str,
        context: &mut Self::Context,
        path: &str,
        line: usize,
    ) -> Result<Self::Context, Failure> {
        let _ = (context, path, line);
        Err(Failure::runtime(format!("cannot enter `{}'", source.trim())))
    }

    /// Names worth offering for tab completion in `context`
    fn completions(&self, context: &Self::Context) -> Vec<String> {
        let _ = context;
        Vec::new()
    }
}
