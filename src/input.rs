//! Line sources
//!
//! The session pulls one physical line at a time. Interactive front ends
//! (rustyline in the `ripl` binary) and plain readers both implement
//! [`LineSource`].

use crate::error::ReplError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::BufRead;
use std::rc::Rc;

/// Result of asking for a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    /// The user interrupted the current input (Ctrl-C)
    Interrupted,
    /// No more input (Ctrl-D, end of file)
    Eof,
}

pub trait LineSource {
    /// Show `prompt` and read one line without its terminator
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine, ReplError>;

    /// Replace the candidates offered for completion
    fn set_completions(&mut self, _candidates: Vec<String>) {}

    /// Seed the source's own recall history (e.g. from a history file)
    fn add_history(&mut self, _line: &str) {}
}

/// Reads lines from any `BufRead`, ignoring prompts
pub struct ReaderInput<R> {
    reader: R,
}

impl<R: BufRead> ReaderInput<R> {
    pub fn new(reader: R) -> Self {
        ReaderInput { reader }
    }
}

impl ReaderInput<std::io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        ReaderInput::new(std::io::stdin().lock())
    }
}

impl<R: BufRead> LineSource for ReaderInput<R> {
    fn read_line(&mut self, _prompt: &str) -> Result<ReadLine, ReplError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(ReadLine::Eof);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(ReadLine::Line(line))
    }
}

/// Feeds a fixed list of lines and remembers every prompt it was shown.
///
/// Runs out with [`ReadLine::Eof`].
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<ReadLine>,
    prompts: Rc<RefCell<Vec<String>>>,
    completions: Rc<RefCell<Vec<String>>>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInput {
            lines: lines.into_iter().map(|l| ReadLine::Line(l.into())).collect(),
            ..Self::default()
        }
    }

    /// Queue an interrupt after the lines given so far
    pub fn interrupt(mut self) -> Self {
        self.lines.push_back(ReadLine::Interrupted);
        self
    }

    /// Queue more lines after the ones given so far
    pub fn then<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(|l| ReadLine::Line(l.into())));
        self
    }

    /// Shared log of prompts shown so far
    pub fn prompt_log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.prompts)
    }

    /// Shared view of the latest completion candidates
    pub fn completion_log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.completions)
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine, ReplError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.lines.pop_front().unwrap_or(ReadLine::Eof))
    }

    fn set_completions(&mut self, candidates: Vec<String>) {
        *self.completions.borrow_mut() = candidates;
    }
}
