//! Common test utilities for ripl integration tests

#![allow(dead_code)]

pub use ripl::calc::{Calc, Scope, Value};
pub use ripl::{ScriptedInput, Session, SessionBuilder, SessionExit};

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// Output sink the test keeps a handle to after the session takes it
#[derive(Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Non-empty output lines
    pub fn lines(&self) -> Vec<String> {
        self.text()
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A calc session builder reading `input` and writing results and `print`
/// text to the returned sink
pub fn builder(input: ScriptedInput) -> (SessionBuilder<Calc>, SharedOutput) {
    let output = SharedOutput::new();
    let builder = Session::builder(Calc::with_output(output.clone()))
        .input(input)
        .output(output.clone());
    (builder, output)
}

/// Outcome of running a whole session
pub struct Run {
    pub session: Session<Calc>,
    pub exit: SessionExit<Scope, Value>,
    pub output: SharedOutput,
    pub prompts: Vec<String>,
}

/// Run a default calc session over `lines` until the input runs out
pub fn run<I, S>(lines: I) -> Run
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run_input(ScriptedInput::new(lines))
}

pub fn run_input(input: ScriptedInput) -> Run {
    let prompts = input.prompt_log();
    let (builder, output) = builder(input);
    let mut session = builder.build();
    let exit = session.start(Scope::main()).expect("session runs");
    let prompts = prompts.borrow().clone();
    Run {
        session,
        exit,
        output,
        prompts,
    }
}

/// `Display` of the last result, if any
pub fn last(session: &Session<Calc>) -> Option<String> {
    session.last_result().map(|v| v.to_string())
}
