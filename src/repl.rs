use ripl::calc::{Calc, Scope};
use ripl::{CommandSet, LineSource, ReadLine, ReplConfig, ReplError, Session};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use std::borrow::Cow;
use std::env;
use std::io;
use std::process::ExitCode;
use std::rc::Rc;

use crate::rcfile;

/// Tab completion over the candidates the session last handed out
struct RiplHelper {
    candidates: Vec<String>,
}

impl Helper for RiplHelper {}

impl Completer for RiplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Find the word being completed
        let start = line[..pos]
            .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '!'))
            .map(|i| i + line[i..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(0);
        let prefix = &line[start..pos];

        if prefix.is_empty() {
            return Ok((start, Vec::new()));
        }

        let pairs = self
            .candidates
            .iter()
            .filter(|c| c.starts_with(prefix))
            .map(|c| Pair {
                display: c.clone(),
                replacement: c.clone(),
            })
            .collect();

        Ok((start, pairs))
    }
}

impl Hinter for RiplHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for RiplHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }

    fn highlight_char(&self, _line: &str, _pos: usize) -> bool {
        false
    }
}

impl Validator for RiplHelper {}

/// rustyline as a session line source
struct EditorInput {
    editor: Editor<RiplHelper, DefaultHistory>,
}

impl EditorInput {
    fn new() -> Result<Self, ReplError> {
        let mut editor = Editor::new().map_err(|e| ReplError::Input(e.to_string()))?;
        editor.set_helper(Some(RiplHelper {
            candidates: Vec::new(),
        }));
        Ok(EditorInput { editor })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine, ReplError> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(ReadLine::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadLine::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadLine::Eof),
            Err(e) => Err(ReplError::Input(e.to_string())),
        }
    }

    fn set_completions(&mut self, candidates: Vec<String>) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.candidates = candidates;
        }
    }

    fn add_history(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }
}

/// Run the interactive session
pub(crate) fn run_repl(config: &ReplConfig) -> ExitCode {
    let input = match EditorInput::new() {
        Ok(input) => input,
        Err(e) => {
            eprintln!("REPL error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let commands = CommandSet::<Calc>::with_defaults();
    let mut command_names: Vec<String> = commands.names().map(String::from).collect();
    command_names.push("help".to_string());

    let mut session = Session::builder(Calc::new())
        .config(config)
        .registry(Rc::new(rcfile::registry(config)))
        .commands(commands)
        .custom_completions(move |_scope: &Scope| command_names.clone())
        .input(input)
        .output(io::stdout())
        .build();

    if let Err(e) = session.load_history() {
        eprintln!("Warning: could not load history: {}", e);
    }

    if env::var("RIPL_BANNER").is_ok() {
        println!("ripl {} - type `help` for commands, Ctrl-D to quit", env!("CARGO_PKG_VERSION"));
    }

    match session.start(Scope::main()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("REPL error: {}", e);
            ExitCode::FAILURE
        }
    }
}
