//! The evaluation loop
//!
//! A [`Session`] owns the context stack, the prompt stack and the two
//! history buffers, and drives an [`Evaluator`] through read / dispatch /
//! evaluate / print cycles until something asks it to stop.
//!
//! ```text
//! start(target)
//!   prologue   before_session hook, neutral specials, aligned histories,
//!              registry entry, push target
//!   cycle*     inject specials, read lines until the unit is complete,
//!              evaluate, record, print
//!   epilogue   after_session hook, pop own contexts, leave registry
//! ```

use crate::classify::{Classification, FailureClassifier, PatternClassifier};
use crate::command::{CommandContext, CommandDispatcher, CommandResult, CommandSet};
use crate::config::{ReplConfig, DEFAULT_MEMORY_SIZE};
use crate::context::ContextStack;
use crate::error::ReplError;
use crate::evaluator::{Evaluator, SessionValue};
use crate::failure::Failure;
use crate::history::{HistoryBuffer, Output};
use crate::input::{LineSource, ReadLine, ReaderInput};
use crate::prompt::{Prompt, PromptContext, PromptStack};
use crate::registry::SessionRegistry;
use crate::special::{self, SessionState, COMMAND_RESULT};
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, warn};

/// Read-only snapshot of a session, handed to prompts, hooks and
/// `_session_`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Entries ever pushed to the input history
    pub input_count: usize,
    pub output_count: usize,
    /// Depth of the current context below the session's own
    pub nesting: usize,
    pub active_sessions: usize,
    pub memory_size: usize,
    pub last_result_is_exception: bool,
    /// Line number the next unit is evaluated at
    pub current_line: usize,
}

pub type PrintFn<V> = Box<dyn Fn(&mut dyn Write, &V) -> Result<(), ReplError>>;
pub type ExceptionHandlerFn = Box<dyn Fn(&mut dyn Write, &Failure) -> Result<(), ReplError>>;
pub type HookFn<C> = Box<dyn FnMut(&mut dyn Write, &C, &SessionInfo)>;
pub type CompletionFn<C> = Box<dyn Fn(&C) -> Vec<String>>;
pub type EndOfInputFn = Box<dyn FnMut(&mut String, &SessionInfo) -> EndOfInput>;

/// What to do when the line source runs dry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfInput {
    /// Carry on as if an empty line was read
    Continue,
    /// End the session without a value
    Break,
}

/// Session lifecycle hooks. Missing hooks are skipped.
pub struct Hooks<C> {
    pub before_session: Option<HookFn<C>>,
    pub after_session: Option<HookFn<C>>,
}

impl<C> Default for Hooks<C> {
    fn default() -> Self {
        Hooks {
            before_session: None,
            after_session: None,
        }
    }
}

impl<C> Hooks<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_session<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut dyn Write, &C, &SessionInfo) + 'static,
    {
        self.before_session = Some(Box::new(hook));
        self
    }

    pub fn after_session<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut dyn Write, &C, &SessionInfo) + 'static,
    {
        self.after_session = Some(Box::new(hook));
        self
    }
}

/// How one cycle ended. A failed unit is recorded like any other result;
/// only `Break` stops the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome<V> {
    Continue,
    /// The unit raised; the failure is also in the output history
    Failed(Failure),
    Break(Option<V>),
}

/// How [`Session::start`] ended
#[derive(Debug)]
pub enum SessionExit<C, V> {
    /// A break carried a value (`exit 42`)
    Value(V),
    /// No value; the context the session was started with
    Target(C),
}

enum Processed<V> {
    Continue,
    Substituted,
    Break(Option<V>),
}

fn default_print<V: std::fmt::Display>(output: &mut dyn Write, value: &V) -> Result<(), ReplError> {
    writeln!(output, "=> {}", value)?;
    Ok(())
}

fn default_exception_handler(output: &mut dyn Write, failure: &Failure) -> Result<(), ReplError> {
    writeln!(output, "{}: {}", failure.kind, failure.message)?;
    if let Some(frame) = failure.backtrace.first() {
        writeln!(output, "from {}", frame)?;
    }
    Ok(())
}

/// Abandon a partial unit; stop when there was none
fn default_end_of_input(pending: &mut String, _info: &SessionInfo) -> EndOfInput {
    if pending.is_empty() {
        EndOfInput::Break
    } else {
        pending.clear();
        EndOfInput::Continue
    }
}

/// Empty units and units ending in `;` aren't printed
fn suppresses_output(code: &str) -> bool {
    let body = code.strip_suffix('\n').unwrap_or(code);
    body.is_empty() || body.ends_with(';')
}

pub struct SessionBuilder<E: Evaluator> {
    evaluator: E,
    memory_size: usize,
    hooks: Hooks<E::Context>,
    prompt: Prompt,
    print: Option<PrintFn<E::Value>>,
    exception_handler: Option<ExceptionHandlerFn>,
    custom_completions: Option<CompletionFn<E::Context>>,
    end_of_input: Option<EndOfInputFn>,
    classifier: Option<Box<dyn FailureClassifier>>,
    registry: Option<Rc<SessionRegistry>>,
    output: Option<Box<dyn Write>>,
    input: Option<Box<dyn LineSource>>,
    commands: Option<Box<dyn CommandDispatcher<E>>>,
}

impl<E: Evaluator + 'static> SessionBuilder<E> {
    pub fn new(evaluator: E) -> Self {
        SessionBuilder {
            evaluator,
            memory_size: DEFAULT_MEMORY_SIZE,
            hooks: Hooks::default(),
            prompt: Prompt::default_prompt(),
            print: None,
            exception_handler: None,
            custom_completions: None,
            end_of_input: None,
            classifier: None,
            registry: None,
            output: None,
            input: None,
            commands: None,
        }
    }

    /// Memory size and prompt from a config file
    pub fn config(mut self, config: &ReplConfig) -> Self {
        self.memory_size = config.memory_size;
        self.prompt = config.prompt.prompt();
        self
    }

    pub fn memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    pub fn hooks(mut self, hooks: Hooks<E::Context>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn print<F>(mut self, print: F) -> Self
    where
        F: Fn(&mut dyn Write, &E::Value) -> Result<(), ReplError> + 'static,
    {
        self.print = Some(Box::new(print));
        self
    }

    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut dyn Write, &Failure) -> Result<(), ReplError> + 'static,
    {
        self.exception_handler = Some(Box::new(handler));
        self
    }

    /// Extra completion candidates on top of the evaluator's own
    pub fn custom_completions<F>(mut self, completions: F) -> Self
    where
        F: Fn(&E::Context) -> Vec<String> + 'static,
    {
        self.custom_completions = Some(Box::new(completions));
        self
    }

    pub fn end_of_input<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut String, &SessionInfo) -> EndOfInput + 'static,
    {
        self.end_of_input = Some(Box::new(handler));
        self
    }

    pub fn classifier<C: FailureClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Share a registry with other sessions (nested or sequential)
    pub fn registry(mut self, registry: Rc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn output<W: Write + 'static>(mut self, output: W) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn input<L: LineSource + 'static>(mut self, input: L) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    pub fn commands<D: CommandDispatcher<E> + 'static>(mut self, commands: D) -> Self {
        self.commands = Some(Box::new(commands));
        self
    }

    pub fn build(self) -> Session<E> {
        Session {
            evaluator: self.evaluator,
            input: self.input.unwrap_or_else(|| Box::new(ReaderInput::stdin())),
            output: self.output.unwrap_or_else(|| Box::new(io::stdout())),
            commands: self
                .commands
                .unwrap_or_else(|| Box::new(CommandSet::<E>::with_defaults())),
            print: self.print.unwrap_or_else(|| Box::new(default_print::<E::Value>)),
            exception_handler: self
                .exception_handler
                .unwrap_or_else(|| Box::new(default_exception_handler)),
            hooks: self.hooks,
            custom_completions: self.custom_completions,
            end_of_input: self.end_of_input.unwrap_or_else(|| Box::new(default_end_of_input)),
            classifier: self.classifier.unwrap_or_else(|| Box::new(PatternClassifier::new())),
            registry: self.registry.unwrap_or_default(),
            contexts: ContextStack::new(),
            prompts: PromptStack::new(self.prompt),
            input_history: HistoryBuffer::new(self.memory_size),
            output_history: HistoryBuffer::new(self.memory_size),
            last_result: None,
            last_exception: None,
            last_file: None,
            suppress_output: false,
            last_result_is_exception: false,
            base_depth: 0,
        }
    }
}

pub struct Session<E: Evaluator> {
    evaluator: E,
    input: Box<dyn LineSource>,
    output: Box<dyn Write>,
    commands: Box<dyn CommandDispatcher<E>>,
    print: PrintFn<E::Value>,
    exception_handler: ExceptionHandlerFn,
    hooks: Hooks<E::Context>,
    custom_completions: Option<CompletionFn<E::Context>>,
    end_of_input: EndOfInputFn,
    classifier: Box<dyn FailureClassifier>,
    registry: Rc<SessionRegistry>,
    contexts: ContextStack<E::Context>,
    prompts: PromptStack,
    input_history: HistoryBuffer<Option<String>>,
    output_history: HistoryBuffer<Output<E::Value>>,
    last_result: Option<E::Value>,
    last_exception: Option<Failure>,
    last_file: Option<String>,
    suppress_output: bool,
    last_result_is_exception: bool,
    /// Contexts below this index were on the stack before `start`
    base_depth: usize,
}

impl<E: Evaluator + 'static> Session<E> {
    /// A session on stdin/stdout with the default commands and prompt
    pub fn new(evaluator: E) -> Self {
        SessionBuilder::new(evaluator).build()
    }

    pub fn builder(evaluator: E) -> SessionBuilder<E> {
        SessionBuilder::new(evaluator)
    }
}

impl<E: Evaluator> Session<E> {
    /// Run the loop against `target` until a break
    pub fn start(&mut self, mut target: E::Context) -> Result<SessionExit<E::Context, E::Value>, ReplError> {
        let registry = Rc::clone(&self.registry);
        let base = self.contexts.len();
        let previous_base = std::mem::replace(&mut self.base_depth, base);

        if let Err(e) = self.prologue(&mut target) {
            self.base_depth = previous_base;
            return Err(e);
        }
        let guard = registry.enter();
        self.contexts.push(target);
        debug!(active = registry.active_sessions(), "session started");

        let outcome = self.run_loop();

        self.fire_after_session(base);
        let popped = self.contexts.truncate(base);
        drop(guard);
        self.base_depth = previous_base;
        debug!(active = registry.active_sessions(), "session ended");

        match outcome? {
            Some(value) => Ok(SessionExit::Value(value)),
            None => popped
                .into_iter()
                .next()
                .map(SessionExit::Target)
                .ok_or(ReplError::EmptyContextStack),
        }
    }

    fn prologue(&mut self, target: &mut E::Context) -> Result<(), ReplError> {
        self.last_result = None;
        self.last_result_is_exception = false;
        let info = self.info();
        if let Some(hook) = self.hooks.before_session.as_mut() {
            hook(&mut *self.output, target, &info);
        }
        special::initialize(
            &mut self.evaluator,
            target,
            &self.input_history,
            &self.output_history,
            &info,
        )
        .map_err(ReplError::Binding)?;
        self.output_history.push(Output::Nil);
        self.input_history.push(None);
        Ok(())
    }

    fn fire_after_session(&mut self, base: usize) {
        let info = self.info();
        if let (Some(hook), Some(context)) = (self.hooks.after_session.as_mut(), self.contexts.get(base)) {
            hook(&mut *self.output, context, &info);
        }
    }

    fn run_loop(&mut self) -> Result<Option<E::Value>, ReplError> {
        loop {
            match self.run_one_cycle()? {
                CycleOutcome::Continue | CycleOutcome::Failed(_) => {}
                CycleOutcome::Break(payload) => return Ok(payload),
            }
        }
    }

    /// Read, evaluate and print one unit
    pub fn run_one_cycle(&mut self) -> Result<CycleOutcome<E::Value>, ReplError> {
        if self.contexts.is_empty() {
            return Err(ReplError::EmptyContextStack);
        }
        self.inject_specials()?;
        self.refresh_completions();

        let mut pending = String::new();
        let mut substituted = false;
        let evaluated = loop {
            let Some(line) = self.retrieve_line(&mut pending)? else {
                self.clear_command_result(substituted);
                return Ok(CycleOutcome::Break(None));
            };
            match self.process_line(&line, &mut pending) {
                Ok(Processed::Continue) => {}
                Ok(Processed::Substituted) => substituted = true,
                Ok(Processed::Break(payload)) => {
                    self.clear_command_result(substituted);
                    return Ok(CycleOutcome::Break(payload));
                }
                Err(e) => {
                    self.clear_command_result(substituted);
                    return Err(e);
                }
            }

            let caller = self.evaluator.backtrace();
            match self.evaluate(&pending) {
                Err(failure) if self.is_incomplete(&failure, &caller) => {
                    debug!(lines = pending.lines().count(), "incomplete input, reading on");
                }
                result => break result,
            }
        };
        self.clear_command_result(substituted);

        let output = match evaluated {
            Ok(value) => {
                self.set_last_result(&value);
                Output::Value(value)
            }
            Err(mut failure) => {
                failure.locate();
                self.set_last_exception(&failure);
                Output::Exception(failure)
            }
        };
        self.update_input_history(&pending);

        self.suppress_output = suppresses_output(&pending);
        if self.should_print() {
            self.show_result(&output);
        }
        self.output.flush()?;
        Ok(match output {
            Output::Exception(failure) => CycleOutcome::Failed(failure),
            _ => CycleOutcome::Continue,
        })
    }

    /// Read one line with the prompt matching the state of `pending`.
    /// `None` means the end-of-input handler asked to stop.
    fn retrieve_line(&mut self, pending: &mut String) -> Result<Option<String>, ReplError> {
        let prompt = self.select_prompt(pending.is_empty());
        match self.input.read_line(&prompt)? {
            ReadLine::Line(line) => {
                self.registry.record_typed(&line);
                Ok(Some(line))
            }
            ReadLine::Interrupted => {
                debug!("input interrupted, discarding pending buffer");
                pending.clear();
                Ok(Some(String::new()))
            }
            ReadLine::Eof => {
                writeln!(self.output)?;
                let info = self.info();
                match (self.end_of_input)(pending, &info) {
                    EndOfInput::Continue => Ok(Some(String::new())),
                    EndOfInput::Break => Ok(None),
                }
            }
        }
    }

    /// Offer `line` to the command dispatcher, otherwise append it to
    /// `pending`
    fn process_line(&mut self, line: &str, pending: &mut String) -> Result<Processed<E::Value>, ReplError> {
        let dispatched = {
            let mut cx = CommandContext {
                pending: &mut *pending,
                contexts: &mut self.contexts,
                evaluator: &mut self.evaluator,
                output: &mut *self.output,
                inputs: &self.input_history,
                last_file: &mut self.last_file,
                eval_path: self.registry.eval_path(),
                line: self.registry.current_line(),
                base_depth: self.base_depth,
            };
            self.commands.dispatch(line, &mut cx)
        };
        let result = match dispatched {
            Err(ReplError::Command(message)) => {
                writeln!(self.output, "Error: {}", message)?;
                CommandResult::Void
            }
            other => other?,
        };

        match result {
            CommandResult::NotCommand => {
                if !line.is_empty() {
                    pending.push_str(line.trim_end());
                    pending.push('\n');
                }
                Ok(Processed::Continue)
            }
            CommandResult::Void => Ok(Processed::Continue),
            CommandResult::Value(value) => {
                let context = self.contexts.top_mut().ok_or(ReplError::EmptyContextStack)?;
                self.evaluator
                    .bind(COMMAND_RESULT, SessionValue::Value(&value), context)
                    .map_err(ReplError::Binding)?;
                pending.clear();
                pending.push_str(COMMAND_RESULT);
                pending.push('\n');
                Ok(Processed::Substituted)
            }
            CommandResult::Break(payload) => Ok(Processed::Break(payload)),
        }
    }

    fn evaluate(&mut self, source: &str) -> Result<E::Value, Failure> {
        let line = self.registry.current_line();
        let context = self
            .contexts
            .top_mut()
            .ok_or_else(|| Failure::runtime("no context to evaluate in"))?;
        self.evaluator.evaluate(source, context, self.registry.eval_path(), line)
    }

    fn is_incomplete(&self, failure: &Failure, caller: &[String]) -> bool {
        self.classifier.classify(failure, caller, self.registry.eval_path()) == Classification::Incomplete
    }

    fn clear_command_result(&mut self, substituted: bool) {
        if !substituted {
            return;
        }
        if let Some(context) = self.contexts.top_mut() {
            self.evaluator.unbind(COMMAND_RESULT, context);
        }
    }

    fn inject_specials(&mut self) -> Result<(), ReplError> {
        let info = self.info();
        let state = SessionState {
            inputs: &self.input_history,
            outputs: &self.output_history,
            info: &info,
            last_exception: self.last_exception.as_ref(),
            last_file: self.last_file.as_deref(),
            last_result: self.last_result.as_ref(),
        };
        let context = self.contexts.top_mut().ok_or(ReplError::EmptyContextStack)?;
        special::inject(&mut self.evaluator, context, &state).map_err(ReplError::Binding)
    }

    fn refresh_completions(&mut self) {
        let Some(context) = self.contexts.top() else {
            return;
        };
        let mut candidates = self.evaluator.completions(context);
        if let Some(custom) = &self.custom_completions {
            candidates.extend(custom(context));
        }
        candidates.sort();
        candidates.dedup();
        self.input.set_completions(candidates);
    }

    /// Record a successful result, blank units included
    pub fn set_last_result(&mut self, value: &E::Value) {
        self.last_result_is_exception = false;
        self.output_history.push(Output::Value(value.clone()));
        self.last_result = Some(value.clone());
    }

    pub fn set_last_exception(&mut self, failure: &Failure) {
        self.last_result_is_exception = true;
        self.output_history.push(Output::Exception(failure.clone()));
        self.last_exception = Some(failure.clone());
    }

    /// Push an evaluated unit to the input history and move the running
    /// line number past it
    pub fn update_input_history(&mut self, code: &str) {
        self.input_history.push(Some(code.to_string()));
        self.registry.advance(code);
    }

    pub fn should_print(&self) -> bool {
        !self.suppress_output || self.last_result_is_exception
    }

    fn show_result(&mut self, output: &Output<E::Value>) {
        let shown = match output {
            Output::Value(value) => (self.print)(&mut *self.output, value),
            Output::Exception(failure) => (self.exception_handler)(&mut *self.output, failure),
            Output::Nil => Ok(()),
        };
        let Err(e) = shown else {
            return;
        };
        warn!("Failed to display result: {}", e);
        if writeln!(self.output, "output error: {}", e).is_err() {
            let what = if output.is_exception() { "exception" } else { "result" };
            let _ = writeln!(self.output, "output error: failed to show {}", what);
        }
    }

    /// Prompt for the current state; `first_line` when nothing is pending
    pub fn select_prompt(&self, first_line: bool) -> String {
        let info = self.info();
        let receiver = self
            .contexts
            .top()
            .map(|context| self.evaluator.describe(context))
            .unwrap_or_default();
        let cx = PromptContext {
            receiver: &receiver,
            depth: info.nesting,
            session: &info,
        };
        self.prompts.select(first_line, &cx)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            input_count: self.input_history.count(),
            output_count: self.output_history.count(),
            nesting: self.contexts.len().saturating_sub(self.base_depth + 1),
            active_sessions: self.registry.active_sessions(),
            memory_size: self.memory_size(),
            last_result_is_exception: self.last_result_is_exception,
            current_line: self.registry.current_line(),
        }
    }

    /// Re-apply memory size and prompt from `config`
    pub fn refresh(&mut self, config: &ReplConfig) {
        if config.memory_size != self.memory_size() {
            self.set_memory_size(config.memory_size);
        }
        self.prompts.set(config.prompt.prompt());
    }

    pub fn memory_size(&self) -> usize {
        self.input_history.max_size()
    }

    /// Resize the histories. Both are recreated empty.
    pub fn set_memory_size(&mut self, size: usize) {
        self.input_history = HistoryBuffer::new(size);
        self.output_history = HistoryBuffer::new(size);
    }

    pub fn prompt(&self) -> &Prompt {
        self.prompts.current()
    }

    pub fn set_prompt(&mut self, prompt: Prompt) {
        self.prompts.set(prompt);
    }

    pub fn push_prompt(&mut self, prompt: Prompt) {
        self.prompts.push(prompt);
    }

    pub fn pop_prompt(&mut self) -> Prompt {
        self.prompts.pop()
    }

    pub fn last_result(&self) -> Option<&E::Value> {
        self.last_result.as_ref()
    }

    pub fn last_exception(&self) -> Option<&Failure> {
        self.last_exception.as_ref()
    }

    pub fn last_result_is_exception(&self) -> bool {
        self.last_result_is_exception
    }

    pub fn last_file(&self) -> Option<&str> {
        self.last_file.as_deref()
    }

    pub fn set_last_file(&mut self, file: Option<String>) {
        self.last_file = file;
    }

    pub fn input_history(&self) -> &HistoryBuffer<Option<String>> {
        &self.input_history
    }

    pub fn output_history(&self) -> &HistoryBuffer<Output<E::Value>> {
        &self.output_history
    }

    pub fn contexts(&self) -> &ContextStack<E::Context> {
        &self.contexts
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut E {
        &mut self.evaluator
    }

    pub fn registry(&self) -> &Rc<SessionRegistry> {
        &self.registry
    }

    /// Seed the line source's recall history from the history file
    pub fn load_history(&mut self) -> Result<usize, ReplError> {
        let lines = self.registry.load_history()?;
        for line in &lines {
            self.input.add_history(line);
        }
        debug!(lines = lines.len(), "history loaded");
        Ok(lines.len())
    }
}
