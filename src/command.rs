//! Command dispatch
//!
//! Every line is offered to a [`CommandDispatcher`] before it is added to
//! the pending buffer. The dispatcher answers with a [`CommandResult`]:
//!
//! - `NotCommand` - the line is source text
//! - `Void`       - a command ran and contributes nothing to the buffer
//! - `Value(v)`   - a command ran and `v` becomes the cycle's result
//! - `Break(v)`   - a command asked to end the session, optionally with a value
//!
//! [`CommandSet`] is a small name-keyed dispatcher with the session
//! commands every front end wants (`exit`, `cd`, `show-input`...).

use crate::context::ContextStack;
use crate::error::ReplError;
use crate::evaluator::Evaluator;
use crate::failure::Failure;
use crate::history::HistoryBuffer;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult<V> {
    NotCommand,
    Void,
    Value(V),
    Break(Option<V>),
}

impl<V> CommandResult<V> {
    /// Whether a command matched the line
    pub fn is_command(&self) -> bool {
        !matches!(self, CommandResult::NotCommand)
    }

    /// Whether the matched command produced no value for the buffer
    pub fn is_void(&self) -> bool {
        matches!(self, CommandResult::Void | CommandResult::Break(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            CommandResult::Value(v) => Some(v),
            CommandResult::Break(v) => v.as_ref(),
            _ => None,
        }
    }
}

/// What a command may look at and change
pub struct CommandContext<'a, E: Evaluator> {
    /// Text accumulated so far in this cycle
    pub pending: &'a mut String,
    pub contexts: &'a mut ContextStack<E::Context>,
    pub evaluator: &'a mut E,
    pub output: &'a mut dyn Write,
    pub inputs: &'a HistoryBuffer<Option<String>>,
    /// Last file a command showed or edited, exposed as `_file_`
    pub last_file: &'a mut Option<String>,
    pub eval_path: &'a str,
    pub line: usize,
    /// Contexts below this index belong to enclosing sessions
    pub base_depth: usize,
}

impl<E: Evaluator> CommandContext<'_, E> {
    /// Evaluate `source` in the current context
    pub fn evaluate(&mut self, source: &str) -> Result<E::Value, Failure> {
        let context = self
            .contexts
            .top_mut()
            .ok_or_else(|| Failure::runtime("no context to evaluate in"))?;
        self.evaluator.evaluate(source, context, self.eval_path, self.line)
    }

    /// Depth of the current context relative to the session's own
    pub fn nesting(&self) -> usize {
        self.contexts.len().saturating_sub(self.base_depth + 1)
    }
}

pub trait CommandDispatcher<E: Evaluator> {
    fn dispatch(
        &mut self,
        line: &str,
        cx: &mut CommandContext<'_, E>,
    ) -> Result<CommandResult<E::Value>, ReplError>;
}

/// Dispatcher that never matches; every line is source text
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCommands;

impl<E: Evaluator> CommandDispatcher<E> for NoCommands {
    fn dispatch(
        &mut self,
        _line: &str,
        _cx: &mut CommandContext<'_, E>,
    ) -> Result<CommandResult<E::Value>, ReplError> {
        Ok(CommandResult::NotCommand)
    }
}

pub type CommandFn<E> = Box<
    dyn FnMut(&str, &mut CommandContext<'_, E>) -> Result<CommandResult<<E as Evaluator>::Value>, ReplError>,
>;

struct Command<E: Evaluator> {
    description: String,
    run: CommandFn<E>,
}

/// Commands keyed by the first word of the line
pub struct CommandSet<E: Evaluator> {
    commands: BTreeMap<String, Command<E>>,
}

impl<E: Evaluator> Default for CommandSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Evaluator> CommandSet<E> {
    /// An empty set (only `help`)
    pub fn new() -> Self {
        CommandSet {
            commands: BTreeMap::new(),
        }
    }

    /// Register `name`. The closure gets the rest of the line, trimmed.
    pub fn command<F>(&mut self, name: &str, description: &str, run: F) -> &mut Self
    where
        F: FnMut(&str, &mut CommandContext<'_, E>) -> Result<CommandResult<E::Value>, ReplError> + 'static,
    {
        self.commands.insert(
            name.to_string(),
            Command {
                description: description.to_string(),
                run: Box::new(run),
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    fn write_help(&self, output: &mut dyn Write) -> Result<(), ReplError> {
        let width = self.commands.keys().map(String::len).max().unwrap_or(0).max(4);
        writeln!(output, "{:width$}  Show this list", "help", width = width)?;
        for (name, command) in &self.commands {
            writeln!(output, "{:width$}  {}", name, command.description, width = width)?;
        }
        Ok(())
    }

    /// The session commands: `exit`, `exit-all`, `cd`, `nesting`,
    /// `show-input`, `!` and `hist`
    pub fn with_defaults() -> Self {
        let mut set = Self::new();
        set.command(
            "exit",
            "Leave the current context; at the top level end the session (optionally with a value)",
            |args, cx| {
                if cx.nesting() > 0 {
                    cx.contexts.pop();
                    return Ok(CommandResult::Void);
                }
                Ok(CommandResult::Break(evaluate_payload(args, cx)?))
            },
        )
        .command("exit-all", "End the session from any depth (optionally with a value)", |args, cx| {
            Ok(CommandResult::Break(evaluate_payload(args, cx)?))
        })
        .command("cd", "Enter the context of an expression; `cd ..` leaves, `cd /` returns to the top", |args, cx| {
            change_context(args, cx)?;
            Ok(CommandResult::Void)
        })
        .command("nesting", "Show the context stack", |_, cx| {
            writeln!(cx.output, "Nesting status:")?;
            writeln!(cx.output, "--")?;
            let contexts: Vec<_> = cx.contexts.iter().skip(cx.base_depth).collect();
            for (level, context) in contexts.into_iter().enumerate() {
                let description = cx.evaluator.describe(context);
                if level == 0 {
                    writeln!(cx.output, "{}. {} (top level)", level, description)?;
                } else {
                    writeln!(cx.output, "{}. {}", level, description)?;
                }
            }
            Ok(CommandResult::Void)
        })
        .command("show-input", "Show the lines entered so far for the current expression", |_, cx| {
            if cx.pending.is_empty() {
                writeln!(cx.output, "(input buffer is empty)")?;
            }
            for (number, line) in cx.pending.lines().enumerate() {
                writeln!(cx.output, "{}: {}", number + 1, line)?;
            }
            Ok(CommandResult::Void)
        })
        .command("!", "Clear the input buffer", |_, cx| {
            cx.pending.clear();
            writeln!(cx.output, "Input buffer cleared!")?;
            Ok(CommandResult::Void)
        })
        .command("hist", "Show input history; `hist -n N` shows the last N entries", |args, cx| {
            show_history(args, cx)?;
            Ok(CommandResult::Void)
        });
        set
    }
}

impl<E: Evaluator> CommandDispatcher<E> for CommandSet<E> {
    fn dispatch(
        &mut self,
        line: &str,
        cx: &mut CommandContext<'_, E>,
    ) -> Result<CommandResult<E::Value>, ReplError> {
        let trimmed = line.trim();
        let (name, args) = match trimmed.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (trimmed, ""),
        };
        if name.is_empty() {
            return Ok(CommandResult::NotCommand);
        }
        if name == "help" && !self.commands.contains_key("help") {
            self.write_help(cx.output)?;
            return Ok(CommandResult::Void);
        }
        let Some(command) = self.commands.get_mut(name) else {
            return Ok(CommandResult::NotCommand);
        };
        debug!(command = name, "command matched");
        (command.run)(args, cx)
    }
}

fn command_failure(failure: Failure) -> ReplError {
    ReplError::command(failure.to_string())
}

fn evaluate_payload<E: Evaluator>(
    args: &str,
    cx: &mut CommandContext<'_, E>,
) -> Result<Option<E::Value>, ReplError> {
    if args.is_empty() {
        return Ok(None);
    }
    cx.evaluate(args).map(Some).map_err(command_failure)
}

fn change_context<E: Evaluator>(args: &str, cx: &mut CommandContext<'_, E>) -> Result<(), ReplError> {
    match args {
        "" | "/" => {
            cx.contexts.truncate(cx.base_depth + 1);
        }
        ".." => {
            if cx.nesting() > 0 {
                cx.contexts.pop();
            }
        }
        source => {
            let context = cx
                .contexts
                .top_mut()
                .ok_or_else(|| ReplError::command("no context to enter from"))?;
            let nested = cx
                .evaluator
                .enter(source, context, cx.eval_path, cx.line)
                .map_err(command_failure)?;
            cx.contexts.push(nested);
        }
    }
    Ok(())
}

fn show_history<E: Evaluator>(args: &str, cx: &mut CommandContext<'_, E>) -> Result<(), ReplError> {
    let limit = match args.strip_prefix("-n") {
        Some(n) => Some(
            n.trim()
                .parse::<usize>()
                .map_err(|_| ReplError::command(format!("hist: invalid count `{}'", n.trim())))?,
        ),
        None if args.is_empty() => None,
        None => return Err(ReplError::command(format!("hist: unknown option `{}'", args))),
    };
    let entries: Vec<(usize, &String)> = cx
        .inputs
        .indexed()
        .filter_map(|(index, entry)| entry.as_ref().map(|text| (index, text)))
        .filter(|(_, text)| !text.is_empty())
        .collect();
    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
    for (index, text) in entries.into_iter().skip(skip) {
        let mut lines = text.lines();
        if let Some(first) = lines.next() {
            writeln!(cx.output, "{:>4}: {}", index, first)?;
        }
        for rest in lines {
            writeln!(cx.output, "      {}", rest)?;
        }
    }
    Ok(())
}
