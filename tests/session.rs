//! Integration tests for the evaluation loop

#[path = "common/mod.rs"]
mod common;
use common::{builder, last, run, run_input, Calc, Scope, ScriptedInput, Session, SessionExit, Value};

use ripl::{
    CommandResult, CommandSet, EndOfInput, Failure, Hooks, Output, Prompt, PromptStyle, ReplConfig,
    ReplError, SessionInfo, SessionRegistry,
};
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::{self, Write};
use std::rc::Rc;

#[test]
fn test_incomplete_input_keeps_reading() {
    let run = run(["total = 1 +", "2", "total * 10"]);
    assert_eq!(run.output.lines(), vec!["=> 3", "=> 30"]);
    assert_eq!(last(&run.session).as_deref(), Some("30"));
    assert_eq!(
        run.prompts,
        vec!["[1] ripl(main)> ", "[1] ripl(main)* ", "[2] ripl(main)> ", "[3] ripl(main)> "]
    );

    let inputs = run.session.input_history();
    assert_eq!(inputs.count(), 3);
    assert_eq!(inputs.get(0), Some(&None));
    assert_eq!(inputs.get(1), Some(&Some("total = 1 +\n2\n".to_string())));
    assert_eq!(inputs.get(-1), Some(&Some("total * 10\n".to_string())));

    match run.exit {
        SessionExit::Target(scope) => assert_eq!(scope.get("total"), Some(&Value::Number(3.0))),
        SessionExit::Value(v) => panic!("unexpected break value {}", v),
    }
}

#[test]
fn test_failures_are_recorded_in_line() {
    let run = run(["1 / 0", "x = 5", "_ex_[\"message\"]"]);
    assert_eq!(
        run.output.lines(),
        vec![
            "ZeroDivisionError: divided by 0",
            "from (ripl):1:in `<main>'",
            "=> 5",
            "=> \"divided by 0\"",
        ]
    );

    let outputs = run.session.output_history();
    assert_eq!(outputs.count(), 4);
    assert_eq!(run.session.input_history().count(), 4);
    assert_eq!(outputs.get(0), Some(&Output::Nil));
    assert!(outputs.get(1).is_some_and(Output::is_exception));
    assert_eq!(outputs.get(2), Some(&Output::Value(Value::Number(5.0))));

    let failure = run.session.last_exception().expect("exception recorded");
    assert_eq!(failure.file.as_deref(), Some("(ripl)"));
    assert_eq!(failure.line, Some(1));
    assert!(!run.session.last_result_is_exception());
}

#[test]
fn test_raising_last_unit_is_remembered() {
    let run = run(["raise(\"boom\")"]);
    assert!(run.session.last_result_is_exception());
    assert_eq!(run.output.lines()[0], "RuntimeError: boom");
    assert!(run.session.last_result().is_none());
}

#[test]
fn test_failure_lines_follow_running_line_number() {
    let run = run(["a = 1\nb = 2", "raise(\"late\")"]);
    let failure = run.session.last_exception().expect("exception recorded");
    assert_eq!(failure.line, Some(3));
    assert_eq!(run.session.registry().current_line(), 4);
}

#[test]
fn test_trailing_semicolon_suppresses_output() {
    let run = run(["x = 41;", "# just a note", "x + 1"]);
    assert_eq!(run.output.lines(), vec!["=> nil", "=> 42"]);
    assert_eq!(run.session.output_history().count(), 4);
}

#[test]
fn test_print_shares_the_session_output() {
    let run = run(["print(\"hi\")", "print(\"quiet\");"]);
    assert_eq!(run.output.lines(), vec!["hi", "=> nil", "quiet"]);
}

#[test]
fn test_lone_comment_prints_nil() {
    let run = run(["# note"]);
    assert_eq!(run.output.lines(), vec!["=> nil"]);
    assert_eq!(run.session.last_result(), Some(&Value::Nil));
}

#[test]
fn test_suppressed_failures_still_print() {
    let run = run(["missing;"]);
    assert_eq!(run.output.lines()[0], "NameError: undefined local variable `missing'");
}

#[test]
fn test_nested_eval_failure_is_genuine() {
    let run = run(["eval(\"1 +\")", "2"]);
    let lines = run.output.lines();
    assert!(lines[0].starts_with("SyntaxError: "), "{:?}", lines);
    assert!(lines[0].contains("unexpected end-of-input"));
    assert_eq!(lines.last().map(String::as_str), Some("=> 2"));
    assert_eq!(run.prompts[1], "[2] ripl(main)> ", "no continuation prompt after eval");
}

#[test]
fn test_closed_string_with_bad_escape_is_genuine() {
    let run = run(["\"a\\q\"", "1"]);
    let lines = run.output.lines();
    assert!(lines[0].starts_with("SyntaxError: "), "{:?}", lines);
    assert!(lines[0].contains("invalid escape '\\q'"), "{:?}", lines);
    assert_eq!(lines.last().map(String::as_str), Some("=> 1"));
    assert_eq!(run.prompts[1], "[2] ripl(main)> ");
    assert_eq!(run.session.input_history().get(1), Some(&Some("\"a\\q\"\n".to_string())));
}

#[test]
fn test_session_variables_are_visible() {
    let run = run(["10", "_ * 2", "len(_in_[1])", "_out_[-1]", "_session_[\"nesting\"]", "_out_[2]"]);
    assert_eq!(run.output.lines(), vec!["=> 10", "=> 20", "=> 3", "=> 3", "=> 0", "=> 20"]);
}

#[test]
fn test_blank_units_reset_last_result() {
    let run = run(["7", "", "_"]);
    assert_eq!(run.output.lines(), vec!["=> 7", "=> nil"]);
    assert_eq!(run.session.input_history().get(2), Some(&Some(String::new())));

    let run = common::run(["7", ""]);
    assert_eq!(run.session.last_result(), Some(&Value::Nil));
    assert_eq!(run.session.output_history().get(-1), Some(&Output::Value(Value::Nil)));
}

#[test]
fn test_interrupt_discards_pending_lines() {
    let run = run_input(ScriptedInput::new(["1 +"]).interrupt().then(["7"]));
    assert_eq!(run.output.lines(), vec!["=> 7"]);
    assert_eq!(run.prompts[1], "[1] ripl(main)* ");
    assert_eq!(run.prompts[2], "[2] ripl(main)> ");
    assert_eq!(run.session.input_history().get(1), Some(&Some(String::new())));
}

#[test]
fn test_end_of_input_abandons_partial_unit() {
    let run = run(["1 +"]);
    assert!(run.output.lines().is_empty());
    assert_eq!(run.session.input_history().count(), 2);
    assert!(matches!(run.exit, SessionExit::Target(_)));
}

#[test]
fn test_custom_end_of_input_handler() {
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let (builder, _output) = builder(ScriptedInput::new(["1"]));
    let mut session = builder
        .end_of_input(move |_pending: &mut String, _info: &SessionInfo| {
            seen.set(seen.get() + 1);
            if seen.get() < 3 {
                EndOfInput::Continue
            } else {
                EndOfInput::Break
            }
        })
        .build();
    session.start(Scope::main()).unwrap();
    assert_eq!(calls.get(), 3);
    // "1" plus two empty units from the handler continuing
    assert_eq!(session.input_history().count(), 4);
}

#[test]
fn test_void_command_leaves_pending_buffer() {
    let run = run(["x = [1,", "show-input", "2]"]);
    assert_eq!(run.output.lines(), vec!["1: x = [1,", "=> [1, 2]"]);
    assert_eq!(
        run.session.input_history().get(1),
        Some(&Some("x = [1,\n2]\n".to_string()))
    );
}

#[test]
fn test_value_command_becomes_the_result() {
    let mut commands = CommandSet::<Calc>::with_defaults();
    commands.command("answer", "The answer", |_, _| Ok(CommandResult::Value(Value::Number(42.0))));
    let (builder, output) = builder(ScriptedInput::new(["answer", "_ + 1"]));
    let mut session = builder.commands(commands).build();
    let exit = session.start(Scope::main()).unwrap();

    assert_eq!(output.lines(), vec!["=> 42", "=> 43"]);
    let SessionExit::Target(scope) = exit else {
        panic!("expected the target back");
    };
    assert!(scope.get("_command_result_").is_none());
}

#[test]
fn test_command_errors_are_reported() {
    let run = run(["hist -x", "1"]);
    assert_eq!(run.output.lines(), vec!["Error: hist: unknown option `-x'", "=> 1"]);
}

#[test]
fn test_cd_changes_prompt_and_receiver() {
    let run = run(["cd [1, 2]", "len(self)", "cd ..", "nesting"]);
    assert_eq!(
        run.output.lines(),
        vec!["=> 2", "Nesting status:", "--", "0. main (top level)"]
    );
    assert_eq!(
        run.prompts,
        vec![
            "[1] ripl(main)> ",
            "[2] ripl([1, 2]):1> ",
            "[3] ripl([1, 2]):1> ",
            "[4] ripl(main)> ",
            "[5] ripl(main)> ",
        ]
    );
}

#[test]
fn test_exit_leaves_nested_context_first() {
    let run = run(["cd 5", "exit", "self"]);
    assert_eq!(run.output.lines(), vec!["=> \"main\""]);
    assert!(matches!(run.exit, SessionExit::Target(_)));
}

#[test]
fn test_exit_with_value() {
    let run = run(["exit 6 * 7", "never"]);
    match run.exit {
        SessionExit::Value(v) => assert_eq!(v, Value::Number(42.0)),
        SessionExit::Target(_) => panic!("expected a break value"),
    }
    assert_eq!(run.prompts.len(), 1);
    assert!(run.session.contexts().is_empty());
}

#[test]
fn test_exit_all_from_nested_context() {
    let run = run(["cd 5", "cd 6", "exit-all self * 2"]);
    match run.exit {
        SessionExit::Value(v) => assert_eq!(v, Value::Number(12.0)),
        SessionExit::Target(_) => panic!("expected a break value"),
    }
    assert!(run.session.contexts().is_empty());
}

#[test]
fn test_hooks_see_active_sessions() {
    let before = Rc::new(Cell::new(usize::MAX));
    let after = Rc::new(Cell::new(usize::MAX));
    let (b, a) = (Rc::clone(&before), Rc::clone(&after));
    let hooks = Hooks::new()
        .before_session(move |out: &mut dyn Write, _scope: &Scope, info: &SessionInfo| {
            let _ = writeln!(out, "hello");
            b.set(info.active_sessions);
        })
        .after_session(move |out: &mut dyn Write, _scope: &Scope, info: &SessionInfo| {
            let _ = writeln!(out, "bye");
            a.set(info.active_sessions);
        });
    let (builder, output) = builder(ScriptedInput::new(["1"]));
    let mut session = builder.hooks(hooks).build();
    session.start(Scope::main()).unwrap();

    assert_eq!(output.lines(), vec!["hello", "=> 1", "bye"]);
    assert_eq!(before.get(), 0);
    assert_eq!(after.get(), 1);
    assert_eq!(session.registry().active_sessions(), 0);
}

#[test]
fn test_nested_sessions_share_the_registry() {
    let registry = Rc::new(SessionRegistry::new());
    let outer_active = Rc::new(Cell::new(0));
    let inner_active = Rc::new(Cell::new(0));

    let hooks = {
        let registry = Rc::clone(&registry);
        let outer_active = Rc::clone(&outer_active);
        let inner_active = Rc::clone(&inner_active);
        Hooks::new().after_session(move |_out: &mut dyn Write, _scope: &Scope, info: &SessionInfo| {
            outer_active.set(info.active_sessions);
            let seen = Rc::clone(&inner_active);
            let mut inner = Session::builder(Calc::new())
                .registry(Rc::clone(&registry))
                .input(ScriptedInput::new(["raise(\"inner\")"]))
                .output(io::sink())
                .hooks(Hooks::new().after_session(
                    move |_out: &mut dyn Write, _scope: &Scope, info: &SessionInfo| {
                        seen.set(info.active_sessions)
                    },
                ))
                .build();
            inner.start(Scope::main()).unwrap();
            assert_eq!(inner.last_exception().and_then(|f| f.line), Some(2));
        })
    };

    let (builder, _output) = builder(ScriptedInput::new(["1"]));
    let mut outer = builder.registry(Rc::clone(&registry)).hooks(hooks).build();
    outer.start(Scope::main()).unwrap();

    assert_eq!(outer_active.get(), 1);
    assert_eq!(inner_active.get(), 2);
    assert_eq!(registry.active_sessions(), 0);
    assert_eq!(registry.current_line(), 3);
}

#[test]
fn test_history_is_trimmed_to_memory_size() {
    let (builder, _output) = builder(ScriptedInput::new(["1", "2", "3", "4", "_in_[0]"]));
    let mut session = builder.memory_size(3).build();
    session.start(Scope::main()).unwrap();

    let inputs = session.input_history();
    assert_eq!(inputs.len(), 3);
    assert_eq!(inputs.count(), 6);
    assert_eq!(inputs.first_index(), 3);
    assert_eq!(session.last_result(), Some(&Value::Nil));

    session.set_memory_size(5);
    assert_eq!(session.memory_size(), 5);
    assert!(session.input_history().is_empty());
    assert!(session.output_history().is_empty());
}

#[test]
fn test_refresh_applies_config() {
    let mut session = Session::builder(Calc::new())
        .input(ScriptedInput::default())
        .output(io::sink())
        .build();
    let config = ReplConfig {
        memory_size: 7,
        prompt: PromptStyle::Simple,
        ..ReplConfig::default()
    };
    session.refresh(&config);
    assert_eq!(session.memory_size(), 7);
    assert_eq!(session.select_prompt(true), ">> ");
    assert_eq!(session.select_prompt(false), " | ");
}

#[test]
fn test_prompt_stack_overrides() {
    let run = run(["1"]);
    let mut session = run.session;
    session.push_prompt(Prompt::new(|cx| format!("{}> ", cx.depth), |_| ".. ".to_string()));
    assert_eq!(session.select_prompt(true), "0> ");
    session.pop_prompt();
    session.pop_prompt();
    assert_eq!(session.select_prompt(true), "[2] ripl()> ");
}

#[test]
fn test_custom_print_and_display_errors() {
    let (builder, output) = builder(ScriptedInput::new(["1 + 2", "\"bad\""]));
    let mut session = builder
        .print(|out: &mut dyn Write, value: &Value| {
            if matches!(value, Value::Str(_)) {
                return Err(ReplError::Display("can't show strings".into()));
            }
            writeln!(out, "-> {}", value)?;
            Ok(())
        })
        .build();
    session.start(Scope::main()).unwrap();
    assert_eq!(
        output.lines(),
        vec!["-> 3", "output error: Display error: can't show strings"]
    );
}

/// Sink whose next `failures` writes fail
#[derive(Clone, Default)]
struct FlakyOutput {
    text: Rc<RefCell<String>>,
    failures: Rc<Cell<usize>>,
}

impl Write for FlakyOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.text.borrow_mut().push_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_display_fallback_when_error_report_fails() {
    let output = FlakyOutput::default();
    let (on_value, on_exception) = (Rc::clone(&output.failures), Rc::clone(&output.failures));
    let mut session = Session::builder(Calc::new())
        .input(ScriptedInput::new(["1", "raise(\"x\")", "\"s\"", "true"]))
        .output(output.clone())
        .print(move |out: &mut dyn Write, value: &Value| match value {
            Value::Number(_) => {
                on_value.set(1);
                Err(ReplError::Display("no numbers".into()))
            }
            Value::Str(_) => {
                on_value.set(2);
                Err(ReplError::Display("no strings".into()))
            }
            other => {
                writeln!(out, "=> {}", other)?;
                Ok(())
            }
        })
        .exception_handler(move |_out: &mut dyn Write, _failure: &Failure| {
            on_exception.set(1);
            Err(ReplError::Display("no exceptions".into()))
        })
        .build();

    assert!(session.start(Scope::main()).is_ok());
    let text = output.text.borrow().clone();
    let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(
        lines,
        vec![
            "output error: failed to show result",
            "output error: failed to show exception",
            "=> true",
        ]
    );
    assert_eq!(session.input_history().count(), 5);
    assert_eq!(session.last_result(), Some(&Value::Bool(true)));
}

#[test]
fn test_restart_clears_exception_flag_before_hook() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let hooks = Hooks::new().before_session(move |_out: &mut dyn Write, _scope: &Scope, info: &SessionInfo| {
        log.borrow_mut().push(info.last_result_is_exception);
    });
    let (builder, _output) = builder(ScriptedInput::new(["raise(\"first run\")"]));
    let mut session = builder.hooks(hooks).build();

    session.start(Scope::main()).unwrap();
    assert!(session.last_result_is_exception());
    session.start(Scope::main()).unwrap();

    assert_eq!(*seen.borrow(), vec![false, false]);
    assert!(!session.last_result_is_exception());
}

#[test]
fn test_completions_are_refreshed_each_cycle() {
    let input = ScriptedInput::new(["answer = 42"]);
    let completions = input.completion_log();
    let (builder, _output) = builder(input);
    let mut session = builder
        .custom_completions(|_scope: &Scope| vec!["cd".to_string()])
        .build();
    session.start(Scope::main()).unwrap();

    let candidates = completions.borrow();
    for expected in ["answer", "cd", "len", "_in_"] {
        assert!(candidates.iter().any(|c| c == expected), "missing {}", expected);
    }
}

#[test]
fn test_typed_lines_are_saved_when_session_ends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history");
    fs::write(&path, "old line\n").unwrap();
    let registry = Rc::new(SessionRegistry::new().with_history_store(ripl::HistoryStore::new(&path)));

    let (builder, _output) = builder(ScriptedInput::new(["1 + 1", "", "x = 2"]));
    let mut session = builder.registry(registry).build();
    assert_eq!(session.load_history().unwrap(), 1);
    session.start(Scope::main()).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "old line\n1 + 1\nx = 2\n");
}

#[test]
fn test_run_one_cycle_needs_a_context() {
    let mut session = Session::builder(Calc::new())
        .input(ScriptedInput::new(["1"]))
        .output(io::sink())
        .build();
    assert!(matches!(session.run_one_cycle(), Err(ReplError::EmptyContextStack)));
}

#[test]
fn test_no_commands_treats_every_line_as_source() {
    let output = common::SharedOutput::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let mut session = Session::builder(Calc::new())
        .input(ScriptedInput::new(["exit = 3", "exit + 1"]))
        .output(output.clone())
        .commands(ripl::NoCommands)
        .print(move |out: &mut dyn Write, value: &Value| {
            log.borrow_mut().push(value.clone());
            writeln!(out, "=> {}", value)?;
            Ok(())
        })
        .build();
    session.start(Scope::main()).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Number(3.0), Value::Number(4.0)]);
}
