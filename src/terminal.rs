use ripl::calc::{Calc, Scope};
use ripl::{Prompt, ReaderInput, ReplConfig, Session, SessionRegistry};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::process::ExitCode;
use std::rc::Rc;

/// Evaluate lines from `reader` without prompts. Fails when the last unit
/// raised.
pub(crate) fn run_lines<R: BufRead + 'static>(reader: R, eval_path: &str, config: &ReplConfig) -> ExitCode {
    let registry = Rc::new(SessionRegistry::new().with_eval_path(eval_path));
    let mut session = Session::builder(Calc::new())
        .config(config)
        .prompt(Prompt::none())
        .registry(registry)
        .input(ReaderInput::new(reader))
        .output(io::stdout())
        .build();

    match session.start(Scope::main()) {
        Ok(_) if session.last_result_is_exception() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `ripl -c <code>`
pub(crate) fn run_command(code: &str, config: &ReplConfig) -> ExitCode {
    run_lines(Cursor::new(code.to_string()), &config.eval_path, config)
}

/// `ripl <script>`; backtraces name the script
pub(crate) fn run_script(path: &str, config: &ReplConfig) -> ExitCode {
    match File::open(path) {
        Ok(file) => run_lines(BufReader::new(file), path, config),
        Err(e) => {
            eprintln!("Error reading {}: {}", path, e);
            ExitCode::FAILURE
        }
    }
}

/// Piped stdin
pub(crate) fn run_stdin(config: &ReplConfig) -> ExitCode {
    run_lines(BufReader::new(io::stdin()), &config.eval_path, config)
}
