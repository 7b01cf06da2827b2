//! ripl - an interactive read-eval-print loop
//!
//! Usage:
//!   ripl              Start interactive session
//!   ripl -c "code"    Evaluate code and print the results
//!   ripl script.calc  Evaluate a script line by line

mod cli;
mod rcfile;
mod repl;
mod terminal;

use std::env;
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{parse_args, print_help, print_version};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let cli = parse_args(&args);

    if cli.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    if cli.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    // RUST_LOG=ripl=debug shows session events on stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = rcfile::load_config(&cli);

    if let Some(code) = &cli.command {
        return terminal::run_command(code, &config);
    }

    if let Some(script) = &cli.script {
        return terminal::run_script(script, &config);
    }

    if !io::stdin().is_terminal() {
        return terminal::run_stdin(&config);
    }

    repl::run_repl(&config)
}
