const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parsed command-line arguments
pub(crate) struct CliArgs {
    pub(crate) command: Option<String>,
    pub(crate) script: Option<String>,
    pub(crate) simple_prompt: bool,
    pub(crate) no_history: bool,
    pub(crate) help: bool,
    pub(crate) version: bool,
}

/// Parse command-line arguments
pub(crate) fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs {
        command: None,
        script: None,
        simple_prompt: false,
        no_history: false,
        help: false,
        version: false,
    };

    let mut i = 1; // Skip program name
    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                // Everything after -c is the code
                if i + 1 < args.len() {
                    cli.command = Some(args[i + 1..].join(" "));
                    break;
                }
            }
            "--simple-prompt" => {
                cli.simple_prompt = true;
            }
            "--no-history" => {
                cli.no_history = true;
            }
            "--help" | "-h" => {
                cli.help = true;
            }
            "--version" | "-V" => {
                cli.version = true;
            }
            path => {
                if !path.starts_with('-') {
                    cli.script = Some(path.to_string());
                }
            }
        }
        i += 1;
    }

    cli
}

pub(crate) fn print_help() {
    println!(
        r#"ripl {} - an interactive read-eval-print loop

USAGE:
    ripl                    Start interactive session
    ripl -c <code>          Evaluate code and print the results
    ripl <script>           Evaluate a script line by line
    ripl --simple-prompt    Use the ">> " prompt
    ripl --no-history       Don't load or save ~/.ripl_history
    ripl --help             Show this help message
    ripl --version          Show version

CONFIGURATION:
    ~/.riplrc.toml          Loaded on startup (or $RIPL_CONFIG)
    RUST_LOG=ripl=debug     Log session events to stderr

COMMANDS:
    exit [expr]             Leave the current context / end the session
    exit-all [expr]         End the session from any depth
    cd <expr> | .. | /      Enter, leave or reset nested contexts
    nesting                 Show the context stack
    show-input              Show the expression typed so far
    !                       Clear the expression typed so far
    hist [-n N]             Show input history
    help                    List commands

SESSION VARIABLES:
    _                       Last result
    _ex_                    Last exception
    _in_ / _out_            Input and output history (_in_[3], _out_[-1])
    _session_               Session counters
    _file_ / _dir_          Last file touched by a command

LANGUAGE:
    x = 1 + 2 * 3           Assignment, arithmetic
    [1, 2, 3][-1]           Lists, indexing from the end
    if x > 2 then "big" else "small" end
    while x > 0 do x = x - 1 end
    len str type print raise eval
"#,
        VERSION
    );
}

pub(crate) fn print_version() {
    println!("ripl {}", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("ripl").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn command_takes_the_rest_of_the_line() {
        let cli = parse_args(&args(&["--no-history", "-c", "1", "+", "2"]));
        assert_eq!(cli.command.as_deref(), Some("1 + 2"));
        assert!(cli.no_history);
        assert!(cli.script.is_none());
    }

    #[test]
    fn script_and_flags() {
        let cli = parse_args(&args(&["--simple-prompt", "demo.calc"]));
        assert_eq!(cli.script.as_deref(), Some("demo.calc"));
        assert!(cli.simple_prompt);
        assert!(!cli.help && !cli.version);
    }
}
