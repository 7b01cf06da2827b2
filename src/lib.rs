//! ripl - a read-eval-print loop engine
//!
//! # Overview
//!
//! ripl drives an evaluator one unit of input at a time. It reads lines
//! until the evaluator stops complaining that the input ended early, offers
//! each line to a command dispatcher first, evaluates the result against
//! the current context, records it, and prints it.
//!
//! # Core Concepts
//!
//! ## Units and incomplete input
//!
//! ```text
//! [1] ripl(main)> total = 1 +
//! [1] ripl(main)* 2
//! => 3
//! ```
//!
//! A failure whose message says the input ended early (`unexpected
//! end-of-input`, `missing 'end' for if`...) means "keep reading", unless it
//! came from code the unit itself evaluated (`eval("1 +")`).
//!
//! ## Contexts
//!
//! ```text
//! [2] ripl(main)> cd [1, 2, 3]
//! [3] ripl([1, 2, 3]):1> len(self)
//! => 3
//! [4] ripl([1, 2, 3]):1> cd ..
//! ```
//!
//! ## Session variables
//!
//! ```text
//! _      last result           _in_    input history
//! _ex_   last exception        _out_   output history
//! _file_ / _dir_               _session_
//! ```
//!
//! # Example
//!
//! ```rust
//! use ripl::calc::{Calc, Scope};
//! use ripl::{ScriptedInput, Session};
//!
//! let mut session = Session::builder(Calc::new())
//!     .input(ScriptedInput::new(["x = 20 +", "22"]))
//!     .output(std::io::sink())
//!     .build();
//! session.start(Scope::main()).unwrap();
//! assert_eq!(session.last_result().map(|v| v.to_string()), Some("42".into()));
//! ```

pub mod calc;
pub mod classify;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod failure;
pub mod history;
pub mod input;
pub mod prompt;
pub mod registry;
pub mod session;
pub mod special;

// Re-export commonly used items
pub use classify::{Classification, FailureClassifier, PatternClassifier};
pub use command::{CommandContext, CommandDispatcher, CommandResult, CommandSet, NoCommands};
pub use config::{HistoryConfig, PromptStyle, ReplConfig};
pub use context::ContextStack;
pub use error::ReplError;
pub use evaluator::{Evaluator, SessionValue};
pub use failure::{Failure, FailureKind};
pub use history::{HistoryBuffer, Output};
pub use input::{LineSource, ReadLine, ReaderInput, ScriptedInput};
pub use prompt::{Prompt, PromptContext, PromptStack};
pub use registry::{ActiveSession, HistoryStore, SessionRegistry, DEFAULT_EVAL_PATH};
pub use session::{
    CycleOutcome, EndOfInput, Hooks, Session, SessionBuilder, SessionExit, SessionInfo,
};
