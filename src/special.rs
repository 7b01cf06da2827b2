//! Special session variables
//!
//! - `_in_`      - input history
//! - `_out_`     - output history
//! - `_session_` - snapshot of the session
//! - `_ex_`      - last exception (nil if none)
//! - `_file_`    - last file touched by a command (nil if none)
//! - `_dir_`     - directory of `_file_` (nil if none)
//! - `_`         - last result (nil if none)
//!
//! They are rebound before every cycle because the current context may have
//! changed since the previous one (`cd`).

use crate::evaluator::{Evaluator, SessionValue};
use crate::failure::Failure;
use crate::history::{HistoryBuffer, Output};
use crate::session::SessionInfo;
use std::path::Path;
use tracing::trace;

pub const INPUT_HISTORY: &str = "_in_";
pub const OUTPUT_HISTORY: &str = "_out_";
pub const SESSION: &str = "_session_";
pub const LAST_EXCEPTION: &str = "_ex_";
pub const LAST_FILE: &str = "_file_";
pub const LAST_DIR: &str = "_dir_";
pub const LAST_RESULT: &str = "_";

/// Transient slot a non-void command's value is passed through
pub const COMMAND_RESULT: &str = "_command_result_";

/// Session state the injector reads from
pub struct SessionState<'a, V> {
    pub inputs: &'a HistoryBuffer<Option<String>>,
    pub outputs: &'a HistoryBuffer<Output<V>>,
    pub info: &'a SessionInfo,
    pub last_exception: Option<&'a Failure>,
    pub last_file: Option<&'a str>,
    pub last_result: Option<&'a V>,
}

/// Bind every special variable with its neutral default
pub fn initialize<E: Evaluator>(
    evaluator: &mut E,
    context: &mut E::Context,
    inputs: &HistoryBuffer<Option<String>>,
    outputs: &HistoryBuffer<Output<E::Value>>,
    info: &SessionInfo,
) -> Result<(), Failure> {
    inject(
        evaluator,
        context,
        &SessionState {
            inputs,
            outputs,
            info,
            last_exception: None,
            last_file: None,
            last_result: None,
        },
    )
}

/// Bind every special variable from the current session state
pub fn inject<E: Evaluator>(
    evaluator: &mut E,
    context: &mut E::Context,
    state: &SessionState<'_, E::Value>,
) -> Result<(), Failure> {
    trace!("binding special variables");
    evaluator.bind(INPUT_HISTORY, SessionValue::Inputs(state.inputs), context)?;
    evaluator.bind(OUTPUT_HISTORY, SessionValue::Outputs(state.outputs), context)?;
    evaluator.bind(SESSION, SessionValue::Session(state.info), context)?;

    let exception = state.last_exception.map_or(SessionValue::Nil, SessionValue::Exception);
    evaluator.bind(LAST_EXCEPTION, exception, context)?;

    let file = state.last_file.map_or(SessionValue::Nil, SessionValue::Text);
    evaluator.bind(LAST_FILE, file, context)?;

    let dir = state
        .last_file
        .and_then(|f| Path::new(f).parent())
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .and_then(|p| p.to_str())
        .map_or(SessionValue::Nil, SessionValue::Text);
    evaluator.bind(LAST_DIR, dir, context)?;

    let result = state.last_result.map_or(SessionValue::Nil, SessionValue::Value);
    evaluator.bind(LAST_RESULT, result, context)?;
    Ok(())
}
