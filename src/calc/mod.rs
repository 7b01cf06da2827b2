//! calc: a small expression language for driving sessions
//!
//! ```text
//! x = [1, 2, 3]
//! if len(x) > 2 then
//!   x[-1] * 10
//! else
//!   nil
//! end
//! ```
//!
//! Numbers, strings, lists, `and`/`or`/`not`, `if`/`while` blocks and the
//! builtins `len`, `str`, `type`, `print`, `raise` and `eval`. Input that
//! ends early fails with the messages the session's incomplete-input
//! classifier looks for, so multi-line constructs can be typed line by line.

pub mod ast;
mod eval;
pub mod lexer;
pub mod parser;
mod value;

pub use eval::{Calc, Scope, BUILTINS};
pub use value::{History, Value};
