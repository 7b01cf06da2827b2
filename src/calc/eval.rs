//! Tree-walking evaluator for calc
//!
//! `Calc` keeps a frame per running `evaluate` call so failures carry a
//! backtrace (`path:line:in `<main>'`, innermost first) and nested `eval`
//! calls can be told apart from top-level input.

use super::ast::{BinaryOp, Expr, Stmt, StmtKind, UnaryOp};
use super::lexer::KEYWORDS;
use super::parser::parse;
use super::value::{History, Value};
use crate::evaluator::{Evaluator, SessionValue};
use crate::failure::{Failure, FailureKind};
use crate::history::Output;
use crate::session::SessionInfo;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};

pub const BUILTINS: &[&str] = &["eval", "len", "print", "raise", "str", "type"];

/// Deepest nesting of `eval` calls before giving up
const MAX_DEPTH: usize = 64;

/// Variables plus the value they are evaluated against (`self`)
#[derive(Debug, Clone, Default)]
pub struct Scope {
    receiver: Option<Value>,
    vars: HashMap<String, Value>,
}

impl Scope {
    /// The top-level scope
    pub fn main() -> Self {
        Self::default()
    }

    /// A scope on `receiver` that starts with a copy of `parent`'s variables
    pub fn nested(receiver: Value, parent: &Scope) -> Self {
        Scope {
            receiver: Some(receiver),
            vars: parent.vars.clone(),
        }
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct Frame {
    path: String,
    /// Line the evaluated source starts at
    base: usize,
    line: usize,
    label: &'static str,
}

impl Frame {
    fn render(&self) -> String {
        format!("{}:{}:in `{}'", self.path, self.line, self.label)
    }
}

pub struct Calc {
    frames: Vec<Frame>,
    /// Where `print` writes
    out: Box<dyn Write>,
}

impl fmt::Debug for Calc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calc").field("frames", &self.frames).finish_non_exhaustive()
    }
}

impl Default for Calc {
    fn default() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Calc {
    pub fn new() -> Self {
        Self::default()
    }

    /// A calc whose `print` writes to `out`; hand it the session's sink to
    /// keep printed text in order with results
    pub fn with_output(out: impl Write + 'static) -> Self {
        Calc {
            frames: Vec::new(),
            out: Box::new(out),
        }
    }

    fn fail(&self, kind: FailureKind, message: impl Into<String>) -> Failure {
        Failure::new(kind, message).with_backtrace(self.backtrace())
    }

    fn type_error(&self, message: impl Into<String>) -> Failure {
        self.fail(FailureKind::Type, message)
    }

    fn current_path(&self) -> String {
        self.frames.last().map_or_else(|| "(eval)".to_string(), |f| f.path.clone())
    }

    fn run_block(&mut self, statements: &[Stmt], scope: &mut Scope) -> Result<Value, Failure> {
        let mut last = Value::Nil;
        for stmt in statements {
            last = self.exec(stmt, scope)?;
        }
        Ok(last)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &mut Scope) -> Result<Value, Failure> {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = frame.base + stmt.line - 1;
        }
        match &stmt.kind {
            StmtKind::Assign(name, expr) => {
                let value = self.eval_expr(expr, scope)?;
                scope.set(name.clone(), value.clone());
                Ok(value)
            }
            StmtKind::Expr(expr) => self.eval_expr(expr, scope),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Value, Failure> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Var(name) => self.lookup(name, scope),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_expr(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval_expr(operand, scope)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Neg, other) => {
                        Err(self.type_error(format!("bad operand for unary -: {}", other.type_name())))
                    }
                }
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval_expr(left, scope)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval_expr(right, scope)
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval_expr(left, scope)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval_expr(right, scope)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                self.binary(*op, left, right)
            }
            Expr::Index(target, index) => {
                let target = self.eval_expr(target, scope)?;
                let index = self.eval_expr(index, scope)?;
                self.index(target, index)
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_expr(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, values, scope)
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(cond, scope)?.is_truthy() {
                    self.run_block(then_branch, scope)
                } else if let Some(else_branch) = else_branch {
                    self.run_block(else_branch, scope)
                } else {
                    Ok(Value::Nil)
                }
            }
            Expr::While { cond, body } => {
                while self.eval_expr(cond, scope)?.is_truthy() {
                    self.run_block(body, scope)?;
                }
                Ok(Value::Nil)
            }
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Result<Value, Failure> {
        if name == "self" {
            return Ok(scope.receiver().cloned().unwrap_or_else(|| Value::from("main")));
        }
        scope
            .get(name)
            .cloned()
            .ok_or_else(|| self.fail(FailureKind::Name, format!("undefined local variable `{}'", name)))
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value, Failure> {
        use Value::{List, Number, Str};
        match (op, left, right) {
            (BinaryOp::Eq, l, r) => Ok(Value::Bool(l == r)),
            (BinaryOp::NotEq, l, r) => Ok(Value::Bool(l != r)),
            (BinaryOp::Add, Number(a), Number(b)) => Ok(Number(a + b)),
            (BinaryOp::Add, Str(a), Str(b)) => Ok(Str(a + &b)),
            (BinaryOp::Add, List(mut a), List(b)) => {
                a.extend(b);
                Ok(List(a))
            }
            (BinaryOp::Sub, Number(a), Number(b)) => Ok(Number(a - b)),
            (BinaryOp::Mul, Number(a), Number(b)) => Ok(Number(a * b)),
            (BinaryOp::Div | BinaryOp::Rem, Number(_), Number(b)) if b == 0.0 => {
                Err(self.fail(FailureKind::ZeroDivision, "divided by 0"))
            }
            (BinaryOp::Div, Number(a), Number(b)) => Ok(Number(a / b)),
            // floored, so the result takes the sign of the divisor
            (BinaryOp::Rem, Number(a), Number(b)) => Ok(Number(a - b * (a / b).floor())),
            (op @ (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge), l, r) => {
                let ordering = match (&l, &r) {
                    (Number(a), Number(b)) => a.partial_cmp(b),
                    (Str(a), Str(b)) => Some(a.cmp(b)),
                    _ => None,
                };
                let Some(ordering) = ordering else {
                    return Err(self.type_error(format!(
                        "comparison of {} with {} failed",
                        l.type_name(),
                        r.type_name()
                    )));
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            (op, l, r) => Err(self.type_error(format!(
                "unsupported operands for {:?}: {} and {}",
                op,
                l.type_name(),
                r.type_name()
            ))),
        }
    }

    fn integer(&self, n: f64) -> Result<i64, Failure> {
        if n.fract() != 0.0 {
            return Err(self.type_error(format!("index must be an integer, got {}", n)));
        }
        Ok(n as i64)
    }

    fn index(&self, target: Value, index: Value) -> Result<Value, Failure> {
        match (target, index) {
            (Value::List(items), Value::Number(n)) => {
                let i = self.integer(n)?;
                let position = if i < 0 { items.len() as i64 + i } else { i };
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|p| items.get(p).cloned())
                    .unwrap_or_default())
            }
            (Value::Str(s), Value::Number(n)) => {
                let i = self.integer(n)?;
                let count = s.chars().count() as i64;
                let position = if i < 0 { count + i } else { i };
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|p| s.chars().nth(p))
                    .map_or(Value::Nil, |c| Value::Str(c.to_string())))
            }
            (Value::History(history), Value::Number(n)) => {
                let i = self.integer(n)?;
                Ok(history.get(i).cloned().unwrap_or_default())
            }
            (Value::Record(fields), Value::Str(key)) => Ok(fields.get(&key).cloned().unwrap_or_default()),
            (target, index) => Err(self.type_error(format!(
                "{} can't be indexed by {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>, scope: &mut Scope) -> Result<Value, Failure> {
        match (name, args.as_slice()) {
            ("len", [value]) => match value {
                Value::Str(s) => Ok(Value::from(s.chars().count())),
                Value::List(items) => Ok(Value::from(items.len())),
                Value::Record(fields) => Ok(Value::from(fields.len())),
                Value::History(history) => Ok(Value::from(history.items.len())),
                other => Err(self.type_error(format!("{} has no length", other.type_name()))),
            },
            ("str", [value]) => Ok(Value::Str(value.to_text())),
            ("type", [value]) => Ok(Value::from(value.type_name())),
            ("print", values) => {
                let text = values.iter().map(Value::to_text).collect::<Vec<_>>().join(" ");
                writeln!(self.out, "{}", text).map_err(|e| self.fail(FailureKind::Runtime, e.to_string()))?;
                Ok(Value::Nil)
            }
            ("raise", []) => Err(self.fail(FailureKind::Runtime, "unhandled exception")),
            ("raise", [message]) => Err(self.fail(FailureKind::Runtime, message.to_text())),
            ("eval", [Value::Str(source)]) => {
                let path = self.current_path();
                self.evaluate(source, scope, &path, 1)
            }
            ("eval", [other]) => Err(self.type_error(format!(
                "no implicit conversion of {} into string",
                other.type_name()
            ))),
            (name, args) if BUILTINS.contains(&name) => Err(self.fail(
                FailureKind::Other("ArgumentError".to_string()),
                format!("wrong number of arguments for `{}' (given {})", name, args.len()),
            )),
            (name, _) => Err(self.fail(FailureKind::Name, format!("undefined method `{}'", name))),
        }
    }
}

fn failure_value(failure: &Failure) -> Value {
    Value::record([
        ("kind", Value::Str(failure.kind.to_string())),
        ("message", Value::Str(failure.message.clone())),
        ("file", failure.file.as_deref().map_or(Value::Nil, Value::from)),
        ("line", failure.line.map_or(Value::Nil, Value::from)),
        (
            "backtrace",
            Value::List(failure.backtrace.iter().map(|f| Value::from(f.as_str())).collect()),
        ),
    ])
}

fn session_value(info: &SessionInfo) -> Value {
    Value::record([
        ("input_count", Value::from(info.input_count)),
        ("output_count", Value::from(info.output_count)),
        ("nesting", Value::from(info.nesting)),
        ("active_sessions", Value::from(info.active_sessions)),
        ("memory_size", Value::from(info.memory_size)),
        ("last_result_is_exception", Value::from(info.last_result_is_exception)),
        ("current_line", Value::from(info.current_line)),
    ])
}

fn to_value(value: SessionValue<'_, Value>) -> Value {
    match value {
        SessionValue::Nil => Value::Nil,
        SessionValue::Value(v) => v.clone(),
        SessionValue::Exception(failure) => failure_value(failure),
        SessionValue::Text(text) => Value::from(text),
        SessionValue::Inputs(inputs) => Value::History(History {
            offset: inputs.first_index(),
            items: inputs
                .iter()
                .map(|entry| entry.as_deref().map_or(Value::Nil, Value::from))
                .collect(),
        }),
        SessionValue::Outputs(outputs) => Value::History(History {
            offset: outputs.first_index(),
            items: outputs
                .iter()
                .map(|entry| match entry {
                    Output::Nil => Value::Nil,
                    Output::Value(v) => v.clone(),
                    Output::Exception(failure) => failure_value(failure),
                })
                .collect(),
        }),
        SessionValue::Session(info) => session_value(info),
    }
}

impl Evaluator for Calc {
    type Context = Scope;
    type Value = Value;

    fn evaluate(&mut self, source: &str, context: &mut Scope, path: &str, line: usize) -> Result<Value, Failure> {
        let program = parse(source).map_err(|e| {
            Failure::syntax(format!("{}:{}: {}", path, line + e.line().saturating_sub(1), e))
                .with_backtrace(self.backtrace())
        })?;
        if self.frames.len() >= MAX_DEPTH {
            return Err(self.fail(FailureKind::Runtime, "stack level too deep"));
        }
        let label = if self.frames.is_empty() { "<main>" } else { "eval" };
        self.frames.push(Frame {
            path: path.to_string(),
            base: line,
            line,
            label,
        });
        let result = self.run_block(&program.statements, context);
        self.frames.pop();
        result
    }

    fn bind(&mut self, name: &str, value: SessionValue<'_, Value>, context: &mut Scope) -> Result<(), Failure> {
        context.set(name, to_value(value));
        Ok(())
    }

    fn unbind(&mut self, name: &str, context: &mut Scope) {
        context.vars.remove(name);
    }

    fn backtrace(&self) -> Vec<String> {
        self.frames.iter().rev().map(Frame::render).collect()
    }

    fn describe(&self, context: &Scope) -> String {
        context.receiver().map_or_else(|| "main".to_string(), Value::to_string)
    }

    fn enter(&mut self, source: &str, context: &mut Scope, path: &str, line: usize) -> Result<Scope, Failure> {
        let receiver = self.evaluate(source, context, path, line)?;
        Ok(Scope::nested(receiver, context))
    }

    fn completions(&self, context: &Scope) -> Vec<String> {
        KEYWORDS
            .iter()
            .chain(BUILTINS)
            .copied()
            .chain(std::iter::once("self"))
            .chain(context.names())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryBuffer;

    fn run(source: &str) -> Result<Value, Failure> {
        Calc::new().evaluate(source, &mut Scope::main(), "(ripl)", 1)
    }

    #[test]
    fn arithmetic_and_variables() {
        let mut calc = Calc::new();
        let mut scope = Scope::main();
        calc.evaluate("x = 6\ny = 7", &mut scope, "(ripl)", 1).unwrap();
        assert_eq!(calc.evaluate("x * y", &mut scope, "(ripl)", 3).unwrap(), Value::Number(42.0));
        assert_eq!(run("7 % 3").unwrap(), Value::Number(1.0));
        assert_eq!(run("-7 % 3").unwrap(), Value::Number(2.0));
        assert_eq!(run("\"a\" + \"b\"").unwrap(), Value::from("ab"));
    }

    #[test]
    fn control_flow() {
        assert_eq!(
            run("i = 0; total = 0\nwhile i < 5 do\n  total = total + i\n  i = i + 1\nend\ntotal").unwrap(),
            Value::Number(10.0)
        );
        assert_eq!(run("if nil then 1 else 2 end").unwrap(), Value::Number(2.0));
        assert_eq!(run("if false then 1 end").unwrap(), Value::Nil);
        assert_eq!(run("nil or 3").unwrap(), Value::Number(3.0));
        assert_eq!(run("not 0").unwrap(), Value::Bool(false));
    }

    #[test]
    fn indexing() {
        assert_eq!(run("[1, 2, 3][-1]").unwrap(), Value::Number(3.0));
        assert_eq!(run("[1, 2, 3][9]").unwrap(), Value::Nil);
        assert_eq!(run("\"abc\"[1]").unwrap(), Value::from("b"));
        assert!(run("[1][0.5]").unwrap_err().kind == FailureKind::Type);
    }

    #[test]
    fn empty_source_is_nil() {
        assert_eq!(run("").unwrap(), Value::Nil);
        assert_eq!(run("\n# only a comment\n").unwrap(), Value::Nil);
    }

    #[test]
    fn syntax_errors_carry_absolute_lines() {
        let mut calc = Calc::new();
        let failure = calc
            .evaluate("x = 1\n(2 + 3\n", &mut Scope::main(), "(ripl)", 10)
            .unwrap_err();
        assert!(failure.is_syntax());
        assert_eq!(failure.message, "(ripl):11: syntax error, unexpected end-of-input, expecting ')'");
        assert!(failure.backtrace.is_empty());
    }

    #[test]
    fn runtime_errors_point_at_the_statement() {
        let mut calc = Calc::new();
        let failure = calc
            .evaluate("x = 1\ny = x / 0\n", &mut Scope::main(), "(ripl)", 4)
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ZeroDivision);
        assert_eq!(failure.backtrace, vec!["(ripl):5:in `<main>'"]);
        assert!(calc.backtrace().is_empty(), "frames leaked");
    }

    #[test]
    fn nested_eval_keeps_outer_frame() {
        let failure = run("eval(\"1 +\")").unwrap_err();
        assert!(failure.is_syntax());
        assert_eq!(failure.message, "(ripl):1: syntax error, unexpected end-of-input");
        assert_eq!(failure.backtrace, vec!["(ripl):1:in `<main>'"]);

        let raised = run("\n\neval(\"raise(\\\"deep\\\")\")").unwrap_err();
        assert_eq!(raised.message, "deep");
        assert_eq!(
            raised.backtrace,
            vec!["(ripl):1:in `eval'", "(ripl):3:in `<main>'"]
        );
    }

    #[test]
    fn unknown_names() {
        assert_eq!(run("nope").unwrap_err().kind, FailureKind::Name);
        assert_eq!(run("nope(1)").unwrap_err().kind, FailureKind::Name);
        assert_eq!(
            run("len(1, 2)").unwrap_err().kind,
            FailureKind::Other("ArgumentError".into())
        );
    }

    #[test]
    fn enter_creates_child_scope() {
        let mut calc = Calc::new();
        let mut scope = Scope::main();
        scope.set("x", Value::Number(1.0));
        let child = calc.enter("[1, 2]", &mut scope, "(ripl)", 1).unwrap();
        assert_eq!(calc.describe(&scope), "main");
        assert_eq!(calc.describe(&child), "[1, 2]");
        let mut child = child;
        assert_eq!(calc.evaluate("len(self) + x", &mut child, "(ripl)", 1).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn bound_histories_index_absolutely() {
        let mut calc = Calc::new();
        let mut scope = Scope::main();
        let mut inputs = HistoryBuffer::new(2);
        inputs.push(None);
        inputs.push(Some("1\n".to_string()));
        inputs.push(Some("2\n".to_string()));
        calc.bind("_in_", SessionValue::Inputs(&inputs), &mut scope).unwrap();
        assert_eq!(calc.evaluate("_in_[2]", &mut scope, "(ripl)", 1).unwrap(), Value::from("2\n"));
        assert_eq!(calc.evaluate("_in_[0]", &mut scope, "(ripl)", 1).unwrap(), Value::Nil);
        assert_eq!(calc.evaluate("len(_in_)", &mut scope, "(ripl)", 1).unwrap(), Value::Number(2.0));

        calc.unbind("_in_", &mut scope);
        assert!(calc.evaluate("_in_", &mut scope, "(ripl)", 1).is_err());
    }

    #[test]
    fn exceptions_bind_as_records() {
        let mut calc = Calc::new();
        let mut scope = Scope::main();
        let mut failure = Failure::runtime("boom").with_backtrace(vec!["(ripl):2:in `<main>'".into()]);
        failure.locate();
        calc.bind("_ex_", SessionValue::Exception(&failure), &mut scope).unwrap();
        assert_eq!(calc.evaluate("_ex_.message", &mut scope, "(ripl)", 1).unwrap(), Value::from("boom"));
        assert_eq!(calc.evaluate("_ex_.line", &mut scope, "(ripl)", 1).unwrap(), Value::Number(2.0));
    }

    #[derive(Clone, Default)]
    struct Captured(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn print_writes_to_its_sink() {
        let captured = Captured::default();
        let mut calc = Calc::with_output(captured.clone());
        let result = calc.evaluate("print(\"hi\", 1 + 1)\nprint()", &mut Scope::main(), "(ripl)", 1);
        assert_eq!(result.unwrap(), Value::Nil);
        assert_eq!(String::from_utf8_lossy(&captured.0.borrow()), "hi 2\n\n");
    }

    #[test]
    fn completions_include_variables() {
        let mut scope = Scope::main();
        scope.set("answer", Value::Nil);
        let names = Calc::new().completions(&scope);
        for expected in ["answer", "while", "len", "self"] {
            assert!(names.iter().any(|n| n == expected), "{}", expected);
        }
    }
}
