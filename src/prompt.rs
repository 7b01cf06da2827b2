//! Prompts and the prompt stack
//!
//! A prompt is a pair of callables: one for the first line of a unit and
//! one for continuation lines. Both receive a [`PromptContext`] describing
//! the receiver, the nesting depth and the session.
//!
//! The stack lets commands or hooks override the prompt temporarily:
//!
//! ```text
//! push_prompt(simple)   # [default, simple] -> ">> "
//! pop_prompt()          # [default]         -> "[3] ripl(main)> "
//! pop_prompt()          # [default]         (never empties)
//! ```

use crate::session::SessionInfo;
use std::fmt;
use std::rc::Rc;

/// Longest receiver description shown verbatim in the default prompt
const MAX_RECEIVER_WIDTH: usize = 60;

/// What a prompt callable gets to look at
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Description of the object the current context evaluates against
    pub receiver: &'a str,
    /// 0 for the session's own context, +1 per nested context
    pub depth: usize,
    pub session: &'a SessionInfo,
}

pub type PromptFn = Rc<dyn Fn(&PromptContext<'_>) -> String>;

/// A (first line, continuation line) prompt pair
#[derive(Clone)]
pub struct Prompt {
    first: PromptFn,
    continuation: PromptFn,
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt").finish_non_exhaustive()
    }
}

impl Prompt {
    pub fn new<F, G>(first: F, continuation: G) -> Self
    where
        F: Fn(&PromptContext<'_>) -> String + 'static,
        G: Fn(&PromptContext<'_>) -> String + 'static,
    {
        Prompt {
            first: Rc::new(first),
            continuation: Rc::new(continuation),
        }
    }

    /// `[3] ripl(main)> ` / `[3] ripl(main)* `, with `:depth` after the
    /// receiver when nested
    pub fn default_prompt() -> Self {
        Prompt::new(|cx| decorated(cx, '>'), |cx| decorated(cx, '*'))
    }

    /// `>> ` / ` | `
    pub fn simple() -> Self {
        Prompt::new(|_| ">> ".to_string(), |_| " | ".to_string())
    }

    /// Empty prompts, for piped input and scripts
    pub fn none() -> Self {
        Prompt::new(|_| String::new(), |_| String::new())
    }

    pub fn first_line(&self, cx: &PromptContext<'_>) -> String {
        (self.first)(cx)
    }

    pub fn continuation_line(&self, cx: &PromptContext<'_>) -> String {
        (self.continuation)(cx)
    }

    /// True when both prompts are the very same callables
    pub fn same_as(&self, other: &Prompt) -> bool {
        Rc::ptr_eq(&self.first, &other.first) && Rc::ptr_eq(&self.continuation, &other.continuation)
    }
}

fn decorated(cx: &PromptContext<'_>, terminator: char) -> String {
    let nest = if cx.depth == 0 {
        String::new()
    } else {
        format!(":{}", cx.depth)
    };
    format!(
        "[{}] ripl({}){}{} ",
        cx.session.input_count,
        clip(cx.receiver, MAX_RECEIVER_WIDTH),
        nest,
        terminator
    )
}

/// Shorten a receiver description to at most `max` characters
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Prompt stack that never runs empty
#[derive(Debug, Clone)]
pub struct PromptStack {
    prompts: Vec<Prompt>,
}

impl PromptStack {
    pub fn new(initial: Prompt) -> Self {
        PromptStack {
            prompts: vec![initial],
        }
    }

    /// The prompt at the top of the stack
    pub fn current(&self) -> &Prompt {
        // `prompts` is never empty: `new` seeds it and `pop` keeps the last one
        &self.prompts[self.prompts.len() - 1]
    }

    /// Replace the current prompt
    pub fn set(&mut self, prompt: Prompt) {
        match self.prompts.last_mut() {
            Some(top) => *top = prompt,
            None => self.prompts.push(prompt),
        }
    }

    pub fn push(&mut self, prompt: Prompt) {
        self.prompts.push(prompt);
    }

    /// Pop the current prompt. On a single-element stack nothing is
    /// removed and the current prompt is returned.
    pub fn pop(&mut self) -> Prompt {
        if self.prompts.len() > 1 {
            if let Some(prompt) = self.prompts.pop() {
                return prompt;
            }
        }
        self.current().clone()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Render the first-line or continuation prompt of the current entry
    pub fn select(&self, first_line: bool, cx: &PromptContext<'_>) -> String {
        if first_line {
            self.current().first_line(cx)
        } else {
            self.current().continuation_line(cx)
        }
    }
}
