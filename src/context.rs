//! Stack of execution contexts
//!
//! The top of the stack is where the next unit is evaluated. Entering a
//! nested scope during a session pushes; leaving pops.

#[derive(Debug, Clone)]
pub struct ContextStack<C> {
    frames: Vec<C>,
}

impl<C> Default for ContextStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ContextStack<C> {
    pub fn new() -> Self {
        ContextStack { frames: Vec::new() }
    }

    pub fn push(&mut self, context: C) {
        self.frames.push(context);
    }

    pub fn pop(&mut self) -> Option<C> {
        self.frames.pop()
    }

    /// The current context
    pub fn top(&self) -> Option<&C> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut C> {
        self.frames.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&C> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Nesting depth as shown to prompts: 0 for the session's own context
    pub fn nesting(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// Pop everything above `len`, returning the removed contexts bottom first
    pub fn truncate(&mut self, len: usize) -> Vec<C> {
        if len >= self.frames.len() {
            return Vec::new();
        }
        self.frames.split_off(len)
    }

    /// Contexts bottom first
    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.frames.iter()
    }
}
