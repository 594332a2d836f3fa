//! Structured-control bookkeeping.
//!
//! Every `block`, `loop` and `if` the generator opens is pushed here, so the
//! relative depth of a branch target is the number of constructs opened
//! since it. A `while` loop opens two: an outer `block` that `exit` leaves
//! and an inner `loop` that `cycle` restarts.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construct {
    If,
    /// Outer block of a loop; branching to it leaves the loop
    LoopExit,
    /// The loop itself; branching to it restarts the loop
    LoopHead,
}

#[derive(Debug, Clone, Default)]
pub struct ControlStack {
    frames: Vec<Construct>,
}

impl ControlStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, construct: Construct) {
        self.frames.push(construct);
    }

    pub fn pop(&mut self, expected: Construct) -> Result<()> {
        match self.frames.pop() {
            Some(c) if c == expected => Ok(()),
            other => Err(Error::internal(format!(
                "closed {:?} while {:?} was innermost",
                expected, other
            ))),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Branch depth of the innermost `target` construct
    fn depth_of(&self, target: Construct) -> Option<u32> {
        self.frames
            .iter()
            .rev()
            .position(|c| *c == target)
            .map(|p| p as u32)
    }

    /// Depth operand for `exit`
    pub fn exit_depth(&self) -> Result<u32> {
        self.depth_of(Construct::LoopExit)
            .ok_or_else(|| Error::codegen("'exit' outside of a loop"))
    }

    /// Depth operand for `cycle`
    pub fn cycle_depth(&self) -> Result<u32> {
        self.depth_of(Construct::LoopHead)
            .ok_or_else(|| Error::codegen("'cycle' outside of a loop"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_from_nested_if() {
        let mut stack = ControlStack::new();
        stack.push(Construct::LoopExit);
        stack.push(Construct::LoopHead);
        stack.push(Construct::If);
        stack.push(Construct::If);
        assert_eq!(stack.exit_depth().unwrap(), 3);
        assert_eq!(stack.cycle_depth().unwrap(), 2);
    }

    #[test]
    fn test_innermost_loop_wins() {
        let mut stack = ControlStack::new();
        for _ in 0..2 {
            stack.push(Construct::LoopExit);
            stack.push(Construct::LoopHead);
        }
        assert_eq!(stack.exit_depth().unwrap(), 1);
        stack.pop(Construct::LoopHead).unwrap();
        assert!(stack.pop(Construct::LoopHead).is_err());
    }

    #[test]
    fn test_exit_outside_loop_is_error() {
        let mut stack = ControlStack::new();
        stack.push(Construct::If);
        assert!(stack.exit_depth().is_err());
    }
}
