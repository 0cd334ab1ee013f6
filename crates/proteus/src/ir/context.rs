//! Execution contexts.
//!
//! A [`Context`] is a bitset of capabilities active at a program point. Every
//! operation declares the contexts it requires and the contexts the block it
//! opens adds on top; the context analyzer tracks the active union over the
//! open block stack.

use bitflags::bitflags;

bitflags! {
    /// Capabilities active at a program point.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Context: u32 {
        /// Plain script context, active at the top level of every program.
        const SCRIPT = 1 << 0;
        /// Inside any subroutine (function, method, constructor).
        const SUBROUTINE = 1 << 1;
        /// Inside a generator function; `yield` is available.
        const GENERATOR_FUNCTION = 1 << 2;
        /// Inside an async function; `await` is available.
        const ASYNC_FUNCTION = 1 << 3;
        /// Inside a loop body; `break` and `continue` are available.
        const LOOP = 1 << 4;
        /// Inside an object literal; only literal fields may be defined.
        const OBJECT_LITERAL = 1 << 5;
        /// Inside a class definition; only class fields may be defined.
        const CLASS_DEFINITION = 1 << 6;
        /// Directly inside a switch; only case blocks may be opened.
        const SWITCH_BLOCK = 1 << 7;
        /// Inside a switch case body.
        const SWITCH_CASE = 1 << 8;
    }
}

impl Context {
    /// The context surrounding a whole program before any block is opened.
    #[must_use]
    pub fn surrounding() -> Self {
        Self::SCRIPT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_queries() {
        let ctx = Context::SCRIPT | Context::SUBROUTINE | Context::LOOP;
        assert!(ctx.contains(Context::SCRIPT));
        assert!(ctx.contains(Context::SCRIPT | Context::LOOP));
        assert!(!ctx.contains(Context::CLASS_DEFINITION));
    }
}
