//! Context tracking.

use crate::ir::{Context, Instruction};

/// Tracks the active context: the union of the contexts opened by all
/// enclosing blocks plus the surrounding script context.
#[derive(Debug, Clone)]
pub struct ContextAnalyzer {
    stack: Vec<Context>,
}

impl ContextAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: vec![Context::surrounding()],
        }
    }

    /// Consumes the next instruction.
    pub fn analyze(&mut self, instr: &Instruction) {
        if instr.is_block_end() {
            self.stack.pop().expect("block ends are matched before analysis");
        }
        if instr.is_block_begin() {
            self.stack.push(instr.op().opened_context());
        }
    }

    /// The context active at the current program point.
    #[must_use]
    pub fn current(&self) -> Context {
        self.stack.iter().fold(Context::empty(), |acc, c| acc | *c)
    }
}

impl Default for ContextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operation, Variable};

    #[test]
    fn contexts_nest_and_unwind() {
        let mut analyzer = ContextAnalyzer::new();
        assert_eq!(analyzer.current(), Context::SCRIPT);

        analyzer.analyze(&Instruction::new(
            Operation::BeginGeneratorFunction { num_parameters: 0, signature: None },
            [Variable::new(0)],
        ));
        assert!(analyzer.current().contains(Context::GENERATOR_FUNCTION));
        assert!(analyzer.current().contains(Context::SUBROUTINE));

        analyzer.analyze(&Instruction::new(Operation::EndGeneratorFunction, []));
        assert_eq!(analyzer.current(), Context::SCRIPT);
    }
}
