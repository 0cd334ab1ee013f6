//! Scope tracking.

use crate::ir::{Instruction, Variable};

/// Tracks the scope tree induced by block begins and ends.
///
/// Visible variables are kept as one ordered list with per-scope start
/// offsets; closing a scope truncates the list, so `visible_variables` is
/// monotone within a scope and resets exactly on scope exit.
#[derive(Debug, Clone)]
pub struct ScopeAnalyzer {
    /// All currently visible variables, in definition order.
    visible: Vec<Variable>,
    /// Offset into `visible` where each open scope begins. The outermost
    /// scope starts at zero and is never popped.
    scope_starts: Vec<usize>,
}

impl ScopeAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            visible: Vec::new(),
            scope_starts: vec![0],
        }
    }

    /// Consumes the next instruction.
    pub fn analyze(&mut self, instr: &Instruction) {
        if instr.is_block_end() {
            let start = self
                .scope_starts
                .pop()
                .expect("block ends are matched before analysis");
            self.visible.truncate(start);
        }
        self.visible.extend_from_slice(instr.outputs());
        if instr.is_block_begin() {
            self.scope_starts.push(self.visible.len());
        }
        self.visible.extend_from_slice(instr.inner_outputs());
    }

    /// All variables visible at the current program point, in definition
    /// order.
    #[inline]
    #[must_use]
    pub fn visible_variables(&self) -> &[Variable] {
        &self.visible
    }

    /// The variables owned by the innermost open scope.
    #[must_use]
    pub fn variables_in_current_scope(&self) -> &[Variable] {
        let start = *self.scope_starts.last().expect("at least the outer scope is open");
        &self.visible[start..]
    }

    /// True if the variable is visible at the current program point.
    #[must_use]
    pub fn is_visible(&self, v: Variable) -> bool {
        self.visible.contains(&v)
    }

    /// Number of open scopes, counting the outermost one.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scope_starts.len()
    }
}

impl Default for ScopeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Comparator, Operation};

    fn v(n: usize) -> Variable {
        Variable::new(n)
    }

    #[test]
    fn scope_exit_evicts_inner_variables() {
        let mut analyzer = ScopeAnalyzer::new();
        analyzer.analyze(&Instruction::new(Operation::LoadInteger { value: 0 }, [v(0)]));
        analyzer.analyze(&Instruction::new(Operation::LoadInteger { value: 9 }, [v(1)]));
        analyzer.analyze(&Instruction::new(
            Operation::BeginWhileLoop { comparator: Comparator::LessThan },
            [v(0), v(1)],
        ));
        analyzer.analyze(&Instruction::new(Operation::LoadInteger { value: 7 }, [v(2)]));
        assert_eq!(analyzer.visible_variables(), &[v(0), v(1), v(2)]);
        assert_eq!(analyzer.variables_in_current_scope(), &[v(2)]);
        analyzer.analyze(&Instruction::new(Operation::EndWhileLoop, []));
        assert_eq!(analyzer.visible_variables(), &[v(0), v(1)]);
        assert!(!analyzer.is_visible(v(2)));
    }

    #[test]
    fn inner_outputs_belong_to_the_new_scope() {
        let mut analyzer = ScopeAnalyzer::new();
        analyzer.analyze(&Instruction::new(
            Operation::BeginPlainFunction { num_parameters: 2, signature: None },
            [v(0), v(1), v(2)],
        ));
        // The function variable is visible outside, the parameters inside.
        assert_eq!(analyzer.visible_variables(), &[v(0), v(1), v(2)]);
        assert_eq!(analyzer.variables_in_current_scope(), &[v(1), v(2)]);
        analyzer.analyze(&Instruction::new(Operation::EndPlainFunction, []));
        assert_eq!(analyzer.visible_variables(), &[v(0)]);
    }
}
