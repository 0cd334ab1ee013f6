//! Instructions: an operation plus its input and output variables.

use smallvec::SmallVec;

use super::{operation::Operation, variable::Variable};

/// An instruction in the intermediate representation.
///
/// `inouts` is ordered: the first `num_inputs` entries are inputs, the next
/// `num_outputs` are outputs, and the remainder are inner outputs (variables
/// visible only inside the block the operation opens). Instructions are
/// immutable once appended to a program.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    op: Operation,
    inouts: SmallVec<[Variable; 4]>,
}

impl Instruction {
    /// Creates an instruction. The number of inouts must match the
    /// operation's arity.
    #[must_use]
    pub fn new(op: Operation, inouts: impl IntoIterator<Item = Variable>) -> Self {
        let inouts: SmallVec<[Variable; 4]> = inouts.into_iter().collect();
        debug_assert_eq!(
            inouts.len(),
            op.num_inputs() + op.num_outputs() + op.num_inner_outputs(),
            "inout count does not match the arity of {}",
            op.name()
        );
        Self { op, inouts }
    }

    /// The operation executed by this instruction.
    #[inline]
    #[must_use]
    pub fn op(&self) -> &Operation {
        &self.op
    }

    /// All inputs and outputs, in order.
    #[inline]
    #[must_use]
    pub fn inouts(&self) -> &[Variable] {
        &self.inouts
    }

    #[inline]
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.op.num_inputs()
    }

    #[inline]
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.op.num_outputs()
    }

    #[inline]
    #[must_use]
    pub fn num_inner_outputs(&self) -> usize {
        self.op.num_inner_outputs()
    }

    /// The input variables.
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[Variable] {
        &self.inouts[..self.num_inputs()]
    }

    /// The output variables visible in the surrounding scope.
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &[Variable] {
        let n = self.num_inputs();
        &self.inouts[n..n + self.num_outputs()]
    }

    /// The output variables visible only inside the opened block.
    #[inline]
    #[must_use]
    pub fn inner_outputs(&self) -> &[Variable] {
        &self.inouts[self.num_inputs() + self.num_outputs()..]
    }

    /// The i-th input.
    #[inline]
    #[must_use]
    pub fn input(&self, i: usize) -> Variable {
        self.inputs()[i]
    }

    /// The single output of a one-output instruction.
    #[inline]
    #[must_use]
    pub fn output(&self) -> Variable {
        debug_assert_eq!(self.num_outputs(), 1);
        self.outputs()[0]
    }

    /// All outputs, outer and inner.
    pub fn all_outputs(&self) -> impl Iterator<Item = Variable> + '_ {
        self.inouts[self.num_inputs()..].iter().copied()
    }

    /// True if the instruction defines at least one variable.
    #[inline]
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        self.num_outputs() + self.num_inner_outputs() > 0
    }

    #[inline]
    #[must_use]
    pub fn is_block_begin(&self) -> bool {
        self.op.is_block_begin()
    }

    #[inline]
    #[must_use]
    pub fn is_block_end(&self) -> bool {
        self.op.is_block_end()
    }

    /// True if executing this instruction may change the value bound to or
    /// reachable through `v`. Used by the splicer to decide whether an
    /// instruction is worth dragging into a slice for its side effect.
    #[must_use]
    pub fn may_mutate(&self, v: Variable) -> bool {
        (self.op.may_reassign() || self.op.is_call()) && self.inputs().contains(&v)
    }

    /// The variable whose binding this instruction overwrites, if any.
    /// Value-reuse maps evict this variable when the instruction is emitted.
    #[must_use]
    pub fn reassigned_variable(&self) -> Option<Variable> {
        if self.op.may_reassign() && self.num_inputs() > 0 {
            Some(self.input(0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operation::UnaryOperator;

    fn v(n: usize) -> Variable {
        Variable::new(n)
    }

    #[test]
    fn inout_partitioning() {
        let instr = Instruction::new(
            Operation::BinaryOperation { op: crate::ir::operation::BinaryOperator::Add },
            [v(0), v(1), v(2)],
        );
        assert_eq!(instr.inputs(), &[v(0), v(1)]);
        assert_eq!(instr.outputs(), &[v(2)]);
        assert!(instr.inner_outputs().is_empty());
        assert_eq!(instr.output(), v(2));
    }

    #[test]
    fn inner_outputs_of_function_begin() {
        let instr = Instruction::new(
            Operation::BeginPlainFunction { num_parameters: 2, signature: None },
            [v(3), v(4), v(5)],
        );
        assert_eq!(instr.outputs(), &[v(3)]);
        assert_eq!(instr.inner_outputs(), &[v(4), v(5)]);
    }

    #[test]
    fn mutation_queries() {
        let reassign = Instruction::new(Operation::Reassign, [v(0), v(1)]);
        assert!(reassign.may_mutate(v(0)));
        assert!(reassign.may_mutate(v(1)));
        assert!(!reassign.may_mutate(v(2)));
        assert_eq!(reassign.reassigned_variable(), Some(v(0)));

        let inc = Instruction::new(
            Operation::UnaryOperation { op: UnaryOperator::PostInc },
            [v(5), v(6)],
        );
        assert_eq!(inc.reassigned_variable(), Some(v(5)));
    }
}
