//! The append-only instruction list.

use std::ops::Index;

use super::{
    context::Context,
    instruction::Instruction,
    variable::{MAX_VARIABLES, Variable},
};
use crate::errors::BuilderError;

/// An append-only sequence of instructions.
///
/// Code under construction temporarily violates the block-matching invariant
/// (blocks are open until their end is appended); [`check`](Self::check)
/// verifies the full invariant set and is run by `finalize` in debug builds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Code {
    instructions: Vec<Instruction>,
}

impl Code {
    /// Creates an empty code object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction and returns its index.
    pub fn append(&mut self, instruction: Instruction) -> usize {
        debug_assert!(
            instruction
                .all_outputs()
                .all(|v| v.number() < MAX_VARIABLES),
            "variable number above the supported maximum"
        );
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Number of instructions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The most recently appended instruction.
    #[must_use]
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Iterates over the instructions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Removes all instructions. Used by the builder on reset.
    pub fn remove_all(&mut self) {
        self.instructions.clear();
    }

    /// Number of variables defined by this code. Variables are dense, so
    /// this equals the total output count.
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.instructions
            .iter()
            .map(|i| i.num_outputs() + i.num_inner_outputs())
            .sum()
    }

    /// Returns the index of the final end of the block opened at `begin`,
    /// skipping over nested blocks and block continuations like `BeginElse`.
    #[must_use]
    pub fn find_block_end(&self, begin: usize) -> Option<usize> {
        debug_assert!(self[begin].is_block_begin());
        let mut depth = 0usize;
        for index in begin..self.len() {
            let instr = &self[index];
            if instr.is_block_end() && !instr.is_block_begin() {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            } else if instr.is_block_begin() && !instr.is_block_end() {
                depth += 1;
            }
        }
        None
    }

    /// Verifies the full static invariant set: dense variable numbering,
    /// matched blocks, inputs defined and in scope, and active contexts
    /// covering every instruction's requirement.
    pub fn check(&self) -> Result<(), BuilderError> {
        let mut next_variable = 0usize;
        // Stack of scopes; each holds the numbers of the variables it owns.
        let mut scopes: Vec<Vec<usize>> = vec![Vec::new()];
        // Stack of (begin index, open operation) for block matching.
        let mut blocks: Vec<(usize, &Instruction)> = Vec::new();
        // Stack of contexts; the active context is the union of all entries.
        let mut contexts: Vec<Context> = vec![Context::surrounding()];

        let visible = |scopes: &[Vec<usize>], v: Variable| {
            scopes.iter().any(|s| s.contains(&v.number()))
        };

        for (index, instr) in self.instructions.iter().enumerate() {
            // Inputs must be defined, and defined in a still-active scope.
            for &input in instr.inputs() {
                if input.number() >= next_variable {
                    return Err(BuilderError::UndefinedInput { index, variable: input });
                }
                if !visible(&scopes, input) {
                    return Err(BuilderError::OutOfScopeInput { index, variable: input });
                }
            }

            // Context requirement against the union of the context stack.
            let active = contexts
                .iter()
                .fold(Context::empty(), |acc, c| acc | *c);
            if !active.contains(instr.op().required_context()) {
                return Err(BuilderError::ContextMismatch { index });
            }

            // Block closing, including continuations (else/catch/finally).
            if instr.is_block_end() {
                let Some((_, open)) = blocks.last() else {
                    return Err(BuilderError::UnmatchedBlockEnd { index });
                };
                if !open.op().is_matching_block_end(instr.op()) {
                    return Err(BuilderError::UnmatchedBlockEnd { index });
                }
                blocks.pop();
                scopes.pop();
                contexts.pop();
            }

            // Outer outputs are owned by the now-current scope.
            for &output in instr.outputs() {
                if output.number() != next_variable {
                    return Err(BuilderError::NonDenseVariable {
                        index,
                        expected: next_variable,
                        found: output.number(),
                    });
                }
                next_variable += 1;
                scopes
                    .last_mut()
                    .expect("the outermost scope is never popped")
                    .push(output.number());
            }

            // Block opening; inner outputs land in the new scope.
            if instr.is_block_begin() {
                blocks.push((index, instr));
                scopes.push(Vec::new());
                contexts.push(instr.op().opened_context());
            }
            for &inner in instr.inner_outputs() {
                if inner.number() != next_variable {
                    return Err(BuilderError::NonDenseVariable {
                        index,
                        expected: next_variable,
                        found: inner.number(),
                    });
                }
                next_variable += 1;
                scopes
                    .last_mut()
                    .expect("a scope was just pushed for this block")
                    .push(inner.number());
            }

            if next_variable > MAX_VARIABLES {
                return Err(BuilderError::TooManyVariables { count: next_variable });
            }
        }

        if let Some(&(begin, _)) = blocks.last() {
            return Err(BuilderError::UnterminatedBlock { index: begin });
        }
        Ok(())
    }

    /// True if [`check`](Self::check) passes.
    #[must_use]
    pub fn is_statically_valid(&self) -> bool {
        self.check().is_ok()
    }
}

impl Index<usize> for Code {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }
}

impl<'a> IntoIterator for &'a Code {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operation::{Comparator, Operation};

    fn v(n: usize) -> Variable {
        Variable::new(n)
    }

    fn load(n: usize, value: i64) -> Instruction {
        Instruction::new(Operation::LoadInteger { value }, [v(n)])
    }

    #[test]
    fn straight_line_code_is_valid() {
        let mut code = Code::new();
        code.append(load(0, 1));
        code.append(load(1, 2));
        code.append(Instruction::new(
            Operation::Compare { op: Comparator::LessThan },
            [v(0), v(1), v(2)],
        ));
        assert!(code.is_statically_valid());
        assert_eq!(code.num_variables(), 3);
    }

    #[test]
    fn undefined_input_is_rejected() {
        let mut code = Code::new();
        code.append(Instruction::new(Operation::TypeOf, [v(5), v(0)]));
        assert!(matches!(
            code.check(),
            Err(BuilderError::UndefinedInput { .. })
        ));
    }

    #[test]
    fn scope_exit_hides_variables() {
        let mut code = Code::new();
        code.append(load(0, 1));
        code.append(load(1, 2));
        code.append(Instruction::new(
            Operation::BeginWhileLoop { comparator: Comparator::LessThan },
            [v(0), v(1)],
        ));
        code.append(load(2, 3));
        code.append(Instruction::new(Operation::EndWhileLoop, []));
        // v2 died with the loop body.
        code.append(Instruction::new(Operation::TypeOf, [v(2), v(3)]));
        assert!(matches!(
            code.check(),
            Err(BuilderError::OutOfScopeInput { .. })
        ));
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut code = Code::new();
        code.append(Instruction::new(Operation::BeginTry, []));
        assert!(matches!(
            code.check(),
            Err(BuilderError::UnterminatedBlock { .. })
        ));
    }

    #[test]
    fn context_requirements_are_enforced() {
        let mut code = Code::new();
        code.append(Instruction::new(Operation::LoopBreak, []));
        assert!(matches!(
            code.check(),
            Err(BuilderError::ContextMismatch { .. })
        ));
    }

    #[test]
    fn find_block_end_skips_nested_blocks() {
        let mut code = Code::new();
        code.append(load(0, 0));
        code.append(Instruction::new(Operation::BeginIf { inverted: false }, [v(0)]));
        code.append(Instruction::new(Operation::BeginTry, []));
        code.append(Instruction::new(Operation::BeginCatch, [v(1)]));
        code.append(Instruction::new(Operation::EndTryCatchFinally, []));
        code.append(Instruction::new(Operation::BeginElse, []));
        code.append(Instruction::new(Operation::EndIf, []));
        assert_eq!(code.find_block_end(1), Some(6));
        assert_eq!(code.find_block_end(2), Some(4));
    }
}
