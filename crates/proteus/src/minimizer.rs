//! Program minimization.
//!
//! Interesting programs come out of mutation with plenty of dead weight.
//! The minimizer repeatedly re-runs reduced variants and keeps a reduction
//! only while the execution still exhibits the aspects that made the
//! original interesting. Reductions are conservative: an instruction is only
//! dropped when nothing later consumes its outputs and it does not shape
//! block structure, so every intermediate variant satisfies the code
//! invariants by construction.

use std::rc::Rc;

use crate::ir::{Program, Variable, VariableSet};

/// Attempts to drop the instruction at `index`, returning the reduced
/// program. `None` if removing it would break the code invariants.
pub(crate) fn without_instruction(program: &Program, index: usize) -> Option<Program> {
    let victim = &program.code()[index];
    // Block structure must stay matched; structural instructions are only
    // removable together with their whole block, which single-instruction
    // reduction does not attempt.
    if victim.is_block_begin() || victim.is_block_end() {
        return None;
    }
    let defined: VariableSet = victim.all_outputs().collect();
    if !defined.is_empty() {
        let used_later = program
            .code()
            .iter()
            .skip(index + 1)
            .flat_map(|instr| instr.inputs().iter().copied())
            .any(|v| defined.contains(v));
        if used_later {
            return None;
        }
    }

    // Rebuild without the victim, renumbering the remaining variables.
    let mut code = crate::ir::Code::new();
    let mut map: crate::ir::VariableMap<Variable> = crate::ir::VariableMap::new();
    let mut next = 0usize;
    for (i, instr) in program.code().iter().enumerate() {
        if i == index {
            continue;
        }
        let mut inouts: Vec<Variable> = Vec::with_capacity(instr.inouts().len());
        for &input in instr.inputs() {
            inouts.push(map.get(input).copied()?);
        }
        for output in instr.all_outputs() {
            let fresh = Variable::new(next);
            next += 1;
            map.insert(output, fresh);
            inouts.push(fresh);
        }
        code.append(crate::ir::Instruction::new(instr.op().clone(), inouts));
    }
    debug_assert!(code.is_statically_valid());
    Some(Program::new(code))
}

/// The outcome of a minimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimizationResult {
    /// Instructions removed in total.
    pub removed: usize,
    /// Reduction attempts that had to be reverted.
    pub reverted: usize,
}

impl<R, E, C> crate::fuzzer::Fuzzer<R, E, C>
where
    R: crate::execution::Runner,
    E: crate::evaluator::Evaluator,
    C: crate::corpus::Corpus<E::Aspects>,
{
    /// Minimizes `program` while preserving `aspects`: walks the
    /// instructions back to front, re-executing each reduced variant and
    /// keeping it only when the target still exhibits the aspects.
    pub fn minimize(
        &mut self,
        program: &Rc<Program>,
        aspects: &E::Aspects,
    ) -> (Rc<Program>, MinimizationResult) {
        let mut current = Rc::clone(program);
        let mut result = MinimizationResult { removed: 0, reverted: 0 };

        let mut index = current.size();
        while index > 0 {
            index -= 1;
            let Some(candidate) = without_instruction(&current, index) else {
                continue;
            };
            let candidate = Rc::new(candidate);
            let execution = self.run_for_minimization(&candidate);
            if self.evaluator_mut().has_aspects(&execution, aspects) {
                current = candidate;
                result.removed += 1;
            } else {
                result.reverted += 1;
            }
        }
        (current, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::ir::{BinaryOperator, Operation};

    #[test]
    fn dead_instructions_are_removable() {
        let mut b = ProgramBuilder::with_seed(1);
        let a = b.load_int(1);
        b.load_string("dead");
        let c = b.load_int(2);
        b.binary(BinaryOperator::Add, a, c);
        let program = b.finalize().unwrap();

        let reduced = without_instruction(&program, 1).unwrap();
        assert_eq!(reduced.size(), 3);
        assert!(reduced.code().is_statically_valid());
        assert!(matches!(reduced.code()[2].op(), Operation::BinaryOperation { .. }));
    }

    #[test]
    fn live_and_structural_instructions_are_not_removable() {
        let mut b = ProgramBuilder::with_seed(2);
        let a = b.load_int(1);
        let cond = b.load_bool(true);
        b.build_if(cond, |b| {
            b.unary(crate::ir::UnaryOperator::Minus, a);
        });
        let program = b.finalize().unwrap();

        // The literal feeds the negation; the if is structural.
        assert!(without_instruction(&program, 0).is_none());
        let begin_if = 2;
        assert!(without_instruction(&program, begin_if).is_none());
    }
}
