//! Mutators: strategies that derive a new program from an existing one.
//!
//! Every mutator receives the sample to mutate plus a fresh builder whose
//! donors, RNG, and environment were prepared by the engine; it returns the
//! finalized result or `None` when the mutation could not be applied. All of
//! them work by adoption: copy a region of the original verbatim, change
//! something in the middle, copy the rest.

use std::rc::Rc;

use rand::Rng;

use crate::{
    builder::{BuildMode, ProgramBuilder},
    ir::{
        BinaryOperator, Comparator, Instruction, Operation, Program, RegExpFlags, UnaryOperator,
        Variable,
    },
};

/// A program-to-program mutation strategy.
pub trait Mutator {
    /// A stable name for scheduling and statistics.
    fn name(&self) -> &'static str;

    /// Attempts to derive a new program from `program`. Returns `None` when
    /// the mutation is not applicable to this sample.
    fn mutate(&self, program: &Rc<Program>, b: &mut ProgramBuilder) -> Option<Program>;
}

/// The default mutator set, in scheduling order.
#[must_use]
pub fn default_mutators() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(InputMutator),
        Box::new(OperationMutator),
        Box::new(SpliceMutator),
        Box::new(CombineMutator),
        Box::new(CodeGenMutator),
    ]
}

/// Rewires one input of one instruction to another visible variable.
pub struct InputMutator;

impl Mutator for InputMutator {
    fn name(&self) -> &'static str {
        "InputMutator"
    }

    fn mutate(&self, program: &Rc<Program>, b: &mut ProgramBuilder) -> Option<Program> {
        let targets: Vec<usize> = (0..program.size())
            .filter(|&i| program.code()[i].num_inputs() > 0)
            .collect();
        if targets.is_empty() {
            return None;
        }
        let target = targets[b.rng().gen_range(0..targets.len())];
        let victim_slot = b.rng().gen_range(0..program.code()[target].num_inputs());

        b.record_contributor(self.name());
        b.begin_adoption();
        for (i, instr) in program.code().iter().enumerate() {
            if i != target {
                b.adopt_instruction(instr);
                continue;
            }
            let mut inputs: Vec<Variable> =
                instr.inputs().iter().map(|&v| b.adopt(v)).collect();
            let wanted = b.type_of(inputs[victim_slot]);
            let replacement = b
                .rand_var_of_type(&wanted)
                .or_else(|| b.rand_var())?;
            inputs[victim_slot] = replacement;
            let mut inouts = inputs;
            for v in instr.all_outputs() {
                inouts.push(b.adopt(v));
            }
            b.internal_append(Instruction::new(instr.op().clone(), inouts));
        }
        b.end_adoption();
        b.finalize().ok()
    }
}

/// Perturbs the payload of one operation in place, keeping its arity.
pub struct OperationMutator;

impl OperationMutator {
    /// Returns a payload-mutated copy of `op`, or `None` for operations with
    /// nothing to mutate. The mutated operation always has the same arity.
    fn mutated_operation(op: &Operation, b: &mut ProgramBuilder) -> Option<Operation> {
        use Operation as O;
        let mutated = match op {
            O::LoadInteger { .. } => O::LoadInteger { value: b.rand_int() },
            O::LoadBigInt { .. } => O::LoadBigInt { value: b.rand_int() },
            O::LoadFloat { .. } => O::LoadFloat { value: b.rand_float() },
            O::LoadBoolean { value } => O::LoadBoolean { value: !value },
            O::LoadString { .. } => O::LoadString { value: b.rand_string() },
            O::LoadRegExp { pattern, .. } => {
                let flags = if b.probability(0.5) {
                    RegExpFlags::GLOBAL | RegExpFlags::CASE_INSENSITIVE
                } else {
                    RegExpFlags::empty()
                };
                O::LoadRegExp { pattern: pattern.clone(), flags }
            }
            O::LoadBuiltin { .. } => O::LoadBuiltin { name: b.rand_builtin() },
            O::UnaryOperation { op: old } => {
                // Stay within the non-reassigning operators so the
                // instruction's effect on its operand is preserved.
                let pool: Vec<UnaryOperator> = UnaryOperator::ALL
                    .iter()
                    .copied()
                    .filter(|o| o.reassigns() == old.reassigns())
                    .collect();
                O::UnaryOperation { op: pool[b.rng().gen_range(0..pool.len())] }
            }
            O::BinaryOperation { .. } => O::BinaryOperation {
                op: BinaryOperator::ALL[b.rng().gen_range(0..BinaryOperator::ALL.len())],
            },
            O::Update { .. } => O::Update {
                op: BinaryOperator::ALL[b.rng().gen_range(0..BinaryOperator::ALL.len())],
            },
            O::Compare { .. } => O::Compare {
                op: Comparator::ALL[b.rng().gen_range(0..Comparator::ALL.len())],
            },
            O::GetProperty { .. } => O::GetProperty { name: b.rand_property_for_defining() },
            O::SetProperty { .. } => O::SetProperty { name: b.rand_property_for_defining() },
            O::DeleteProperty { .. } => O::DeleteProperty { name: b.rand_property_for_defining() },
            O::GetElement { .. } => O::GetElement { index: b.rng().gen_range(-4..32) },
            O::SetElement { .. } => O::SetElement { index: b.rng().gen_range(-4..32) },
            O::BeginWhileLoop { .. } => O::BeginWhileLoop {
                comparator: Comparator::ALL[b.rng().gen_range(0..Comparator::ALL.len())],
            },
            O::BeginDoWhileLoop { .. } => O::BeginDoWhileLoop {
                comparator: Comparator::ALL[b.rng().gen_range(0..Comparator::ALL.len())],
            },
            O::BeginForLoop { .. } => O::BeginForLoop {
                comparator: Comparator::ALL[b.rng().gen_range(0..Comparator::ALL.len())],
                op: BinaryOperator::ALL[b.rng().gen_range(0..BinaryOperator::ALL.len())],
            },
            O::BeginIf { inverted } => O::BeginIf { inverted: !inverted },
            _ => return None,
        };
        Some(mutated)
    }
}

impl Mutator for OperationMutator {
    fn name(&self) -> &'static str {
        "OperationMutator"
    }

    fn mutate(&self, program: &Rc<Program>, b: &mut ProgramBuilder) -> Option<Program> {
        let targets: Vec<usize> = (0..program.size())
            .filter(|&i| Self::mutated_operation(program.code()[i].op(), b).is_some())
            .collect();
        if targets.is_empty() {
            return None;
        }
        let target = targets[b.rng().gen_range(0..targets.len())];

        b.record_contributor(self.name());
        b.begin_adoption();
        for (i, instr) in program.code().iter().enumerate() {
            if i != target {
                b.adopt_instruction(instr);
                continue;
            }
            let op = Self::mutated_operation(instr.op(), b)
                .expect("target was selected for having a mutable payload");
            let inouts: Vec<Variable> = instr.inouts().iter().map(|&v| b.adopt(v)).collect();
            b.internal_append(Instruction::new(op, inouts));
        }
        b.end_adoption();
        b.finalize().ok()
    }
}

/// Copies the sample and splices a slice from a corpus donor into a random
/// position.
pub struct SpliceMutator;

impl Mutator for SpliceMutator {
    fn name(&self) -> &'static str {
        "SpliceMutator"
    }

    fn mutate(&self, program: &Rc<Program>, b: &mut ProgramBuilder) -> Option<Program> {
        let donor = b.rand_donor()?;
        let split = b.rng().gen_range(0..=program.size());

        b.record_contributor(self.name());
        let mut spliced = false;
        b.adopting(|b| {
            for (i, instr) in program.code().iter().enumerate() {
                if i == split {
                    spliced = b.splice_from(&donor).is_ok();
                }
                b.adopt_instruction(instr);
            }
            if split == program.size() {
                spliced = b.splice_from(&donor).is_ok();
            }
        });
        if !spliced {
            return None;
        }
        b.finalize().ok()
    }
}

/// Inserts a complete donor program at a random position.
pub struct CombineMutator;

impl Mutator for CombineMutator {
    fn name(&self) -> &'static str {
        "CombineMutator"
    }

    fn mutate(&self, program: &Rc<Program>, b: &mut ProgramBuilder) -> Option<Program> {
        let donor = b.rand_donor()?;
        let split = b.rng().gen_range(0..=program.size());

        b.record_contributor(self.name());
        b.adopting(|b| {
            for (i, instr) in program.code().iter().enumerate() {
                if i == split {
                    b.append_program(&donor);
                }
                b.adopt_instruction(instr);
            }
            if split == program.size() {
                b.append_program(&donor);
            }
        });
        b.finalize().ok()
    }
}

/// Generates fresh code at a random position using the generator library.
pub struct CodeGenMutator;

impl Mutator for CodeGenMutator {
    fn name(&self) -> &'static str {
        "CodeGenMutator"
    }

    fn mutate(&self, program: &Rc<Program>, b: &mut ProgramBuilder) -> Option<Program> {
        let split = b.rng().gen_range(0..=program.size());
        let budget = b.rng().gen_range(3..=10);

        b.record_contributor(self.name());
        b.adopting(|b| {
            for (i, instr) in program.code().iter().enumerate() {
                if i == split {
                    b.build(budget, BuildMode::Generating);
                }
                b.adopt_instruction(instr);
            }
            if split == program.size() {
                b.build(budget, BuildMode::Generating);
            }
        });
        b.finalize().ok()
    }
}
