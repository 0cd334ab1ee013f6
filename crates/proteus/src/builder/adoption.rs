//! Adoption: copying instructions verbatim from another program.
//!
//! An adoption session maintains a stable mapping from a donor program's
//! variables to fresh local variables. Within one session, adopting the same
//! foreign variable twice returns the same local variable; sessions nest, and
//! closing one discards exactly its own mapping frame.

use std::rc::Rc;

use crate::ir::{Instruction, Program, Variable, VariableMap};

use super::ProgramBuilder;

impl ProgramBuilder {
    /// Opens an adoption session for a donor program.
    pub fn begin_adoption(&mut self) {
        self.adoption_maps.push(VariableMap::new());
    }

    /// Closes the innermost adoption session.
    pub fn end_adoption(&mut self) {
        let frame = self.adoption_maps.pop();
        debug_assert!(frame.is_some(), "end_adoption without begin_adoption");
    }

    /// Maps a donor variable to a local variable, allocating a fresh one on
    /// first sight. Idempotent within a session.
    pub fn adopt(&mut self, foreign: Variable) -> Variable {
        debug_assert!(
            !self.adoption_maps.is_empty(),
            "adopt may only be called inside an adoption session"
        );
        if let Some(&local) = self.adoption_maps.last().and_then(|m| m.get(foreign)) {
            return local;
        }
        let local = self.next_variable();
        if let Some(frame) = self.adoption_maps.last_mut() {
            frame.insert(foreign, local);
        }
        local
    }

    /// Emits a copy of a donor instruction with all inouts mapped through
    /// the current session.
    pub fn adopt_instruction(&mut self, instr: &Instruction) {
        let inouts: Vec<Variable> = instr.inouts().iter().map(|&v| self.adopt(v)).collect();
        self.internal_append(Instruction::new(instr.op().clone(), inouts));
    }

    /// Runs `f` inside a fresh adoption session.
    pub fn adopting<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_adoption();
        let result = f(self);
        self.end_adoption();
        result
    }

    /// Appends a full copy of `program`, remapping all its variables onto
    /// fresh local ones.
    pub fn append_program(&mut self, program: &Rc<Program>) {
        self.adopting(|b| {
            for instr in program.code() {
                b.adopt_instruction(instr);
            }
        });
    }
}
