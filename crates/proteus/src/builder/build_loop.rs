//! The budget-driven build loop.
//!
//! `build(n, mode)` grows the program by roughly `n` instructions by
//! repeatedly dispatching either a code generator or a splice from one of the
//! pre-sampled donors. Recursive generators re-enter through
//! `build_recursive`, which carves a budget share out of the parent's.

use std::rc::Rc;

use rand::Rng;

use crate::{
    generators::{CodeGenerator, InputMode},
    ir::Variable,
};

use super::{BuilderMode, ProgramBuilder};

/// What the build loop is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Only run code generators.
    #[default]
    Generating,
    /// Only splice from the registered donors.
    Splicing,
    /// Flip a coin per iteration.
    GeneratingAndSplicing,
}

/// One entry of the build-loop stack; `build` pushes, `build_recursive`
/// reads the top to size nested budgets.
#[derive(Debug, Clone)]
pub(crate) struct BuildingState {
    pub initial_budget: usize,
    pub remaining: usize,
    pub mode: BuildMode,
    pub recursion_allowed: bool,
    pub next_recursive_block: usize,
    pub total_recursive_blocks: Option<usize>,
}

impl ProgramBuilder {
    /// Generates roughly `n` instructions at the current position. May
    /// overshoot (recursive generators emit whole blocks), but not by more
    /// than about a factor of two.
    pub fn build(&mut self, n: usize, mode: BuildMode) {
        // With nothing visible there is nothing for generators to consume;
        // produce a handful of values first.
        if !self.has_visible_variables() {
            self.build_values(n.clamp(1, 3));
        }
        self.building_stack.push(BuildingState {
            initial_budget: n,
            remaining: n,
            mode,
            recursion_allowed: true,
            next_recursive_block: 0,
            total_recursive_blocks: None,
        });
        self.build_internal();
        self.building_stack.pop();
    }

    /// Called by a recursive generator that just opened block
    /// `block` of `of_blocks` to fill it. The budget defaults to a random
    /// fraction of the parent's initial budget, split across the sibling
    /// blocks.
    pub fn build_recursive(&mut self, block: usize, of_blocks: usize, n: Option<usize>) {
        let (parent_budget, parent_mode) = match self.building_stack.last_mut() {
            Some(state) => {
                state.next_recursive_block = block;
                state.total_recursive_blocks = Some(of_blocks);
                debug_assert!(
                    state.next_recursive_block <= state.total_recursive_blocks.unwrap_or(0),
                    "recursive block index out of range"
                );
                (state.initial_budget, state.mode)
            }
            None => (self.config.default_build_budget, BuildMode::Generating),
        };
        let budget = n.unwrap_or_else(|| {
            let lo = self.config.min_recursive_budget_fraction;
            let hi = self.config.max_recursive_budget_fraction;
            let fraction = self.rng.gen_range(lo..=hi);
            ((fraction * parent_budget as f64) / of_blocks as f64).ceil() as usize
        });
        self.build(budget.max(1), parent_mode);
    }

    fn build_internal(&mut self) {
        let max_failures = self.config.max_consecutive_build_failures;
        let min_recursive_budget = self.config.min_budget_for_recursive_generation;
        let mut consecutive_failures = 0usize;

        loop {
            let Some(state) = self.building_stack.last_mut() else {
                return;
            };
            if state.remaining == 0 {
                return;
            }
            state.recursion_allowed = state.remaining >= min_recursive_budget;
            let mode = state.mode;
            let recursion_allowed = state.recursion_allowed;

            let before = self.code.len();
            match mode {
                BuildMode::Generating => self.run_random_generator(recursion_allowed),
                BuildMode::Splicing => self.splice_from_random_donor(),
                BuildMode::GeneratingAndSplicing => {
                    if self.donors.is_empty() || self.probability(0.5) {
                        self.run_random_generator(recursion_allowed);
                    } else {
                        self.splice_from_random_donor();
                    }
                }
            }
            let emitted = self.code.len() - before;

            if emitted == 0 {
                consecutive_failures += 1;
                if consecutive_failures >= max_failures {
                    return;
                }
            } else {
                consecutive_failures = 0;
            }

            if let Some(state) = self.building_stack.last_mut() {
                state.remaining = state.remaining.saturating_sub(emitted);
            }
        }
    }

    /// Bootstraps an empty scope with a few plain values.
    pub(crate) fn build_values(&mut self, n: usize) {
        let lib = Rc::clone(&self.generators);
        let values: Vec<&CodeGenerator> = lib.value_generators().collect();
        for _ in 0..n {
            if values.is_empty() {
                let value = self.rand_int();
                self.load_int(value);
            } else {
                let g = values[self.rng.gen_range(0..values.len())];
                g.run(self, &[]);
                self.record_contributor(g.name());
            }
        }
    }

    fn run_random_generator(&mut self, recursion_allowed: bool) {
        let context = self.context();
        let lib = Rc::clone(&self.generators);
        let eligible: Vec<&CodeGenerator> = lib
            .iter()
            .filter(|g| context.contains(g.required_context()))
            .filter(|g| recursion_allowed || !g.is_recursive())
            .collect();
        if eligible.is_empty() {
            return;
        }
        let g = eligible[self.rng.gen_range(0..eligible.len())];
        let Some(inputs) = self.resolve_generator_inputs(g) else {
            // Strict inputs not found; counts as a failed attempt.
            return;
        };
        g.run(self, &inputs);
        self.record_contributor(g.name());
    }

    fn splice_from_random_donor(&mut self) {
        if self.donors.is_empty() {
            return;
        }
        let donor = Rc::clone(&self.donors[self.rng.gen_range(0..self.donors.len())]);
        // A failed splice appends nothing and simply counts as a failure.
        let _ = self.splice_from(&donor);
    }

    /// Resolves a generator's declared inputs against the visible variables.
    ///
    /// Loose inputs admit unknown-typed variables and degrade to any visible
    /// variable; strict inputs must match statically or the generator does
    /// not run.
    fn resolve_generator_inputs(&mut self, g: &CodeGenerator) -> Option<Vec<Variable>> {
        let mut inputs = Vec::with_capacity(g.input_types().len());
        for wanted in g.input_types() {
            let found = match g.input_mode() {
                InputMode::Strict => {
                    let saved = self.mode;
                    self.set_mode(BuilderMode::Conservative);
                    let v = self.rand_var_of_type(wanted);
                    self.set_mode(saved);
                    v?
                }
                InputMode::Loose => {
                    let saved = self.mode;
                    self.set_mode(BuilderMode::Aggressive);
                    let v = self.rand_var_of_type(wanted);
                    self.set_mode(saved);
                    v?
                }
            };
            inputs.push(found);
        }
        Some(inputs)
    }
}
