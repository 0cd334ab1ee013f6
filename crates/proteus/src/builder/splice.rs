//! Splicing: extracting a semantically valid slice from a donor program and
//! appending it to the host builder.
//!
//! The algorithm runs in five passes over the (immutable) donor:
//!
//! 1. summarize block groups so each can be treated as one virtual
//!    instruction,
//! 2. determine candidate instructions whose context and data-flow
//!    requirements the host can satisfy, probabilistically remapping donor
//!    outputs onto compatible host variables when dataflow merging is on,
//! 3. pick a root among the candidates,
//! 4. walk backward computing the dependency slice,
//! 5. emit the slice with fresh host variables.
//!
//! Availability is only ever extended by candidate instructions (or their
//! block groups), so everything the slice drags in is context-checked; a
//! failed splice leaves the host untouched.

use ahash::AHashSet;

use rand::Rng;

use crate::{
    analysis::TypeAnalyzer,
    errors::SpliceError,
    ir::{Context, Instruction, Program, Type, Variable, VariableMap, VariableSet},
};

use super::ProgramBuilder;

/// Summary of one block group `[head..end]`.
struct BlockSummary {
    end: usize,
    /// Context the whole group needs from its surroundings.
    required_context: Context,
    /// Everything defined anywhere inside the group, inner outputs included.
    provided: VariableSet,
    /// Variables the group consumes but does not define.
    required_inputs: VariableSet,
}

/// Aggregation state for one open block during the summary pass.
struct OpenBlock {
    head: usize,
    opened: Context,
    required: Context,
    inputs: VariableSet,
    provided: VariableSet,
}

type SummaryMap = ahash::AHashMap<usize, BlockSummary>;

struct DonorAnalysis {
    summaries: SummaryMap,
    /// Innermost group head per instruction index; structural members map to
    /// their own group.
    group_of: Vec<Option<usize>>,
    /// Group head -> enclosing group head.
    parent_group: Vec<Option<usize>>,
}

fn is_pure_begin(instr: &Instruction) -> bool {
    instr.is_block_begin() && !instr.is_block_end()
}

fn is_pure_end(instr: &Instruction) -> bool {
    instr.is_block_end() && !instr.is_block_begin()
}

/// Pass 1: one forward walk computing block summaries and group structure.
fn analyze_donor(donor: &Program) -> DonorAnalysis {
    let n = donor.size();
    let mut summaries = SummaryMap::default();
    let mut group_of: Vec<Option<usize>> = vec![None; n];
    let mut parent_group: Vec<Option<usize>> = vec![None; n];
    let mut stack: Vec<OpenBlock> = Vec::new();

    for (i, instr) in donor.code().iter().enumerate() {
        if is_pure_begin(instr) {
            if let Some(top) = stack.last() {
                parent_group[i] = Some(top.head);
            }
            let mut block = OpenBlock {
                head: i,
                opened: instr.op().opened_context(),
                required: instr.op().required_context(),
                inputs: VariableSet::new(),
                provided: VariableSet::new(),
            };
            block.inputs.extend(instr.inputs().iter().copied());
            block.provided.extend(instr.all_outputs());
            group_of[i] = Some(i);
            stack.push(block);
            continue;
        }

        let Some(top) = stack.last_mut() else {
            // Top-level instruction outside any block.
            continue;
        };
        group_of[i] = Some(top.head);
        top.required |= instr.op().required_context();
        top.inputs.extend(instr.inputs().iter().copied());
        top.provided.extend(instr.all_outputs());
        // Continuations like BeginElse also contribute their opened context.
        if instr.is_block_begin() {
            top.opened |= instr.op().opened_context();
        }

        if is_pure_end(instr) {
            let block = stack.pop().expect("an open block was just inspected");
            let summary = BlockSummary {
                end: i,
                required_context: block.required.difference(block.opened),
                required_inputs: block.inputs.subtracting(&block.provided),
                provided: block.provided.clone(),
            };
            if let Some(parent) = stack.last_mut() {
                parent.required |= summary.required_context;
                parent.inputs.form_union(&block.inputs);
                parent.provided.form_union(&block.provided);
            }
            summaries.insert(block.head, summary);
        }
    }
    debug_assert!(stack.is_empty(), "donor programs have matched blocks");

    DonorAnalysis { summaries, group_of, parent_group }
}

impl ProgramBuilder {
    /// Splices a random slice of `donor` into the current position,
    /// merging dataflow with the host. Returns the number of appended
    /// instructions.
    pub fn splice_from(&mut self, donor: &Program) -> Result<usize, SpliceError> {
        self.splice_from_at(donor, None, true)
    }

    /// Splicing entry point with explicit knobs: a caller-chosen root
    /// instruction and whether donor outputs may be remapped onto host
    /// variables.
    pub fn splice_from_at(
        &mut self,
        donor: &Program,
        root: Option<usize>,
        merge_dataflow: bool,
    ) -> Result<usize, SpliceError> {
        if donor.is_empty() {
            return Err(SpliceError::NoCandidates);
        }
        let analysis = analyze_donor(donor);
        let host_context = self.context();
        let p_outer = self.config.splice_outer_remap_prob;
        let p_inner = self.config.splice_inner_remap_prob;
        let p_mutating = self.config.splice_mutating_include_prob;

        // === Pass 2: candidate selection ===
        let n = donor.size();
        let mut donor_types = TypeAnalyzer::new(std::rc::Rc::clone(&self.env));
        let mut available = VariableSet::new();
        let mut remapped: VariableMap<Variable> = VariableMap::new();
        let mut candidates = vec![false; n];

        for (i, instr) in donor.code().iter().enumerate() {
            let includable = self.is_splice_candidate(
                instr,
                i,
                &analysis,
                host_context,
                &available,
            );
            donor_types.analyze(instr);

            if merge_dataflow {
                let (outer_p, inner_p) = if includable {
                    (p_outer, p_inner)
                } else {
                    (1.0, 1.0)
                };
                let outputs: Vec<Variable> = instr.outputs().to_vec();
                for v in outputs {
                    self.maybe_remap(v, outer_p, &donor_types, &mut remapped, &mut available);
                }
                let inner: Vec<Variable> = instr.inner_outputs().to_vec();
                for v in inner {
                    self.maybe_remap(v, inner_p, &donor_types, &mut remapped, &mut available);
                }
            }

            if includable {
                candidates[i] = true;
                available.extend(instr.all_outputs());
                if is_pure_begin(instr) {
                    if let Some(summary) = analysis.summaries.get(&i) {
                        available.form_union(&summary.provided);
                    }
                }
            }
        }

        // === Pass 3: root selection ===
        let root = match root {
            Some(index) => {
                if !candidates.get(index).copied().unwrap_or(false) {
                    return Err(SpliceError::NoCandidates);
                }
                index
            }
            None => {
                // Trivial value loads make boring slices; exclude them.
                let roots: Vec<usize> = (0..n)
                    .filter(|&i| candidates[i])
                    .filter(|&i| {
                        let op = donor.code()[i].op();
                        !(op.is_simple() && op.num_inputs() == 0)
                    })
                    .collect();
                if roots.is_empty() {
                    return Err(SpliceError::NoCandidates);
                }
                roots[self.rng.gen_range(0..roots.len())]
            }
        };

        // === Pass 4: slice computation ===
        let mut slice = vec![false; n];
        let mut required = VariableSet::new();
        let mut full_groups: AHashSet<usize> = AHashSet::new();

        let include = |i: usize,
                           slice: &mut Vec<bool>,
                           required: &mut VariableSet,
                           full_groups: &mut AHashSet<usize>| {
            if slice[i] {
                return;
            }
            slice[i] = true;
            let instr = &donor.code()[i];
            for &input in instr.inputs() {
                if !remapped.contains(input) {
                    required.insert(input);
                }
            }
            // Including any structural member of a block group (its begin,
            // end, or a continuation like BeginElse) commits to the whole
            // group so the emitted code keeps its blocks matched.
            if instr.is_block_begin() || instr.is_block_end() {
                let head = analysis.group_of[i].expect("structural members have a group");
                full_groups.insert(head);
            }
        };

        include(root, &mut slice, &mut required, &mut full_groups);
        // The forward remainder of any group committed so far (and of groups
        // committed while walking) must come along as well.
        let settle_forward =
            |slice: &mut Vec<bool>, required: &mut VariableSet, full_groups: &mut AHashSet<usize>| {
                loop {
                    let mut changed = false;
                    for head in full_groups.clone() {
                        let end = analysis.summaries.get(&head).map_or(head, |s| s.end);
                        for j in head..=end {
                            if !slice[j] && Self::is_in_full_group(j, &analysis, full_groups) {
                                slice[j] = true;
                                changed = true;
                                let instr = &donor.code()[j];
                                for &input in instr.inputs() {
                                    if !remapped.contains(input) {
                                        required.insert(input);
                                    }
                                }
                                if instr.is_block_begin() || instr.is_block_end() {
                                    let h = analysis.group_of[j]
                                        .expect("structural members have a group");
                                    full_groups.insert(h);
                                }
                            }
                        }
                    }
                    if !changed {
                        return;
                    }
                }
            };
        settle_forward(&mut slice, &mut required, &mut full_groups);

        for i in (0..root).rev() {
            if slice[i] {
                continue;
            }
            let instr = &donor.code()[i];
            let in_full_group = Self::is_in_full_group(i, &analysis, &full_groups);
            let produces_required = instr.all_outputs().any(|v| required.contains(v));
            let mutates_required = candidates[i]
                && instr.inputs().iter().any(|&v| required.contains(v))
                && (instr.op().may_reassign() || instr.op().is_call())
                && self.probability(p_mutating);

            if in_full_group || produces_required || mutates_required {
                include(i, &mut slice, &mut required, &mut full_groups);
                settle_forward(&mut slice, &mut required, &mut full_groups);
            }
        }

        let count = slice.iter().filter(|included| **included).count();
        if count == 0 {
            return Err(SpliceError::EmptySlice);
        }

        // === Pass 5: emission ===
        let mut var_map = remapped;
        let mut appended = 0usize;
        for (i, instr) in donor.code().iter().enumerate() {
            if !slice[i] {
                continue;
            }
            let mut inouts: Vec<Variable> = Vec::with_capacity(instr.inouts().len());
            for &input in instr.inputs() {
                let mapped = var_map
                    .get(input)
                    .copied()
                    .expect("slice inputs are satisfied by construction");
                inouts.push(mapped);
            }
            for output in instr.all_outputs() {
                // Fresh host variables for everything the slice defines;
                // this overrides remaps of outputs whose producer ended up
                // in the slice anyway.
                let fresh = self.next_variable();
                var_map.insert(output, fresh);
                inouts.push(fresh);
            }
            self.internal_append(Instruction::new(instr.op().clone(), inouts));
            appended += 1;
        }
        Ok(appended)
    }

    fn is_in_full_group(
        index: usize,
        analysis: &DonorAnalysis,
        full_groups: &AHashSet<usize>,
    ) -> bool {
        let mut head = analysis.group_of[index];
        while let Some(h) = head {
            if full_groups.contains(&h) {
                return true;
            }
            head = analysis.parent_group[h];
        }
        false
    }

    /// The candidacy test of pass 2: context fit plus input availability,
    /// with block begins judged by their whole-group summary.
    fn is_splice_candidate(
        &self,
        instr: &Instruction,
        index: usize,
        analysis: &DonorAnalysis,
        host_context: Context,
        available: &VariableSet,
    ) -> bool {
        let op = instr.op();
        if op.is_internal() || op.is_forbidden_splice_target() {
            return false;
        }
        // Ends and continuations only travel with their group.
        if op.is_block_end() {
            return false;
        }
        if is_pure_begin(instr) {
            let Some(summary) = analysis.summaries.get(&index) else {
                return false;
            };
            host_context.contains(summary.required_context)
                && summary.required_inputs.is_subset_of(available)
        } else {
            host_context.contains(op.required_context())
                && instr.inputs().iter().all(|&v| available.contains(v))
        }
    }

    /// Attempts to remap a donor variable onto a compatible visible host
    /// variable with the given probability.
    fn maybe_remap(
        &mut self,
        donor_var: Variable,
        probability: f64,
        donor_types: &TypeAnalyzer,
        remapped: &mut VariableMap<Variable>,
        available: &mut VariableSet,
    ) {
        if remapped.contains(donor_var) || !self.probability(probability) {
            return;
        }
        let donor_type = donor_types.type_of(donor_var);
        let wanted = if donor_type.is_unknown() { Type::anything() } else { donor_type };
        let compatible: Vec<Variable> = self
            .scopes
            .visible_variables()
            .iter()
            .copied()
            .filter(|&h| {
                let host_type = self.types.type_of(h);
                let host_type = if host_type.is_unknown() { Type::anything() } else { host_type };
                wanted.is(&host_type)
            })
            .collect();
        if compatible.is_empty() {
            return;
        }
        let host_var = compatible[self.rng.gen_range(0..compatible.len())];
        remapped.insert(donor_var, host_var);
        available.insert(donor_var);
    }
}
