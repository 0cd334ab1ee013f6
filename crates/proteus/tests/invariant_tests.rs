//! Randomized invariant checks over generated and mutated programs.
//!
//! These re-derive analyzer state from finalized programs and cross-check it
//! against what the builder maintained incrementally, and they sweep the
//! splicing probability knobs instead of trusting the defaults.

use std::rc::Rc;

use proteus::{
    BuildMode, BuilderMode, Config, Context, Environment, GeneratorLibrary, Mutator,
    ProgramBuilder, Variable, default_mutators,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn builder_with(seed: u64, config: Config) -> ProgramBuilder {
    ProgramBuilder::new(
        Rc::new(Environment::javascript()),
        Rc::new(config),
        Rc::new(GeneratorLibrary::default()),
        ChaCha8Rng::seed_from_u64(seed),
    )
}

fn random_program(seed: u64, budget: usize) -> proteus::Program {
    let mut b = ProgramBuilder::with_seed(seed);
    b.set_mode(BuilderMode::Aggressive);
    b.build(budget, BuildMode::Generating);
    b.finalize().unwrap()
}

/// Re-derives def-before-use and scope liveness directly from the
/// instruction list, independent of the analyzers.
fn check_integrity(program: &proteus::Program) {
    let mut scopes: Vec<Vec<Variable>> = vec![Vec::new()];
    let mut defined = 0usize;
    for (index, instr) in program.code().iter().enumerate() {
        for &input in instr.inputs() {
            assert!(
                input.number() < defined,
                "instruction {index} uses v{} before definition",
                input.number()
            );
            assert!(
                scopes.iter().any(|s| s.contains(&input)),
                "instruction {index} uses out-of-scope v{}",
                input.number()
            );
        }
        if instr.is_block_end() {
            scopes.pop().expect("matched blocks");
        }
        for &output in instr.outputs() {
            assert_eq!(output.number(), defined, "dense numbering broke at {index}");
            defined += 1;
            scopes.last_mut().unwrap().push(output);
        }
        if instr.is_block_begin() {
            scopes.push(Vec::new());
        }
        for &inner in instr.inner_outputs() {
            assert_eq!(inner.number(), defined, "dense numbering broke at {index}");
            defined += 1;
            scopes.last_mut().unwrap().push(inner);
        }
    }
    assert_eq!(scopes.len(), 1, "blocks left open");
}

/// Re-derives the active context and checks every instruction's requirement
/// against it.
fn check_contexts(program: &proteus::Program) {
    let mut stack = vec![Context::surrounding()];
    for (index, instr) in program.code().iter().enumerate() {
        if instr.is_block_end() {
            stack.pop().expect("matched blocks");
        }
        let active = stack.iter().fold(Context::empty(), |acc, c| acc | *c);
        assert!(
            active.contains(instr.op().required_context()),
            "instruction {index} ({}) runs outside its required context",
            instr.op().name()
        );
        if instr.is_block_begin() {
            stack.push(instr.op().opened_context());
        }
    }
}

#[test]
fn generated_programs_satisfy_integrity_and_context_invariants() {
    for seed in 0..40u64 {
        let program = random_program(seed, 35);
        check_integrity(&program);
        check_contexts(&program);
    }
}

#[test]
fn mutated_programs_satisfy_the_same_invariants() {
    let mutators = default_mutators();
    for seed in 0..15u64 {
        let parent = Rc::new(random_program(seed, 25));
        let donor = Rc::new(random_program(seed + 500, 20));
        for (m, mutator) in mutators.iter().enumerate() {
            let mut b = ProgramBuilder::with_seed(seed * 31 + m as u64);
            b.add_splice_donor(Rc::clone(&donor));
            let Some(child) = mutator.mutate(&parent, &mut b) else {
                continue;
            };
            assert!(
                child.code().is_statically_valid(),
                "seed {seed}, {} produced invalid code",
                mutator.name()
            );
            check_integrity(&child);
            check_contexts(&child);
        }
    }
}

#[test]
fn splice_invariants_hold_across_the_probability_knobs() {
    let knob_grid = [
        (0.0, 0.0, 0.0),
        (0.10, 0.75, 0.50),
        (0.5, 0.5, 1.0),
        (1.0, 1.0, 0.0),
        (1.0, 1.0, 1.0),
    ];
    for (outer, inner, mutating) in knob_grid {
        let config = Config {
            splice_outer_remap_prob: outer,
            splice_inner_remap_prob: inner,
            splice_mutating_include_prob: mutating,
            ..Config::default()
        };
        for seed in 0..10u64 {
            let donor = random_program(seed + 2000, 30);
            let mut b = builder_with(seed, config.clone());
            b.set_mode(BuilderMode::Aggressive);
            b.build(8, BuildMode::Generating);
            if b.splice_from(&donor).is_err() {
                continue;
            }
            let program = b.finalize().unwrap_or_else(|err| {
                panic!("knobs ({outer}, {inner}, {mutating}), seed {seed}: {err}")
            });
            check_integrity(&program);
            check_contexts(&program);
        }
    }
}

#[test]
fn type_queries_agree_with_a_rederivation() {
    // Whatever the builder claims about a variable's type, re-deriving via a
    // fresh analyzer over the finalized program agrees. Property writes
    // precede the reads here so the fuzzer-wide property table is in the
    // same state on both passes.
    use proteus::analysis::TypeAnalyzer;
    use proteus::BinaryOperator;

    let env = Rc::new(Environment::javascript());
    let mut b = ProgramBuilder::new(
        Rc::clone(&env),
        Rc::new(Config::default()),
        Rc::new(GeneratorLibrary::default()),
        ChaCha8Rng::seed_from_u64(42),
    );
    let i = b.load_int(3);
    let f = b.load_float(1.5);
    let sum = b.binary(BinaryOperator::Add, i, f);
    let s = b.load_string("tag");
    let arr = b.create_array(&[i, sum]);
    b.set_property(arr, "mark", s);
    let mark = b.get_property(arr, "mark");
    let func = b.build_plain_function(1, None, |b, params| {
        b.return_value(params[0]);
    });
    let call = b.call_function(func, &[i]);

    let claimed: Vec<_> = [i, f, sum, s, arr, mark, func, call]
        .into_iter()
        .map(|v| (v, b.type_of(v)))
        .collect();
    let program = b.finalize().unwrap();

    let mut rederived = TypeAnalyzer::new(env);
    for instr in program.code() {
        rederived.analyze(instr);
    }
    for (v, claimed_type) in claimed {
        assert_eq!(rederived.type_of(v), claimed_type, "{v}");
    }
}
