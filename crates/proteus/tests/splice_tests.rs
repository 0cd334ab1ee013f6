//! Tests for the splicing engine.

use std::rc::Rc;

use proteus::{
    BinaryOperator, Config, Environment, GeneratorLibrary, Operation, ProgramBuilder, SpliceError,
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

/// Donor for the function-splice scenario:
/// `v0 = 0; v1 = function(p0) { return p0 }; v3 = call v1(v0)`.
fn function_donor() -> proteus::Program {
    let mut b = ProgramBuilder::with_seed(100);
    let zero = b.load_int(0);
    let f = b.build_plain_function(1, None, |b, params| {
        b.return_value(params[0]);
    });
    b.call_function(f, &[zero]);
    b.finalize().unwrap()
}

#[test]
fn splicing_a_call_drags_in_the_whole_function() {
    let donor = function_donor();
    // The call is the last instruction.
    let root = donor.size() - 1;

    let mut b = ProgramBuilder::with_seed(101);
    let appended = b.splice_from_at(&donor, Some(root), false).unwrap();
    assert_eq!(appended, donor.size());

    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
    // Block structure survived the transplant.
    assert!(matches!(program.code()[1].op(), Operation::BeginPlainFunction { .. }));
    assert!(matches!(program.code()[3].op(), Operation::EndPlainFunction));
    assert!(matches!(program.code()[4].op(), Operation::CallFunction { .. }));
}

#[test]
fn splicing_into_a_populated_host_renumbers_variables() {
    let donor = function_donor();
    let root = donor.size() - 1;

    let mut b = ProgramBuilder::with_seed(102);
    b.load_string("host");
    b.load_string("host2");
    b.splice_from_at(&donor, Some(root), false).unwrap();
    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
    assert_eq!(program.size(), 2 + donor.size());
}

#[test]
fn merge_dataflow_remaps_inputs_and_drops_dead_producers() {
    // Donor: v0 = 0; v1 = 1; v2 = v0 + v1.
    let mut donor_builder = ProgramBuilder::with_seed(103);
    let v0 = donor_builder.load_int(0);
    let v1 = donor_builder.load_int(1);
    donor_builder.binary(BinaryOperator::Add, v0, v1);
    let donor = donor_builder.finalize().unwrap();

    // Remapping made certain: every donor output remaps onto a host
    // variable when one is compatible.
    let config = Config {
        splice_outer_remap_prob: 1.0,
        splice_inner_remap_prob: 1.0,
        ..Config::default()
    };
    let mut b = builder_with(104, config);
    let h0 = b.load_int(9);

    let appended = b.splice_from_at(&donor, Some(2), true).unwrap();
    // Both integer loads were replaced by h0; only the add survives.
    assert_eq!(appended, 1);
    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
    assert_eq!(program.size(), 2);
    assert!(matches!(program.code()[1].op(), Operation::BinaryOperation { .. }));
    assert_eq!(program.code()[1].inputs(), &[h0, h0]);
}

#[test]
fn without_remapping_the_full_dependency_chain_is_copied() {
    let mut donor_builder = ProgramBuilder::with_seed(105);
    let v0 = donor_builder.load_int(0);
    let v1 = donor_builder.load_int(1);
    donor_builder.binary(BinaryOperator::Add, v0, v1);
    let donor = donor_builder.finalize().unwrap();

    let mut b = builder_with(106, Config::default());
    b.load_int(9);
    let appended = b.splice_from_at(&donor, Some(2), false).unwrap();
    assert_eq!(appended, 3);
    assert!(b.finalize().unwrap().code().is_statically_valid());
}

#[test]
fn splice_fails_cleanly_when_no_root_is_usable() {
    // Only trivial no-input literals: no acceptable root.
    let mut donor_builder = ProgramBuilder::with_seed(107);
    donor_builder.load_int(1);
    donor_builder.load_int(2);
    let donor = donor_builder.finalize().unwrap();

    let mut b = ProgramBuilder::with_seed(108);
    b.load_int(5);
    let before = b.current_size();
    assert_eq!(b.splice_from(&donor), Err(SpliceError::NoCandidates));
    assert_eq!(b.current_size(), before);
}

#[test]
fn context_bound_instructions_cannot_be_splice_roots_outside_their_context() {
    // The return lives inside a function; a top-level host cannot take it.
    let donor = function_donor();
    let return_index = donor
        .code()
        .iter()
        .position(|i| matches!(i.op(), Operation::Return))
        .unwrap();

    let mut b = ProgramBuilder::with_seed(109);
    b.load_int(5);
    let before = b.current_size();
    assert_eq!(
        b.splice_from_at(&donor, Some(return_index), false),
        Err(SpliceError::NoCandidates)
    );
    assert_eq!(b.current_size(), before);
}

#[test]
fn splicing_inside_a_function_can_take_subroutine_code() {
    let donor = function_donor();
    let return_index = donor
        .code()
        .iter()
        .position(|i| matches!(i.op(), Operation::Return))
        .unwrap();

    let mut b = ProgramBuilder::with_seed(110);
    let mut spliced = Err(SpliceError::NoCandidates);
    b.build_plain_function(1, None, |b, _params| {
        spliced = b.splice_from_at(&donor, Some(return_index), true);
    });
    assert!(spliced.is_ok());
    assert!(b.finalize().unwrap().code().is_statically_valid());
}

#[test]
fn random_splices_preserve_all_invariants() {
    use proteus::{BuildMode, BuilderMode};
    for seed in 0..30u64 {
        let mut donor_builder = ProgramBuilder::with_seed(seed);
        donor_builder.set_mode(BuilderMode::Aggressive);
        donor_builder.build(25, BuildMode::Generating);
        let donor = donor_builder.finalize().unwrap();

        let mut b = ProgramBuilder::with_seed(seed + 1000);
        b.set_mode(BuilderMode::Aggressive);
        b.build(10, BuildMode::Generating);
        match b.splice_from(&donor) {
            Ok(appended) => assert!(appended > 0, "seed {seed}: empty successful splice"),
            Err(_) => continue,
        }
        let program = b
            .finalize()
            .unwrap_or_else(|err| panic!("seed {seed}: splice broke the host: {err}"));
        assert!(program.code().is_statically_valid(), "seed {seed}");
    }
}

#[test]
fn spliced_programs_round_trip_through_the_wire_format() {
    let donor = function_donor();
    let mut b = ProgramBuilder::with_seed(111);
    b.splice_from_at(&donor, Some(donor.size() - 1), false).unwrap();
    let program = b.finalize().unwrap();
    let bytes = program.dump();
    let loaded = proteus::Program::load(&bytes).unwrap();
    assert_eq!(loaded.dump(), bytes);
}
