//! Tests for the binary wire format.

use proteus::{
    BinaryOperator, BuildMode, BuilderMode, Comparator, Program, ProgramBuilder, RegExpFlags,
    WireError,
};

/// A program touching most payload encodings.
fn rich_program() -> Program {
    let mut b = ProgramBuilder::with_seed(0);
    let neg = b.load_int(-123_456_789);
    let big = b.load_big_int(9_007_199_254_740_991);
    let f = b.load_float(-0.5);
    let s = b.load_string("päylöad");
    let t = b.load_bool(true);
    b.load_reg_exp("a|b", RegExpFlags::GLOBAL | RegExpFlags::UNICODE);
    let math = b.load_builtin("Math");
    let arr = b.create_array(&[neg, big, f]);
    b.set_element(arr, 3, s);
    let sum = b.binary(BinaryOperator::Add, neg, big);
    b.compare(Comparator::StrictEqual, sum, f);
    b.call_method(math, "abs", &[neg]);
    b.build_for_loop(neg, big, sum, Comparator::LessThan, BinaryOperator::Add, |b, i| {
        b.get_element(i, -1);
    });
    b.build_if_else(
        t,
        |b| {
            b.load_null();
        },
        |b| {
            b.load_undefined();
        },
    );
    b.finalize().unwrap()
}

#[test]
fn round_trip_is_byte_identical() {
    let program = rich_program();
    let bytes = program.dump();
    let loaded = Program::load(&bytes).unwrap();
    assert_eq!(loaded.dump(), bytes);
    assert_eq!(loaded.code(), program.code());
}

#[test]
fn random_programs_round_trip() {
    for seed in 0..25u64 {
        let mut b = ProgramBuilder::with_seed(seed);
        b.set_mode(BuilderMode::Aggressive);
        b.build(30, BuildMode::Generating);
        let program = b.finalize().unwrap();
        let bytes = program.dump();
        let loaded = Program::load(&bytes)
            .unwrap_or_else(|err| panic!("seed {seed}: decode failed: {err}"));
        assert_eq!(loaded.dump(), bytes, "seed {seed}");
    }
}

#[test]
fn empty_program_round_trips() {
    let mut b = ProgramBuilder::with_seed(1);
    let program = b.finalize().unwrap();
    let bytes = program.dump();
    assert_eq!(bytes, vec![0u8]);
    assert!(Program::load(&bytes).unwrap().is_empty());
}

#[test]
fn garbage_is_rejected_not_panicked_on() {
    assert!(Program::load(&[]).is_err());
    assert!(matches!(
        Program::load(&[1, 0xff]),
        Err(WireError::UnknownOperation { .. } | WireError::UnexpectedEof)
    ));
    // A valid prefix with a truncated tail.
    let bytes = rich_program().dump();
    for cut in 1..bytes.len().min(40) {
        assert!(Program::load(&bytes[..cut]).is_err(), "cut at {cut} decoded");
    }
}

#[test]
fn decoded_programs_are_revalidated() {
    // Hand-craft: tag 35 (TypeOf) reading v5 which does not exist.
    // Layout: count=1, tag=35, inout_count=2, inouts=[5, 0].
    let bytes = [1u8, 35, 2, 5, 0];
    assert!(matches!(
        Program::load(&bytes),
        Err(WireError::InvalidProgram(_))
    ));
}
