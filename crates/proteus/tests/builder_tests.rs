//! Tests for the program builder: value reuse, scoping, adoption, block
//! construction, and the build loop.

use proteus::{
    BinaryOperator, BuildMode, BuilderMode, Comparator, Operation, ProgramBuilder, Type,
};

// === Value reuse ===

#[test]
fn reuse_returns_the_existing_variable() {
    let mut b = ProgramBuilder::with_seed(1);
    let first = b.load_int(7);
    let again = b.reuse_or_load_int(7);
    assert_eq!(first, again);
    assert_eq!(b.current_size(), 1);

    let other = b.reuse_or_load_int(8);
    assert_ne!(first, other);
    assert_eq!(b.current_size(), 2);
}

#[test]
fn reuse_does_not_cross_scope_exits() {
    let mut b = ProgramBuilder::with_seed(2);
    let lhs = b.load_int(0);
    let rhs = b.load_int(10);
    b.build_while_loop(lhs, rhs, Comparator::LessThan, |b| {
        b.load_int(7);
    });
    // The inner load died with the loop scope, so a new one is emitted.
    let size_before = b.current_size();
    let v = b.reuse_or_load_int(7);
    assert_eq!(b.current_size(), size_before + 1);
    assert!(b.visible_variables().contains(&v));
    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
}

#[test]
fn reuse_is_invalidated_by_reassignment() {
    let mut b = ProgramBuilder::with_seed(3);
    let seven = b.load_int(7);
    let eight = b.load_int(8);
    b.reassign(seven, eight);
    // The variable no longer holds 7; reuse must emit a fresh load.
    let v = b.reuse_or_load_int(7);
    assert_ne!(v, seven);
    assert_eq!(b.current_size(), 4);
}

#[test]
fn reuse_tracks_types() {
    let mut b = ProgramBuilder::with_seed(4);
    let v = b.reuse_or_load_int(42);
    assert!(b.type_of(v).is(&Type::integer()));
}

// === Adoption ===

#[test]
fn adoption_is_idempotent_within_a_session() {
    let mut donor_builder = ProgramBuilder::with_seed(5);
    let a = donor_builder.load_int(1);
    let c = donor_builder.load_int(2);
    donor_builder.binary(BinaryOperator::Add, a, c);
    let donor = donor_builder.finalize().unwrap();

    let mut b = ProgramBuilder::with_seed(6);
    b.begin_adoption();
    let first = b.adopt(a);
    let second = b.adopt(a);
    assert_eq!(first, second);
    let other = b.adopt(c);
    assert_ne!(first, other);
    b.end_adoption();

    // A fresh session starts a fresh mapping.
    b.begin_adoption();
    assert_ne!(b.adopt(a), first);
    b.end_adoption();

    let _ = donor;
}

#[test]
fn append_program_copies_with_fresh_variables() {
    let mut donor_builder = ProgramBuilder::with_seed(7);
    let a = donor_builder.load_int(1);
    let c = donor_builder.load_int(2);
    donor_builder.binary(BinaryOperator::Add, a, c);
    let donor = std::rc::Rc::new(donor_builder.finalize().unwrap());

    let mut b = ProgramBuilder::with_seed(8);
    b.load_string("prefix");
    b.append_program(&donor);
    b.append_program(&donor);
    let program = b.finalize().unwrap();
    assert_eq!(program.size(), 1 + donor.size() * 2);
    assert!(program.code().is_statically_valid());
}

#[test]
fn finalize_rejects_open_adoption_sessions() {
    let mut b = ProgramBuilder::with_seed(9);
    b.load_int(1);
    b.begin_adoption();
    assert!(b.finalize().is_err());
}

// === Block construction ===

#[test]
fn block_builders_emit_matched_blocks() {
    let mut b = ProgramBuilder::with_seed(10);
    let cond = b.load_bool(true);
    b.build_if_else(
        cond,
        |b| {
            let x = b.load_int(1);
            b.unary(proteus::UnaryOperator::Minus, x);
        },
        |b| {
            b.load_float(2.5);
        },
    );
    b.build_try_catch_finally(
        |b| {
            let s = b.load_string("boom");
            b.throw_exception(s);
        },
        |b, exception| {
            b.type_of_value(exception);
        },
        |b| {
            b.load_undefined();
        },
    );
    let f = b.build_plain_function(2, None, |b, params| {
        let sum = b.binary(BinaryOperator::Add, params[0], params[1]);
        b.return_value(sum);
    });
    let arg = b.load_int(3);
    b.call_function(f, &[arg, arg]);
    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
}

#[test]
fn object_literals_and_classes_build_valid_code() {
    let mut b = ProgramBuilder::with_seed(11);
    let value = b.load_int(13);
    let obj = b.build_object_literal(|ol| {
        ol.add_property("a", value);
        ol.add_method("m", 1, |b, params| {
            b.return_value(params[0]);
        });
    });
    b.get_property(obj, "a");

    let class = b.build_class_definition(None, |cd| {
        cd.add_instance_property("x", Some(value));
        cd.add_constructor(1, |b, args| {
            b.set_property(args[0], "x", args[1]);
        });
        cd.add_instance_method("get", 0, |b, args| {
            let x = b.get_property(args[0], "x");
            b.return_value(x);
        });
    });
    let instance = b.construct(class, &[value]);
    b.call_method(instance, "get", &[]);

    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
}

#[test]
fn switch_builder_emits_cases_and_default() {
    let mut b = ProgramBuilder::with_seed(12);
    let on = b.load_int(1);
    let c0 = b.load_int(0);
    let c1 = b.load_int(1);
    b.build_switch(on, |sw| {
        sw.add_case(c0, |b| {
            b.load_string("zero");
        });
        sw.add_case(c1, |b| {
            b.load_string("one");
        });
        sw.add_default(|b| {
            b.load_string("other");
        });
    });
    let program = b.finalize().unwrap();
    assert!(program.code().is_statically_valid());
    let default_cases = program
        .code()
        .iter()
        .filter(|i| matches!(i.op(), Operation::BeginSwitchDefaultCase))
        .count();
    assert_eq!(default_cases, 1);
}

// === Variable queries ===

#[test]
fn conservative_queries_report_misses() {
    let mut b = ProgramBuilder::with_seed(13);
    b.load_int(1);
    b.set_mode(BuilderMode::Conservative);
    assert!(b.rand_var_of_type(&Type::string()).is_none());
    assert!(b.rand_var_of_type(&Type::integer()).is_some());
}

#[test]
fn aggressive_queries_never_fail_with_visible_variables() {
    let mut b = ProgramBuilder::with_seed(14);
    b.load_int(1);
    b.set_mode(BuilderMode::Aggressive);
    for _ in 0..50 {
        assert!(b.rand_var_of_type(&Type::string()).is_some());
    }
}

#[test]
fn rand_var_is_none_only_when_nothing_is_visible() {
    let mut b = ProgramBuilder::with_seed(15);
    assert!(b.rand_var().is_none());
    b.load_int(1);
    assert!(b.rand_var().is_some());
}

// === The build loop ===

#[test]
fn build_produces_valid_programs_for_every_seed_and_budget() {
    for seed in 0..20u64 {
        for budget in [1usize, 2, 5, 15, 40] {
            let mut b = ProgramBuilder::with_seed(seed);
            b.set_mode(BuilderMode::Aggressive);
            b.build(budget, BuildMode::Generating);
            let program = b.finalize().unwrap_or_else(|err| {
                panic!("seed {seed} budget {budget}: invalid program: {err}")
            });
            assert!(program.code().is_statically_valid());
            assert!(program.size() >= 1, "seed {seed} budget {budget} emitted nothing");
        }
    }
}

#[test]
fn build_overshoot_is_bounded() {
    for seed in 40..60u64 {
        let budget = 30usize;
        let mut b = ProgramBuilder::with_seed(seed);
        b.set_mode(BuilderMode::Aggressive);
        b.build(budget, BuildMode::Generating);
        // Overshoot of roughly 2x is tolerated; more means budget leaked.
        assert!(
            b.current_size() <= budget * 3,
            "seed {seed}: built {} instructions for a budget of {budget}",
            b.current_size()
        );
    }
}

#[test]
fn build_is_deterministic_under_seed() {
    let build = |seed: u64| {
        let mut b = ProgramBuilder::with_seed(seed);
        b.set_mode(BuilderMode::Aggressive);
        b.build(25, BuildMode::Generating);
        b.finalize().unwrap().dump()
    };
    assert_eq!(build(77), build(77));
    assert_ne!(build(77), build(78));
}

#[test]
fn splicing_mode_without_donors_gives_up_gracefully() {
    let mut b = ProgramBuilder::with_seed(16);
    b.load_int(5);
    let before = b.current_size();
    b.build(10, BuildMode::Splicing);
    // No donors: the loop hits its consecutive-failure valve and stops.
    assert_eq!(b.current_size(), before);
}
