//! End-to-end tests driving the whole engine against the mock runner.

use std::{cell::RefCell, rc::Rc};

use proteus::{
    BasicCorpus, Config, Corpus, CoverageEvaluator, EdgeSet, Event, Fuzzer, MockRunner,
    new_shared_edge_map,
};

const NUM_EDGES: usize = 4096;

type TestFuzzer = Fuzzer<MockRunner, CoverageEvaluator, BasicCorpus<EdgeSet>>;

fn make_fuzzer(seed: u64) -> TestFuzzer {
    let config = Config { seed, ..Config::default() };
    let edge_map = new_shared_edge_map(NUM_EDGES);
    let runner = MockRunner::new(Rc::clone(&edge_map), NUM_EDGES);
    let evaluator = CoverageEvaluator::new(edge_map, NUM_EDGES, config.edge_reset_threshold);
    let corpus = BasicCorpus::new(512, config.min_mutations_per_sample);
    Fuzzer::new(config, runner, evaluator, corpus)
}

#[test]
fn the_corpus_grows_and_coverage_climbs() {
    let mut fuzzer = make_fuzzer(1);
    fuzzer.start();
    fuzzer.run(60);
    let stats = fuzzer.stats();
    assert!(stats.total_executions > 0);
    assert!(stats.interesting_programs > 0, "nothing entered the corpus");
    assert!(!fuzzer.corpus().is_empty());
    assert!(fuzzer.evaluator().coverage() > 0.0);
    fuzzer.shutdown();
}

#[test]
fn iterations_are_deterministic_under_seed() {
    let run = |seed: u64| {
        let mut fuzzer = make_fuzzer(seed);
        fuzzer.run(40);
        let stats = fuzzer.stats();
        (
            stats.total_executions,
            stats.interesting_programs,
            Corpus::size(fuzzer.corpus()),
        )
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn lifecycle_events_fire_in_order() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut fuzzer = make_fuzzer(3);
    {
        let seen = Rc::clone(&seen);
        fuzzer.events_mut().add_listener(move |event| {
            let tag = match event {
                Event::Initialized => "init",
                Event::Shutdown => "shutdown",
                Event::ProgramGenerated(_) => "generated",
                Event::PreExecute(_) => "pre",
                Event::PostExecute(_) => "post",
                Event::ValidProgramFound(_) => "valid",
                Event::InterestingProgramFound(_) => "interesting",
                Event::CrashFound(_) => "crash",
                Event::Log { .. } => return,
            };
            seen.borrow_mut().push(tag);
        });
    }
    fuzzer.start();
    fuzzer.fuzz_one_iteration();
    fuzzer.shutdown();

    let seen = seen.borrow();
    assert_eq!(seen.first(), Some(&"init"));
    assert_eq!(seen.last(), Some(&"shutdown"));
    let pre = seen.iter().position(|&t| t == "pre").unwrap();
    let post = seen.iter().position(|&t| t == "post").unwrap();
    assert!(pre < post);
    assert!(seen.contains(&"generated"));
}

#[test]
fn crashes_are_detected_and_reported() {
    let config = Config { seed: 11, ..Config::default() };
    let edge_map = new_shared_edge_map(NUM_EDGES);
    // Every builtin load of "Math" takes the target down.
    let runner = MockRunner::new(Rc::clone(&edge_map), NUM_EDGES).crashing_on("Math");
    let evaluator = CoverageEvaluator::new(edge_map, NUM_EDGES, config.edge_reset_threshold);
    let corpus = BasicCorpus::new(512, config.min_mutations_per_sample);
    let mut fuzzer = Fuzzer::new(config, runner, evaluator, corpus);

    let crashes = Rc::new(RefCell::new(0usize));
    {
        let crashes = Rc::clone(&crashes);
        fuzzer.events_mut().add_listener(move |event| {
            if matches!(event, Event::CrashFound(_)) {
                *crashes.borrow_mut() += 1;
            }
        });
    }
    fuzzer.run(400);
    assert_eq!(fuzzer.stats().crashes_found as usize, *crashes.borrow());
    assert!(
        fuzzer.stats().crashes_found > 0,
        "the builtin generator never hit the poison builtin in 400 iterations"
    );
}

#[test]
fn mutated_programs_record_their_lineage() {
    let mut fuzzer = make_fuzzer(5);
    let parents = Rc::new(RefCell::new(0usize));
    {
        let parents = Rc::clone(&parents);
        fuzzer.events_mut().add_listener(move |event| {
            if let Event::ProgramGenerated(program) = event {
                if program.parent().is_some() {
                    *parents.borrow_mut() += 1;
                }
            }
        });
    }
    fuzzer.run(50);
    assert!(*parents.borrow() > 0, "no mutation produced a child program");
}

#[test]
fn make_builder_presets_splice_donors_once_the_corpus_is_populated() {
    let mut fuzzer = make_fuzzer(6);
    fuzzer.run(30);
    assert!(!fuzzer.corpus().is_empty());
    let mut b = fuzzer.make_builder();
    assert!(b.rand_donor().is_some());
}

#[test]
fn minimization_shrinks_without_losing_validity() {
    let mut fuzzer = make_fuzzer(9);
    fuzzer.run(20);
    assert!(!fuzzer.corpus().is_empty());
    let program = fuzzer.corpus().program_at(0).unwrap();
    let aspects = fuzzer.corpus().aspects(0).unwrap().clone();

    let (reduced, result) = fuzzer.minimize(&program, &aspects);
    assert!(reduced.size() <= program.size());
    assert_eq!(program.size() - reduced.size(), result.removed);
    assert!(reduced.code().is_statically_valid());
}

#[test]
fn corpus_state_survives_a_round_trip() {
    let mut fuzzer = make_fuzzer(10);
    fuzzer.run(30);
    let corpus = fuzzer.corpus();
    assert!(!corpus.is_empty());

    let bytes = corpus.dump();
    let restored: BasicCorpus<EdgeSet> =
        BasicCorpus::load(&bytes, 512, fuzzer.config().min_mutations_per_sample).unwrap();
    assert_eq!(Corpus::size(corpus), Corpus::size(&restored));
    for index in 0..Corpus::size(corpus) {
        let original = corpus.program_at(index).unwrap();
        let loaded = restored.program_at(index).unwrap();
        assert_eq!(original.dump(), loaded.dump());
        assert_eq!(corpus.aspects(index), restored.aspects(index));
    }
    assert!(BasicCorpus::<EdgeSet>::load(&bytes[..bytes.len() / 2], 512, 16).is_err());
}
