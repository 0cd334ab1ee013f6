use std::{env, process::ExitCode, rc::Rc, time::Instant};

use proteus::{
    BasicCorpus, Config, CoverageEvaluator, EdgeSet, Event, Fuzzer, LogLevel, MockRunner,
    new_shared_edge_map, stderr_log_listener,
};

const NUM_EDGES: usize = 1 << 16;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let iterations: usize = match args.get(1).map(|s| s.parse()) {
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            eprintln!("usage: proteus [iterations] [seed]");
            return ExitCode::FAILURE;
        }
        None => 2000,
    };
    let seed: u64 = match args.get(2).map(|s| s.parse()) {
        Some(Ok(s)) => s,
        Some(Err(_)) => {
            eprintln!("usage: proteus [iterations] [seed]");
            return ExitCode::FAILURE;
        }
        None => 0x5eed,
    };

    let config = Config { seed, ..Config::default() };
    let edge_map = new_shared_edge_map(NUM_EDGES);
    let runner = MockRunner::new(Rc::clone(&edge_map), NUM_EDGES).crashing_on("Proxy");
    let evaluator = CoverageEvaluator::new(edge_map, NUM_EDGES, config.edge_reset_threshold);
    let corpus: BasicCorpus<EdgeSet> = BasicCorpus::new(1024, config.min_mutations_per_sample);

    let mut fuzzer = Fuzzer::new(config, runner, evaluator, corpus);
    fuzzer.events_mut().add_listener(stderr_log_listener(LogLevel::Info));
    fuzzer.events_mut().add_listener(|event| {
        if let Event::CrashFound(program) = event {
            eprintln!("crashing program has {} instructions", program.size());
        }
    });

    fuzzer.start();
    let start = Instant::now();
    fuzzer.run(iterations);
    let elapsed = start.elapsed();
    fuzzer.shutdown();

    let stats = fuzzer.stats();
    println!("ran {} executions in {elapsed:?}", stats.total_executions);
    println!(
        "valid: {}, interesting: {}, crashes: {}, failed mutations: {}",
        stats.valid_programs, stats.interesting_programs, stats.crashes_found, stats.failed_mutations
    );
    println!(
        "corpus size: {}, coverage: {:.2}%",
        proteus::Corpus::size(fuzzer.corpus()),
        fuzzer.evaluator().coverage() * 100.0
    );
    ExitCode::SUCCESS
}
