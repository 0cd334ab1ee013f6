//! The engine driver.
//!
//! [`Fuzzer`] is the context object that owns everything with shared mutable
//! state: the RNG, the environment, the generator library, the mutators and
//! both bandit schedulers, the corpus, the evaluator, the runner, and the
//! event registry. One fuzzer instance is strictly single-threaded;
//! parallelism comes from running several independent instances.
//!
//! The iteration loop is the classic mutation engine: pick a corpus sample
//! (program bandit), pick a mutator (mutator bandit, frozen before the
//! mutator runs), apply a round of consecutive mutations, execute and
//! evaluate each result, and feed the outcomes back to the schedulers
//! strictly after the executions completed.

use std::rc::Rc;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    bandit::{MutatorScheduler, ProgramScheduler},
    builder::{BuildMode, BuilderMode, ProgramBuilder},
    config::Config,
    corpus::Corpus,
    environment::Environment,
    evaluator::{Aspects, Evaluator},
    events::{Event, Events, LogLevel},
    execution::Runner,
    generators::GeneratorLibrary,
    ir::Program,
    mutators::{Mutator, default_mutators},
};

/// Counters the driver maintains across iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub total_executions: u64,
    pub valid_programs: u64,
    pub interesting_programs: u64,
    pub crashes_found: u64,
    pub failed_mutations: u64,
}

/// One fuzzing instance.
pub struct Fuzzer<R, E, C>
where
    R: Runner,
    E: Evaluator,
    C: Corpus<E::Aspects>,
{
    config: Rc<Config>,
    env: Rc<Environment>,
    generators: Rc<GeneratorLibrary>,
    rng: ChaCha8Rng,
    runner: R,
    evaluator: E,
    corpus: C,
    mutators: Vec<Box<dyn Mutator>>,
    mutator_scheduler: MutatorScheduler,
    program_scheduler: ProgramScheduler,
    events: Events,
    stats: Stats,
}

impl<R, E, C> Fuzzer<R, E, C>
where
    R: Runner,
    E: Evaluator,
    C: Corpus<E::Aspects>,
{
    /// Assembles a fuzzer with the default environment, generator library,
    /// and mutator set.
    pub fn new(config: Config, runner: R, evaluator: E, corpus: C) -> Self {
        let mutators = default_mutators();
        Self::with_parts(
            config,
            runner,
            evaluator,
            corpus,
            Rc::new(Environment::javascript()),
            Rc::new(GeneratorLibrary::default()),
            mutators,
        )
    }

    /// Assembles a fuzzer from explicit parts.
    pub fn with_parts(
        config: Config,
        runner: R,
        evaluator: E,
        corpus: C,
        env: Rc<Environment>,
        generators: Rc<GeneratorLibrary>,
        mutators: Vec<Box<dyn Mutator>>,
    ) -> Self {
        debug_assert!(!mutators.is_empty(), "a fuzzer needs at least one mutator");
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mutator_scheduler = MutatorScheduler::new(
            mutators.len(),
            config.rescale_interval,
            config.restart_threshold,
        );
        let program_scheduler = ProgramScheduler::new(
            config.program_cache_size,
            config.regenerate_threshold,
            config.rescale_interval,
            config.restart_threshold,
        );
        Self {
            config: Rc::new(config),
            env,
            generators,
            rng,
            runner,
            evaluator,
            corpus,
            mutators,
            mutator_scheduler,
            program_scheduler,
            events: Events::new(),
            stats: Stats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    #[must_use]
    pub fn corpus(&self) -> &C {
        &self.corpus
    }

    #[must_use]
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut E {
        &mut self.evaluator
    }

    /// Runs a program without feeding the result into the corpus or the
    /// schedulers. Used by the minimizer to probe reduced variants.
    pub(crate) fn run_for_minimization(&mut self, program: &Rc<Program>) -> crate::execution::Execution {
        self.stats.total_executions += 1;
        self.runner.run(program, self.config.timeout)
    }

    pub fn events_mut(&mut self) -> &mut Events {
        &mut self.events
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds a fresh [`ProgramBuilder`] wired to this fuzzer: its own RNG
    /// stream split off the instance RNG, shared environment and generator
    /// library handles, and a set of pre-sampled splice donors.
    pub fn make_builder(&mut self) -> ProgramBuilder {
        let rng = ChaCha8Rng::seed_from_u64(self.rng.next_u64());
        let mut b = ProgramBuilder::new(
            Rc::clone(&self.env),
            Rc::clone(&self.config),
            Rc::clone(&self.generators),
            rng,
        );
        for _ in 0..self.config.num_splice_donors {
            if let Some(donor) = self.corpus.random_element_for_splicing(&mut self.rng) {
                b.add_splice_donor(donor);
            }
        }
        b
    }

    /// Announces the instance to its listeners.
    pub fn start(&mut self) {
        self.events.dispatch(&Event::Initialized);
        self.events.log(LogLevel::Info, "Fuzzer", "instance initialized");
    }

    /// Runs `iterations` fuzzing iterations.
    pub fn run(&mut self, iterations: usize) {
        for _ in 0..iterations {
            self.fuzz_one_iteration();
        }
    }

    /// Announces shutdown to the listeners.
    pub fn shutdown(&mut self) {
        self.events.dispatch(&Event::Shutdown);
    }

    /// One iteration: generate while the corpus is empty, mutate afterwards.
    pub fn fuzz_one_iteration(&mut self) {
        if self.corpus.is_empty() {
            self.generate_one();
        } else {
            self.mutate_one_round();
        }
    }

    /// Generates a program from scratch and processes it. Used to seed an
    /// empty corpus.
    fn generate_one(&mut self) {
        let mut b = self.make_builder();
        b.set_mode(BuilderMode::Aggressive);
        b.build(self.config.default_build_budget, BuildMode::Generating);
        match b.finalize() {
            Ok(program) => {
                let program = Rc::new(program);
                self.events.dispatch(&Event::ProgramGenerated(&program));
                self.execute_and_evaluate(&program);
            }
            Err(err) => {
                let message = format!("generated program failed to finalize: {err}");
                self.events.log(LogLevel::Warn, "Fuzzer", &message);
            }
        }
    }

    /// One mutation round: both bandit choices are frozen up front, then a
    /// batch of consecutive mutations runs, then both bandits are rewarded.
    fn mutate_one_round(&mut self) {
        let available = self.corpus.available_pool();
        let corpus_index = match self.program_scheduler.select(&available, &mut self.rng) {
            Some(index) => index,
            None => {
                // Pool exhausted or empty; fall back to a uniform pick.
                (self.rng.next_u64() % self.corpus.size() as u64) as usize
            }
        };
        let Some(parent) = self.corpus.program_at(corpus_index) else {
            return;
        };
        self.corpus.note_mutation(corpus_index);
        let mutator_index = self.mutator_scheduler.select(&mut self.rng);

        let mut current = parent;
        let mut calls = 0u64;
        let mut coverage_found = 0.0f64;
        let mut programs_found = 0u64;

        for _ in 0..self.config.mutations_per_sample_round {
            let mut b = self.make_builder();
            let result = self.mutators[mutator_index].mutate(&current, &mut b);
            calls += 1;
            let Some(mut program) = result else {
                self.stats.failed_mutations += 1;
                continue;
            };
            program.set_parent(Rc::clone(&current));
            program.record_contributor(self.mutators[mutator_index].name());
            let program = Rc::new(program);
            self.events.dispatch(&Event::ProgramGenerated(&program));
            if let Some(aspects) = self.execute_and_evaluate(&program) {
                coverage_found += aspects.magnitude();
                programs_found += 1;
                // Keep drilling into the sample that just proved fruitful.
                current = program;
            }
        }

        // Rewards happen strictly after all outcomes are known.
        self.mutator_scheduler
            .reward(mutator_index, coverage_found, calls, calls);
        self.program_scheduler
            .reward(corpus_index, programs_found as f64, calls, calls);
    }

    /// Runs a program, evaluates the result, and files it into the corpus
    /// when it proved interesting. Returns the aspects, if any.
    fn execute_and_evaluate(&mut self, program: &Rc<Program>) -> Option<E::Aspects> {
        self.events.dispatch(&Event::PreExecute(program));
        let execution = self.runner.run(program, self.config.timeout);
        self.stats.total_executions += 1;
        self.events.dispatch(&Event::PostExecute(&execution));

        if execution.outcome.is_crash() {
            self.stats.crashes_found += 1;
            let aspects = self.evaluator.evaluate_crash(&execution);
            self.events.dispatch(&Event::CrashFound(program));
            self.events.log(LogLevel::Info, "Fuzzer", "crash found");
            return aspects;
        }

        if execution.outcome != crate::execution::Outcome::Succeeded {
            return None;
        }
        self.stats.valid_programs += 1;
        self.events.dispatch(&Event::ValidProgramFound(program));

        let aspects = self.evaluator.evaluate(&execution)?;
        self.stats.interesting_programs += 1;
        self.corpus.add(Rc::clone(program), &aspects);
        self.events.dispatch(&Event::InterestingProgramFound(program));
        Some(aspects)
    }
}
