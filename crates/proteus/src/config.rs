//! Engine configuration.

use std::time::Duration;

/// Tunables for one fuzzer instance.
///
/// Every probability and threshold the engine consults lives here so that
/// tests can pin them instead of depending on hard-coded constants.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Seed for the instance RNG. All randomness is derived from it.
    pub seed: u64,

    /// Rough number of instructions `build` aims for when growing programs.
    pub default_build_budget: usize,

    /// Probability of remapping a regular output during splice candidate
    /// selection (requires merge-dataflow).
    pub splice_outer_remap_prob: f64,
    /// Probability of remapping an inner output (e.g. a parameter) during
    /// splice candidate selection.
    pub splice_inner_remap_prob: f64,
    /// Probability of dragging a mutating candidate into a slice for its
    /// side effect alone.
    pub splice_mutating_include_prob: f64,

    /// Bounds for the per-block budget fraction handed to recursive
    /// generators.
    pub min_recursive_budget_fraction: f64,
    pub max_recursive_budget_fraction: f64,
    /// Below this remaining budget, only non-recursive generators run.
    pub min_budget_for_recursive_generation: usize,
    /// Abort a build after this many consecutive zero-instruction attempts.
    pub max_consecutive_build_failures: usize,
    /// How many corpus programs are pre-sampled as splice donors per builder.
    pub num_splice_donors: usize,

    /// Number of consecutive mutations applied to a selected sample.
    pub mutations_per_sample_round: usize,

    /// Size of the program bandit's cache of corpus samples.
    pub program_cache_size: usize,
    /// Mutations a corpus sample receives before it leaves the available
    /// pool of the program bandit.
    pub min_mutations_per_sample: u32,
    /// Critical-mass windows between cache regenerations.
    pub regenerate_threshold: u32,
    /// Bandit iterations before a full restart.
    pub restart_threshold: u64,
    /// Bandit iterations between weight rescales.
    pub rescale_interval: u64,

    /// Tunable for the non-deterministic edge reset heuristic of the
    /// coverage evaluator.
    pub edge_reset_threshold: u32,

    /// Per-execution timeout handed to the runner.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0x50c4_93bd,
            default_build_budget: 50,
            splice_outer_remap_prob: 0.10,
            splice_inner_remap_prob: 0.75,
            splice_mutating_include_prob: 0.50,
            min_recursive_budget_fraction: 0.05,
            max_recursive_budget_fraction: 0.50,
            min_budget_for_recursive_generation: 5,
            max_consecutive_build_failures: 10,
            num_splice_donors: 5,
            mutations_per_sample_round: 5,
            program_cache_size: 32,
            min_mutations_per_sample: 16,
            regenerate_threshold: 8,
            restart_threshold: 100_000,
            rescale_interval: 4096,
            edge_reset_threshold: 1000,
            timeout: Duration::from_millis(250),
        }
    }
}
