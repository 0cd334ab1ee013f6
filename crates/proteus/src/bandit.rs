//! Exp3.1 multi-armed bandit scheduling.
//!
//! Two instances run in parallel in a fuzzer: one over the mutators and one
//! over a sliding cache of corpus programs. The core [`Exp3State`] implements
//! the algorithm itself: epoch-based exploration rate, exponential weight
//! updates on importance-weighted rewards, periodic weight rescaling, and a
//! full restart path. Rewards are normalized to (-1, 1) with a logistic
//! z-score so that throughput spikes do not blow up the weights.

use rand::{Rng, RngCore};

/// Per-arm state.
#[derive(Debug, Clone)]
pub struct Arm {
    weight: f64,
    invocation_count: u64,
    sum_of_rewards: f64,
    sum_of_squared_rewards: f64,
    last_normalized_reward: f64,
    /// Accumulated importance-weighted reward estimate, `G` in the paper.
    estimated_total_reward: f64,
}

impl Arm {
    fn new() -> Self {
        Self {
            weight: 1.0,
            invocation_count: 0,
            sum_of_rewards: 0.0,
            sum_of_squared_rewards: 0.0,
            last_normalized_reward: 0.0,
            estimated_total_reward: 0.0,
        }
    }

    #[must_use]
    pub fn invocation_count(&self) -> u64 {
        self.invocation_count
    }

    #[must_use]
    pub fn sum_of_rewards(&self) -> f64 {
        self.sum_of_rewards
    }

    #[must_use]
    pub fn last_normalized_reward(&self) -> f64 {
        self.last_normalized_reward
    }

    #[must_use]
    pub fn estimated_total_reward(&self) -> f64 {
        self.estimated_total_reward
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Normalizes a raw reward to (-1, 1) via a z-score against this arm's
    /// running statistics, squashed through a logistic.
    fn normalize(&self, raw: f64) -> f64 {
        let n = self.invocation_count as f64;
        if n < 1.0 {
            return 0.0;
        }
        let mean = self.sum_of_rewards / n;
        let variance = (self.sum_of_squared_rewards / n - mean * mean).max(0.0);
        let sigma = variance.sqrt();
        let z = if sigma > 0.0 { (raw - mean) / sigma } else { raw - mean };
        if !z.is_finite() {
            return 0.0;
        }
        // 2 / (1 + e^-z) - 1, the logistic mapped onto (-1, 1).
        2.0 / (1.0 + (-z).exp()) - 1.0
    }
}

/// The Exp3.1 algorithm over a fixed number of arms.
#[derive(Debug, Clone)]
pub struct Exp3State {
    arms: Vec<Arm>,
    gamma: f64,
    epoch: u32,
    trials: u64,
    rescale_interval: u64,
    restart_threshold: u64,
}

impl Exp3State {
    /// Creates the state for `k` arms. `rescale_interval` bounds weight
    /// growth, `restart_threshold` bounds the total run length before the
    /// state resets itself.
    #[must_use]
    pub fn new(k: usize, rescale_interval: u64, restart_threshold: u64) -> Self {
        debug_assert!(k > 0, "a bandit needs at least one arm");
        let mut state = Self {
            arms: vec![Arm::new(); k],
            gamma: 1.0,
            epoch: 0,
            trials: 0,
            rescale_interval,
            restart_threshold,
        };
        state.gamma = state.gamma_for_epoch(0);
        state
    }

    #[must_use]
    pub fn num_arms(&self) -> usize {
        self.arms.len()
    }

    #[must_use]
    pub fn arm(&self, index: usize) -> &Arm {
        &self.arms[index]
    }

    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[must_use]
    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// The best-action reward guess for epoch `r`:
    /// `g(r) = (K ln K / (e - 1)) * 4^r`.
    #[must_use]
    pub fn best_action_guess(&self, epoch: u32) -> f64 {
        let k = self.arms.len() as f64;
        (k * k.ln().max(f64::MIN_POSITIVE) / (std::f64::consts::E - 1.0)) * 4f64.powi(epoch as i32)
    }

    fn gamma_for_epoch(&self, epoch: u32) -> f64 {
        let k = self.arms.len() as f64;
        let g = self.best_action_guess(epoch);
        if g <= 0.0 {
            return 1.0;
        }
        (k * k.ln().max(f64::MIN_POSITIVE) / ((std::f64::consts::E - 1.0) * g))
            .sqrt()
            .min(1.0)
    }

    /// The selection probability of every arm:
    /// `P(a) = (1 - γ) w_a / Σw + γ / K`.
    #[must_use]
    pub fn probabilities(&self) -> Vec<f64> {
        let total: f64 = self.arms.iter().map(|a| a.weight).sum();
        let k = self.arms.len() as f64;
        self.arms
            .iter()
            .map(|a| (1.0 - self.gamma) * a.weight / total + self.gamma / k)
            .collect()
    }

    /// Samples an arm from the selection distribution. The choice is frozen
    /// before the arm runs; updates happen strictly afterwards.
    pub fn select<R: RngCore>(&mut self, rng: &mut R) -> usize {
        self.trials += 1;
        if self.rescale_interval > 0 && self.trials % self.rescale_interval == 0 {
            self.rescale_weights();
        }
        let probabilities = self.probabilities();
        let roll: f64 = rng.gen_range(0.0..1.0);
        let mut cumulative = 0.0;
        for (index, p) in probabilities.iter().enumerate() {
            cumulative += p;
            if roll < cumulative {
                return index;
            }
        }
        self.arms.len() - 1
    }

    /// Applies one invocation's raw reward to an arm: updates the running
    /// statistics, computes the normalized reward, and performs the Exp3
    /// weight update `w <- w * exp(γ x̂ / K)` with `x̂ = reward / p`.
    pub fn update(&mut self, index: usize, raw_reward: f64) {
        let p = self.probabilities()[index];
        let k = self.arms.len() as f64;
        let gamma = self.gamma;
        let arm = &mut self.arms[index];

        arm.invocation_count += 1;
        arm.sum_of_rewards += raw_reward;
        arm.sum_of_squared_rewards += raw_reward * raw_reward;
        let normalized = arm.normalize(raw_reward);
        arm.last_normalized_reward = normalized;

        let estimate = normalized / p;
        arm.estimated_total_reward += estimate;
        arm.weight *= (gamma * estimate / k).exp();
        // exp() of a large estimate can overflow; clamp away from zero and
        // infinity, rescaling handles the rest.
        if !arm.weight.is_finite() {
            arm.weight = f64::MAX / 1e10;
        }
        if arm.weight <= 0.0 {
            arm.weight = f64::MIN_POSITIVE;
        }
    }

    /// True if the strongest arm's estimated reward exceeded the epoch
    /// budget `g(r) - K/γ`.
    #[must_use]
    pub fn epoch_reached(&self) -> bool {
        let k = self.arms.len() as f64;
        let bound = self.best_action_guess(self.epoch) - k / self.gamma;
        self.max_estimated_total_reward() > bound
    }

    #[must_use]
    pub fn max_estimated_total_reward(&self) -> f64 {
        self.arms
            .iter()
            .map(|a| a.estimated_total_reward)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Zeroes the estimated reward of the strongest arm, so the next epoch
    /// measures it afresh.
    pub fn reset_max_estimated_total_reward(&mut self) {
        let Some(best) = self
            .arms
            .iter_mut()
            .max_by(|a, b| a.estimated_total_reward.total_cmp(&b.estimated_total_reward))
        else {
            return;
        };
        best.estimated_total_reward = 0.0;
    }

    /// Moves to the next epoch: resets the winning arm's estimate,
    /// increments the epoch counter, and recomputes γ (which shrinks).
    pub fn advance_epoch(&mut self) {
        self.reset_max_estimated_total_reward();
        self.epoch += 1;
        self.gamma = self.gamma_for_epoch(self.epoch);
    }

    /// Restores arm weights, e.g. from a persisted scheduler state. The
    /// slice length must match the arm count.
    pub fn set_weights(&mut self, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.arms.len());
        for (arm, &w) in self.arms.iter_mut().zip(weights) {
            arm.weight = w.max(f64::MIN_POSITIVE);
        }
    }

    /// Linearly rescales all weights into `[1, 2K]`, preserving their
    /// relative order.
    pub fn rescale_weights(&mut self) {
        let min = self.arms.iter().map(|a| a.weight).fold(f64::INFINITY, f64::min);
        let max = self.arms.iter().map(|a| a.weight).fold(f64::NEG_INFINITY, f64::max);
        let upper = 2.0 * self.arms.len() as f64;
        if max <= min {
            for arm in &mut self.arms {
                arm.weight = 1.0;
            }
            return;
        }
        for arm in &mut self.arms {
            arm.weight = 1.0 + (arm.weight - min) / (max - min) * (upper - 1.0);
        }
    }

    /// True once the trial counter passed the restart threshold.
    #[must_use]
    pub fn should_restart(&self) -> bool {
        self.trials >= self.restart_threshold
    }

    /// Full restart: weights into `[1, 2K]`, epoch and trial counters
    /// cleared, per-arm reward accumulators cleared. Invocation counts are
    /// kept; they only ever grow.
    pub fn restart(&mut self) {
        self.rescale_weights();
        self.epoch = 0;
        self.trials = 0;
        self.gamma = self.gamma_for_epoch(0);
        for arm in &mut self.arms {
            arm.estimated_total_reward = 0.0;
            arm.sum_of_rewards = 0.0;
            arm.sum_of_squared_rewards = 0.0;
            arm.last_normalized_reward = 0.0;
        }
    }
}

/// Exp3.1 over the mutator set, with the throughput-normalized reward of
/// the specification: `(new_coverage / calls) / global_avg * iterations`.
pub struct MutatorScheduler {
    state: Exp3State,
    total_coverage: f64,
    total_calls: u64,
}

impl MutatorScheduler {
    #[must_use]
    pub fn new(num_mutators: usize, rescale_interval: u64, restart_threshold: u64) -> Self {
        Self {
            state: Exp3State::new(num_mutators, rescale_interval, restart_threshold),
            total_coverage: 0.0,
            total_calls: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> &Exp3State {
        &self.state
    }

    pub fn select<R: RngCore>(&mut self, rng: &mut R) -> usize {
        if self.state.should_restart() {
            self.state.restart();
        }
        self.state.select(rng)
    }

    /// Records the outcome of a batch of invocations of one mutator.
    pub fn reward(&mut self, mutator: usize, coverage_found: f64, calls: u64, iterations: u64) {
        self.total_coverage += coverage_found;
        self.total_calls += calls;
        let global_avg = if self.total_calls > 0 {
            (self.total_coverage / self.total_calls as f64).max(f64::MIN_POSITIVE)
        } else {
            f64::MIN_POSITIVE
        };
        let per_call = if calls > 0 { coverage_found / calls as f64 } else { 0.0 };
        let raw = per_call / global_avg * iterations as f64;
        self.state.update(mutator, raw);
        if self.state.epoch_reached() {
            self.state.advance_epoch();
        }
    }
}

/// Exp3.1 over a sliding cache of corpus programs.
///
/// The cache holds corpus indices drawn from the "available pool": samples
/// that have not yet exceeded their mutation allowance. The cache
/// regenerates every few reward windows and whenever one of its entries
/// drops out of the pool.
pub struct ProgramScheduler {
    state: Exp3State,
    cache: Vec<usize>,
    cache_size: usize,
    windows: u32,
    regenerate_threshold: u32,
}

impl ProgramScheduler {
    #[must_use]
    pub fn new(
        cache_size: usize,
        regenerate_threshold: u32,
        rescale_interval: u64,
        restart_threshold: u64,
    ) -> Self {
        Self {
            state: Exp3State::new(cache_size.max(1), rescale_interval, restart_threshold),
            cache: Vec::new(),
            cache_size: cache_size.max(1),
            windows: 0,
            regenerate_threshold,
        }
    }

    #[must_use]
    pub fn state(&self) -> &Exp3State {
        &self.state
    }

    /// The corpus indices currently cached.
    #[must_use]
    pub fn cached(&self) -> &[usize] {
        &self.cache
    }

    /// Selects a corpus index, refreshing the cache from `available` as
    /// needed. Returns `None` when the pool is empty.
    pub fn select<R: RngCore>(&mut self, available: &[usize], rng: &mut R) -> Option<usize> {
        if available.is_empty() {
            return None;
        }
        // A pool smaller than the cache cannot sustain the bandit; restart.
        if available.len() < self.cache_size && !self.cache.is_empty() {
            self.state.restart();
            self.cache.clear();
        }
        if self.state.should_restart() {
            self.state.restart();
        }
        if self.cache.is_empty() {
            self.regenerate(available, rng);
        }
        // Entries that left the pool are replaced by fresh draws with reset
        // arm statistics.
        for slot in 0..self.cache.len() {
            if !available.contains(&self.cache[slot]) {
                self.cache[slot] = available[rng.gen_range(0..available.len())];
                self.reset_arm(slot);
            }
        }
        let slot = self.state.select(rng);
        self.cache.get(slot).copied()
    }

    /// Records the outcome of a reward window for a cached sample:
    /// `(programs_found / invocations) * iterations`.
    pub fn reward(&mut self, corpus_index: usize, programs_found: f64, invocations: u64, iterations: u64) {
        let Some(slot) = self.cache.iter().position(|&c| c == corpus_index) else {
            return;
        };
        let per_invocation = if invocations > 0 {
            programs_found / invocations as f64
        } else {
            0.0
        };
        self.state.update(slot, per_invocation * iterations as f64);
        if self.state.epoch_reached() {
            self.state.advance_epoch();
        }
        self.windows += 1;
        if self.regenerate_threshold > 0 && self.windows % self.regenerate_threshold == 0 {
            self.cache.clear();
        }
    }

    fn regenerate<R: RngCore>(&mut self, available: &[usize], rng: &mut R) {
        self.cache.clear();
        for slot in 0..self.cache_size.min(available.len()) {
            self.cache.push(available[rng.gen_range(0..available.len())]);
            self.reset_arm(slot);
        }
    }

    fn reset_arm(&mut self, slot: usize) {
        if let Some(arm) = self.state.arms.get_mut(slot) {
            *arm = Arm::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn probabilities_sum_to_one() {
        let state = Exp3State::new(4, 0, u64::MAX);
        let total: f64 = state.probabilities().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn monotone_counters() {
        let mut state = Exp3State::new(2, 0, u64::MAX);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut last_count = 0;
        let mut last_sum = f64::NEG_INFINITY;
        for i in 0..100 {
            let arm = state.select(&mut rng);
            state.update(arm, f64::from(i % 5));
            let count: u64 = (0..2).map(|a| state.arm(a).invocation_count()).sum();
            let sum: f64 = (0..2).map(|a| state.arm(a).sum_of_rewards()).sum();
            assert!(count > last_count);
            assert!(sum >= last_sum);
            last_count = count;
            last_sum = sum;
        }
    }

    #[test]
    fn rescale_preserves_order() {
        let mut state = Exp3State::new(3, 0, u64::MAX);
        state.arms[0].weight = 0.5;
        state.arms[1].weight = 123.0;
        state.arms[2].weight = 7.0;
        state.rescale_weights();
        assert!(state.arms[1].weight > state.arms[2].weight);
        assert!(state.arms[2].weight > state.arms[0].weight);
        assert!(state.arms[0].weight >= 1.0);
        assert!(state.arms[1].weight <= 6.0);
    }

    #[test]
    fn program_cache_replaces_dropped_entries() {
        let mut scheduler = ProgramScheduler::new(2, 0, 0, u64::MAX);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let selected = scheduler.select(&[10, 20, 30], &mut rng);
        assert!(selected.is_some());
        // 10 and 20 leave the pool; whatever is cached must be replaced by
        // a pool member on the next selection.
        let selected = scheduler.select(&[30, 40], &mut rng).unwrap();
        assert!([30, 40].contains(&selected));
    }
}
