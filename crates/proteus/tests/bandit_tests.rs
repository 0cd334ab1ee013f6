//! Tests for the Exp3.1 scheduler.

use proteus::Exp3State;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[test]
fn selection_probability_matches_the_formula() {
    let mut state = Exp3State::new(3, 0, u64::MAX);
    state.set_weights(&[1.0, 2.0, 5.0]);
    let gamma = state.gamma();
    let total = 8.0;
    let probabilities = state.probabilities();
    for (index, &weight) in [1.0, 2.0, 5.0].iter().enumerate() {
        let expected = (1.0 - gamma) * weight / total + gamma / 3.0;
        assert!(
            (probabilities[index] - expected).abs() < 1e-12,
            "arm {index}: {} != {expected}",
            probabilities[index]
        );
    }
    let sum: f64 = probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-9);
}

#[test]
fn empirical_distribution_matches_weights_when_exploration_vanishes() {
    let mut state = Exp3State::new(2, 0, u64::MAX);
    // Epoch advances shrink gamma geometrically toward zero.
    for _ in 0..40 {
        state.advance_epoch();
    }
    assert!(state.gamma() < 1e-9);
    state.set_weights(&[1.0, 3.0]);

    let mut rng = ChaCha8Rng::seed_from_u64(0xdead);
    let draws = 10_000usize;
    let mut arm_two = 0usize;
    for _ in 0..draws {
        if state.select(&mut rng) == 1 {
            arm_two += 1;
        }
    }
    // P(arm 2) = 0.75; allow three binomial standard deviations.
    let expected = 0.75 * draws as f64;
    let sigma = (draws as f64 * 0.75 * 0.25).sqrt();
    let delta = (arm_two as f64 - expected).abs();
    assert!(delta < 3.0 * sigma, "got {arm_two}, expected {expected} +- {}", 3.0 * sigma);
}

#[test]
fn epoch_advances_when_the_estimate_exceeds_the_bound() {
    let mut state = Exp3State::new(2, 0, u64::MAX);
    // The first epochs have a negative bound and advance trivially.
    while state.epoch_reached() {
        state.advance_epoch();
    }
    let epoch = state.epoch();
    let gamma = state.gamma();
    assert!(gamma < 1.0);

    // Escalating rewards keep the z-score positive, growing the winning
    // arm's estimated total reward until it crosses the epoch bound.
    let mut reward = 1.0;
    let mut iterations = 0;
    while !state.epoch_reached() {
        state.update(0, reward);
        reward *= 2.0;
        iterations += 1;
        assert!(iterations < 10_000, "epoch bound never reached");
    }
    let before = state.arm(0).estimated_total_reward();
    assert!(before > 0.0);

    state.advance_epoch();
    assert_eq!(state.epoch(), epoch + 1);
    assert!(state.gamma() < gamma);
    assert!(state.arm(0).estimated_total_reward() == 0.0);
}

#[test]
fn counters_are_monotone_under_arbitrary_rewards() {
    let mut state = Exp3State::new(3, 16, u64::MAX);
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let mut last_counts = vec![0u64; 3];
    let mut last_sums = vec![0.0f64; 3];
    for step in 0..500 {
        let arm = state.select(&mut rng);
        // Rewards of every sign and magnitude.
        let reward = ((step % 7) as f64 - 3.0) * 10.0;
        state.update(arm, reward.abs());
        for a in 0..3 {
            assert!(state.arm(a).invocation_count() >= last_counts[a]);
            assert!(state.arm(a).sum_of_rewards() >= last_sums[a] - 1e-12);
            last_counts[a] = state.arm(a).invocation_count();
            last_sums[a] = state.arm(a).sum_of_rewards();
        }
    }
}

#[test]
fn normalized_rewards_stay_in_the_open_unit_interval() {
    let mut state = Exp3State::new(2, 0, u64::MAX);
    for reward in [0.0, 1.0, 100.0, 1e12, 3.5, 0.0, 42.0] {
        state.update(0, reward);
        let normalized = state.arm(0).last_normalized_reward();
        assert!(normalized > -1.0 && normalized < 1.0, "got {normalized}");
    }
}

#[test]
fn restart_clears_accumulators_but_not_invocation_counts() {
    let mut state = Exp3State::new(2, 0, 10);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    for i in 0..10 {
        let arm = state.select(&mut rng);
        state.update(arm, f64::from(i));
    }
    assert!(state.should_restart());
    let invocations: u64 = (0..2).map(|a| state.arm(a).invocation_count()).sum();
    state.restart();
    assert_eq!(state.trials(), 0);
    assert_eq!(state.epoch(), 0);
    let after: u64 = (0..2).map(|a| state.arm(a).invocation_count()).sum();
    assert_eq!(invocations, after);
    for a in 0..2 {
        assert_eq!(state.arm(a).sum_of_rewards(), 0.0);
        assert_eq!(state.arm(a).estimated_total_reward(), 0.0);
        let w = state.arm(a).weight();
        assert!((1.0..=4.0).contains(&w));
    }
}

#[test]
fn weights_stay_finite_under_extreme_rewards() {
    let mut state = Exp3State::new(2, 4, u64::MAX);
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    for i in 0..1000 {
        let arm = state.select(&mut rng);
        state.update(arm, (i as f64).exp2().min(1e300));
        if state.epoch_reached() {
            state.advance_epoch();
        }
    }
    for a in 0..2 {
        assert!(state.arm(a).weight().is_finite());
        assert!(state.arm(a).weight() > 0.0);
    }
}
