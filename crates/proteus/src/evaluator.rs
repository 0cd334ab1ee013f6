//! Evaluator contract and the canonical edge-coverage evaluator.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    errors::StateImportError,
    execution::{Execution, Outcome, SharedEdgeMap, edge_is_set},
    ir::Program,
};

/// Opaque summary of what made an execution interesting.
pub trait Aspects: Clone + std::fmt::Debug {
    /// A scalar size used for reward computation; defaults to one unit per
    /// interesting finding.
    fn magnitude(&self) -> f64 {
        1.0
    }
}

/// The canonical aspects: indices of newly discovered coverage edges,
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EdgeSet {
    edges: Vec<u32>,
}

impl EdgeSet {
    #[must_use]
    pub fn new(mut edges: Vec<u32>) -> Self {
        edges.sort_unstable();
        edges.dedup();
        Self { edges }
    }

    #[must_use]
    pub fn edges(&self) -> &[u32] {
        &self.edges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Aspects for EdgeSet {
    fn magnitude(&self) -> f64 {
        self.edges.len() as f64
    }
}

/// Judges executions and distills the interesting ones into aspects.
pub trait Evaluator {
    type Aspects: Aspects;

    /// Evaluates a regular execution; `Some` if it uncovered something new.
    fn evaluate(&mut self, execution: &Execution) -> Option<Self::Aspects>;

    /// Evaluates a crashing execution.
    fn evaluate_crash(&mut self, execution: &Execution) -> Option<Self::Aspects>;

    /// True if the given execution still exhibits `aspects`.
    fn has_aspects(&mut self, execution: &Execution, aspects: &Self::Aspects) -> bool;

    /// Intersects `aspects` with what the most recent execution of
    /// `program` actually triggered. Callers re-run the program first.
    fn compute_aspect_intersection(
        &mut self,
        program: &Program,
        aspects: &Self::Aspects,
    ) -> Option<Self::Aspects>;

    /// Serializes the evaluator's persistent state.
    fn export_state(&self) -> Vec<u8>;

    /// Restores persistent state exported by a compatible instance.
    fn import_state(&mut self, bytes: &[u8]) -> Result<(), StateImportError>;

    /// Discards all persistent state.
    fn reset_state(&mut self);
}

/// Persistent evaluator state, as serialized by `export_state`.
#[derive(serde::Serialize, serde::Deserialize)]
struct CoverageState {
    num_edges: u32,
    found: Vec<u8>,
    crash_found: Vec<u8>,
}

/// Edge-coverage evaluator over a shared per-execution bitmap.
///
/// Keeps a persistent map of every edge seen so far (the complement of the
/// classic "virgin" map) plus a separate map for edges seen in crashing
/// executions, and optionally per-edge hit counts. Edges that repeatedly
/// fail to reproduce during aspect intersection are treated as
/// non-deterministic and reset, so they can be rediscovered cleanly; the
/// threshold is a tunable, not a contract.
pub struct CoverageEvaluator {
    shared: SharedEdgeMap,
    num_edges: usize,
    found: Vec<u8>,
    crash_found: Vec<u8>,
    hit_counts: Vec<u32>,
    flaky_observations: AHashMap<u32, u32>,
    edge_reset_threshold: u32,
    edges_reset: u64,
}

impl CoverageEvaluator {
    #[must_use]
    pub fn new(shared: SharedEdgeMap, num_edges: usize, edge_reset_threshold: u32) -> Self {
        let words = num_edges.div_ceil(8);
        Self {
            shared,
            num_edges,
            found: vec![0; words],
            crash_found: vec![0; words],
            hit_counts: vec![0; num_edges],
            flaky_observations: AHashMap::new(),
            edge_reset_threshold,
            edges_reset: 0,
        }
    }

    /// Fraction of known edges discovered so far.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        let found: usize = (0..self.num_edges)
            .filter(|&e| edge_is_set(&self.found, e))
            .count();
        found as f64 / self.num_edges as f64
    }

    #[must_use]
    pub fn num_edges_reset(&self) -> u64 {
        self.edges_reset
    }

    #[must_use]
    pub fn hit_count(&self, edge: u32) -> u32 {
        self.hit_counts.get(edge as usize).copied().unwrap_or(0)
    }

    fn current_edges(&self) -> Vec<u32> {
        let shared = self.shared.borrow();
        (0..self.num_edges)
            .filter(|&e| edge_is_set(&shared, e))
            .map(|e| e as u32)
            .collect()
    }

    fn diff_against(&mut self, persistent: PersistentMap) -> Option<EdgeSet> {
        let current = self.current_edges();
        let mut new_edges = Vec::new();
        for &edge in &current {
            self.hit_counts[edge as usize] += 1;
            let map = match persistent {
                PersistentMap::Found => &mut self.found,
                PersistentMap::CrashFound => &mut self.crash_found,
            };
            if !edge_is_set(map, edge as usize) {
                crate::execution::set_edge(map, edge as usize);
                new_edges.push(edge);
            }
        }
        if new_edges.is_empty() {
            None
        } else {
            Some(EdgeSet::new(new_edges))
        }
    }
}

#[derive(Clone, Copy)]
enum PersistentMap {
    Found,
    CrashFound,
}

impl Evaluator for CoverageEvaluator {
    type Aspects = EdgeSet;

    fn evaluate(&mut self, execution: &Execution) -> Option<EdgeSet> {
        if execution.outcome != Outcome::Succeeded {
            return None;
        }
        self.diff_against(PersistentMap::Found)
    }

    fn evaluate_crash(&mut self, execution: &Execution) -> Option<EdgeSet> {
        if !execution.outcome.is_crash() {
            return None;
        }
        self.diff_against(PersistentMap::CrashFound)
    }

    fn has_aspects(&mut self, execution: &Execution, aspects: &EdgeSet) -> bool {
        if execution.outcome != Outcome::Succeeded {
            return false;
        }
        let shared = self.shared.borrow();
        aspects.edges().iter().all(|&e| edge_is_set(&shared, e as usize))
    }

    fn compute_aspect_intersection(
        &mut self,
        _program: &Program,
        aspects: &EdgeSet,
    ) -> Option<EdgeSet> {
        let shared = Rc::clone(&self.shared);
        let map = shared.borrow();
        let mut surviving = Vec::new();
        for &edge in aspects.edges() {
            if edge_is_set(&map, edge as usize) {
                surviving.push(edge);
            } else {
                // The edge did not reproduce; after enough failed
                // observations it is treated as non-deterministic and its
                // discovery is forgotten.
                let observations = self.flaky_observations.entry(edge).or_insert(0);
                *observations += 1;
                if *observations >= self.edge_reset_threshold {
                    let byte = edge as usize / 8;
                    self.found[byte] &= !(1 << (edge as usize % 8));
                    self.flaky_observations.remove(&edge);
                    self.edges_reset += 1;
                }
            }
        }
        if surviving.is_empty() {
            None
        } else {
            Some(EdgeSet::new(surviving))
        }
    }

    fn export_state(&self) -> Vec<u8> {
        let state = CoverageState {
            num_edges: self.num_edges as u32,
            found: self.found.clone(),
            crash_found: self.crash_found.clone(),
        };
        postcard::to_allocvec(&state).expect("coverage state serialization should not fail")
    }

    fn import_state(&mut self, bytes: &[u8]) -> Result<(), StateImportError> {
        let state: CoverageState =
            postcard::from_bytes(bytes).map_err(|_| StateImportError::Malformed)?;
        if state.num_edges as usize != self.num_edges {
            return Err(StateImportError::ShapeMismatch {
                expected: self.num_edges,
                found: state.num_edges as usize,
            });
        }
        self.found = state.found;
        self.crash_found = state.crash_found;
        Ok(())
    }

    fn reset_state(&mut self) {
        self.found.fill(0);
        self.crash_found.fill(0);
        self.hit_counts.fill(0);
        self.flaky_observations.clear();
        self.edges_reset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{new_shared_edge_map, set_edge};
    use std::time::Duration;

    fn exec() -> Execution {
        Execution::succeeded(Duration::from_micros(10))
    }

    #[test]
    fn new_edges_are_reported_once() {
        let shared = new_shared_edge_map(64);
        let mut evaluator = CoverageEvaluator::new(Rc::clone(&shared), 64, 1000);

        set_edge(&mut shared.borrow_mut(), 3);
        set_edge(&mut shared.borrow_mut(), 9);
        let aspects = evaluator.evaluate(&exec()).unwrap();
        assert_eq!(aspects.edges(), &[3, 9]);

        // Same edges again: nothing new.
        assert!(evaluator.evaluate(&exec()).is_none());
    }

    #[test]
    fn state_round_trips_and_rejects_mismatched_shape() {
        let shared = new_shared_edge_map(64);
        let mut evaluator = CoverageEvaluator::new(Rc::clone(&shared), 64, 1000);
        set_edge(&mut shared.borrow_mut(), 5);
        evaluator.evaluate(&exec());

        let state = evaluator.export_state();
        let mut fresh = CoverageEvaluator::new(new_shared_edge_map(64), 64, 1000);
        fresh.import_state(&state).unwrap();
        // Edge 5 is already known to the restored instance.
        set_edge(&mut fresh.shared.borrow_mut(), 5);
        assert!(fresh.evaluate(&exec()).is_none());

        let mut other = CoverageEvaluator::new(new_shared_edge_map(128), 128, 1000);
        assert!(matches!(
            other.import_state(&state),
            Err(StateImportError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn flaky_edges_are_reset_after_enough_misses() {
        let shared = new_shared_edge_map(64);
        let mut evaluator = CoverageEvaluator::new(Rc::clone(&shared), 64, 2);
        set_edge(&mut shared.borrow_mut(), 7);
        let aspects = evaluator.evaluate(&exec()).unwrap();

        // The edge stops reproducing.
        shared.borrow_mut().fill(0);
        let program = Program::default();
        assert!(evaluator.compute_aspect_intersection(&program, &aspects).is_none());
        assert!(evaluator.compute_aspect_intersection(&program, &aspects).is_none());
        assert_eq!(evaluator.num_edges_reset(), 1);

        // After the reset the edge counts as new again.
        set_edge(&mut shared.borrow_mut(), 7);
        assert!(evaluator.evaluate(&exec()).is_some());
    }
}
