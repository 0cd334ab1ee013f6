//! Runner contract and execution outcomes.
//!
//! The real target runner (subprocess control, pipes at fixed descriptors,
//! the shared-memory coverage region) lives outside the core; the core only
//! defines the data it produces and a [`MockRunner`] that emulates a target
//! in-process for tests and demos.

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::ir::{Operation, Program};

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// Normal exit with a non-zero status.
    Failed(i32),
    /// Terminated by a signal.
    Crashed(i32),
    TimedOut,
}

impl Outcome {
    #[must_use]
    pub fn is_crash(self) -> bool {
        matches!(self, Self::Crashed(_))
    }
}

/// The observable result of running one program on the target.
#[derive(Debug, Clone)]
pub struct Execution {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
    /// Output of the target's dedicated fuzzer channel.
    pub fuzzout: String,
    pub exec_time: Duration,
}

impl Execution {
    /// An execution that finished cleanly with no output.
    #[must_use]
    pub fn succeeded(exec_time: Duration) -> Self {
        Self {
            outcome: Outcome::Succeeded,
            stdout: String::new(),
            stderr: String::new(),
            fuzzout: String::new(),
            exec_time,
        }
    }
}

/// Drives programs on an instrumented target.
pub trait Runner {
    /// Runs `program`, honoring `timeout`. Never fails from the core's point
    /// of view; crashes and timeouts are outcomes.
    fn run(&mut self, program: &Program, timeout: Duration) -> Execution;
}

/// The per-execution coverage bitmap a runner fills in, standing in for the
/// shared-memory region of a real target. Shared between the runner and the
/// coverage evaluator of one (single-threaded) fuzzer instance.
pub type SharedEdgeMap = Rc<RefCell<Vec<u8>>>;

/// Allocates an edge map for `num_edges` edges, all clear.
#[must_use]
pub fn new_shared_edge_map(num_edges: usize) -> SharedEdgeMap {
    Rc::new(RefCell::new(vec![0u8; num_edges.div_ceil(8)]))
}

/// Sets one edge bit.
pub fn set_edge(map: &mut [u8], edge: usize) {
    map[edge / 8] |= 1 << (edge % 8);
}

/// Reads one edge bit.
#[must_use]
pub fn edge_is_set(map: &[u8], edge: usize) -> bool {
    map[edge / 8] & (1 << (edge % 8)) != 0
}

/// An in-process stand-in for an instrumented target.
///
/// Coverage is synthesized deterministically from the program's structure:
/// every operation hashes (with a little payload salt) onto an edge index, so
/// structurally new programs discover new edges the way real targets do.
/// A program that loads the configured poison builtin "crashes".
pub struct MockRunner {
    edge_map: SharedEdgeMap,
    num_edges: usize,
    crash_builtin: Option<String>,
    executions: u64,
}

impl MockRunner {
    #[must_use]
    pub fn new(edge_map: SharedEdgeMap, num_edges: usize) -> Self {
        Self {
            edge_map,
            num_edges,
            crash_builtin: None,
            executions: 0,
        }
    }

    /// Makes the runner report a crash whenever a program loads the given
    /// builtin.
    #[must_use]
    pub fn crashing_on(mut self, builtin: impl Into<String>) -> Self {
        self.crash_builtin = Some(builtin.into());
        self
    }

    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions
    }

    fn edge_for(&self, data: &[u8]) -> usize {
        // FNV-1a; the hash must be stable across runs for determinism.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &byte in data {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.num_edges as u64) as usize
    }
}

impl Runner for MockRunner {
    fn run(&mut self, program: &Program, _timeout: Duration) -> Execution {
        self.executions += 1;
        let mut map = self.edge_map.borrow_mut();
        map.fill(0);

        let mut crashed = false;
        let mut previous = 0usize;
        for instr in program.code() {
            let op = instr.op();
            let mut key = op.name().as_bytes().to_vec();
            match op {
                Operation::LoadInteger { value } | Operation::LoadBigInt { value } => {
                    key.extend_from_slice(&value.to_le_bytes());
                }
                Operation::LoadString { value } => key.extend_from_slice(value.as_bytes()),
                Operation::LoadBuiltin { name } => {
                    key.extend_from_slice(name.as_bytes());
                    if Some(name.as_str()) == self.crash_builtin.as_deref() {
                        crashed = true;
                    }
                }
                Operation::BinaryOperation { op } => key.push(*op as u8),
                Operation::Compare { op } => key.push(*op as u8),
                Operation::GetProperty { name } | Operation::SetProperty { name } => {
                    key.extend_from_slice(name.as_bytes());
                }
                _ => {}
            }
            // Chain in the previous edge so instruction order matters, the
            // way edge coverage does.
            key.extend_from_slice(&previous.to_le_bytes());
            let edge = self.edge_for(&key);
            set_edge(&mut map, edge);
            previous = edge;
        }

        let execution = Execution::succeeded(Duration::from_micros(50));
        if crashed {
            return Execution {
                outcome: Outcome::Crashed(11),
                ..execution
            };
        }
        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;

    #[test]
    fn coverage_is_deterministic() {
        let map = new_shared_edge_map(1024);
        let mut runner = MockRunner::new(Rc::clone(&map), 1024);

        let mut b = ProgramBuilder::with_seed(1);
        let a = b.load_int(1);
        let c = b.load_int(2);
        b.binary(crate::ir::BinaryOperator::Add, a, c);
        let program = b.finalize().unwrap();

        runner.run(&program, Duration::from_millis(10));
        let first = map.borrow().clone();
        runner.run(&program, Duration::from_millis(10));
        assert_eq!(*map.borrow(), first);
    }

    #[test]
    fn poison_builtin_crashes() {
        let map = new_shared_edge_map(64);
        let mut runner = MockRunner::new(Rc::clone(&map), 64).crashing_on("Proxy");
        let mut b = ProgramBuilder::with_seed(2);
        b.load_builtin("Proxy");
        let program = b.finalize().unwrap();
        let execution = runner.run(&program, Duration::from_millis(10));
        assert!(execution.outcome.is_crash());
    }
}
