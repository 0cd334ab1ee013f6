//! Corpus contract and the in-memory ring corpus.

use std::rc::Rc;

use rand::{Rng, RngCore};

use crate::{errors::StateImportError, evaluator::Aspects, ir::Program};

/// Holds the interesting programs found so far.
pub trait Corpus<A: Aspects> {
    /// Adds a program together with the aspects that made it interesting.
    fn add(&mut self, program: Rc<Program>, aspects: &A);

    /// A random element to serve as a splice donor.
    fn random_element_for_splicing<R: RngCore>(&self, rng: &mut R) -> Option<Rc<Program>>;

    /// The program stored at a stable index below `size()`.
    fn program_at(&self, index: usize) -> Option<Rc<Program>>;

    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Indices eligible for mutation scheduling. Defaults to everything;
    /// corpora with mutation budgets narrow this down.
    fn available_pool(&self) -> Vec<usize> {
        (0..self.size()).collect()
    }

    /// Notes that the entry at `index` was handed to a mutation round.
    fn note_mutation(&mut self, index: usize) {
        let _ = index;
    }
}

struct CorpusEntry<A> {
    program: Rc<Program>,
    aspects: A,
    mutation_count: u32,
}

/// A bounded in-memory corpus.
///
/// Each entry counts how often it has been selected for mutation; entries
/// that exceeded their allowance leave the "available pool" that feeds the
/// program bandit. When the corpus outgrows its bound, the oldest
/// fully-mutated entry is dropped first.
pub struct BasicCorpus<A> {
    entries: Vec<CorpusEntry<A>>,
    max_size: usize,
    min_mutations_per_sample: u32,
}

impl<A: Aspects> BasicCorpus<A> {
    #[must_use]
    pub fn new(max_size: usize, min_mutations_per_sample: u32) -> Self {
        Self {
            entries: Vec::new(),
            max_size: max_size.max(1),
            min_mutations_per_sample,
        }
    }

    /// The aspects recorded for a corpus index.
    #[must_use]
    pub fn aspects(&self, index: usize) -> Option<&A> {
        self.entries.get(index).map(|e| &e.aspects)
    }

    #[must_use]
    pub fn mutation_count(&self, index: usize) -> u32 {
        self.entries.get(index).map_or(0, |e| e.mutation_count)
    }
}

/// Persisted corpus contents: wire-encoded programs plus their metadata.
#[derive(serde::Serialize, serde::Deserialize)]
struct CorpusState<A> {
    programs: Vec<Vec<u8>>,
    aspects: Vec<A>,
    mutation_counts: Vec<u32>,
}

impl<A> BasicCorpus<A>
where
    A: Aspects + serde::Serialize + serde::de::DeserializeOwned,
{
    /// Serializes the corpus contents for persistence or cross-instance
    /// transfer. Lineage and comments are not preserved, only the code.
    #[must_use]
    pub fn dump(&self) -> Vec<u8> {
        let state = CorpusState {
            programs: self.entries.iter().map(|e| e.program.dump()).collect(),
            aspects: self.entries.iter().map(|e| e.aspects.clone()).collect(),
            mutation_counts: self.entries.iter().map(|e| e.mutation_count).collect(),
        };
        postcard::to_allocvec(&state).expect("corpus serialization should not fail")
    }

    /// Restores a corpus persisted by [`dump`](Self::dump), re-validating
    /// every program.
    pub fn load(
        bytes: &[u8],
        max_size: usize,
        min_mutations_per_sample: u32,
    ) -> Result<Self, StateImportError> {
        let state: CorpusState<A> =
            postcard::from_bytes(bytes).map_err(|_| StateImportError::Malformed)?;
        if state.programs.len() != state.aspects.len()
            || state.programs.len() != state.mutation_counts.len()
        {
            return Err(StateImportError::Malformed);
        }
        let mut corpus = Self::new(max_size, min_mutations_per_sample);
        for ((bytes, aspects), mutation_count) in state
            .programs
            .iter()
            .zip(state.aspects)
            .zip(state.mutation_counts)
        {
            let program = Program::load(bytes).map_err(|_| StateImportError::Malformed)?;
            corpus.entries.push(CorpusEntry {
                program: Rc::new(program),
                aspects,
                mutation_count,
            });
        }
        Ok(corpus)
    }
}

impl<A: Aspects> Corpus<A> for BasicCorpus<A> {
    fn add(&mut self, program: Rc<Program>, aspects: &A) {
        let entry = CorpusEntry {
            program,
            aspects: aspects.clone(),
            mutation_count: 0,
        };
        if self.entries.len() >= self.max_size {
            // Replace in place so the indices of the other entries stay
            // stable for the program scheduler. Prefer an exhausted victim;
            // fall back to the oldest.
            let victim = self
                .entries
                .iter()
                .position(|e| e.mutation_count >= self.min_mutations_per_sample)
                .unwrap_or(0);
            self.entries[victim] = entry;
        } else {
            self.entries.push(entry);
        }
    }

    fn random_element_for_splicing<R: RngCore>(&self, rng: &mut R) -> Option<Rc<Program>> {
        if self.entries.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.entries.len());
        Some(Rc::clone(&self.entries[index].program))
    }

    fn program_at(&self, index: usize) -> Option<Rc<Program>> {
        self.entries.get(index).map(|e| Rc::clone(&e.program))
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn available_pool(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.mutation_count < self.min_mutations_per_sample)
            .map(|(i, _)| i)
            .collect()
    }

    fn note_mutation(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.mutation_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EdgeSet;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn program() -> Rc<Program> {
        Rc::new(Program::default())
    }

    #[test]
    fn pool_shrinks_as_entries_are_mutated() {
        let mut corpus = BasicCorpus::new(8, 2);
        corpus.add(program(), &EdgeSet::new(vec![1]));
        corpus.add(program(), &EdgeSet::new(vec![2]));
        assert_eq!(corpus.available_pool(), vec![0, 1]);
        corpus.note_mutation(0);
        corpus.note_mutation(0);
        assert_eq!(corpus.available_pool(), vec![1]);
    }

    #[test]
    fn bounded_size_evicts_exhausted_entries_first(){
        let mut corpus = BasicCorpus::new(2, 1);
        corpus.add(program(), &EdgeSet::new(vec![1]));
        corpus.add(program(), &EdgeSet::new(vec![2]));
        corpus.note_mutation(1);
        corpus.add(program(), &EdgeSet::new(vec![3]));
        assert_eq!(corpus.size(), 2);
        // Entry 1 (exhausted) was evicted; entry 0 survives.
        assert_eq!(corpus.aspects(0).unwrap().edges(), &[1]);
    }

    #[test]
    fn splicing_draws_from_the_corpus() {
        let mut corpus = BasicCorpus::new(4, 4);
        assert!(corpus.random_element_for_splicing(&mut ChaCha8Rng::seed_from_u64(0)).is_none());
        corpus.add(program(), &EdgeSet::new(vec![1]));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(corpus.random_element_for_splicing(&mut rng).is_some());
    }
}
