//! Variables and variable sets.
//!
//! A [`Variable`] is nothing but a dense integer identifier, unique within one
//! program. [`VariableSet`] is a word-packed bitset keyed by variable number;
//! the splicer's dataflow passes lean on it heavily, so all set operations are
//! O(words) or better.

use std::fmt;

/// Maximum number of variables a single program may define.
pub const MAX_VARIABLES: usize = 0x10000;

/// A variable in the intermediate representation.
///
/// Variables carry no type information at the IR level; types are derived by
/// inference over the defining code. Uses `u32` to keep instructions compact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Variable(u32);

impl Variable {
    /// Creates a variable with the given number.
    #[inline]
    #[must_use]
    pub fn new(number: usize) -> Self {
        debug_assert!(number < MAX_VARIABLES, "variable number out of range");
        Self(number as u32)
    }

    /// Returns the variable number.
    #[inline]
    #[must_use]
    pub fn number(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

const BITS_PER_WORD: usize = 64;

/// A set of variables, backed by a word-packed bitset.
///
/// The word vector never carries trailing zero words: every mutating
/// operation trims them, so derived equality compares the logical set and two
/// sets built along different paths still compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VariableSet {
    words: Vec<u64>,
}

impl VariableSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set containing the given variables.
    #[must_use]
    pub fn from_iter(variables: impl IntoIterator<Item = Variable>) -> Self {
        let mut set = Self::new();
        for v in variables {
            set.insert(v);
        }
        set
    }

    /// Returns true if no variable is in the set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the number of variables in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Inserts a variable. Inserting a present variable is a no-op.
    pub fn insert(&mut self, v: Variable) {
        let (word, bit) = Self::index(v);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    /// Removes a variable. Removing an absent variable is a no-op.
    pub fn remove(&mut self, v: Variable) {
        let (word, bit) = Self::index(v);
        if word < self.words.len() {
            self.words[word] &= !(1 << bit);
            self.trim();
        }
    }

    /// Returns true if the variable is in the set.
    #[inline]
    #[must_use]
    pub fn contains(&self, v: Variable) -> bool {
        let (word, bit) = Self::index(v);
        word < self.words.len() && self.words[word] & (1 << bit) != 0
    }

    /// Adds all variables of `other` to this set.
    pub fn form_union(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (i, w) in other.words.iter().enumerate() {
            self.words[i] |= w;
        }
    }

    /// Removes all variables of this set that are not in `other`.
    pub fn form_intersection(&mut self, other: &Self) {
        self.words.truncate(other.words.len());
        for (i, w) in self.words.iter_mut().enumerate() {
            *w &= other.words[i];
        }
        self.trim();
    }

    /// Removes all variables of `other` from this set.
    pub fn subtract(&mut self, other: &Self) {
        let n = self.words.len().min(other.words.len());
        for i in 0..n {
            self.words[i] &= !other.words[i];
        }
        self.trim();
    }

    /// Returns the union of the two sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.form_union(other);
        result
    }

    /// Returns the intersection of the two sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.form_intersection(other);
        result
    }

    /// Returns the variables of this set that are not in `other`.
    #[must_use]
    pub fn subtracting(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.subtract(other);
        result
    }

    /// Returns true if the two sets share no variable.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    /// Returns true if every variable of this set is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.words.len() <= other.words.len()
            && self
                .words
                .iter()
                .zip(other.words.iter())
                .all(|(a, b)| a & !b == 0)
    }

    /// Iterates over the variables in the set in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = Variable> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..BITS_PER_WORD)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| Variable::new(i * BITS_PER_WORD + bit))
        })
    }

    #[inline]
    fn index(v: Variable) -> (usize, usize) {
        (v.number() / BITS_PER_WORD, v.number() % BITS_PER_WORD)
    }

    /// Drops trailing zero words so that equality stays logical.
    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<Variable> for VariableSet {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        Self::from_iter(iter)
    }
}

impl Extend<Variable> for VariableSet {
    fn extend<I: IntoIterator<Item = Variable>>(&mut self, iter: I) {
        for v in iter {
            self.insert(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: usize) -> Variable {
        Variable::new(n)
    }

    #[test]
    fn insert_remove_contains() {
        let mut set = VariableSet::new();
        assert!(set.is_empty());
        set.insert(v(3));
        set.insert(v(130));
        assert!(set.contains(v(3)));
        assert!(set.contains(v(130)));
        assert!(!set.contains(v(4)));
        assert_eq!(set.len(), 2);
        set.remove(v(130));
        assert!(!set.contains(v(130)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn equality_ignores_trailing_words() {
        let mut a = VariableSet::new();
        a.insert(v(1));
        let mut b = VariableSet::new();
        b.insert(v(1));
        b.insert(v(200));
        b.remove(v(200));
        assert_eq!(a, b);
    }

    #[test]
    fn set_algebra() {
        let a = VariableSet::from_iter([v(0), v(1), v(64)]);
        let b = VariableSet::from_iter([v(1), v(64), v(65)]);
        assert_eq!(a.union(&b), VariableSet::from_iter([v(0), v(1), v(64), v(65)]));
        assert_eq!(a.intersection(&b), VariableSet::from_iter([v(1), v(64)]));
        assert_eq!(a.subtracting(&b), VariableSet::from_iter([v(0)]));
        assert!(!a.is_disjoint(&b));
        assert!(a.is_disjoint(&VariableSet::from_iter([v(2), v(66)])));
        assert!(VariableSet::from_iter([v(1)]).is_subset_of(&a));
        assert!(!b.is_subset_of(&a));
    }

    #[test]
    fn iteration_is_ordered() {
        let set = VariableSet::from_iter([v(65), v(0), v(7)]);
        let collected: Vec<_> = set.iter().collect();
        assert_eq!(collected, vec![v(0), v(7), v(65)]);
    }
}
