use smallvec::SmallVec;
use std::ops::Range;

type Word = u64;
const WORD_BITS: usize = Word::BITS as usize;
const ONE: Word = 1;

/// Set of node (or object) indices.
///
/// Stored as a bitset so that membership tests and unions are cheap and
/// iteration is always in ascending index order. Shapes with up to 256 nodes
/// never touch the heap.
#[derive(Clone, Debug, Default)]
pub struct NodeSet {
    words: SmallVec<[Word; 4]>,
}

impl NodeSet {
    /// Sentinel returned by `start` and `next` when there are no more indices
    pub const END: usize = usize::MAX;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set containing every index in `0..n`
    #[must_use]
    pub fn with_all(n: usize) -> Self {
        let mut set = Self::new();
        set.set_all(n);
        set
    }

    #[must_use]
    pub fn test(&self, i: usize) -> bool {
        self.words
            .get(i / WORD_BITS)
            .is_some_and(|w| w & (ONE << (i % WORD_BITS)) != 0)
    }

    pub fn set(&mut self, i: usize) {
        let w = i / WORD_BITS;
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= ONE << (i % WORD_BITS);
    }

    pub fn clear(&mut self, i: usize) {
        if let Some(w) = self.words.get_mut(i / WORD_BITS) {
            *w &= !(ONE << (i % WORD_BITS));
        }
    }

    /// Sets every index in `0..n`. Indices at or past `n` are cleared.
    pub fn set_all(&mut self, n: usize) {
        self.words.clear();
        self.words.resize(n / WORD_BITS, Word::MAX);
        let rem = n % WORD_BITS;
        if rem != 0 {
            self.words.push((ONE << rem) - 1);
        }
    }

    pub fn clear_all(&mut self) {
        self.words.clear();
    }

    /// Union in place
    pub fn overlap(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    /// Difference in place
    pub fn take_away(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= !b;
        }
    }

    /// Intersection in place
    pub fn intersect(&mut self, other: &Self) {
        self.words.truncate(other.words.len());
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= b;
        }
    }

    /// First index in the set or `END`
    #[must_use]
    pub fn start(&self) -> usize {
        self.scan_from(0)
    }

    /// First index in the set greater than `i`, or `END`
    #[must_use]
    pub fn next(&self, i: usize) -> usize {
        if i == Self::END {
            return Self::END;
        }
        self.scan_from(i + 1)
    }

    /// One past the highest index in the set, or 0 when empty
    #[must_use]
    pub fn end(&self) -> usize {
        for (w, word) in self.words.iter().enumerate().rev() {
            if *word != 0 {
                return w * WORD_BITS + WORD_BITS
                    - word.leading_zeros() as usize;
            }
        }
        0
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of indices in the set that are below `i`. Keyframe data is
    /// stored by this rank.
    #[must_use]
    pub fn rank(&self, i: usize) -> usize {
        let full = (i / WORD_BITS).min(self.words.len());
        let mut r: usize =
            self.words[..full].iter().map(|w| w.count_ones() as usize).sum();
        if let Some(w) = self.words.get(i / WORD_BITS) {
            let mask = (ONE << (i % WORD_BITS)) - 1;
            r += (w & mask).count_ones() as usize;
        }
        r
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Ascending iterator over all indices in the set
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            cur: self.start(),
            stop: Self::END,
        }
    }

    /// Ascending iterator over the indices that fall inside `range`
    #[must_use]
    pub fn iter_range(&self, range: Range<usize>) -> Iter<'_> {
        Iter {
            set: self,
            cur: self.scan_from(range.start),
            stop: range.end,
        }
    }

    fn scan_from(&self, i: usize) -> usize {
        let mut w = i / WORD_BITS;
        if w >= self.words.len() {
            return Self::END;
        }
        // Mask off the bits below i in the first word
        let mut word = self.words[w] & (Word::MAX << (i % WORD_BITS));
        loop {
            if word != 0 {
                return w * WORD_BITS + word.trailing_zeros() as usize;
            }
            w += 1;
            if w >= self.words.len() {
                return Self::END;
            }
            word = self.words[w];
        }
    }
}

// Trailing zero words do not make two sets different
impl PartialEq for NodeSet {
    fn eq(&self, other: &Self) -> bool {
        let n = self.words.len().max(other.words.len());
        (0..n).all(|w| {
            self.words.get(w).copied().unwrap_or(0)
                == other.words.get(w).copied().unwrap_or(0)
        })
    }
}

impl Eq for NodeSet {}

impl FromIterator<usize> for NodeSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.set(i);
        }
        set
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a> {
    set: &'a NodeSet,
    cur: usize,
    stop: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cur == NodeSet::END || self.cur >= self.stop {
            return None;
        }
        let i = self.cur;
        self.cur = self.set.next(i);
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::NodeSet;

    #[test]
    fn empty_set() {
        let set = NodeSet::new();
        assert_eq!(set.start(), NodeSet::END);
        assert_eq!(set.end(), 0);
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
        assert!(!set.test(0));
        assert!(!set.test(1000));
    }

    #[test]
    fn start_and_next() {
        let set: NodeSet = [3, 64, 65, 200].into_iter().collect();
        let mut i = set.start();
        let mut seen = Vec::new();
        while i != NodeSet::END {
            seen.push(i);
            i = set.next(i);
        }
        assert_eq!(seen, vec![3, 64, 65, 200]);
        assert_eq!(set.end(), 201);
        assert_eq!(set.count(), 4);
    }

    #[test]
    fn set_all_covers_range() {
        for n in [0, 1, 63, 64, 65, 130] {
            let set = NodeSet::with_all(n);
            assert_eq!(set.count(), n);
            assert_eq!(set.end(), n);
            assert!(n == 0 || set.test(n - 1));
            assert!(!set.test(n));
        }
    }

    #[test]
    fn union_and_difference() {
        let mut a: NodeSet = [1, 2, 3].into_iter().collect();
        let b: NodeSet = [3, 4, 100].into_iter().collect();
        a.overlap(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 100]);
        a.take_away(&[2, 100].into_iter().collect());
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 3, 4]);
        a.intersect(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3, 4]);
        a.clear(3);
        a.clear(500); // Not present, nothing happens
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![4]);
        a.clear_all();
        assert!(a.is_empty());
    }

    #[test]
    fn rank_counts_lower_members() {
        let set: NodeSet = [0, 5, 70, 71].into_iter().collect();
        assert_eq!(set.rank(0), 0);
        assert_eq!(set.rank(5), 1);
        assert_eq!(set.rank(70), 2);
        assert_eq!(set.rank(71), 3);
        assert_eq!(set.rank(1000), 4);
    }

    #[test]
    fn range_iteration() {
        let set: NodeSet = [1, 4, 8, 12].into_iter().collect();
        assert_eq!(set.iter_range(4..12).collect::<Vec<_>>(), vec![4, 8]);
        assert_eq!(set.iter_range(13..20).count(), 0);
    }
}
