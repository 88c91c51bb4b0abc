//! Set of pairs that already have a distance record.

use proximity_store::PairKey;
use std::collections::HashSet;

/// `(origin_id, target_id)` pairs recorded so far.
///
/// Loaded once at the start of a run and extended after every committed
/// batch. Only the orchestrator thread mutates it; workers read it between
/// mutations.
#[derive(Debug, Clone, Default)]
pub struct ProcessedPairSet {
    pairs: HashSet<PairKey>,
}

impl ProcessedPairSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pair is recorded.
    #[inline]
    pub fn contains(&self, origin_id: i64, target_id: i64) -> bool {
        self.pairs.contains(&(origin_id, target_id))
    }

    /// Marks a pair as recorded. Returns false if it already was.
    pub fn insert(&mut self, origin_id: i64, target_id: i64) -> bool {
        self.pairs.insert((origin_id, target_id))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair is recorded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<PairKey> for ProcessedPairSet {
    fn from_iter<I: IntoIterator<Item = PairKey>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl Extend<PairKey> for ProcessedPairSet {
    fn extend<I: IntoIterator<Item = PairKey>>(&mut self, iter: I) {
        self.pairs.extend(iter);
    }
}
