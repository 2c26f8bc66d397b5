//! Per-endpoint resume cursors and bulk-pull intermediate state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An opaque, per-endpoint resume token as handed back by an enumeration
/// or firehose API. Never interpreted, only round-tripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

/// Small value persisted to disk after meaningful progress, so a run can
/// resume where it left off.
///
/// Two shapes: a bare enumeration cursor for the enumeration-driven bulk
/// pull, or `{first_unpulled_index, recently_completed_indices}` for the
/// census-driven pull. `first_unpulled_index` is monotonically non-decreasing;
/// no index `>= first_unpulled_index` is ever considered complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum IntermediateState {
    /// Enumeration-driven: the last server-supplied page cursor.
    PdsCursor(String),
    /// Census-driven: how far the completion prefix has advanced, plus
    /// the out-of-order completions waiting to be drained into it.
    CensusProgress {
        /// Every index below this has been fully emitted.
        first_unpulled_index: u64,
        /// Indices `>= first_unpulled_index` that have completed but
        /// haven't yet been drained into the prefix because a lower
        /// index is still outstanding.
        recently_completed_indices: BTreeSet<u64>,
    },
}

impl IntermediateState {
    /// Record `index` as complete and advance `first_unpulled_index` by
    /// draining the longest available prefix.
    ///
    /// # Panics
    ///
    /// Panics if called on a [`IntermediateState::PdsCursor`] value —
    /// the two shapes are never mixed within a single pull.
    pub fn mark_complete(&mut self, index: u64) {
        let IntermediateState::CensusProgress {
            first_unpulled_index,
            recently_completed_indices,
        } = self
        else {
            panic!("mark_complete called on a PdsCursor intermediate state");
        };

        if index >= *first_unpulled_index {
            recently_completed_indices.insert(index);
        }

        while recently_completed_indices.remove(first_unpulled_index) {
            *first_unpulled_index += 1;
        }
    }
}

/// One line of a pre-enumerated identifier list, assumed immutable for
/// the lifetime of a bulk pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CensusEntry {
    /// The actor's DID.
    pub did: String,
    /// The repository revision at census time.
    pub rev: String,
    /// The repository's head CID at census time.
    pub head: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> IntermediateState {
        IntermediateState::CensusProgress {
            first_unpulled_index: 1,
            recently_completed_indices: BTreeSet::new(),
        }
    }

    #[test]
    fn prefix_drains_in_order() {
        let mut state = fresh();
        state.mark_complete(1);
        state.mark_complete(2);
        state.mark_complete(3);
        state.mark_complete(5);
        state.mark_complete(6);

        let IntermediateState::CensusProgress {
            first_unpulled_index,
            recently_completed_indices,
        } = &state
        else {
            unreachable!()
        };
        assert_eq!(*first_unpulled_index, 4);
        assert_eq!(
            recently_completed_indices.iter().copied().collect::<Vec<_>>(),
            vec![5, 6]
        );
    }

    #[test]
    fn out_of_order_completion_eventually_drains() {
        let mut state = fresh();
        state.mark_complete(2);
        state.mark_complete(1);

        let IntermediateState::CensusProgress {
            first_unpulled_index,
            recently_completed_indices,
        } = &state
        else {
            unreachable!()
        };
        assert_eq!(*first_unpulled_index, 3);
        assert!(recently_completed_indices.is_empty());
    }

    #[test]
    fn first_unpulled_index_is_monotonic() {
        let mut state = fresh();
        state.mark_complete(1);
        state.mark_complete(2);
        let after_first_advance = match &state {
            IntermediateState::CensusProgress {
                first_unpulled_index,
                ..
            } => *first_unpulled_index,
            IntermediateState::PdsCursor(_) => unreachable!(),
        };

        // A stale completion below the current frontier must not regress it.
        state.mark_complete(0);
        let after_stale = match &state {
            IntermediateState::CensusProgress {
                first_unpulled_index,
                ..
            } => *first_unpulled_index,
            IntermediateState::PdsCursor(_) => unreachable!(),
        };
        assert_eq!(after_first_advance, after_stale);
    }
}
