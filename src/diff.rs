//! Open-port drift detection.
//!
//! Compares a freshly observed open-port set against a target's baseline.
//! This is the only place that decides whether a target's exposed surface
//! has changed.

use crate::types::Port;
use serde::Serialize;
use std::collections::BTreeSet;

/// Difference between an observed open-port set and its baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Drift {
    /// Symmetric-difference cardinality; zero means no drift.
    pub count: usize,
    /// Open now, not expected.
    pub added: BTreeSet<Port>,
    /// Expected, not observed open.
    pub removed: BTreeSet<Port>,
}

impl Drift {
    /// True when observation and baseline agree.
    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}

/// Diff an observation against a baseline.
///
/// Both inputs are treated as sets, so order and duplicates do not matter.
/// Swapping the arguments swaps `added` and `removed`.
pub fn diff<O, E>(observed: O, expected: E) -> Drift
where
    O: IntoIterator<Item = Port>,
    E: IntoIterator<Item = Port>,
{
    let observed: BTreeSet<Port> = observed.into_iter().collect();
    let expected: BTreeSet<Port> = expected.into_iter().collect();

    let added: BTreeSet<Port> = observed.difference(&expected).copied().collect();
    let removed: BTreeSet<Port> = expected.difference(&observed).copied().collect();

    Drift {
        count: added.len() + removed.len(),
        added,
        removed,
    }
}
