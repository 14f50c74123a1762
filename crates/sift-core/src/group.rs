//! Group Splitter
//!
//! Partitions a flat criteria list into AND-groups separated by OR markers.
//! One group compiles as a pure AND; several compile as an OR of AND-groups
//! where at least one group must match. An empty result means "match
//! everything".

use crate::criteria::Criterion;

/// Split criteria into AND-groups at OR markers.
///
/// An OR marker closes the current group when it is non-empty, so leading,
/// trailing and repeated markers never produce empty groups.
pub fn split(criteria: &[Criterion]) -> Vec<Vec<&Criterion>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();

    for criterion in criteria {
        if criterion.is_or_marker() {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push(criterion);
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
