//! Round-robin partitioning of work items across workers.
//!
//! Item `i` lands in group `i % parts`. Compared to contiguous slicing this
//! spreads neighbouring (and usually similarly sized) chapters across
//! workers, and group sizes never differ by more than one.

use crate::error::CbzMergeError;

/// Split `items` into exactly `parts` groups, round-robin.
///
/// Groups may be empty when `parts > items.len()`.
///
/// # Errors
/// [`CbzMergeError::InvalidConfig`] when `parts` is zero.
pub fn partition<T>(items: Vec<T>, parts: usize) -> Result<Vec<Vec<T>>, CbzMergeError> {
    if parts == 0 {
        return Err(CbzMergeError::InvalidConfig(
            "partition count must be ≥ 1".into(),
        ));
    }

    let per_group = items.len().div_ceil(parts);
    let mut groups: Vec<Vec<T>> = (0..parts).map(|_| Vec::with_capacity(per_group)).collect();
    for (i, item) in items.into_iter().enumerate() {
        groups[i % parts].push(item);
    }
    Ok(groups)
}
