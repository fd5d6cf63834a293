//! Volume grouping: split the page stream into contiguous runs by regex key.
//!
//! The key of a unit is the first match of the volume pattern in its file
//! name (`Vol 03` in `Vol 03 Ch 12-4.jpg`). A new [`Volume`] starts every
//! time the key changes, so a key that reappears later in the stream starts
//! a *second* volume with the same key instead of being folded into the
//! first. A unit whose name does not match fails the whole grouping.

use crate::error::CbzMergeError;
use crate::pipeline::transform::Unit;
use regex::Regex;
use tracing::info;

/// One contiguous run of units sharing a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub key: String,
    pub units: Vec<Unit>,
}

/// Volumes in order of first appearance in the page stream.
///
/// Backed by a `Vec`, not a map: keys may repeat, and iteration order is
/// part of the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Volumes(Vec<Volume>);

impl Volumes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Volume> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|v| v.key.as_str())
    }
}

impl IntoIterator for Volumes {
    type Item = Volume;
    type IntoIter = std::vec::IntoIter<Volume>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Volumes {
    type Item = &'a Volume;
    type IntoIter = std::slice::Iter<'a, Volume>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Group `units` (already in page-stream order) into volumes.
///
/// Every unit name must contain a match; nothing is grouped otherwise.
///
/// # Errors
/// [`CbzMergeError::PatternMismatch`] when any unit name (or every one, or
/// the empty stream) has no match for `pattern`.
pub fn group_volumes(units: &[Unit], pattern: &Regex) -> Result<Volumes, CbzMergeError> {
    let keys: Vec<Option<&str>> = units
        .iter()
        .map(|u| pattern.find(&u.name).map(|m| m.as_str()))
        .collect();

    let unmatched = keys.iter().filter(|k| k.is_none()).count();
    if units.is_empty() || unmatched > 0 {
        let first = units
            .iter()
            .zip(&keys)
            .find(|(_, k)| k.is_none())
            .map(|(u, _)| u.name.clone());
        return Err(CbzMergeError::PatternMismatch {
            pattern: pattern.as_str().to_string(),
            first,
            unmatched,
            units: units.len(),
        });
    }

    let mut volumes: Vec<Volume> = Vec::new();
    for (unit, key) in units.iter().zip(keys.into_iter().flatten()) {
        match volumes.last_mut() {
            Some(current) if current.key == key => current.units.push(unit.clone()),
            _ => volumes.push(Volume {
                key: key.to_string(),
                units: vec![unit.clone()],
            }),
        }
    }

    info!(
        "Grouped {} pages into {} volume(s)",
        units.len(),
        volumes.len()
    );
    Ok(Volumes(volumes))
}
