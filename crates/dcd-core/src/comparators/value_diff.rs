//! Structural diff of two JSON-like documents.
//!
//! Mappings are compared key by key and sequences index by index. Children
//! present on one side only are grouped into a single `Added` or `Removed`
//! entry per container; differing leaves become `Changed` entries. Numbers
//! are compared with a relative and an absolute tolerance.

use std::collections::BTreeSet;

use serde_json::{Number, Value};

use crate::comparator::{DiffEntry, Location, PathSegment};
use crate::options::DiffOptions;

/// Settings of one structural comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffSettings {
    pub tolerance: f64,
    pub absolute_tolerance: f64,
    /// Dotted locations that are skipped together with their children.
    pub ignore: BTreeSet<String>,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            tolerance: f64::EPSILON,
            absolute_tolerance: 0.0,
            ignore: BTreeSet::new(),
        }
    }
}

impl From<&DiffOptions> for DiffSettings {
    fn from(options: &DiffOptions) -> Self {
        let defaults = Self::default();
        Self {
            tolerance: options.tolerance.unwrap_or(defaults.tolerance),
            absolute_tolerance: options
                .absolute_tolerance
                .unwrap_or(defaults.absolute_tolerance),
            ignore: options.ignore.iter().cloned().collect(),
        }
    }
}

/// Compute the differences between `reference` and `compared`.
pub fn diff_values(reference: &Value, compared: &Value, settings: &DiffSettings) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    walk(&Location::root(), reference, compared, settings, &mut entries);
    entries
}

fn is_ignored(location: &Location, settings: &DiffSettings) -> bool {
    !settings.ignore.is_empty() && settings.ignore.contains(&location.dotted())
}

fn walk(
    location: &Location,
    reference: &Value,
    compared: &Value,
    settings: &DiffSettings,
    out: &mut Vec<DiffEntry>,
) {
    match (reference, compared) {
        (Value::Object(first), Value::Object(second)) => {
            let mut removed = Vec::new();
            for (key, value) in first {
                let child = location.child(PathSegment::Key(key.clone()));
                if is_ignored(&child, settings) {
                    continue;
                }
                match second.get(key) {
                    Some(other) => walk(&child, value, other, settings, out),
                    None => removed.push((PathSegment::Key(key.clone()), value.clone())),
                }
            }
            let added: Vec<_> = second
                .iter()
                .filter(|(key, _)| !first.contains_key(*key))
                .filter(|(key, _)| {
                    !is_ignored(&location.child(PathSegment::Key((*key).clone())), settings)
                })
                .map(|(key, value)| (PathSegment::Key(key.clone()), value.clone()))
                .collect();
            push_groups(location, added, removed, out);
        }
        (Value::Array(first), Value::Array(second)) => {
            let common = first.len().min(second.len());
            for idx in 0..common {
                let child = location.child(PathSegment::Index(idx));
                if !is_ignored(&child, settings) {
                    walk(&child, &first[idx], &second[idx], settings, out);
                }
            }
            let keep = |idx: &usize| !is_ignored(&location.child(PathSegment::Index(*idx)), settings);
            let added = (common..second.len())
                .filter(keep)
                .map(|idx| (PathSegment::Index(idx), second[idx].clone()))
                .collect();
            let removed = (common..first.len())
                .rev()
                .filter(keep)
                .map(|idx| (PathSegment::Index(idx), first[idx].clone()))
                .collect();
            push_groups(location, added, removed, out);
        }
        (first, second) => {
            if are_different(first, second, settings) {
                out.push(DiffEntry::Changed {
                    location: location.clone(),
                    old: first.clone(),
                    new: second.clone(),
                });
            }
        }
    }
}

fn push_groups(
    location: &Location,
    added: Vec<(PathSegment, Value)>,
    removed: Vec<(PathSegment, Value)>,
    out: &mut Vec<DiffEntry>,
) {
    if !added.is_empty() {
        out.push(DiffEntry::Added {
            location: location.clone(),
            values: added,
        });
    }
    if !removed.is_empty() {
        out.push(DiffEntry::Removed {
            location: location.clone(),
            values: removed,
        });
    }
}

fn are_different(first: &Value, second: &Value, settings: &DiffSettings) -> bool {
    match (first, second) {
        (Value::Number(a), Value::Number(b)) => !numbers_close(a, b, settings),
        _ => first != second,
    }
}

fn numbers_close(a: &Number, b: &Number, settings: &DiffSettings) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if x == y {
            return true;
        }
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        if x == y {
            return true;
        }
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => {
            if x == y {
                return true;
            }
            if !x.is_finite() || !y.is_finite() {
                return false;
            }
            let diff = (x - y).abs();
            diff <= (settings.tolerance * x.abs().max(y.abs())).max(settings.absolute_tolerance)
        }
        _ => false,
    }
}
