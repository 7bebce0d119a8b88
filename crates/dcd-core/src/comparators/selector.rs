//! JSONPath selectors used by value replacement.
//!
//! Queries are evaluated by `jsonpath-rust`; every match is turned into a
//! JSON pointer so the value can be rewritten in place. A path written
//! without a leading `$` (`a.b`, `[0].name`) is taken relative to the root.

use jsonpath_rust::JsonPathFinder;
use serde_json::Value;

use crate::error::{DcdError, DcdResult};

/// A validated JSONPath query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    query: String,
}

impl Selector {
    pub fn parse(raw: &str) -> DcdResult<Self> {
        let trimmed = raw.trim();
        let query = if trimmed.starts_with('$') {
            trimmed.to_string()
        } else if trimmed.starts_with('[') {
            format!("${trimmed}")
        } else {
            format!("$.{trimmed}")
        };
        JsonPathFinder::from_str("null", &query).map_err(|e| invalid(raw, e))?;
        Ok(Self {
            raw: raw.to_string(),
            query,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// JSON pointers of every value the query reaches in `root`.
    pub fn pointers(&self, root: &Value) -> DcdResult<Vec<String>> {
        let finder = JsonPathFinder::from_str(&root.to_string(), &self.query)
            .map_err(|e| invalid(&self.raw, e))?;
        match finder.find_as_path() {
            Value::Array(paths) => paths
                .iter()
                .filter_map(Value::as_str)
                .map(|path| to_pointer(path).ok_or_else(|| invalid(&self.raw, path)))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Apply `f` to every value the query reaches; returns how many were reached.
    pub fn for_each_mut<F>(&self, root: &mut Value, f: &mut F) -> DcdResult<usize>
    where
        F: FnMut(&mut Value),
    {
        let mut reached = 0;
        for pointer in self.pointers(root)? {
            if let Some(target) = root.pointer_mut(&pointer) {
                f(target);
                reached += 1;
            }
        }
        Ok(reached)
    }
}

fn invalid(raw: &str, reason: impl std::fmt::Display) -> DcdError {
    DcdError::Format(format!("invalid path {raw:?}: {reason}"))
}

/// `$.['a'][0].['b/c']` becomes `/a/0/b~1c`.
fn to_pointer(path: &str) -> Option<String> {
    let mut rest = path.strip_prefix('$')?;
    let mut pointer = String::new();
    while !rest.is_empty() {
        rest = rest.strip_prefix('.').unwrap_or(rest);
        let (segment, tail) = if let Some(inner) = rest.strip_prefix("['") {
            let end = inner.find("']")?;
            (&inner[..end], &inner[end + 2..])
        } else if let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']')?;
            (&inner[..end], &inner[end + 1..])
        } else {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        };
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        rest = tail;
    }
    Some(pointer)
}
