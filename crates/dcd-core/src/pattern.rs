//! Start-anchored regular expression sets.

use regex::Regex;

use crate::error::{DcdError, DcdResult};

/// An ordered set of regular expressions matched at the start of a string.
#[derive(Clone, Debug, Default)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl PatternSet {
    /// Compile every pattern, anchoring it at the start of the input.
    pub fn new<I, S>(patterns: I) -> DcdResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let raw = p.as_ref().to_string();
                compile_anchored(&raw).map(|re| (raw, re))
            })
            .collect::<DcdResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Returns `true` if any pattern matches.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|(_, re)| re.is_match(haystack))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The patterns as written.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(raw, _)| raw.as_str())
    }
}

impl PartialEq for PatternSet {
    fn eq(&self, other: &Self) -> bool {
        self.sources().eq(other.sources())
    }
}

pub(crate) fn compile_anchored(pattern: &str) -> DcdResult<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| DcdError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

pub(crate) fn compile(pattern: &str) -> DcdResult<Regex> {
    Regex::new(pattern).map_err(|source| DcdError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_at_start_only() {
        let set = PatternSet::new(["sub_dir_1/.*", r".*\.json"]).unwrap();
        assert!(set.is_match("sub_dir_1/file.b"));
        assert!(set.is_match("deep/file.json"));
        assert!(!set.is_match("other/sub_dir_1/file.b"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        match PatternSet::new(["(unclosed"]) {
            Err(DcdError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn alternation_stays_anchored() {
        let set = PatternSet::new(["a|b"]).unwrap();
        assert!(set.is_match("b_file"));
        assert!(!set.is_match("xb"));
    }
}
