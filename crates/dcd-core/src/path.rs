//! Normalized relative paths.
//!
//! A [`RelPath`] is the identity key that correlates a file in the reference
//! tree with its counterpart in the compared tree. It never carries a root,
//! a drive prefix or `.`/`..` components, and always uses `/` as separator so
//! that keys compare equal across platforms.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DcdError, DcdResult};

/// A normalized, OS-independent relative file path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Parse a relative path written with `/` or `\` separators.
    pub fn new(raw: impl AsRef<str>) -> DcdResult<Self> {
        let raw = raw.as_ref();
        let invalid = |reason: &str| DcdError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(invalid("path is absolute"));
        }
        let mut parts = Vec::new();
        for part in raw.split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => return Err(invalid("parent components are not allowed")),
                p if parts.is_empty() && p.len() >= 2 && p.ends_with(':') => {
                    return Err(invalid("drive prefixes are not allowed"))
                }
                p => parts.push(p),
            }
        }
        if parts.is_empty() {
            return Err(invalid("path is empty"));
        }
        Ok(Self(parts.join("/")))
    }

    /// Build a relative path from filesystem path components.
    pub fn from_path(path: &Path) -> DcdResult<Self> {
        let invalid = |reason: &str| DcdError::InvalidPath {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(s) => parts.push(s),
                    None => return Err(invalid("path is not valid UTF-8")),
                },
                Component::CurDir => {}
                Component::ParentDir => return Err(invalid("parent components are not allowed")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("path is absolute"))
                }
            }
        }
        if parts.is_empty() {
            return Err(invalid("path is empty"));
        }
        Ok(Self(parts.join("/")))
    }

    /// Express `full` relative to `root`.
    pub fn strip(root: &Path, full: &Path) -> DcdResult<Self> {
        let rel = full.strip_prefix(root).map_err(|_| DcdError::InvalidPath {
            path: full.display().to_string(),
            reason: format!("not below {}", root.display()),
        })?;
        Self::from_path(rel)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join this path onto a filesystem root.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        out.extend(self.0.split('/'));
        out
    }

    /// The last component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The extension of the last component, without the leading dot.
    ///
    /// Dot files such as `.bashrc` have no extension.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) if idx + 1 == name.len() => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RelPath {
    type Error = DcdError;

    fn try_from(value: String) -> DcdResult<Self> {
        Self::new(value)
    }
}

impl From<RelPath> for String {
    fn from(value: RelPath) -> Self {
        value.0
    }
}
