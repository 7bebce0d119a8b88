//! Tree enumeration and path matching.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DcdError, DcdResult};
use crate::path::RelPath;
use crate::pattern::PatternSet;

/// Include/exclude patterns applied to relative paths.
///
/// A path is kept when it matches at least one include pattern (or there are
/// none) and no exclude pattern.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathFilter {
    include: PatternSet,
    exclude: PatternSet,
}

impl PathFilter {
    pub fn new<I, E, S, T>(include: I, exclude: E) -> DcdResult<Self>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Ok(Self {
            include: PatternSet::new(include)?,
            exclude: PatternSet::new(exclude)?,
        })
    }

    pub fn accepts(&self, path: &RelPath) -> bool {
        (self.include.is_empty() || self.include.is_match(path.as_str()))
            && !self.exclude.is_match(path.as_str())
    }
}

/// How trees are walked.
#[derive(Clone, Debug, Default)]
pub struct WalkOptions {
    /// Descend into symlinked directories. Symlinked files are always compared
    /// by content.
    pub follow_symlinks: bool,
    pub filter: PathFilter,
}

/// The relative paths of two trees, split by presence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathSet {
    pub only_in_reference: Vec<RelPath>,
    pub only_in_compared: Vec<RelPath>,
    pub common: Vec<RelPath>,
    /// Entries of either tree that could not be read.
    pub skipped: Vec<PathBuf>,
}

/// The files found below one root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileListing {
    pub files: BTreeSet<RelPath>,
    /// Unreadable directories and filesystem loops, left out of `files`.
    pub skipped: Vec<PathBuf>,
}

/// Walk both roots and split their files by presence.
///
/// Each list is sorted lexicographically.
pub fn resolve_paths(
    reference_root: &Path,
    compared_root: &Path,
    options: &WalkOptions,
) -> DcdResult<PathSet> {
    let reference = list_files(reference_root, options)?;
    let compared = list_files(compared_root, options)?;
    let (ref_files, cmp_files) = (&reference.files, &compared.files);

    let set = PathSet {
        only_in_reference: ref_files.difference(cmp_files).cloned().collect(),
        only_in_compared: cmp_files.difference(ref_files).cloned().collect(),
        common: ref_files.intersection(cmp_files).cloned().collect(),
        skipped: reference.skipped.into_iter().chain(compared.skipped).collect(),
    };
    debug!(
        common = set.common.len(),
        only_in_reference = set.only_in_reference.len(),
        only_in_compared = set.only_in_compared.len(),
        skipped = set.skipped.len(),
        "resolved paths"
    );
    Ok(set)
}

/// List every regular file below `root`, relative to it.
///
/// Entries below the root that cannot be read are logged and listed in
/// `skipped`; an unreadable root is an error.
pub fn list_files(root: &Path, options: &WalkOptions) -> DcdResult<FileListing> {
    if !root.is_dir() {
        return Err(DcdError::NotADirectory(root.to_path_buf()));
    }

    let mut listing = FileListing::default();
    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop at root"));
                return Err(DcdError::io(root, source));
            }
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                if let Some(path) = err.path() {
                    listing.skipped.push(path.to_path_buf());
                }
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_symlink() {
            // Unfollowed link: compare a file target by content, skip the rest.
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "skipping broken symlink");
                    continue;
                }
            }
        }

        let rel = RelPath::strip(root, entry.path())?;
        if options.filter.accepts(&rel) {
            listing.files.insert(rel);
        }
    }
    Ok(listing)
}
