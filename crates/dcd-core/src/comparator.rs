//! The comparator capability set and the values flowing through it.
//!
//! A [`Comparator`] is an immutable policy object. It is shared by every
//! comparison of its file type (and across threads), so all per-file state
//! lives in the pipeline, never in the comparator.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{DcdError, DcdResult};
use crate::options::{
    ConcatOptions, DiffOptions, FilterOptions, FormatDataOptions, FormatDiffOptions, LoadOptions,
    SaveOptions, SortOptions, StageOptions,
};
use crate::pattern::PatternSet;
use crate::report::{diff_message, render_change_value, render_entries};

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// The payload passed from `load` to `format_data` to `diff`.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    /// The file itself, read lazily by the stage that needs its bytes.
    Path(PathBuf),
    /// Raw file content.
    Bytes(Vec<u8>),
    /// A parsed structured document.
    Value(Value),
}

impl Data {
    /// The raw bytes of this payload.
    pub fn bytes(&self) -> DcdResult<Cow<'_, [u8]>> {
        match self {
            Self::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| DcdError::io(path, e)),
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Value(value) => serde_json::to_vec(value)
                .map(Cow::Owned)
                .map_err(|e| DcdError::Serialization(e.to_string())),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Locations and diff entries
// ---------------------------------------------------------------------------

/// One step into a structured document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(idx) => write!(f, "{idx}"),
        }
    }
}

/// Where in a document a difference was found. Renders as `[a][0]`; the
/// document root renders as an empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Location(Vec<PathSegment>);

impl Location {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Dot-separated form (`a.b.0`), used by ignore lists.
    pub fn dotted(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<Vec<PathSegment>> for Location {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "[{segment}]")?;
        }
        Ok(())
    }
}

/// A single localized difference.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DiffEntry {
    /// Children present only in the compared document.
    Added {
        location: Location,
        values: Vec<(PathSegment, Value)>,
    },
    /// Children present only in the reference document.
    Removed {
        location: Location,
        values: Vec<(PathSegment, Value)>,
    },
    /// A value that differs between the two documents.
    Changed {
        location: Location,
        old: Value,
        new: Value,
    },
    /// A free-form difference for comparators that are not key/value shaped.
    Message { text: String },
}

impl DiffEntry {
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Added { location, .. }
            | Self::Removed { location, .. }
            | Self::Changed { location, .. } => Some(location),
            Self::Message { .. } => None,
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { location, values } => write!(
                f,
                "Added the value(s) '{}' in the '{location}' key.",
                render_entries(values)
            ),
            Self::Removed { location, values } => write!(
                f,
                "Removed the value(s) '{}' in the '{location}' key.",
                render_entries(values)
            ),
            Self::Changed { location, old, new } => write!(
                f,
                "Changed the value of '{location}' from {} to {}.",
                render_change_value(old),
                render_change_value(new)
            ),
            Self::Message { text } => f.write_str(text),
        }
    }
}

/// The comparator-specific result of the `diff` stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawDiff {
    /// Whole-file comparison; `true` when the files differ.
    Binary(bool),
    /// Localized differences.
    Entries(Vec<DiffEntry>),
}

impl RawDiff {
    /// Returns `true` if no difference was found.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Binary(differs) => !differs,
            Self::Entries(entries) => entries.is_empty(),
        }
    }
}

/// The two files a report is about.
#[derive(Clone, Copy, Debug)]
pub struct ReportContext<'a> {
    pub reference: &'a Path,
    pub compared: &'a Path,
}

// ---------------------------------------------------------------------------
// Comparator trait
// ---------------------------------------------------------------------------

/// The pipeline stages of one file type.
///
/// Only [`name`](Comparator::name) and [`diff`](Comparator::diff) are
/// required; every other stage has a default.
pub trait Comparator: Send + Sync + fmt::Debug {
    /// Name used to select this comparator from configuration.
    fn name(&self) -> &str;

    /// Stage options this comparator applies before any caller override.
    fn default_options(&self) -> StageOptions {
        StageOptions::default()
    }

    fn load(&self, path: &Path, _options: &LoadOptions) -> DcdResult<Data> {
        Ok(Data::Path(path.to_path_buf()))
    }

    /// Transform one side. Must not depend on the other side.
    fn format_data(&self, data: Data, _options: &FormatDataOptions) -> DcdResult<Data> {
        Ok(data)
    }

    fn diff(&self, reference: &Data, compared: &Data, options: &DiffOptions)
        -> DcdResult<RawDiff>;

    /// Drop entries whose rendered location matches `exclude_locations`.
    fn filter_diff(
        &self,
        entries: Vec<DiffEntry>,
        options: &FilterOptions,
    ) -> DcdResult<Vec<DiffEntry>> {
        if options.exclude_locations.is_empty() {
            return Ok(entries);
        }
        let excluded = PatternSet::new(&options.exclude_locations)?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                entry
                    .location()
                    .map_or(true, |loc| !excluded.is_match(&loc.to_string()))
            })
            .collect())
    }

    fn format_diff(&self, entry: &DiffEntry, _options: &FormatDiffOptions) -> String {
        entry.to_string()
    }

    fn sort_diff(&self, mut lines: Vec<String>, options: &SortOptions) -> Vec<String> {
        lines.sort();
        if options.reverse {
            lines.reverse();
        }
        lines
    }

    fn concat_diff(&self, lines: Vec<String>, options: &ConcatOptions) -> String {
        lines.join(&options.separator)
    }

    /// Render the final report. `details` is `None` when the difference
    /// cannot be localized.
    fn report(
        &self,
        context: &ReportContext<'_>,
        details: Option<&str>,
        options: &StageOptions,
    ) -> String {
        diff_message(context, details, options)
    }

    /// Whether [`save`](Comparator::save) is implemented.
    fn can_save(&self) -> bool {
        false
    }

    fn save(&self, _data: &Data, _path: &Path, _options: &SaveOptions) -> DcdResult<()> {
        Err(DcdError::SaveUnsupported(self.name().to_string()))
    }
}
