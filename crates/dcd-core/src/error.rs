//! Error types for the comparison engine.

use std::path::PathBuf;

/// Errors that can occur while resolving, comparing or exporting trees.
///
/// Structural and configuration errors abort a run. Per-file errors (load,
/// format, diff, save) are caught by the pipeline and reported against the
/// file that caused them.
#[derive(Debug, thiserror::Error)]
pub enum DcdError {
    /// A comparison root is missing or is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Filesystem access failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path could not be expressed as a normalized relative path.
    #[error("invalid relative path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A regular expression failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Options routed to a pipeline stage were unknown or ill-typed.
    #[error("invalid {stage} options: {message}")]
    InvalidOption { stage: String, message: String },

    /// A run-level setting is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An extension could not be normalized.
    #[error("invalid extension {0:?}")]
    InvalidExtension(String),

    /// A comparator was requested by a name nothing is registered under.
    #[error("unknown comparator: {0}")]
    UnknownComparator(String),

    /// A comparator already exists for this extension.
    #[error("a comparator is already registered for '{0}'")]
    AlreadyRegistered(String),

    /// No comparator exists for this extension.
    #[error("no comparator registered for '{0}'")]
    NotRegistered(String),

    /// A file could not be loaded or parsed.
    #[error("could not load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// Loaded data could not be formatted.
    #[error("{0}")]
    Format(String),

    /// The diff stage failed.
    #[error("{0}")]
    Diff(String),

    /// The comparator has no `save` stage.
    #[error("the comparator {0} cannot save data")]
    SaveUnsupported(String),

    /// Formatted data could not be written.
    #[error("could not save {}: {message}", path.display())]
    Save { path: PathBuf, message: String },

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The compared trees differ; carries the joined report.
    #[error("{report}")]
    TreesDiffer { report: String },
}

impl DcdError {
    /// Stable name of the error kind, used in per-file failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotADirectory(_) => "NotADirectory",
            Self::Io { .. } => "IoError",
            Self::InvalidPath { .. } => "InvalidPath",
            Self::InvalidPattern { .. } => "InvalidPattern",
            Self::InvalidOption { .. } => "InvalidOption",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::InvalidExtension(_) => "InvalidExtension",
            Self::UnknownComparator(_) => "UnknownComparator",
            Self::AlreadyRegistered(_) => "AlreadyRegistered",
            Self::NotRegistered(_) => "NotRegistered",
            Self::Load { .. } => "LoadError",
            Self::Format(_) => "FormatError",
            Self::Diff(_) => "DiffError",
            Self::SaveUnsupported(_) => "SaveUnsupported",
            Self::Save { .. } => "SaveError",
            Self::Serialization(_) => "SerializationError",
            Self::TreesDiffer { .. } => "TreesDiffer",
        }
    }

    /// Returns `true` for errors that abort a whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotADirectory(_)
                | Self::InvalidPath { .. }
                | Self::InvalidPattern { .. }
                | Self::InvalidOption { .. }
                | Self::InvalidConfig(_)
                | Self::InvalidExtension(_)
                | Self::UnknownComparator(_)
                | Self::AlreadyRegistered(_)
                | Self::NotRegistered(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for engine results.
pub type DcdResult<T> = Result<T, DcdError>;
