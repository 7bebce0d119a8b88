//! Run configuration.

use std::path::{Path, PathBuf};
use std::thread;

use crate::args::{ArgsLayer, SpecificArgs};
use crate::error::{DcdError, DcdResult};
use crate::registry::{get_comparators, ComparatorRegistry};
use crate::tree::{PathFilter, WalkOptions};

/// Environment switch enabling the export of formatted data.
pub const EXPORT_ENV: &str = "DCD_EXPORT_FORMATTED_DATA";
/// Environment switch overriding the export suffix.
pub const EXPORT_SUFFIX_ENV: &str = "DCD_EXPORT_SUFFIX";

/// Whether and where formatted compared-side data is exported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExportMode {
    #[default]
    Disabled,
    /// Export next to the compared root, with the default suffix.
    Enabled,
    /// Export next to the compared root, with a custom suffix.
    Suffix(String),
}

impl ExportMode {
    pub const DEFAULT_SUFFIX: &'static str = "_FORMATTED";

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn suffix(&self) -> Option<&str> {
        match self {
            Self::Disabled => None,
            Self::Enabled => Some(Self::DEFAULT_SUFFIX),
            Self::Suffix(suffix) => Some(suffix.as_str()),
        }
    }

    /// Read [`EXPORT_ENV`] and [`EXPORT_SUFFIX_ENV`].
    pub fn from_env() -> DcdResult<Self> {
        let export = std::env::var(EXPORT_ENV).ok();
        let suffix = std::env::var(EXPORT_SUFFIX_ENV).ok();
        Self::from_switches(export.as_deref(), suffix.as_deref())
    }

    /// Build a mode from the two textual switches. A suffix only takes
    /// effect when export is enabled.
    pub fn from_switches(export: Option<&str>, suffix: Option<&str>) -> DcdResult<Self> {
        let enabled = match export.map(|s| s.trim().to_ascii_lowercase()) {
            None => false,
            Some(s) => match s.as_str() {
                "" | "0" | "false" | "no" | "off" => false,
                "1" | "true" | "yes" | "on" => true,
                _ => {
                    return Err(DcdError::InvalidConfig(format!(
                        "{EXPORT_ENV} must be a boolean, got {s:?}"
                    )))
                }
            },
        };
        if !enabled {
            return Ok(Self::Disabled);
        }
        match suffix {
            Some(suffix) => Self::with_suffix(suffix),
            None => Ok(Self::Enabled),
        }
    }

    /// Export with a custom, non-blank suffix.
    pub fn with_suffix(suffix: &str) -> DcdResult<Self> {
        if suffix.trim().is_empty() {
            return Err(DcdError::InvalidConfig(
                "the export suffix must not be empty".into(),
            ));
        }
        if suffix.contains(['/', '\\']) {
            return Err(DcdError::InvalidConfig(format!(
                "the export suffix must not contain a separator: {suffix:?}"
            )));
        }
        Ok(Self::Suffix(suffix.to_string()))
    }

    /// The export root for `compared_root`: a sibling named after it plus the suffix.
    pub fn export_root(&self, compared_root: &Path) -> DcdResult<Option<PathBuf>> {
        let Some(suffix) = self.suffix() else {
            return Ok(None);
        };
        let root = match compared_root.file_name() {
            Some(_) => compared_root.to_path_buf(),
            None => compared_root
                .canonicalize()
                .map_err(|e| DcdError::io(compared_root, e))?,
        };
        let name = root.file_name().ok_or_else(|| {
            DcdError::InvalidConfig(format!(
                "cannot derive an export directory from {}",
                compared_root.display()
            ))
        })?;
        let mut name = name.to_os_string();
        name.push(suffix);
        Ok(Some(root.with_file_name(name)))
    }
}

/// How file pairs are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Executor {
    #[default]
    Sequential,
    /// Scoped worker threads; `None` uses [`default_max_workers`].
    Threads { max_workers: Option<usize> },
}

impl Executor {
    pub fn worker_count(&self) -> usize {
        match *self {
            Self::Sequential => 1,
            Self::Threads { max_workers } => max_workers.unwrap_or_else(default_max_workers).max(1),
        }
    }
}

/// `min(32, available cores + 4)`.
pub fn default_max_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_add(4)
        .min(32)
}

/// Everything a tree comparison needs besides the two roots.
#[derive(Clone, Debug)]
pub struct ComparisonConfig {
    pub comparators: ComparatorRegistry,
    pub global_args: ArgsLayer,
    pub specific_args: SpecificArgs,
    pub filter: PathFilter,
    pub export: ExportMode,
    pub executor: Executor,
    pub follow_symlinks: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            comparators: get_comparators(),
            global_args: ArgsLayer::default(),
            specific_args: SpecificArgs::default(),
            filter: PathFilter::default(),
            export: ExportMode::Disabled,
            executor: Executor::Sequential,
            follow_symlinks: false,
        }
    }
}

impl ComparisonConfig {
    pub fn builder() -> ComparisonConfigBuilder {
        ComparisonConfigBuilder::default()
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            follow_symlinks: self.follow_symlinks,
            filter: self.filter.clone(),
        }
    }
}

/// Builder validating patterns, arguments and settings up front.
#[derive(Debug, Default)]
pub struct ComparisonConfigBuilder {
    comparators: Option<ComparatorRegistry>,
    global_args: ArgsLayer,
    specific_args: SpecificArgs,
    include: Vec<String>,
    exclude: Vec<String>,
    export: ExportMode,
    executor: Executor,
    follow_symlinks: bool,
}

impl ComparisonConfigBuilder {
    /// Use this registry instead of a snapshot of the process-wide one.
    pub fn comparators(mut self, registry: ComparatorRegistry) -> Self {
        self.comparators = Some(registry);
        self
    }

    pub fn global_args(mut self, args: ArgsLayer) -> Self {
        self.global_args = args;
        self
    }

    pub fn specific_args(mut self, args: SpecificArgs) -> Self {
        self.specific_args = args;
        self
    }

    pub fn include_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn export(mut self, mode: ExportMode) -> Self {
        self.export = mode;
        self
    }

    pub fn export_formatted_files(self, enabled: bool) -> Self {
        self.export(if enabled {
            ExportMode::Enabled
        } else {
            ExportMode::Disabled
        })
    }

    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn max_workers(self, workers: usize) -> Self {
        self.executor(Executor::Threads {
            max_workers: Some(workers),
        })
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn build(self) -> DcdResult<ComparisonConfig> {
        if let ExportMode::Suffix(suffix) = &self.export {
            ExportMode::with_suffix(suffix)?;
        }
        if let Executor::Threads {
            max_workers: Some(0),
        } = self.executor
        {
            return Err(DcdError::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        self.global_args.validate()?;

        Ok(ComparisonConfig {
            comparators: self.comparators.unwrap_or_else(get_comparators),
            global_args: self.global_args,
            specific_args: self.specific_args,
            filter: PathFilter::new(&self.include, &self.exclude)?,
            export: self.export,
            executor: self.executor,
            follow_symlinks: self.follow_symlinks,
        })
    }
}
