//! Directory content comparison engine.
//!
//! Compares two directory trees file by file. Each file pair is dispatched to
//! a pluggable [`Comparator`] chosen by extension (or by a per-path override)
//! and run through the load → format → diff → filter → format-diff → sort →
//! concatenate → report pipeline. The result maps every differing relative
//! path to a human-readable report.
//!
//! # Key Types
//!
//! - [`RelPath`] -- Normalized relative path correlating the two trees
//! - [`Comparator`] / [`Data`] / [`RawDiff`] / [`DiffEntry`] -- The comparator capability set
//! - [`ComparatorRegistry`] -- Extension to comparator mapping with a fallback
//! - [`StageOptions`] -- Typed options of every pipeline stage
//! - [`ArgsLayer`] / [`SpecificArgs`] -- Run-wide and per-path option overrides
//! - [`ComparisonConfig`] -- Everything a run needs besides the two roots
//! - [`ComparisonResult`] -- Ordered mapping of differing paths to reports
//!
//! # Example
//!
//! ```no_run
//! use dcd_core::{assert_equal_trees, ComparisonConfig};
//!
//! let config = ComparisonConfig::builder()
//!     .export_formatted_files(true)
//!     .build()?;
//! assert_equal_trees("expected_output", "actual_output", &config)?;
//! # Ok::<(), dcd_core::DcdError>(())
//! ```

pub mod args;
pub mod compare;
pub mod comparator;
pub mod comparators;
pub mod config;
pub mod error;
pub mod options;
pub mod path;
pub mod pattern;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod tree;

pub use args::{
    resolve_args, ArgsLayer, ArgsSource, ComparatorChoice, ResolvedArgs, SpecificArgs,
    SpecificArgsEntry,
};
pub use compare::{assert_equal_trees, compare_trees, ComparisonResult, REPORT_SEPARATOR};
pub use comparator::{
    Comparator, Data, DiffEntry, Location, PathSegment, RawDiff, ReportContext,
};
pub use comparators::{Codec, DefaultComparator, StructuredComparator};
pub use config::{
    default_max_workers, ComparisonConfig, ComparisonConfigBuilder, Executor, ExportMode,
    EXPORT_ENV, EXPORT_SUFFIX_ENV,
};
pub use error::{DcdError, DcdResult};
pub use options::{
    ConcatOptions, DiffOptions, FilterOptions, FormatDataOptions, FormatDiffOptions, LoadOptions,
    ReplacePattern, ReportOptions, SaveOptions, SortOptions, Stage, StageOptions,
};
pub use path::RelPath;
pub use pattern::PatternSet;
pub use pipeline::{compare_files, export_formatted_file};
pub use registry::{
    get_comparators, get_default_comparators, normalize_extension, register_comparator,
    reset_comparators, unregister_comparator, ComparatorRegistry,
};
pub use report::diff_message;
pub use tree::{list_files, resolve_paths, FileListing, PathFilter, PathSet, WalkOptions};
