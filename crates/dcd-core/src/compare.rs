//! Tree comparison and result aggregation.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread;

use tracing::{debug, info};

use crate::args::{resolve_args, ResolvedArgs};
use crate::config::{ComparisonConfig, ExportMode};
use crate::error::{DcdError, DcdResult};
use crate::path::RelPath;
use crate::pipeline::compare_files;
use crate::tree::resolve_paths;

/// Separator between the reports of two files in an aggregated report.
pub const REPORT_SEPARATOR: &str = "\n\n\n";

/// The reports of every differing path, ordered by path. Empty when the
/// trees are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComparisonResult {
    differences: BTreeMap<RelPath, String>,
}

impl ComparisonResult {
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.differences.len()
    }

    /// The report of one relative path.
    pub fn get(&self, path: &str) -> Option<&str> {
        let rel = RelPath::new(path).ok()?;
        self.differences.get(&rel).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, &str)> {
        self.differences.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
        self.differences.keys()
    }

    /// Every report in path order, separated by [`REPORT_SEPARATOR`].
    pub fn report(&self) -> String {
        self.differences
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(REPORT_SEPARATOR)
    }

    pub fn into_inner(self) -> BTreeMap<RelPath, String> {
        self.differences
    }
}

impl IntoIterator for ComparisonResult {
    type Item = (RelPath, String);
    type IntoIter = std::collections::btree_map::IntoIter<RelPath, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.differences.into_iter()
    }
}

/// One common path with its resolved comparator and options.
struct Job {
    path: RelPath,
    args: ResolvedArgs,
}

/// Compare two trees file by file.
///
/// Files present on one side only and per-file failures are reported in the
/// result. Only structural and configuration errors are returned as `Err`.
pub fn compare_trees(
    reference_root: impl AsRef<Path>,
    compared_root: impl AsRef<Path>,
    config: &ComparisonConfig,
) -> DcdResult<ComparisonResult> {
    let reference_root = reference_root.as_ref();
    let compared_root = compared_root.as_ref();
    let paths = resolve_paths(reference_root, compared_root, &config.walk_options())?;

    let mut differences = BTreeMap::new();
    for path in paths.only_in_reference {
        let msg = missing_message(&path, compared_root);
        differences.insert(path, msg);
    }
    for path in paths.only_in_compared {
        let msg = missing_message(&path, reference_root);
        differences.insert(path, msg);
    }

    // Resolve everything before comparing anything: configuration errors are fatal.
    let jobs = paths
        .common
        .into_iter()
        .map(|path| {
            let args = resolve_args(
                &path,
                &config.comparators,
                &config.global_args,
                &config.specific_args,
            )?;
            Ok(Job { path, args })
        })
        .collect::<DcdResult<Vec<_>>>()?;

    let export_root = config.export.export_root(compared_root)?;
    let run = |job: &Job| -> Option<(RelPath, String)> {
        let target = export_root.as_deref().map(|root| job.path.to_path(root));
        compare_files(
            &job.path.to_path(reference_root),
            &job.path.to_path(compared_root),
            job.args.comparator.as_ref(),
            &job.args.options,
            target.as_deref(),
        )
        .map(|report| (job.path.clone(), report))
    };

    let workers = config.executor.worker_count().min(jobs.len()).max(1);
    let found: Vec<(RelPath, String)> = if workers == 1 {
        jobs.iter().filter_map(&run).collect()
    } else {
        run_threaded(&jobs, workers, &run)
    };
    differences.extend(found);

    info!(
        reference = %reference_root.display(),
        compared = %compared_root.display(),
        compared_files = jobs.len(),
        differences = differences.len(),
        "compared trees"
    );
    Ok(ComparisonResult { differences })
}

/// Run jobs on scoped threads, one contiguous chunk per worker; results are
/// merged once, after every worker has finished.
fn run_threaded<F>(jobs: &[Job], workers: usize, run: &F) -> Vec<(RelPath, String)>
where
    F: Fn(&Job) -> Option<(RelPath, String)> + Sync,
{
    let chunk_size = jobs.len().div_ceil(workers);
    debug!(workers, chunk_size, "running comparisons in parallel");
    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().filter_map(run).collect::<Vec<_>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

fn missing_message(path: &RelPath, root: &Path) -> String {
    format!("The file '{path}' does not exist in '{}'.", root.display())
}

/// Compare two trees and fail with the joined report if they differ.
///
/// When the config does not export formatted data, the
/// [`EXPORT_ENV`](crate::config::EXPORT_ENV) and
/// [`EXPORT_SUFFIX_ENV`](crate::config::EXPORT_SUFFIX_ENV) switches are
/// honoured, so test suites can turn export on without code changes.
pub fn assert_equal_trees(
    reference_root: impl AsRef<Path>,
    compared_root: impl AsRef<Path>,
    config: &ComparisonConfig,
) -> DcdResult<()> {
    let env_export = match config.export {
        ExportMode::Disabled => ExportMode::from_env()?,
        _ => ExportMode::Disabled,
    };
    let result = if env_export.is_enabled() {
        let mut config = config.clone();
        config.export = env_export;
        compare_trees(reference_root, compared_root, &config)?
    } else {
        compare_trees(reference_root, compared_root, config)?
    };

    if result.is_empty() {
        Ok(())
    } else {
        Err(DcdError::TreesDiffer {
            report: result.report(),
        })
    }
}
