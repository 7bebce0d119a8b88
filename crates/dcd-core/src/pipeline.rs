//! The per-file comparison pipeline.
//!
//! load → format_data → diff → filter_diff → format_diff → sort_diff →
//! concat_diff → report, each stage receiving only its own options.

use std::path::Path;

use tracing::{debug, warn};

use crate::comparator::{Comparator, Data, RawDiff, ReportContext};
use crate::error::{DcdError, DcdResult};
use crate::options::{SaveOptions, StageOptions};
use crate::report::diff_message;

/// Compare two files; `None` means no difference.
///
/// Failures of the load, format and diff stages do not escape: they become the
/// report of this file pair. When `export_to` is given and the comparator can
/// save, the formatted compared-side data is written there whatever the
/// outcome of the diff, including when the reference fails to load.
pub fn compare_files(
    reference: &Path,
    compared: &Path,
    comparator: &dyn Comparator,
    options: &StageOptions,
    export_to: Option<&Path>,
) -> Option<String> {
    let context = ReportContext {
        reference,
        compared,
    };
    match run_stages(&context, comparator, options, export_to) {
        Ok(report) => report,
        Err(err) => {
            debug!(
                reference = %reference.display(),
                comparator = comparator.name(),
                error = %err,
                "comparison failed"
            );
            let reason = format!("Exception raised: ({}) {}", err.kind(), err);
            Some(diff_message(&context, Some(&reason), options))
        }
    }
}

fn run_stages(
    context: &ReportContext<'_>,
    comparator: &dyn Comparator,
    options: &StageOptions,
    export_to: Option<&Path>,
) -> DcdResult<Option<String>> {
    // The compared side is exported even when the reference cannot be read,
    // so it is loaded first and the reference error is raised afterwards.
    let reference = comparator.load(context.reference, &options.load);
    let compared = comparator
        .load(context.compared, &options.load)
        .and_then(|data| comparator.format_data(data, &options.format_data));

    if let (Some(target), Ok(data)) = (export_to, &compared) {
        if comparator.can_save() {
            if let Err(err) = save_formatted(comparator, data, target, &options.save) {
                warn!(target = %target.display(), error = %err, "could not export formatted data");
            }
        }
    }

    let reference = comparator.format_data(reference?, &options.format_data)?;
    let compared = compared?;

    let raw = comparator.diff(&reference, &compared, &options.diff)?;
    if options.return_raw_diffs {
        if raw.is_empty() {
            return Ok(None);
        }
        return serde_json::to_string(&raw)
            .map(Some)
            .map_err(|e| DcdError::Serialization(e.to_string()));
    }

    let details = match raw {
        RawDiff::Binary(false) => return Ok(None),
        RawDiff::Binary(true) => None,
        RawDiff::Entries(entries) => {
            let kept = comparator.filter_diff(entries, &options.filter)?;
            if kept.is_empty() {
                return Ok(None);
            }
            let lines = kept
                .iter()
                .map(|entry| comparator.format_diff(entry, &options.format_diff))
                .collect();
            let lines = comparator.sort_diff(lines, &options.sort);
            Some(comparator.concat_diff(lines, &options.concat))
        }
    };
    Ok(Some(comparator.report(context, details.as_deref(), options)))
}

fn save_formatted(
    comparator: &dyn Comparator,
    data: &Data,
    target: &Path,
    options: &SaveOptions,
) -> DcdResult<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DcdError::io(parent, e))?;
    }
    comparator.save(data, target, options)?;
    debug!(target = %target.display(), "exported formatted data");
    Ok(())
}

/// Load, format and save one file. Returns `false` when the comparator
/// cannot save.
pub fn export_formatted_file(
    file: &Path,
    target: &Path,
    comparator: &dyn Comparator,
    options: &StageOptions,
) -> DcdResult<bool> {
    if !comparator.can_save() {
        return Ok(false);
    }
    let data = comparator.load(file, &options.load)?;
    let data = comparator.format_data(data, &options.format_data)?;
    save_formatted(comparator, &data, target, &options.save)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::comparators::{DefaultComparator, StructuredComparator};
    use crate::options::{DiffOptions, Stage};
    use serde_json::{json, Map, Value};

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn structured_report() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "ref.json", r#"{"a": 1, "b": [1, 2]}"#);
        let b = write(dir.path(), "cmp.json", r#"{"a": 2, "b": [10, 2, 0]}"#);

        let report = compare_files(
            &a,
            &b,
            &StructuredComparator::json(),
            &StageOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(
            report,
            format!(
                "The files '{}' and '{}' are different:\n\
                 Added the value(s) '{{\"2\": 0}}' in the '[b]' key.\n\
                 Changed the value of '[a]' from 1 to 2.\n\
                 Changed the value of '[b][0]' from 1 to 10.",
                a.display(),
                b.display()
            )
        );
    }

    #[test]
    fn equal_documents_have_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "ref.yaml", "a: 1\nb: [1, 2]\n");
        let b = write(dir.path(), "cmp.yaml", "b: [1, 2]\na: 1\n");
        let report = compare_files(
            &a,
            &b,
            &StructuredComparator::yaml(),
            &StageOptions::default(),
            None,
        );
        assert_eq!(report, None);
    }

    #[test]
    fn binary_report_is_not_localized() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.c", "one");
        let b = write(dir.path(), "b.c", "two");
        let report = compare_files(&a, &b, &DefaultComparator, &StageOptions::default(), None);
        assert_eq!(
            report,
            Some(format!(
                "The files '{}' and '{}' are different.",
                a.display(),
                b.display()
            ))
        );
    }

    #[test]
    fn load_failure_becomes_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", "{broken");
        let b = write(dir.path(), "b.json", "{}");
        let report = compare_files(
            &a,
            &b,
            &StructuredComparator::json(),
            &StageOptions::default(),
            None,
        )
        .unwrap();
        assert!(report.starts_with(&format!(
            "The files '{}' and '{}' are different:\nException raised: (LoadError) could not load",
            a.display(),
            b.display()
        )));
    }

    #[test]
    fn filtered_out_differences_are_no_difference() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"time": 1, "x": 1}"#);
        let b = write(dir.path(), "b.json", r#"{"time": 2, "x": 1}"#);
        let mut options = StageOptions::default();
        options
            .merge(Stage::Filter, &map(json!({"exclude_locations": [r"\[time\]"]})))
            .unwrap();
        assert_eq!(
            compare_files(&a, &b, &StructuredComparator::json(), &options, None),
            None
        );
    }

    #[test]
    fn options_are_listed_in_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"x": 1.0}"#);
        let b = write(dir.path(), "b.json", r#"{"x": 2.0}"#);
        let mut options = StageOptions::default();
        options.diff = DiffOptions {
            tolerance: Some(0.1),
            ..DiffOptions::default()
        };
        let report =
            compare_files(&a, &b, &StructuredComparator::json(), &options, None).unwrap();
        assert!(report.contains(
            ":\nKwargs used for computing differences: {\"tolerance\": 0.1}\n\
             Changed the value of '[x]' from 1.0 to 2.0."
        ));
    }

    #[test]
    fn raw_diffs_are_returned_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"x": 1}"#);
        let b = write(dir.path(), "b.json", r#"{"x": 2}"#);
        let options = StageOptions {
            return_raw_diffs: true,
            ..StageOptions::default()
        };
        let raw = compare_files(&a, &b, &StructuredComparator::json(), &options, None).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed,
            json!([{"action": "changed", "location": ["x"], "old": 1, "new": 2}])
        );
    }

    #[test]
    fn export_happens_even_without_difference() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"x": 1}"#);
        let b = write(dir.path(), "b.json", r#"{"x": 1}"#);
        let target = dir.path().join("exported").join("nested").join("b.json");
        let report = compare_files(
            &a,
            &b,
            &StructuredComparator::json(),
            &StageOptions::default(),
            Some(&target),
        );
        assert_eq!(report, None);
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(saved, json!({"x": 1}));
    }

    #[test]
    fn compared_side_is_exported_when_the_reference_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "ref.json", "{broken");
        let b = write(dir.path(), "cmp.json", r#"{"a": 1}"#);
        let target = dir.path().join("cmp_FORMATTED").join("f.json");
        let report = compare_files(
            &a,
            &b,
            &StructuredComparator::json(),
            &StageOptions::default(),
            Some(&target),
        )
        .unwrap();
        assert!(report.contains("Exception raised: (LoadError)"));
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(saved, json!({"a": 1}));
    }

    #[test]
    fn broken_compared_side_is_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "ref.json", r#"{"a": 1}"#);
        let b = write(dir.path(), "cmp.json", "{broken");
        let target = dir.path().join("out").join("cmp.json");
        let report = compare_files(
            &a,
            &b,
            &StructuredComparator::json(),
            &StageOptions::default(),
            Some(&target),
        )
        .unwrap();
        assert!(report.contains("Exception raised: (LoadError)"));
        assert!(!target.exists());
    }

    #[test]
    fn export_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "doc.yaml", "k: v\n");
        let target = dir.path().join("out").join("doc.yaml");
        let cmp = StructuredComparator::yaml();
        assert!(export_formatted_file(&file, &target, &cmp, &StageOptions::default()).unwrap());
        let reloaded = cmp.load(&target, &Default::default()).unwrap();
        assert_eq!(reloaded, Data::Value(json!({"k": "v"})));

        assert!(!export_formatted_file(
            &file,
            &target,
            &DefaultComparator,
            &StageOptions::default()
        )
        .unwrap());
    }
}
