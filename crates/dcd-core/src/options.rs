//! Typed per-stage options.
//!
//! Every pipeline stage receives its own options struct. Layers of untyped
//! overrides (comparator defaults, run-wide arguments, per-path arguments)
//! are merged key by key into these structs, so an unknown key or an
//! ill-typed value is rejected when the arguments for a file are resolved.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DcdError, DcdResult};
use crate::pattern::{compile, compile_anchored};

/// Routing key enabling raw diff output.
pub const RETURN_RAW_DIFFS_KEY: &str = "return_raw_diffs";
/// Key selecting a comparator for one specific-args entry.
pub const COMPARATOR_KEY: &str = "comparator";
/// Key holding the regular expressions of a pattern-keyed entry.
pub const PATTERNS_KEY: &str = "patterns";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A step of the per-file comparison pipeline that takes options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Load,
    FormatData,
    Diff,
    Filter,
    FormatDiff,
    Sort,
    Concat,
    Report,
    Save,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 9] = [
        Stage::Load,
        Stage::FormatData,
        Stage::Diff,
        Stage::Filter,
        Stage::FormatDiff,
        Stage::Sort,
        Stage::Concat,
        Stage::Report,
        Stage::Save,
    ];

    /// Short name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::FormatData => "format_data",
            Self::Diff => "diff",
            Self::Filter => "filter",
            Self::FormatDiff => "format_diff",
            Self::Sort => "sort",
            Self::Concat => "concat",
            Self::Report => "report",
            Self::Save => "save",
        }
    }

    /// The argument key routing a nested mapping to this stage.
    ///
    /// The diff stage has none: keys that are not routing keys are diff options.
    pub fn routing_key(self) -> Option<&'static str> {
        match self {
            Self::Load => Some("load_kwargs"),
            Self::FormatData => Some("format_data_kwargs"),
            Self::Diff => None,
            Self::Filter => Some("filter_kwargs"),
            Self::FormatDiff => Some("format_diff_kwargs"),
            Self::Sort => Some("sort_kwargs"),
            Self::Concat => Some("concat_kwargs"),
            Self::Report => Some("report_kwargs"),
            Self::Save => Some("save_kwargs"),
        }
    }

    pub fn from_routing_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.routing_key() == Some(key))
    }

    /// What the stage does, as shown in report option lines.
    pub fn description(self) -> &'static str {
        match self {
            Self::Load => "loading data",
            Self::FormatData => "formatting data",
            Self::Diff => "computing differences",
            Self::Filter => "filtering differences",
            Self::FormatDiff => "formatting differences",
            Self::Sort => "sorting differences",
            Self::Concat => "concatenating differences",
            Self::Report => "reporting differences",
            Self::Save => "saving data",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Stage option structs
// ---------------------------------------------------------------------------

/// Options for the `load` stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    /// Free-form parameters for custom comparators.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// A regular expression substitution applied to the string values found at
/// the given document paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplacePattern {
    pub pattern: String,
    /// Substitution text. Groups are referenced as `\1` or `\g<name>`;
    /// `\n`, `\t` and `\\` are escapes and `$` is a plain character.
    pub replacement: String,
    /// Maximum number of replacements per value; 0 replaces every match.
    #[serde(default)]
    pub count: usize,
    /// JSONPath queries such as `$.a.b`, `$..name` or `items[0:2]`; a path
    /// without the leading `$` starts at the document root.
    pub paths: Vec<String>,
}

/// Options for the `format_data` stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatDataOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replace_patterns: Vec<ReplacePattern>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// Options for the `diff` stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffOptions {
    /// Relative tolerance for numbers; machine epsilon when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Absolute tolerance for numbers; zero when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_tolerance: Option<f64>,
    /// Dotted locations (`a.b.0`) excluded from the comparison.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// Options for the `filter_diff` stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterOptions {
    /// Patterns matched against rendered locations such as `[a][0]`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_locations: Vec<String>,
}

/// Options for the `format_diff` stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatDiffOptions {
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// Options for the `sort_diff` stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SortOptions {
    pub reverse: bool,
}

/// Options for the `concat_diff` stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcatOptions {
    pub separator: String,
}

impl Default for ConcatOptions {
    fn default() -> Self {
        Self {
            separator: "\n".into(),
        }
    }
}

/// Options for the `report` stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportOptions {
    /// List non-default stage options below the report header.
    pub show_options: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { show_options: true }
    }
}

/// Options for the `save` stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveOptions {
    pub pretty: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { pretty: true }
    }
}

// ---------------------------------------------------------------------------
// StageOptions
// ---------------------------------------------------------------------------

/// The effective options of every stage for one file comparison.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageOptions {
    /// Return the serialized raw diff instead of the rendered report.
    pub return_raw_diffs: bool,
    pub load: LoadOptions,
    pub format_data: FormatDataOptions,
    pub diff: DiffOptions,
    pub filter: FilterOptions,
    pub format_diff: FormatDiffOptions,
    pub sort: SortOptions,
    pub concat: ConcatOptions,
    pub report: ReportOptions,
    pub save: SaveOptions,
}

impl StageOptions {
    /// Overlay `overrides` onto the options of `stage`, key by key.
    pub fn merge(&mut self, stage: Stage, overrides: &Map<String, Value>) -> DcdResult<()> {
        if overrides.is_empty() {
            return Ok(());
        }
        match stage {
            Stage::Load => self.load = merge_stage(stage, &self.load, overrides)?,
            Stage::FormatData => {
                self.format_data = merge_stage(stage, &self.format_data, overrides)?
            }
            Stage::Diff => self.diff = merge_stage(stage, &self.diff, overrides)?,
            Stage::Filter => self.filter = merge_stage(stage, &self.filter, overrides)?,
            Stage::FormatDiff => {
                self.format_diff = merge_stage(stage, &self.format_diff, overrides)?
            }
            Stage::Sort => self.sort = merge_stage(stage, &self.sort, overrides)?,
            Stage::Concat => self.concat = merge_stage(stage, &self.concat, overrides)?,
            Stage::Report => self.report = merge_stage(stage, &self.report, overrides)?,
            Stage::Save => self.save = merge_stage(stage, &self.save, overrides)?,
        }
        Ok(())
    }

    /// Check values that serde cannot: patterns compile, tolerances are sane.
    pub fn validate(&self) -> DcdResult<()> {
        for replace in &self.format_data.replace_patterns {
            compile(&replace.pattern)?;
            if replace.paths.is_empty() {
                return Err(invalid(
                    Stage::FormatData,
                    format!("replace pattern {:?} has no paths", replace.pattern),
                ));
            }
        }
        for location in &self.filter.exclude_locations {
            compile_anchored(location)?;
        }
        for (name, value) in [
            ("tolerance", self.diff.tolerance),
            ("absolute_tolerance", self.diff.absolute_tolerance),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(
                        Stage::Diff,
                        format!("{name} must be a non-negative number, got {v}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stages whose options differ from their defaults, with the options as JSON.
    pub fn non_default(&self) -> Vec<(Stage, Value)> {
        let defaults = Self::default();
        let mut out = Vec::new();
        for stage in Stage::ALL {
            let value = match stage {
                Stage::Load if self.load != defaults.load => serde_json::to_value(&self.load),
                Stage::FormatData if self.format_data != defaults.format_data => {
                    serde_json::to_value(&self.format_data)
                }
                Stage::Diff if self.diff != defaults.diff => serde_json::to_value(&self.diff),
                Stage::Filter if self.filter != defaults.filter => {
                    serde_json::to_value(&self.filter)
                }
                Stage::FormatDiff if self.format_diff != defaults.format_diff => {
                    serde_json::to_value(&self.format_diff)
                }
                Stage::Sort if self.sort != defaults.sort => serde_json::to_value(&self.sort),
                Stage::Concat if self.concat != defaults.concat => {
                    serde_json::to_value(&self.concat)
                }
                Stage::Report if self.report != defaults.report => {
                    serde_json::to_value(&self.report)
                }
                Stage::Save if self.save != defaults.save => serde_json::to_value(&self.save),
                _ => continue,
            };
            if let Ok(value) = value {
                out.push((stage, value));
            }
        }
        out
    }
}

fn invalid(stage: Stage, message: impl Into<String>) -> DcdError {
    DcdError::InvalidOption {
        stage: stage.name().to_string(),
        message: message.into(),
    }
}

/// Serialize `base`, overlay `overrides` and deserialize the result.
fn merge_stage<T>(stage: Stage, base: &T, overrides: &Map<String, Value>) -> DcdResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = match serde_json::to_value(base) {
        Ok(Value::Object(map)) => map,
        Ok(other) => return Err(invalid(stage, format!("expected an object, got {other}"))),
        Err(e) => return Err(invalid(stage, e.to_string())),
    };
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged)).map_err(|e| invalid(stage, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn routing_keys_round_trip() {
        for stage in Stage::ALL {
            if let Some(key) = stage.routing_key() {
                assert_eq!(Stage::from_routing_key(key), Some(stage));
            }
        }
        assert_eq!(Stage::from_routing_key("tolerance"), None);
    }

    #[test]
    fn merge_is_key_level() {
        let mut opts = StageOptions::default();
        opts.merge(Stage::Diff, &map(json!({"tolerance": 0.1})))
            .unwrap();
        opts.merge(Stage::Diff, &map(json!({"ignore": ["a.b"]})))
            .unwrap();
        assert_eq!(opts.diff.tolerance, Some(0.1));
        assert_eq!(opts.diff.ignore, vec!["a.b".to_string()]);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut opts = StageOptions::default();
        match opts.merge(Stage::Sort, &map(json!({"descending": true}))) {
            Err(DcdError::InvalidOption { stage, .. }) => assert_eq!(stage, "sort"),
            other => panic!("expected InvalidOption, got {:?}", other),
        }
    }

    #[test]
    fn ill_typed_value_is_rejected() {
        let mut opts = StageOptions::default();
        let err = opts
            .merge(Stage::Diff, &map(json!({"tolerance": "small"})))
            .unwrap_err();
        assert!(matches!(err, DcdError::InvalidOption { .. }));
    }

    #[test]
    fn concat_default_separator_survives_partial_merge() {
        let mut opts = StageOptions::default();
        opts.merge(Stage::Report, &map(json!({"show_options": false})))
            .unwrap();
        assert_eq!(opts.concat.separator, "\n");
        assert!(!opts.report.show_options);
    }

    #[test]
    fn validate_checks_patterns_and_tolerances() {
        let mut opts = StageOptions::default();
        opts.filter.exclude_locations.push("[".into());
        assert!(matches!(
            opts.validate(),
            Err(DcdError::InvalidPattern { .. })
        ));

        let mut opts = StageOptions::default();
        opts.diff.tolerance = Some(-1.0);
        assert!(matches!(
            opts.validate(),
            Err(DcdError::InvalidOption { .. })
        ));
    }

    #[test]
    fn non_default_lists_changed_stages_only() {
        let mut opts = StageOptions::default();
        assert!(opts.non_default().is_empty());
        opts.sort.reverse = true;
        opts.diff.tolerance = Some(0.5);
        let changed = opts.non_default();
        assert_eq!(
            changed,
            vec![
                (Stage::Diff, json!({"tolerance": 0.5})),
                (Stage::Sort, json!({"reverse": true})),
            ]
        );
    }
}
