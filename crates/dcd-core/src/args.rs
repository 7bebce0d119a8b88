//! Per-file argument resolution.
//!
//! The effective options of a file are built in layers, later layers
//! overriding earlier ones key by key:
//!
//! 1. the comparator's [`default_options`](crate::Comparator::default_options);
//! 2. the run-wide [`ArgsLayer`];
//! 3. at most one [`SpecificArgsEntry`]: the entry keyed by the exact relative
//!    path if there is one, otherwise the first pattern-keyed entry (in
//!    declaration order) with a pattern matching the path.
//!
//! The selected entry may also replace the comparator chosen by extension.
//! Pattern entries never combine: later matching entries are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::comparator::Comparator;
use crate::error::{DcdError, DcdResult};
use crate::options::{Stage, StageOptions, COMPARATOR_KEY, PATTERNS_KEY, RETURN_RAW_DIFFS_KEY};
use crate::path::RelPath;
use crate::pattern::PatternSet;
use crate::registry::{builtin_comparator, ComparatorRegistry};

// ---------------------------------------------------------------------------
// ArgsLayer
// ---------------------------------------------------------------------------

/// One layer of untyped option overrides, already routed to stages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgsLayer {
    return_raw_diffs: Option<bool>,
    stages: BTreeMap<Stage, Map<String, Value>>,
}

impl ArgsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route the keys of an argument mapping.
    ///
    /// `return_raw_diffs` and the `*_kwargs` routing keys go to their stage;
    /// every other key is a diff option.
    pub fn from_map(map: &Map<String, Value>) -> DcdResult<Self> {
        let mut layer = Self::default();
        for (key, value) in map {
            if key == RETURN_RAW_DIFFS_KEY {
                let flag = value.as_bool().ok_or_else(|| DcdError::InvalidOption {
                    stage: RETURN_RAW_DIFFS_KEY.into(),
                    message: format!("expected a boolean, got {value}"),
                })?;
                layer.return_raw_diffs = Some(flag);
            } else if let Some(stage) = Stage::from_routing_key(key) {
                let Value::Object(options) = value else {
                    return Err(DcdError::InvalidOption {
                        stage: stage.name().into(),
                        message: format!("'{key}' must be a mapping, got {value}"),
                    });
                };
                let target = layer.stages.entry(stage).or_default();
                for (k, v) in options {
                    target.insert(k.clone(), v.clone());
                }
            } else if key == COMPARATOR_KEY || key == PATTERNS_KEY {
                return Err(DcdError::InvalidConfig(format!(
                    "'{key}' is only valid in a specific-args entry"
                )));
            } else {
                layer
                    .stages
                    .entry(Stage::Diff)
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
        }
        Ok(layer)
    }

    pub fn from_value(value: &Value) -> DcdResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::Null => Ok(Self::default()),
            other => Err(DcdError::InvalidConfig(format!(
                "arguments must be a mapping, got {other}"
            ))),
        }
    }

    /// Set one option of one stage.
    pub fn with_option(mut self, stage: Stage, key: impl Into<String>, value: Value) -> Self {
        self.stages.entry(stage).or_default().insert(key.into(), value);
        self
    }

    pub fn with_return_raw_diffs(mut self, flag: bool) -> Self {
        self.return_raw_diffs = Some(flag);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.return_raw_diffs.is_none() && self.stages.values().all(Map::is_empty)
    }

    /// Overlay this layer onto `options`.
    pub fn apply_to(&self, options: &mut StageOptions) -> DcdResult<()> {
        if let Some(flag) = self.return_raw_diffs {
            options.return_raw_diffs = flag;
        }
        for (stage, overrides) in &self.stages {
            options.merge(*stage, overrides)?;
        }
        Ok(())
    }

    /// Check that this layer applies cleanly on top of default options.
    pub fn validate(&self) -> DcdResult<()> {
        let mut options = StageOptions::default();
        self.apply_to(&mut options)?;
        options.validate()
    }
}

// ---------------------------------------------------------------------------
// Specific args
// ---------------------------------------------------------------------------

/// A comparator chosen by a specific-args entry.
#[derive(Clone)]
pub enum ComparatorChoice {
    /// Looked up by [`Comparator::name`] in the registry, then among built-ins.
    Named(String),
    Instance(Arc<dyn Comparator>),
}

impl fmt::Debug for ComparatorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Instance(c) => f.debug_tuple("Instance").field(&c.name()).finish(),
        }
    }
}

#[derive(Clone, Debug)]
enum EntryKey {
    Exact(RelPath),
    Patterns(PatternSet),
}

/// Overrides for one relative path or for every path matching its patterns.
#[derive(Clone, Debug)]
pub struct SpecificArgsEntry {
    label: String,
    key: EntryKey,
    comparator: Option<ComparatorChoice>,
    layer: ArgsLayer,
}

impl SpecificArgsEntry {
    /// An entry applying to exactly one relative path.
    pub fn exact(path: &str) -> DcdResult<Self> {
        let rel = RelPath::new(path)?;
        Ok(Self {
            label: rel.to_string(),
            key: EntryKey::Exact(rel),
            comparator: None,
            layer: ArgsLayer::default(),
        })
    }

    /// An entry applying to every path matched by one of `patterns`.
    pub fn patterns<I, S>(label: impl Into<String>, patterns: I) -> DcdResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let label = label.into();
        let set = PatternSet::new(patterns)?;
        if set.is_empty() {
            return Err(DcdError::InvalidConfig(format!(
                "entry '{label}' has an empty pattern list"
            )));
        }
        Ok(Self {
            label,
            key: EntryKey::Patterns(set),
            comparator: None,
            layer: ArgsLayer::default(),
        })
    }

    /// Parse one entry of a specific-args mapping.
    ///
    /// Entries with a `patterns` list are pattern-keyed, all others are keyed
    /// by `label` as a relative path.
    pub fn from_map(label: &str, map: &Map<String, Value>) -> DcdResult<Self> {
        let mut rest = map.clone();
        let mut entry = match rest.remove(PATTERNS_KEY) {
            Some(Value::Array(items)) => {
                let patterns = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            DcdError::InvalidConfig(format!(
                                "entry '{label}': patterns must be strings, got {item}"
                            ))
                        })
                    })
                    .collect::<DcdResult<Vec<_>>>()?;
                Self::patterns(label, patterns)?
            }
            Some(other) => {
                return Err(DcdError::InvalidConfig(format!(
                    "entry '{label}': patterns must be a list, got {other}"
                )))
            }
            None => Self::exact(label)?,
        };

        match rest.remove(COMPARATOR_KEY) {
            Some(Value::String(name)) => entry.comparator = Some(ComparatorChoice::Named(name)),
            Some(Value::Null) | None => {}
            Some(other) => {
                return Err(DcdError::InvalidConfig(format!(
                    "entry '{label}': comparator must be a name, got {other}"
                )))
            }
        }
        entry.layer = ArgsLayer::from_map(&rest)?;
        Ok(entry)
    }

    pub fn with_comparator(mut self, comparator: ComparatorChoice) -> Self {
        self.comparator = Some(comparator);
        self
    }

    pub fn with_layer(mut self, layer: ArgsLayer) -> Self {
        self.layer = layer;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layer(&self) -> &ArgsLayer {
        &self.layer
    }

    pub fn comparator(&self) -> Option<&ComparatorChoice> {
        self.comparator.as_ref()
    }

    pub fn is_exact(&self) -> bool {
        matches!(self.key, EntryKey::Exact(_))
    }

    fn matches(&self, path: &RelPath) -> bool {
        match &self.key {
            EntryKey::Exact(rel) => rel == path,
            EntryKey::Patterns(set) => set.is_match(path.as_str()),
        }
    }
}

/// Every specific-args entry of a run, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct SpecificArgs {
    entries: Vec<SpecificArgsEntry>,
}

impl SpecificArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a mapping of entry label to entry. Declaration order is kept.
    pub fn from_value(value: &Value) -> DcdResult<Self> {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(DcdError::InvalidConfig(format!(
                    "specific args must be a mapping, got {other}"
                )))
            }
        };
        let mut args = Self::default();
        for (label, entry) in map {
            let Value::Object(entry) = entry else {
                return Err(DcdError::InvalidConfig(format!(
                    "entry '{label}' must be a mapping, got {entry}"
                )));
            };
            args.push(SpecificArgsEntry::from_map(label, entry)?)?;
        }
        Ok(args)
    }

    /// Append an entry. Two exact entries for one path are rejected.
    pub fn push(&mut self, entry: SpecificArgsEntry) -> DcdResult<()> {
        if let EntryKey::Exact(rel) = &entry.key {
            if self.entries.iter().any(|e| e.is_exact() && e.matches(rel)) {
                return Err(DcdError::InvalidConfig(format!(
                    "duplicate entry for '{rel}'"
                )));
            }
        }
        entry.layer.validate()?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn with(mut self, entry: SpecificArgsEntry) -> DcdResult<Self> {
        self.push(entry)?;
        Ok(self)
    }

    pub fn entries(&self) -> &[SpecificArgsEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry applying to `path`: exact first, then the first matching pattern entry.
    pub fn select(&self, path: &RelPath) -> Option<&SpecificArgsEntry> {
        self.entries
            .iter()
            .find(|e| e.is_exact() && e.matches(path))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| !e.is_exact() && e.matches(path))
            })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Where the specific overrides of a file came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgsSource {
    Default,
    Exact(String),
    Pattern(String),
}

/// The comparator and options to use for one file.
#[derive(Clone, Debug)]
pub struct ResolvedArgs {
    pub comparator: Arc<dyn Comparator>,
    pub options: StageOptions,
    pub source: ArgsSource,
}

/// Compute the effective comparator and options for `path`.
pub fn resolve_args(
    path: &RelPath,
    registry: &ComparatorRegistry,
    global: &ArgsLayer,
    specific: &SpecificArgs,
) -> DcdResult<ResolvedArgs> {
    let selected = specific.select(path);

    let comparator = match selected.and_then(SpecificArgsEntry::comparator) {
        Some(ComparatorChoice::Named(name)) => registry
            .find_by_name(name)
            .or_else(|| builtin_comparator(name))
            .ok_or_else(|| DcdError::UnknownComparator(name.clone()))?,
        Some(ComparatorChoice::Instance(comparator)) => Arc::clone(comparator),
        None => Arc::clone(registry.for_path(path)),
    };

    let mut options = comparator.default_options();
    global.apply_to(&mut options)?;
    let source = match selected {
        Some(entry) => {
            entry.layer.apply_to(&mut options)?;
            if entry.is_exact() {
                ArgsSource::Exact(entry.label.clone())
            } else {
                ArgsSource::Pattern(entry.label.clone())
            }
        }
        None => ArgsSource::Default,
    };
    options.validate()?;

    debug!(
        path = %path,
        comparator = comparator.name(),
        source = ?source,
        "resolved arguments"
    );
    Ok(ResolvedArgs {
        comparator,
        options,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{Data, RawDiff};
    use crate::options::DiffOptions;
    use crate::registry::get_default_comparators;
    use serde_json::json;

    #[derive(Debug)]
    struct Tolerant;

    impl Comparator for Tolerant {
        fn name(&self) -> &str {
            "Tolerant"
        }

        fn default_options(&self) -> StageOptions {
            let mut options = StageOptions::default();
            options.diff.tolerance = Some(0.5);
            options.diff.absolute_tolerance = Some(1.0);
            options
        }

        fn diff(&self, _: &Data, _: &Data, _: &DiffOptions) -> DcdResult<RawDiff> {
            Ok(RawDiff::Binary(false))
        }
    }

    fn rel(s: &str) -> RelPath {
        RelPath::new(s).unwrap()
    }

    #[test]
    fn routing_of_keys() {
        let layer = ArgsLayer::from_value(&json!({
            "tolerance": 0.1,
            "return_raw_diffs": true,
            "sort_kwargs": {"reverse": true},
            "load_kwargs": {"params": {"sheet": 1}},
        }))
        .unwrap();
        let mut options = StageOptions::default();
        layer.apply_to(&mut options).unwrap();
        assert_eq!(options.diff.tolerance, Some(0.1));
        assert!(options.return_raw_diffs);
        assert!(options.sort.reverse);
        assert_eq!(options.load.params.get("sheet"), Some(&json!(1)));
    }

    #[test]
    fn routing_key_must_hold_a_mapping() {
        assert!(matches!(
            ArgsLayer::from_value(&json!({"sort_kwargs": true})),
            Err(DcdError::InvalidOption { .. })
        ));
        assert!(matches!(
            ArgsLayer::from_value(&json!({"comparator": "JsonComparator"})),
            Err(DcdError::InvalidConfig(_))
        ));
    }

    #[test]
    fn layers_override_key_by_key() {
        let mut registry = get_default_comparators();
        registry.register("c", Arc::new(Tolerant)).unwrap();
        let global = ArgsLayer::from_value(&json!({"tolerance": 0.2})).unwrap();
        let specific = SpecificArgs::from_value(&json!({
            "file.c": {"ignore": ["a"]}
        }))
        .unwrap();

        let resolved = resolve_args(&rel("file.c"), &registry, &global, &specific).unwrap();
        assert_eq!(resolved.comparator.name(), "Tolerant");
        assert_eq!(resolved.options.diff.tolerance, Some(0.2));
        assert_eq!(resolved.options.diff.absolute_tolerance, Some(1.0));
        assert_eq!(resolved.options.diff.ignore, vec!["a".to_string()]);
        assert_eq!(resolved.source, ArgsSource::Exact("file.c".into()));
    }

    #[test]
    fn unmatched_path_uses_defaults_and_global() {
        let registry = get_default_comparators();
        let global = ArgsLayer::new().with_option(Stage::Sort, "reverse", json!(true));
        let specific = SpecificArgs::from_value(&json!({
            "other.json": {"tolerance": 0.3},
            "by_pattern": {"patterns": ["sub/.*"], "tolerance": 0.4}
        }))
        .unwrap();

        let resolved = resolve_args(&rel("file.json"), &registry, &global, &specific).unwrap();
        assert_eq!(resolved.source, ArgsSource::Default);
        assert_eq!(resolved.options.diff.tolerance, None);
        assert!(resolved.options.sort.reverse);
        assert_eq!(resolved.comparator.name(), "JsonComparator");
    }

    #[test]
    fn exact_entry_beats_pattern_entry() {
        let registry = get_default_comparators();
        let specific = SpecificArgs::from_value(&json!({
            "all_json": {"patterns": [".*\\.json"], "comparator": "YamlComparator", "tolerance": 0.9},
            "sub/file.json": {"comparator": "TomlComparator", "tolerance": 0.1}
        }))
        .unwrap();

        let resolved =
            resolve_args(&rel("sub/file.json"), &registry, &ArgsLayer::new(), &specific).unwrap();
        assert_eq!(resolved.comparator.name(), "TomlComparator");
        assert_eq!(resolved.options.diff.tolerance, Some(0.1));
        assert_eq!(resolved.source, ArgsSource::Exact("sub/file.json".into()));

        let other =
            resolve_args(&rel("sub/other.json"), &registry, &ArgsLayer::new(), &specific).unwrap();
        assert_eq!(other.comparator.name(), "YamlComparator");
        assert_eq!(other.source, ArgsSource::Pattern("all_json".into()));
    }

    #[test]
    fn first_matching_pattern_entry_wins() {
        let registry = get_default_comparators();
        let specific = SpecificArgs::from_value(&json!({
            "first": {"patterns": ["data/"], "tolerance": 0.1},
            "second": {"patterns": ["data/.*\\.json"], "tolerance": 0.2, "sort_kwargs": {"reverse": true}}
        }))
        .unwrap();

        let resolved =
            resolve_args(&rel("data/x.json"), &registry, &ArgsLayer::new(), &specific).unwrap();
        assert_eq!(resolved.source, ArgsSource::Pattern("first".into()));
        assert_eq!(resolved.options.diff.tolerance, Some(0.1));
        assert!(!resolved.options.sort.reverse, "entries must not be merged");
    }

    #[test]
    fn comparator_instance_override() {
        let registry = get_default_comparators();
        let specific = SpecificArgs::new()
            .with(
                SpecificArgsEntry::patterns("custom", [r".*\.bin"])
                    .unwrap()
                    .with_comparator(ComparatorChoice::Instance(Arc::new(Tolerant))),
            )
            .unwrap();
        let resolved =
            resolve_args(&rel("x/y.bin"), &registry, &ArgsLayer::new(), &specific).unwrap();
        assert_eq!(resolved.comparator.name(), "Tolerant");
        assert_eq!(resolved.options.diff.tolerance, Some(0.5));
    }

    #[test]
    fn unknown_comparator_is_fatal() {
        let registry = get_default_comparators();
        let specific = SpecificArgs::from_value(&json!({
            "file.json": {"comparator": "NoSuchComparator"}
        }))
        .unwrap();
        match resolve_args(&rel("file.json"), &registry, &ArgsLayer::new(), &specific) {
            Err(DcdError::UnknownComparator(name)) => assert_eq!(name, "NoSuchComparator"),
            other => panic!("expected UnknownComparator, got {:?}", other),
        }
    }

    #[test]
    fn invalid_entries_are_rejected_early() {
        assert!(matches!(
            SpecificArgs::from_value(&json!({"file.json": {"no_such_option": 1}})),
            Err(DcdError::InvalidOption { .. })
        ));
        assert!(matches!(
            SpecificArgs::from_value(&json!({"e": {"patterns": ["("]}})),
            Err(DcdError::InvalidPattern { .. })
        ));
        assert!(matches!(
            SpecificArgs::from_value(&json!({"e": {"patterns": []}})),
            Err(DcdError::InvalidConfig(_))
        ));
        assert!(matches!(
            SpecificArgs::from_value(&json!(["not", "a", "mapping"])),
            Err(DcdError::InvalidConfig(_))
        ));
        assert!(matches!(
            SpecificArgs::new()
                .with(SpecificArgsEntry::exact("a.json").unwrap())
                .unwrap()
                .with(SpecificArgsEntry::exact("./a.json").unwrap()),
            Err(DcdError::InvalidConfig(_))
        ));
    }
}
