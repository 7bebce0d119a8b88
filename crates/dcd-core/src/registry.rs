//! Extension-based comparator registry.
//!
//! The registry maps normalized extensions (`.json`) to shared comparator
//! instances. A fallback comparator always exists and handles every file
//! whose extension has no entry.
//!
//! A process-wide registry backs [`get_comparators`],
//! [`register_comparator`], [`unregister_comparator`] and
//! [`reset_comparators`]; runs take a snapshot of it when their config is
//! built, so changes never affect a comparison already in progress.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::debug;

use crate::comparator::Comparator;
use crate::comparators::{DefaultComparator, StructuredComparator};
use crate::error::{DcdError, DcdResult};
use crate::path::RelPath;

/// Normalize an extension to its lowercase, dot-prefixed form.
///
/// `"JSON"`, `"json"` and `".json"` all become `".json"`.
pub fn normalize_extension(ext: &str) -> DcdResult<String> {
    let trimmed = ext.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if bare.is_empty() || bare.contains(['/', '\\']) || bare.starts_with('.') {
        return Err(DcdError::InvalidExtension(ext.to_string()));
    }
    Ok(format!(".{}", bare.to_lowercase()))
}

/// A mapping from extension to comparator, plus the fallback.
#[derive(Clone, Debug)]
pub struct ComparatorRegistry {
    by_extension: BTreeMap<String, Arc<dyn Comparator>>,
    fallback: Arc<dyn Comparator>,
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        get_default_comparators()
    }
}

impl ComparatorRegistry {
    /// A registry with no extension entries and the given fallback.
    pub fn new(fallback: Arc<dyn Comparator>) -> Self {
        Self {
            by_extension: BTreeMap::new(),
            fallback,
        }
    }

    /// A registry with no extension entries and the binary fallback.
    pub fn empty() -> Self {
        Self::new(Arc::new(DefaultComparator))
    }

    /// Insert or replace the comparator of `ext`; returns the replaced one.
    pub fn register(
        &mut self,
        ext: &str,
        comparator: Arc<dyn Comparator>,
    ) -> DcdResult<Option<Arc<dyn Comparator>>> {
        let ext = normalize_extension(ext)?;
        debug!(ext = %ext, comparator = comparator.name(), "registering comparator");
        Ok(self.by_extension.insert(ext, comparator))
    }

    /// Insert the comparator of `ext`, refusing to replace an existing one.
    pub fn try_register(&mut self, ext: &str, comparator: Arc<dyn Comparator>) -> DcdResult<()> {
        let ext = normalize_extension(ext)?;
        if self.by_extension.contains_key(&ext) {
            return Err(DcdError::AlreadyRegistered(ext));
        }
        self.by_extension.insert(ext, comparator);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, ext: &str, comparator: Arc<dyn Comparator>) -> DcdResult<Self> {
        self.register(ext, comparator)?;
        Ok(self)
    }

    /// Remove the comparator of `ext`.
    pub fn unregister(&mut self, ext: &str) -> DcdResult<Arc<dyn Comparator>> {
        let ext = normalize_extension(ext)?;
        self.by_extension
            .remove(&ext)
            .ok_or(DcdError::NotRegistered(ext))
    }

    pub fn get(&self, ext: &str) -> Option<&Arc<dyn Comparator>> {
        let ext = normalize_extension(ext).ok()?;
        self.by_extension.get(&ext)
    }

    pub fn fallback(&self) -> &Arc<dyn Comparator> {
        &self.fallback
    }

    pub fn set_fallback(&mut self, comparator: Arc<dyn Comparator>) {
        self.fallback = comparator;
    }

    /// The comparator for a file: by its extension, else the fallback.
    pub fn for_path(&self, path: &RelPath) -> &Arc<dyn Comparator> {
        path.extension()
            .and_then(|ext| self.get(ext))
            .unwrap_or(&self.fallback)
    }

    /// Find a comparator by its [`Comparator::name`], the fallback included.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn Comparator>> {
        if self.fallback.name() == name {
            return Some(Arc::clone(&self.fallback));
        }
        self.by_extension
            .values()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Registered extensions in sorted order.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.by_extension.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

/// The built-in comparators: JSON, YAML, TOML, INI and XML documents, with
/// the binary fallback.
pub fn get_default_comparators() -> ComparatorRegistry {
    let json: Arc<dyn Comparator> = Arc::new(StructuredComparator::json());
    let yaml: Arc<dyn Comparator> = Arc::new(StructuredComparator::yaml());
    let toml: Arc<dyn Comparator> = Arc::new(StructuredComparator::toml());
    let ini: Arc<dyn Comparator> = Arc::new(StructuredComparator::ini());
    let xml: Arc<dyn Comparator> = Arc::new(StructuredComparator::xml());

    let mut by_extension = BTreeMap::new();
    by_extension.insert(".json".to_string(), json);
    by_extension.insert(".yaml".to_string(), Arc::clone(&yaml));
    by_extension.insert(".yml".to_string(), yaml);
    by_extension.insert(".toml".to_string(), toml);
    by_extension.insert(".ini".to_string(), Arc::clone(&ini));
    by_extension.insert(".cfg".to_string(), Arc::clone(&ini));
    by_extension.insert(".conf".to_string(), ini);
    by_extension.insert(".xml".to_string(), xml);
    ComparatorRegistry {
        by_extension,
        fallback: Arc::new(DefaultComparator),
    }
}

/// Look up a built-in comparator by name, registered or not.
pub fn builtin_comparator(name: &str) -> Option<Arc<dyn Comparator>> {
    get_default_comparators().find_by_name(name)
}

// ---------------------------------------------------------------------------
// Process-wide registry
// ---------------------------------------------------------------------------

static GLOBAL: LazyLock<RwLock<ComparatorRegistry>> =
    LazyLock::new(|| RwLock::new(get_default_comparators()));

/// A snapshot of the process-wide registry.
pub fn get_comparators() -> ComparatorRegistry {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Register a comparator in the process-wide registry, replacing any
/// existing entry for the extension. Returns the replaced comparator.
pub fn register_comparator(
    ext: &str,
    comparator: Arc<dyn Comparator>,
) -> DcdResult<Option<Arc<dyn Comparator>>> {
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(ext, comparator)
}

/// Remove a comparator from the process-wide registry.
pub fn unregister_comparator(ext: &str) -> DcdResult<Arc<dyn Comparator>> {
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .unregister(ext)
}

/// Restore the process-wide registry to the built-in comparators.
pub fn reset_comparators() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = get_default_comparators();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{Data, RawDiff};
    use crate::options::DiffOptions;

    #[derive(Debug)]
    struct Named(&'static str);

    impl Comparator for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn diff(&self, _: &Data, _: &Data, _: &DiffOptions) -> DcdResult<RawDiff> {
            Ok(RawDiff::Binary(false))
        }
    }

    fn rel(s: &str) -> RelPath {
        RelPath::new(s).unwrap()
    }

    #[test]
    fn extension_normalization() {
        assert_eq!(normalize_extension("JSON").unwrap(), ".json");
        assert_eq!(normalize_extension(".json").unwrap(), ".json");
        assert_eq!(normalize_extension(" yml ").unwrap(), ".yml");
        assert!(matches!(
            normalize_extension("."),
            Err(DcdError::InvalidExtension(_))
        ));
        assert!(normalize_extension("").is_err());
        assert!(normalize_extension("a/b").is_err());
    }

    #[test]
    fn defaults_and_fallback() {
        let registry = get_default_comparators();
        let exts: Vec<_> = registry.extensions().collect();
        assert_eq!(
            exts,
            vec![".cfg", ".conf", ".ini", ".json", ".toml", ".xml", ".yaml", ".yml"]
        );
        assert_eq!(registry.for_path(&rel("a/b.JSON")).name(), "JsonComparator");
        assert_eq!(registry.for_path(&rel("a/b.yml")).name(), "YamlComparator");
        assert_eq!(registry.for_path(&rel("setup.cfg")).name(), "IniComparator");
        assert_eq!(registry.for_path(&rel("a/b.xml")).name(), "XmlComparator");
        assert_eq!(registry.for_path(&rel("a/b.c")).name(), "DefaultComparator");
        assert_eq!(registry.for_path(&rel("Makefile")).name(), "DefaultComparator");
    }

    #[test]
    fn register_replaces_and_try_register_refuses() {
        let mut registry = ComparatorRegistry::empty();
        assert!(registry
            .register("c", Arc::new(Named("First")))
            .unwrap()
            .is_none());
        let old = registry.register(".C", Arc::new(Named("Second"))).unwrap();
        assert_eq!(old.map(|c| c.name().to_string()), Some("First".into()));
        assert_eq!(registry.len(), 1);

        match registry.try_register("c", Arc::new(Named("Third"))) {
            Err(DcdError::AlreadyRegistered(ext)) => assert_eq!(ext, ".c"),
            other => panic!("expected AlreadyRegistered, got {:?}", other),
        }
        assert_eq!(registry.for_path(&rel("x.c")).name(), "Second");
    }

    #[test]
    fn unregister_falls_back() {
        let mut registry = get_default_comparators();
        let removed = registry.unregister("json").unwrap();
        assert_eq!(removed.name(), "JsonComparator");
        assert_eq!(registry.for_path(&rel("x.json")).name(), "DefaultComparator");
        assert!(matches!(
            registry.unregister("json"),
            Err(DcdError::NotRegistered(_))
        ));
    }

    #[test]
    fn lookup_by_name() {
        let registry = get_default_comparators();
        assert!(registry.find_by_name("TomlComparator").is_some());
        assert!(registry.find_by_name("DefaultComparator").is_some());
        assert!(registry.find_by_name("Nope").is_none());

        let empty = ComparatorRegistry::empty();
        assert!(empty.find_by_name("YamlComparator").is_none());
        assert!(builtin_comparator("YamlComparator").is_some());
    }

    #[test]
    fn process_wide_registry() {
        let ext = ".registry-test";
        assert!(register_comparator(ext, Arc::new(Named("Global")))
            .unwrap()
            .is_none());
        assert_eq!(
            get_comparators()
                .for_path(&rel("f.registry-test"))
                .name(),
            "Global"
        );
        assert_eq!(unregister_comparator(ext).unwrap().name(), "Global");
        assert!(get_comparators().get(ext).is_none());
    }
}
