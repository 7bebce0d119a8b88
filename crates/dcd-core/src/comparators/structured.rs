//! Comparators for structured documents (JSON, YAML, TOML, INI, XML).
//!
//! Every codec parses into a `serde_json::Value`, so the formatting and diff
//! stages are shared; only parsing and saving depend on the codec.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::comparator::{Comparator, Data, RawDiff};
use crate::comparators::selector::Selector;
use crate::comparators::{ini, xml};
use crate::comparators::value_diff::{diff_values, DiffSettings};
use crate::error::{DcdError, DcdResult};
use crate::options::{DiffOptions, FormatDataOptions, LoadOptions, ReplacePattern, SaveOptions};
use crate::pattern::compile;

/// A document serialization format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Json,
    Yaml,
    Toml,
    Ini,
    Xml,
}

impl Codec {
    pub fn parse(self, text: &str) -> Result<Value, String> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Self::Ini => ini::parse(text),
            Self::Xml => xml::parse(text),
        }
    }

    pub fn render(self, value: &Value, pretty: bool) -> Result<String, String> {
        match self {
            Self::Json if pretty => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string(value).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
            Self::Toml if pretty => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Toml => toml::to_string(value).map_err(|e| e.to_string()),
            Self::Ini => ini::render(value),
            Self::Xml => xml::render(value, pretty),
        }
    }
}

/// Loads a document, applies value replacements and diffs it structurally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructuredComparator {
    codec: Codec,
}

impl StructuredComparator {
    pub const fn new(codec: Codec) -> Self {
        Self { codec }
    }

    pub const fn json() -> Self {
        Self::new(Codec::Json)
    }

    pub const fn yaml() -> Self {
        Self::new(Codec::Yaml)
    }

    pub const fn toml() -> Self {
        Self::new(Codec::Toml)
    }

    pub const fn ini() -> Self {
        Self::new(Codec::Ini)
    }

    pub const fn xml() -> Self {
        Self::new(Codec::Xml)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

impl Comparator for StructuredComparator {
    fn name(&self) -> &str {
        match self.codec {
            Codec::Json => "JsonComparator",
            Codec::Yaml => "YamlComparator",
            Codec::Toml => "TomlComparator",
            Codec::Ini => "IniComparator",
            Codec::Xml => "XmlComparator",
        }
    }

    fn load(&self, path: &Path, _options: &LoadOptions) -> DcdResult<Data> {
        let text = std::fs::read_to_string(path).map_err(|e| DcdError::io(path, e))?;
        self.codec
            .parse(&text)
            .map(Data::Value)
            .map_err(|message| DcdError::Load {
                path: path.to_path_buf(),
                message,
            })
    }

    fn format_data(&self, data: Data, options: &FormatDataOptions) -> DcdResult<Data> {
        let mut value = match data {
            Data::Value(value) => value,
            other => return Ok(other),
        };
        for replace in &options.replace_patterns {
            apply_replace(&mut value, replace)?;
        }
        Ok(Data::Value(value))
    }

    fn diff(&self, reference: &Data, compared: &Data, options: &DiffOptions) -> DcdResult<RawDiff> {
        match (reference.as_value(), compared.as_value()) {
            (Some(a), Some(b)) => Ok(RawDiff::Entries(diff_values(
                a,
                b,
                &DiffSettings::from(options),
            ))),
            _ => Err(DcdError::Diff(format!(
                "{} expects structured data on both sides",
                self.name()
            ))),
        }
    }

    fn can_save(&self) -> bool {
        true
    }

    fn save(&self, data: &Data, path: &Path, options: &SaveOptions) -> DcdResult<()> {
        let value = data.as_value().ok_or_else(|| DcdError::Save {
            path: path.to_path_buf(),
            message: "nothing structured to save".into(),
        })?;
        let text = self
            .codec
            .render(value, options.pretty)
            .map_err(|message| DcdError::Save {
                path: path.to_path_buf(),
                message,
            })?;
        std::fs::write(path, text).map_err(|e| DcdError::io(path, e))
    }
}

/// Apply one regex replacement to every string reached by its paths.
fn apply_replace(value: &mut Value, replace: &ReplacePattern) -> DcdResult<()> {
    let re = compile(&replace.pattern)?;
    let template = expand_template(&replace.replacement);
    for raw in &replace.paths {
        let selector = Selector::parse(raw)?;
        let reached = selector.for_each_mut(value, &mut |v| {
            if let Value::String(s) = v {
                let replaced = re.replacen(s.as_str(), replace.count, template.as_str());
                *s = replaced.into_owned();
            }
        })?;
        if reached == 0 {
            return Err(DcdError::Format(format!(
                "the path '{}' is missing in the document, please fix the replace pattern",
                selector.as_str()
            )));
        }
        debug!(path = %selector.as_str(), reached, "applied replace pattern");
    }
    Ok(())
}

/// Rewrite a replacement template with `\1` and `\g<name>` group references
/// into the `regex` crate's `${1}` form. `$` is literal.
fn expand_template(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '$' => {
                out.push_str("$$");
                continue;
            }
            '\\' => {}
            _ => {
                out.push(c);
                continue;
            }
        }

        let digits = rest.len() - rest.trim_start_matches(|d: char| d.is_ascii_digit()).len();
        if digits > 0 {
            out.push_str(&format!("${{{}}}", &rest[..digits]));
            rest = &rest[digits..];
            continue;
        }
        if let Some((group, tail)) = rest.strip_prefix("g<").and_then(|g| g.split_once('>')) {
            out.push_str(&format!("${{{group}}}"));
            rest = tail;
            continue;
        }
        let escaped = match rest.chars().next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('\\') => '\\',
            _ => {
                out.push('\\');
                continue;
            }
        };
        out.push(escaped);
        rest = &rest[1..];
    }
    out
}
