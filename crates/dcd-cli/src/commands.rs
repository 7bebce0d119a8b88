use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use colored::Colorize;
use dcd_core::{
    compare_files, compare_trees, get_comparators, resolve_args, ArgsLayer, ComparisonConfig,
    ExportMode, RelPath, SpecificArgs, SpecificArgsEntry,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cli::Cli;

/// Whether the inputs matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Equal,
    Different,
}

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    Ok(match execute(&cli)? {
        Outcome::Equal => ExitCode::SUCCESS,
        Outcome::Different => ExitCode::FAILURE,
    })
}

pub fn execute(cli: &Cli) -> anyhow::Result<Outcome> {
    let config = load_config(cli.config.as_deref())?;
    let (reference, compared) = (&cli.reference_input, &cli.compared_input);
    if reference.is_dir() && compared.is_dir() {
        cmd_compare_dirs(cli, &config)
    } else if reference.is_file() && compared.is_file() {
        cmd_compare_files(cli, &config)
    } else {
        bail!(
            "'{}' and '{}' must both be directories or both be files",
            reference.display(),
            compared.display()
        )
    }
}

fn cmd_compare_dirs(cli: &Cli, config: &Value) -> anyhow::Result<Outcome> {
    let specific = SpecificArgs::from_value(config).context("invalid configuration")?;
    let mut builder = ComparisonConfig::builder()
        .specific_args(specific)
        .include_patterns(cli.include.iter().cloned())
        .exclude_patterns(cli.exclude.iter().cloned())
        .export(export_mode(cli)?)
        .follow_symlinks(cli.follow_symlinks);
    if let Some(threads) = cli.threads {
        builder = builder.max_workers(threads);
    }
    let config = builder.build()?;

    let result = compare_trees(&cli.reference_input, &cli.compared_input, &config)?;
    if result.is_empty() {
        print_equal(cli);
        return Ok(Outcome::Equal);
    }
    println!(
        "{} Differences found between '{}' and '{}':",
        "✗".red().bold(),
        cli.reference_input.display(),
        cli.compared_input.display()
    );
    for (path, report) in result.iter() {
        println!("\n{}", path.as_str().yellow().bold());
        println!("{report}");
    }
    Ok(Outcome::Different)
}

/// Compare two files. The configuration is a single entry: an optional
/// `comparator` and stage options.
fn cmd_compare_files(cli: &Cli, config: &Value) -> anyhow::Result<Outcome> {
    let name = cli
        .reference_input
        .file_name()
        .and_then(|n| n.to_str())
        .context("the reference file has no usable name")?;
    let entry = match config {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => bail!("the configuration of a file comparison must be a mapping, got {other}"),
    };
    let specific = SpecificArgs::new().with(SpecificArgsEntry::from_map(name, &entry)?)?;
    let rel = RelPath::new(name)?;
    let resolved = resolve_args(&rel, &get_comparators(), &ArgsLayer::new(), &specific)?;
    debug!(comparator = resolved.comparator.name(), "comparing files");

    let export_target = export_mode(cli)?
        .suffix()
        .map(|suffix| with_name_suffix(&cli.compared_input, suffix));
    let report = compare_files(
        &cli.reference_input,
        &cli.compared_input,
        resolved.comparator.as_ref(),
        &resolved.options,
        export_target.as_deref(),
    );
    match report {
        None => {
            print_equal(cli);
            Ok(Outcome::Equal)
        }
        Some(report) => {
            println!("{} {report}", "✗".red().bold());
            Ok(Outcome::Different)
        }
    }
}

fn print_equal(cli: &Cli) {
    println!(
        "{} No difference found between '{}' and '{}'.",
        "✓".green().bold(),
        cli.reference_input.display(),
        cli.compared_input.display()
    );
}

fn export_mode(cli: &Cli) -> anyhow::Result<ExportMode> {
    Ok(match (cli.export_formatted_files, cli.export_suffix.as_deref()) {
        (false, _) => ExportMode::Disabled,
        (true, None) => ExportMode::Enabled,
        (true, Some(suffix)) => ExportMode::with_suffix(suffix)?,
    })
}

/// `dir/name.ext` becomes `dir/name<suffix>.ext`.
fn with_name_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

/// Read the `--config` argument: a path to a JSON, YAML or TOML document, or
/// an inline JSON string.
pub fn load_config(raw: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let path = Path::new(raw);
    if !path.is_file() {
        return serde_json::from_str(raw)
            .context("--config is neither an existing file nor a valid JSON string");
    }

    let text =
        fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let value = match ext.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
        Some("toml") => {
            toml::from_str(&text).with_context(|| format!("invalid TOML in {}", path.display()))?
        }
        _ => serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
    };
    debug!(path = %path.display(), "loaded configuration file");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dcd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn inline_json_config() {
        let value = load_config(Some(r#"{"file.json": {"tolerance": 0.1}}"#)).unwrap();
        assert_eq!(value, json!({"file.json": {"tolerance": 0.1}}));
        assert_eq!(load_config(None).unwrap(), Value::Null);
        assert!(load_config(Some("not json and not a file")).is_err());
    }

    #[test]
    fn config_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("args.yaml");
        fs::write(&yaml, "all_json:\n  patterns: ['.*\\.json']\n  tolerance: 0.1\n").unwrap();
        let toml_file = dir.path().join("args.toml");
        fs::write(&toml_file, "[\"file.json\"]\ntolerance = 0.1\n").unwrap();

        assert_eq!(
            load_config(yaml.to_str()).unwrap(),
            json!({"all_json": {"patterns": [".*\\.json"], "tolerance": 0.1}})
        );
        assert_eq!(
            load_config(toml_file.to_str()).unwrap(),
            json!({"file.json": {"tolerance": 0.1}})
        );
    }

    #[test]
    fn suffix_is_inserted_before_the_extension() {
        assert_eq!(
            with_name_suffix(Path::new("out/data.json"), "_FORMATTED"),
            PathBuf::from("out/data_FORMATTED.json")
        );
        assert_eq!(
            with_name_suffix(Path::new("out/Makefile"), "_X"),
            PathBuf::from("out/Makefile_X")
        );
    }

    #[test]
    fn directory_mode() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference");
        let compared = dir.path().join("compared");
        touch(&reference, "file.json", r#"{"a": 1.0}"#);
        touch(&compared, "file.json", r#"{"a": 1.05}"#);
        let (r, c) = (reference.to_str().unwrap(), compared.to_str().unwrap());

        assert_eq!(execute(&cli(&[r, c])).unwrap(), Outcome::Different);
        let tolerant = r#"{"file.json": {"tolerance": 0.1}}"#;
        assert_eq!(execute(&cli(&[r, c, "-c", tolerant])).unwrap(), Outcome::Equal);
    }

    #[test]
    fn file_mode_with_comparator_override() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt", "key: 1\nother: 2\n");
        touch(dir.path(), "b.txt", "other: 2\nkey: 1\n");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let (a, b) = (a.to_str().unwrap(), b.to_str().unwrap());

        assert_eq!(execute(&cli(&[a, b])).unwrap(), Outcome::Different);
        let yaml = r#"{"comparator": "YamlComparator"}"#;
        assert_eq!(execute(&cli(&[a, b, "-c", yaml, "-f"])).unwrap(), Outcome::Equal);
        assert!(dir.path().join("b_FORMATTED.txt").is_file());
    }

    #[test]
    fn mixed_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "file.json", "{}");
        let d = dir.path().to_str().unwrap().to_string();
        let f = dir.path().join("file.json").to_str().unwrap().to_string();
        assert!(execute(&cli(&[&d, &f])).is_err());
    }
}
