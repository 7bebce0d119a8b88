//! Report message formatting.

use serde_json::Value;

use crate::comparator::{PathSegment, ReportContext};
use crate::options::StageOptions;

/// Build the report of one differing file pair.
///
/// The header ends with `.` when there is nothing else to say, otherwise with
/// `:` followed by the non-default stage options and `details`.
pub fn diff_message(
    context: &ReportContext<'_>,
    details: Option<&str>,
    options: &StageOptions,
) -> String {
    let option_lines: Vec<String> = if options.report.show_options {
        options
            .non_default()
            .into_iter()
            .map(|(stage, value)| {
                format!(
                    "Kwargs used for {}: {}\n",
                    stage.description(),
                    to_display_json(&value)
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    let eol = if details.is_some() || !option_lines.is_empty() {
        ":\n"
    } else {
        "."
    };
    let mut msg = format!(
        "The files '{}' and '{}' are different{eol}",
        context.reference.display(),
        context.compared.display()
    );
    for line in option_lines {
        msg.push_str(&line);
    }
    if let Some(details) = details {
        msg.push_str(details);
    }
    msg
}

/// Render added or removed children as a JSON object with sorted keys.
pub fn render_entries(values: &[(PathSegment, Value)]) -> String {
    let mut sorted: Vec<&(PathSegment, Value)> = values.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::from("{");
    for (i, (key, value)) in sorted.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_json_string(&mut out, &key.to_string());
        out.push_str(": ");
        write_json(&mut out, value);
    }
    out.push('}');
    out
}

/// Render one side of a change: strings are single-quoted, everything else
/// is shown as JSON.
pub fn render_change_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => to_display_json(other),
    }
}

/// JSON with `", "` and `": "` separators, on a single line.
pub fn to_display_json(value: &Value) -> String {
    let mut out = String::new();
    write_json(&mut out, value);
    out
}

fn write_json(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_json(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_json_string(out, key);
                out.push_str(": ");
                write_json(out, item);
            }
            out.push('}');
        }
        Value::String(s) => write_json_string(out, s),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
