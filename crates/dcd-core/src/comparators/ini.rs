//! INI documents as `section -> option -> value` mappings.
//!
//! Option names are lowercased. A value that parses as JSON (`1`, `true`,
//! `[1, 2]`, `"text"`) is stored as that JSON value, anything else as a
//! plain string. Saving writes every value back as JSON.

use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use serde_json::{Map, Value};

pub fn parse(text: &str) -> Result<Value, String> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(text, options).map_err(|e| e.to_string())?;

    let mut sections = Map::new();
    for (section, properties) in ini.iter() {
        let Some(section) = section else {
            if properties.is_empty() {
                continue;
            }
            return Err("options must be declared below a [section] header".into());
        };
        let entry = sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(options) = entry else {
            continue;
        };
        for (key, raw) in properties.iter() {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.into()));
            options.insert(key.to_lowercase(), value);
        }
    }
    Ok(Value::Object(sections))
}

pub fn render(value: &Value) -> Result<String, String> {
    let Value::Object(sections) = value else {
        return Err("an INI document must be a mapping of sections".into());
    };
    let mut ini = Ini::new();
    for (section, options) in sections {
        let Value::Object(options) = options else {
            return Err(format!("section '{section}' must be a mapping"));
        };
        let mut setter = ini.with_section(Some(section.as_str()));
        for (key, value) in options {
            let encoded = serde_json::to_string(value).map_err(|e| e.to_string())?;
            setter.set(key.as_str(), encoded);
        }
    }

    let options = WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..WriteOption::default()
    };
    let mut out = Vec::new();
    ini.write_to_opt(&mut out, options)
        .map_err(|e| e.to_string())?;
    String::from_utf8(out).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_are_read_as_json_when_possible() {
        let text = "[section]\nCount = 3\nflag = true\nitems = [1, 2]\nname = plain text\n";
        assert_eq!(
            parse(text).unwrap(),
            json!({"section": {"count": 3, "flag": true, "items": [1, 2], "name": "plain text"}})
        );
    }

    #[test]
    fn options_outside_a_section_are_rejected() {
        assert!(parse("key = 1\n").is_err());
    }

    #[test]
    fn render_writes_json_values() {
        let text = render(&json!({"s": {"a": 1, "b": "x"}}))
            .unwrap()
            .replace(' ', "");
        assert!(text.contains("[s]"));
        assert!(text.contains("a=1"));
        assert!(text.contains("b=\"x\""));
        assert!(render(&json!([1])).is_err());
        assert!(render(&json!({"s": 1})).is_err());
    }
}
