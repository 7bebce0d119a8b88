//! XML documents with typed elements.
//!
//! A document becomes `{root_tag: {child_tag: value, ...}}`. An element's
//! `type` attribute casts its content:
//!
//! ```xml
//! <root>
//!     <count type="int">1</count>
//!     <values type="list">
//!         <item type="float">2.5</item>
//!         <item type="str">text</item>
//!     </values>
//! </root>
//! ```
//!
//! Untyped elements with children are mappings, untyped leaves are their
//! text, and empty untyped leaves are null. Saving writes every element
//! with its `type`, so saved documents load back to the same value.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>"#;

struct Element {
    name: String,
    kind: Option<String>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, String> {
        let mut kind = None;
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            if attr.key.as_ref() == b"type" {
                let value = attr.unescape_value().map_err(|e| e.to_string())?;
                kind = Some(value.to_lowercase());
            }
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            kind,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn into_value(self) -> Result<Value, String> {
        let Element {
            name,
            kind,
            text,
            children,
        } = self;
        let trimmed = text.trim();
        let cast_error = |expected: &str| format!("element '{name}': expected {expected}, got {trimmed:?}");
        match kind.as_deref() {
            None if !children.is_empty() => children_to_map(children),
            None if trimmed.is_empty() => Ok(Value::Null),
            None | Some("str") => Ok(Value::String(text.clone())),
            Some("int") => trimmed
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| trimmed.parse::<u64>().map(Value::from))
                .map_err(|_| cast_error("an integer")),
            Some("float") => trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| cast_error("a finite float")),
            Some("bool") => match trimmed.to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(cast_error("'true' or 'false'")),
            },
            Some("list") => children
                .into_iter()
                .map(Element::into_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Some("dict") => children_to_map(children),
            Some("null") => Ok(Value::Null),
            Some(other) => Err(format!(
                "element '{name}': unsupported type '{other}', expected one of \
                 str, int, float, bool, list, dict, null"
            )),
        }
    }
}

fn children_to_map(children: Vec<Element>) -> Result<Value, String> {
    let mut map = Map::new();
    for child in children {
        let name = child.name.clone();
        map.insert(name, child.into_value()?);
    }
    Ok(Value::Object(map))
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => return Err("the document has more than one root element".into()),
        None => *root = Some(element),
    }
    Ok(())
}

pub fn parse(text: &str) -> Result<Value, String> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => attach(Element::open(&start)?, &mut stack, &mut root)?,
            Event::End(_) => {
                let element = stack.pop().ok_or("unexpected closing tag")?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::Text(content) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&content.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(content) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err("unclosed element at end of document".into());
    }
    let root = root.ok_or("the document has no root element")?;
    let name = root.name.clone();
    let body = children_to_map(root.children)?;
    let mut document = Map::new();
    document.insert(name, body);
    Ok(Value::Object(document))
}

pub fn render(value: &Value, pretty: bool) -> Result<String, String> {
    let (name, body) = match value {
        Value::Object(map) if map.len() == 1 => map.iter().next().ok_or("empty document")?,
        _ => return Err("an XML document must be a mapping with a single root element".into()),
    };
    let Value::Object(children) = body else {
        return Err(format!("the root element '{name}' must be a mapping"));
    };
    check_name(name)?;

    let newline = if pretty { "\n" } else { "" };
    let mut out = format!("{DECLARATION}{newline}<{name}>{newline}");
    for (key, child) in children {
        write_element(&mut out, key, child, 1, pretty)?;
    }
    out.push_str(&format!("</{name}>{newline}"));
    Ok(out)
}

fn write_element(
    out: &mut String,
    name: &str,
    value: &Value,
    depth: usize,
    pretty: bool,
) -> Result<(), String> {
    check_name(name)?;
    let indent = if pretty { "    ".repeat(depth) } else { String::new() };
    let newline = if pretty { "\n" } else { "" };
    let (kind, text) = match value {
        Value::Null => ("null", String::new()),
        Value::Bool(b) => ("bool", b.to_string()),
        Value::Number(n) if n.is_f64() => ("float", n.to_string()),
        Value::Number(n) => ("int", n.to_string()),
        Value::String(s) => ("str", escape(s.as_str()).into_owned()),
        Value::Array(items) => {
            out.push_str(&format!("{indent}<{name} type=\"list\">"));
            if !items.is_empty() {
                out.push_str(newline);
                for item in items {
                    write_element(out, "item", item, depth + 1, pretty)?;
                }
                out.push_str(&indent);
            }
            out.push_str(&format!("</{name}>{newline}"));
            return Ok(());
        }
        Value::Object(map) => {
            out.push_str(&format!("{indent}<{name} type=\"dict\">"));
            if !map.is_empty() {
                out.push_str(newline);
                for (key, child) in map {
                    write_element(out, key, child, depth + 1, pretty)?;
                }
                out.push_str(&indent);
            }
            out.push_str(&format!("</{name}>{newline}"));
            return Ok(());
        }
    };
    out.push_str(&format!("{indent}<{name} type=\"{kind}\">{text}</{name}>{newline}"));
    Ok(())
}

fn check_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        Ok(())
    } else {
        Err(format!("'{name}' is not a valid element name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_elements_are_cast() {
        let text = r#"<?xml version="1.0" encoding="UTF-8" ?>
            <root>
                <int_value type="int">1</int_value>
                <simple_list type="list">
                    <item type="int">1</item>
                    <item type="float">2.5</item>
                    <item type="str">str_val</item>
                    <item type="bool">True</item>
                    <item type="null"/>
                </simple_list>
                <nested><leaf>text</leaf><empty/></nested>
            </root>"#;
        assert_eq!(
            parse(text).unwrap(),
            json!({"root": {
                "int_value": 1,
                "simple_list": [1, 2.5, "str_val", true, null],
                "nested": {"leaf": "text", "empty": null}
            }})
        );
    }

    #[test]
    fn bad_casts_are_errors() {
        assert!(parse("<root><a type=\"int\">x</a></root>").is_err());
        assert!(parse("<root><a type=\"bool\">yes</a></root>").is_err());
        assert!(parse("<root><a type=\"date\">1</a></root>").is_err());
        assert!(parse("<root><a></root>").is_err());
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn rendered_documents_load_back() {
        let value = json!({"root": {
            "n": 3,
            "f": 1.5,
            "s": "a < b",
            "b": false,
            "none": null,
            "list": [1, {"k": "v"}, []],
            "dict": {}
        }});
        for pretty in [true, false] {
            let text = render(&value, pretty).unwrap();
            assert_eq!(parse(&text).unwrap(), value, "pretty={pretty}:\n{text}");
        }
    }

    #[test]
    fn render_needs_a_single_root_mapping() {
        assert!(render(&json!({"a": {}, "b": {}}), true).is_err());
        assert!(render(&json!({"root": 1}), true).is_err());
        assert!(render(&json!({"root": {"bad name": 1}}), true).is_err());
    }
}
