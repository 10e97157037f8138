//! XML rendering of serialized values.
//!
//! Objects become child elements, arrays repeat an `<item>` element, scalars
//! become escaped text and `null` an empty element. Keys that are not valid
//! element names are rewritten with `_`.

use serde_json::Value;

pub const ROOT_ELEMENT: &str = "response";
const ARRAY_ELEMENT: &str = "item";

/// Render `value` as a standalone XML document.
pub fn to_xml(value: &Value, indent: Option<&str>) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    if indent.is_some() {
        out.push('\n');
    }
    write_element(&mut out, ROOT_ELEMENT, value, indent, 0);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value, indent: Option<&str>, depth: usize) {
    push_indent(out, indent, depth);
    match value {
        Value::Null => {
            out.push_str(&format!("<{}/>", name));
        }
        Value::Object(map) if map.is_empty() => {
            out.push_str(&format!("<{}/>", name));
        }
        Value::Array(items) if items.is_empty() => {
            out.push_str(&format!("<{}/>", name));
        }
        Value::Object(map) => {
            out.push_str(&format!("<{}>", name));
            newline(out, indent);
            for (key, child) in map {
                write_element(out, &element_name(key), child, indent, depth + 1);
            }
            push_indent(out, indent, depth);
            out.push_str(&format!("</{}>", name));
        }
        Value::Array(items) => {
            out.push_str(&format!("<{}>", name));
            newline(out, indent);
            for child in items {
                write_element(out, ARRAY_ELEMENT, child, indent, depth + 1);
            }
            push_indent(out, indent, depth);
            out.push_str(&format!("</{}>", name));
        }
        Value::Bool(b) => out.push_str(&format!("<{0}>{1}</{0}>", name, b)),
        Value::Number(n) => out.push_str(&format!("<{0}>{1}</{0}>", name, n)),
        Value::String(s) => out.push_str(&format!("<{0}>{1}</{0}>", name, escape(s))),
    }
    newline(out, indent);
}

fn push_indent(out: &mut String, indent: Option<&str>, depth: usize) {
    if let Some(unit) = indent {
        for _ in 0..depth {
            out.push_str(unit);
        }
    }
}

fn newline(out: &mut String, indent: Option<&str>) {
    if indent.is_some() {
        out.push('\n');
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let valid_start = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    if !valid_start || name.to_ascii_lowercase().starts_with("xml") {
        name.insert(0, '_');
    }
    name
}
