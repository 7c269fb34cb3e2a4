//! Project spec input.
//!
//! `.yaml`/`.yml` files are read as YAML. Anything else is read as structured
//! Markdown:
//!
//! ```markdown
//! # Title                  (skipped)
//! ## Data Models           -> "data_models": [...]
//! - Link                   -> "Link"
//! - **Storage** sqlite     -> {"storage": "sqlite"}
//! - **Endpoints**          -> {"endpoints": ["POST /links", "GET /{code}"]}
//!   - POST /links
//!   - GET /{code}
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Yaml,
    Markdown,
}

impl SpecFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml") | Some("yml") => SpecFormat::Yaml,
            _ => SpecFormat::Markdown,
        }
    }
}

pub fn load(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read spec file {}", path.display()))?;
    let format = SpecFormat::from_path(path);
    parse(&text, format).with_context(|| format!("failed to parse {:?} spec {}", format, path.display()))
}

/// Parses spec text. Empty input yields an empty mapping.
pub fn parse(text: &str, format: SpecFormat) -> Result<Value> {
    match format {
        SpecFormat::Yaml => {
            if text.trim().is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            match serde_yaml::from_str::<Value>(text)? {
                Value::Null => Ok(Value::Object(Map::new())),
                value => Ok(value),
            }
        }
        SpecFormat::Markdown => Ok(Value::Object(parse_markdown(text))),
    }
}

pub fn parse_markdown(text: &str) -> Map<String, Value> {
    let mut spec = Map::new();
    let mut section: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            if let Some((key, lines)) = section.take() {
                insert_section(&mut spec, key, &lines);
            }
            section = Some((section_key(title), Vec::new()));
        } else if line.starts_with("# ") {
            continue;
        } else if let Some((_, lines)) = section.as_mut() {
            lines.push(line);
        }
    }
    if let Some((key, lines)) = section {
        insert_section(&mut spec, key, &lines);
    }
    spec
}

fn insert_section(spec: &mut Map<String, Value>, key: String, lines: &[&str]) {
    if !lines.is_empty() {
        spec.insert(key, Value::Array(parse_list(lines)));
    }
}

fn section_key(title: &str) -> String {
    title.trim().to_lowercase().replace(' ', "_")
}

/// Parses one section's list. Lines that are not list items are ignored.
pub fn parse_list(lines: &[&str]) -> Vec<Value> {
    let mut items = Vec::new();
    let mut current: Option<Value> = None;

    for line in lines {
        let trimmed = line.trim();
        let Some(content) = strip_marker(trimmed) else {
            continue;
        };
        let indent = line.len() - line.trim_start().len();
        match current.as_mut() {
            Some(parent) if indent >= 2 => nest(parent, content),
            _ => {
                items.extend(current.take());
                current = Some(list_item(content));
            }
        }
    }
    items.extend(current);
    items
}

fn strip_marker(line: &str) -> Option<&str> {
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim)
}

/// `**Key** value` becomes `{key: value}`, a bare `**Key**` the string `key`.
fn list_item(content: &str) -> Value {
    let Some((emphasis, rest)) = emphasis(content) else {
        return Value::String(content.to_string());
    };
    let key = emphasis.to_lowercase().replace(' ', "_");
    let value = rest.trim();
    if value.is_empty() {
        return Value::String(key);
    }
    let mut map = Map::new();
    map.insert(key, Value::String(value.to_string()));
    Value::Object(map)
}

/// The first `**...**` span and the text with it removed.
fn emphasis(content: &str) -> Option<(&str, String)> {
    let start = content.find("**")?;
    let len = content[start + 2..].find("**")?;
    let inner = &content[start + 2..start + 2 + len];
    let rest = format!("{}{}", &content[..start], &content[start + 4 + len..]);
    Some((inner, rest))
}

/// Indented items become a list under the current item; an inline value is
/// replaced by that list.
fn nest(parent: &mut Value, child: &str) {
    let child = Value::String(child.to_string());
    match parent {
        Value::Object(map) => {
            if let Some(slot) = map.values_mut().next() {
                match slot {
                    Value::Array(children) => children.push(child),
                    other => *other = Value::Array(vec![child]),
                }
            }
        }
        Value::String(key) => {
            let mut map = Map::new();
            map.insert(std::mem::take(key), Value::Array(vec![child]));
            *parent = Value::Object(map);
        }
        _ => {}
    }
}
