//! Front-matter decoding for planning documents.
//!
//! A front-matter block opens with a `---` line at the very start of the
//! document and closes at the next line that is exactly `---`. Inside it:
//!
//! ```text
//! key: value            scalar (quotes stripped, true/false → bool, digits → int)
//! key: [a, b]           inline list
//! key:                  followed by a run of "  - item" lines → list
//!   - item
//! must_haves:           three-section sub-grammar, ends at the next
//!   truths:             non-indented line or the end of the block
//!     - item
//!   artifacts:
//!   key_links:
//! ```
//!
//! Lines that match none of these forms are skipped. Decoding never fails;
//! a malformed field is simply absent from the result.

use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    MustHaves(MustHaves),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MustHaves {
    pub truths: Vec<String>,
    pub artifacts: Vec<String>,
    pub key_links: Vec<String>,
}

impl MustHaves {
    pub fn is_empty(&self) -> bool {
        self.truths.is_empty() && self.artifacts.is_empty() && self.key_links.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MustHaveSection {
    Truths,
    Artifacts,
    KeyLinks,
}

// ---------------------------------------------------------------------------
// FrontMatter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FrontMatter {
    fields: BTreeMap<String, Value>,
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// String value, or the text form of an int/bool. Empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::Str(s) if s.is_empty() => None,
            Value::Str(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer value; quoted digit strings are accepted too.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Str(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// List value. A bare scalar is promoted to a one-element list; an empty
    /// scalar (a `key:` line with no items) is an empty list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::List(items)) => items.clone(),
            Some(Value::Str(s)) if s.is_empty() => Vec::new(),
            Some(Value::Str(s)) => vec![s.clone()],
            Some(Value::Int(n)) => vec![n.to_string()],
            _ => Vec::new(),
        }
    }

    pub fn must_haves(&self) -> Option<&MustHaves> {
        match self.fields.get("must_haves")? {
            Value::MustHaves(m) => Some(m),
            _ => None,
        }
    }

    /// Serialize back into a `---` delimited block. Formatting is normalized;
    /// decoding the output yields the same fields.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.fields {
            match value {
                Value::Str(s) => out.push_str(&format!("{key}: {}\n", render_scalar(s))),
                Value::Int(n) => out.push_str(&format!("{key}: {n}\n")),
                Value::Bool(b) => out.push_str(&format!("{key}: {b}\n")),
                Value::List(items) if items.is_empty() => out.push_str(&format!("{key}: []\n")),
                Value::List(items) => {
                    out.push_str(&format!("{key}:\n"));
                    for item in items {
                        out.push_str(&format!("  - {}\n", render_item(item)));
                    }
                }
                Value::MustHaves(m) => {
                    out.push_str(&format!("{key}:\n"));
                    for (name, items) in [
                        ("truths", &m.truths),
                        ("artifacts", &m.artifacts),
                        ("key_links", &m.key_links),
                    ] {
                        out.push_str(&format!("  {name}:\n"));
                        for item in items {
                            out.push_str(&format!("    - {}\n", render_item(item)));
                        }
                    }
                }
            }
        }
        out.push_str("---\n");
        out
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s == "true"
        || s == "false"
        || s.chars().all(|c| c.is_ascii_digit())
        || s.starts_with('[')
        || s.starts_with('"')
        || s.starts_with('\'')
        || s.trim() != s
}

fn quote(s: &str) -> String {
    if s.contains('"') {
        format!("'{s}'")
    } else {
        format!("\"{s}\"")
    }
}

fn render_scalar(s: &str) -> String {
    if needs_quotes(s) {
        quote(s)
    } else {
        s.to_string()
    }
}

fn render_item(s: &str) -> String {
    if s.starts_with('"') || s.starts_with('\'') || s.trim() != s || s.is_empty() {
        quote(s)
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Block extraction
// ---------------------------------------------------------------------------

/// Split a document into its front-matter block (without delimiters) and the
/// remaining body. Returns `None` when the document has no complete block.
pub fn split(text: &str) -> Option<(&str, &str)> {
    let first_end = text.find('\n')?;
    if text[..first_end].trim_end_matches('\r') != "---" {
        return None;
    }
    let block_start = first_end + 1;
    let mut offset = block_start;
    for line in text[block_start..].split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let block = &text[block_start..offset];
            let body = &text[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

/// The document text after the front-matter block, or the whole text if none.
pub fn body(text: &str) -> &str {
    split(text).map(|(_, body)| body).unwrap_or(text)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Decode the front-matter block of `text`. A document without a block yields
/// an empty map.
pub fn parse(text: &str) -> FrontMatter {
    match split(text) {
        Some((block, _)) => parse_block(block),
        None => FrontMatter::default(),
    }
}

enum Mode {
    Top,
    MustHaves(Option<MustHaveSection>),
}

fn parse_block(block: &str) -> FrontMatter {
    let mut fm = FrontMatter::default();
    let mut mode = Mode::Top;
    let mut last_key: Option<String> = None;

    for raw in block.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let indented = line.starts_with(' ') || line.starts_with('\t');

        if let Mode::MustHaves(section) = &mut mode {
            if indented {
                let trimmed = line.trim();
                match trimmed {
                    "truths:" => *section = Some(MustHaveSection::Truths),
                    "artifacts:" => *section = Some(MustHaveSection::Artifacts),
                    "key_links:" => *section = Some(MustHaveSection::KeyLinks),
                    _ => {
                        if let (Some(sec), Some(item)) = (*section, list_item(trimmed)) {
                            if let Some(Value::MustHaves(m)) = fm.fields.get_mut("must_haves") {
                                match sec {
                                    MustHaveSection::Truths => m.truths.push(item),
                                    MustHaveSection::Artifacts => m.artifacts.push(item),
                                    MustHaveSection::KeyLinks => m.key_links.push(item),
                                }
                            }
                        }
                    }
                }
                continue;
            }
            mode = Mode::Top;
        }

        if indented {
            let Some(item) = list_item(line.trim()) else {
                continue;
            };
            let Some(key) = &last_key else {
                continue;
            };
            match fm.fields.get_mut(key) {
                Some(Value::List(items)) => items.push(item),
                Some(slot @ Value::Str(_)) => {
                    if matches!(&*slot, Value::Str(s) if s.is_empty()) {
                        *slot = Value::List(vec![item]);
                    }
                }
                _ => {}
            }
            continue;
        }

        let Some((key, value)) = split_key_value(line) else {
            continue;
        };
        if key == "must_haves" && value.is_empty() {
            fm.insert("must_haves", Value::MustHaves(MustHaves::default()));
            mode = Mode::MustHaves(None);
            last_key = None;
            continue;
        }
        fm.insert(key, decode_value(value));
        last_key = Some(key.to_string());
    }
    fm
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let key = line[..colon].trim_end();
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some((key, line[colon + 1..].trim()))
}

fn list_item(trimmed: &str) -> Option<String> {
    let rest = trimmed.strip_prefix('-')?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let item = unquote(rest.trim());
    if item.is_empty() {
        None
    } else {
        Some(item.to_string())
    }
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn is_quoted(s: &str) -> bool {
    unquote(s).len() != s.len()
}

fn decode_value(raw: &str) -> Value {
    if is_quoted(raw) {
        return Value::Str(unquote(raw).to_string());
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(|s| unquote(s.trim()).to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Value::List(items);
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Int(n);
        }
    }
    Value::Str(raw.to_string())
}

// ---------------------------------------------------------------------------
// Line rewriting
// ---------------------------------------------------------------------------

/// Replace the scalar `key: ...` line inside the front-matter block of `text`
/// with `key: raw_value`, appending the line before the closing delimiter when
/// the key is absent. Returns the new text and the previous raw value, or
/// `None` when `text` has no front-matter block.
pub fn set_scalar(text: &str, key: &str, raw_value: &str) -> Option<(String, Option<String>)> {
    let (block, body) = split(text)?;
    let mut previous = None;
    let mut lines: Vec<String> = Vec::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        let is_target = !line.starts_with(' ')
            && split_key_value(line).map(|(k, _)| k == key).unwrap_or(false);
        if is_target && previous.is_none() {
            let old = split_key_value(line).map(|(_, v)| unquote(v).to_string());
            previous = Some(old.unwrap_or_default());
            lines.push(format!("{key}: {raw_value}"));
        } else {
            lines.push(line.to_string());
        }
    }
    if previous.is_none() {
        lines.push(format!("{key}: {raw_value}"));
    }
    let mut out = String::with_capacity(text.len() + raw_value.len());
    out.push_str("---\n");
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(body);
    Some((out, previous))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "---\n\
plan: 02-01\n\
wave: 2\n\
autonomous: true\n\
depends_on: [02-00, \"01-03\"]\n\
files_modified:\n  - src/auth.rs\n  - 'src/lib.rs'\n\
must_haves:\n  truths:\n    - \"User can log in\"\n  artifacts:\n    - src/auth.rs\n  key_links:\n    - login -> session\n\
gap_closure: false\n\
title: \"42\"\n\
---\n\n# Plan body\n";

    #[test]
    fn parses_scalars_and_coercions() {
        let fm = parse(PLAN);
        assert_eq!(fm.get("plan"), Some(&Value::Str("02-01".into())));
        assert_eq!(fm.get("wave"), Some(&Value::Int(2)));
        assert_eq!(fm.get("autonomous"), Some(&Value::Bool(true)));
        assert_eq!(fm.get("gap_closure"), Some(&Value::Bool(false)));
        // quoted digits stay a string
        assert_eq!(fm.get("title"), Some(&Value::Str("42".into())));
    }

    #[test]
    fn parses_inline_and_block_lists() {
        let fm = parse(PLAN);
        assert_eq!(fm.get_list("depends_on"), vec!["02-00", "01-03"]);
        assert_eq!(fm.get_list("files_modified"), vec!["src/auth.rs", "src/lib.rs"]);
    }

    #[test]
    fn parses_must_haves_sections() {
        let fm = parse(PLAN);
        let m = fm.must_haves().unwrap();
        assert_eq!(m.truths, vec!["User can log in"]);
        assert_eq!(m.artifacts, vec!["src/auth.rs"]);
        assert_eq!(m.key_links, vec!["login -> session"]);
        // the top-level key after the block is still seen
        assert!(fm.contains_key("gap_closure"));
    }

    #[test]
    fn no_block_yields_empty() {
        assert!(parse("# Just markdown\nstatus: passed\n").is_empty());
        assert!(parse("---\nstatus: passed\n").is_empty(), "unterminated block");
        assert!(parse("").is_empty());
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let fm = parse("---\nstatus: passed\n!!! nonsense\nkey with spaces: x\n  - orphan\n:novalue\n---\n");
        assert_eq!(fm.len(), 1);
        assert_eq!(fm.get_str("status").as_deref(), Some("passed"));
    }

    #[test]
    fn empty_key_then_no_items_is_empty_list() {
        let fm = parse("---\nblockers:\nstatus: building\n---\n");
        assert!(fm.get_list("blockers").is_empty());
        assert_eq!(fm.get_str("blockers"), None);
    }

    #[test]
    fn item_lines_extend_only_empty_or_list_keys() {
        let fm = parse("---\nblockers:\n  - waiting on API key\n  - flaky CI\nstatus: blocked\n  - stray\n---\n");
        assert_eq!(fm.get_list("blockers"), vec!["waiting on API key", "flaky CI"]);
        assert_eq!(fm.get("status"), Some(&Value::Str("blocked".into())));
    }

    #[test]
    fn must_haves_ends_at_block_end() {
        let fm = parse("---\nmust_haves:\n  truths:\n    - a\n---\nbody: not parsed\n");
        assert_eq!(fm.must_haves().unwrap().truths, vec!["a"]);
        assert!(!fm.contains_key("body"));
    }

    #[test]
    fn render_then_parse_preserves_fields() {
        let fm = parse(PLAN);
        let again = parse(&fm.render());
        assert_eq!(again, fm);

        let mut tricky = FrontMatter::default();
        tricky.insert("empty", Value::Str(String::new()));
        tricky.insert("looks_bool", Value::Str("true".into()));
        tricky.insert("looks_int", Value::Str("007".into()));
        tricky.insert("quoted", Value::Str("say \"hi\"".into()));
        tricky.insert("none", Value::List(vec![]));
        assert_eq!(parse(&tricky.render()).get("looks_bool"), tricky.get("looks_bool"));
        assert_eq!(parse(&tricky.render()).get("looks_int"), tricky.get("looks_int"));
        assert_eq!(parse(&tricky.render()).get("quoted"), tricky.get("quoted"));
        assert_eq!(parse(&tricky.render()).get("none"), tricky.get("none"));
    }

    #[test]
    fn split_returns_body() {
        let (block, rest) = split("---\na: 1\n---\nbody\n").unwrap();
        assert_eq!(block, "a: 1\n");
        assert_eq!(rest, "body\n");
        assert_eq!(body("no front matter"), "no front matter");
    }

    #[test]
    fn set_scalar_replaces_and_inserts() {
        let text = "---\nstatus: \"planning\"\ncurrent_phase: 1\n---\n# State\n";
        let (out, old) = set_scalar(text, "status", "\"building\"").unwrap();
        assert_eq!(old.as_deref(), Some("planning"));
        assert!(out.contains("status: \"building\""));
        assert!(out.ends_with("---\n# State\n"));

        let (out, old) = set_scalar(&out, "plans_complete", "2").unwrap();
        assert_eq!(old, None);
        assert_eq!(parse(&out).get_int("plans_complete"), Some(2));
        assert!(set_scalar("no block", "status", "x").is_none());
    }
}
