//! # Source Documents
//!
//! Reads a markdown source into the fields the pipeline needs: identity,
//! taxonomy, temporal anchor, aliases and the substance hash.
//!
//! Only a minimal frontmatter dialect is understood: a leading `---` block of
//! `key: value` lines, inline `[a, b]` lists and `- item` block lists.

use crate::identity::{node_id, substance_hash};
use crate::primitives::{DEFAULT_DOMAIN, DEFAULT_LAYER};
use crate::types::{Node, NodeKind, NodeMeta};
use crate::WeftError;
use std::collections::BTreeMap;

/// Split a document into its frontmatter text (if any) and body.
///
/// An opening `---` without a closing delimiter is treated as body.
#[must_use]
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = content.strip_prefix("---") else {
        return (None, content);
    };
    let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return (None, content);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, content)
}

/// A frontmatter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::Scalar(s) if s.is_empty() => Vec::new(),
            Self::Scalar(s) => vec![s],
            Self::List(items) => items,
        }
    }

    fn into_scalar(self) -> String {
        match self {
            Self::Scalar(s) => s,
            Self::List(items) => items.join(", "),
        }
    }
}

/// Parse frontmatter text into ordered fields.
///
/// # Errors
///
/// Returns `Parse` for a line that is neither `key: value`, a list item under
/// a key, a comment nor blank.
pub fn parse_frontmatter(text: &str) -> Result<BTreeMap<String, FieldValue>, WeftError> {
    let mut fields = BTreeMap::new();
    let mut current: Option<String> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            let Some(key) = current.as_ref() else {
                return Err(WeftError::Parse(format!(
                    "frontmatter line {}: list item without a key",
                    index + 1
                )));
            };
            let entry = fields
                .entry(key.clone())
                .or_insert_with(|| FieldValue::List(Vec::new()));
            if matches!(entry, FieldValue::Scalar(s) if s.is_empty()) {
                *entry = FieldValue::List(Vec::new());
            }
            match entry {
                FieldValue::List(items) => items.push(unquote(item)),
                FieldValue::Scalar(_) => {
                    return Err(WeftError::Parse(format!(
                        "frontmatter line {}: list item after scalar `{key}`",
                        index + 1
                    )));
                }
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(WeftError::Parse(format!(
                "frontmatter line {}: expected `key: value`",
                index + 1
            )));
        };
        let key = key.trim().to_lowercase();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(WeftError::Parse(format!(
                "frontmatter line {}: invalid key",
                index + 1
            )));
        }
        fields.insert(key.clone(), parse_value(value.trim()));
        current = Some(key);
    }

    Ok(fields)
}

fn parse_value(value: &str) -> FieldValue {
    match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(inner) => FieldValue::List(
            inner
                .split(',')
                .map(unquote)
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        None => FieldValue::Scalar(unquote(value)),
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value).trim().to_string()
}

// =============================================================================
// SOURCE DOCUMENT
// =============================================================================

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Root-relative path with forward slashes.
    pub path: String,
    pub id: String,
    pub title: String,
    pub kind: NodeKind,
    pub domain: String,
    pub layer: String,
    pub date: Option<String>,
    pub aliases: Vec<String>,
    /// Unrecognized frontmatter keys.
    pub extra: BTreeMap<String, String>,
    /// Content without frontmatter.
    pub body: String,
    pub hash: String,
}

impl SourceDocument {
    /// Parse `content` found at the root-relative `path`.
    ///
    /// `default_kind` applies when the frontmatter has no `type`.
    pub fn parse(path: &str, content: &str, default_kind: &NodeKind) -> Result<Self, WeftError> {
        let path = path.replace('\\', "/");
        let (frontmatter, body) = split_frontmatter(content);
        if frontmatter.is_none() && is_unterminated(content) {
            return Err(WeftError::Parse(format!("{path}: unterminated frontmatter")));
        }
        let mut fields = match frontmatter {
            Some(text) => parse_frontmatter(text).map_err(|e| match e {
                WeftError::Parse(msg) => WeftError::Parse(format!("{path}: {msg}")),
                other => other,
            })?,
            None => BTreeMap::new(),
        };

        let mut take = |key: &str| {
            fields
                .remove(key)
                .map(FieldValue::into_scalar)
                .filter(|s| !s.is_empty())
        };

        let id = take("id").unwrap_or_else(|| node_id(&path));
        let title = take("title")
            .or_else(|| first_heading(body))
            .unwrap_or_else(|| file_stem(&path));
        let kind = take("type").map_or_else(|| default_kind.clone(), |t| NodeKind::from(t.as_str()));
        let domain = take("domain").unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        let layer = take("layer").unwrap_or_else(|| DEFAULT_LAYER.to_string());
        let date = take("date");
        let aliases = fields
            .remove("aliases")
            .map(FieldValue::into_list)
            .unwrap_or_default();
        let extra = fields
            .into_iter()
            .map(|(k, v)| (k, v.into_scalar()))
            .collect();

        Ok(Self {
            hash: substance_hash(content),
            path,
            id,
            title,
            kind,
            domain,
            layer,
            date,
            aliases,
            extra,
            body: body.to_string(),
        })
    }

    /// Body text used for embedding and extraction.
    #[must_use]
    pub fn text(&self) -> &str {
        self.body.trim()
    }

    /// Build the node record (without embedding).
    #[must_use]
    pub fn to_node(&self) -> Node {
        Node {
            id: self.id.clone(),
            kind: self.kind.clone(),
            title: self.title.clone(),
            domain: self.domain.clone(),
            layer: self.layer.clone(),
            summary: None,
            embedding: None,
            hash: Some(self.hash.clone()),
            meta: NodeMeta {
                source: Some(self.path.clone()),
                date: self.date.clone(),
                aliases: self.aliases.clone(),
                extra: self.extra.clone(),
                ..NodeMeta::default()
            },
        }
    }
}

fn is_unterminated(content: &str) -> bool {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content.starts_with("---\n") || content.starts_with("---\r\n")
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

fn file_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_fields_are_read() {
        let content = "---\nid: term:CircularLogic\ntitle: Circular Logic\ntype: concept\ndomain: lexicon\naliases: [Loops, \"Self Reference\"]\nstatus: draft\n---\nA concept.\n";
        let doc = SourceDocument::parse("lexicon/circular.md", content, &NodeKind::Document)
            .expect("parse");
        assert_eq!(doc.id, "term:CircularLogic");
        assert_eq!(doc.title, "Circular Logic");
        assert_eq!(doc.kind, NodeKind::Concept);
        assert_eq!(doc.domain, "lexicon");
        assert_eq!(doc.layer, "experience");
        assert_eq!(doc.aliases, vec!["Loops", "Self Reference"]);
        assert_eq!(doc.extra.get("status").map(String::as_str), Some("draft"));
        assert_eq!(doc.text(), "A concept.");
    }

    #[test]
    fn block_lists_are_read() {
        let fields = parse_frontmatter("aliases:\n  - One\n  - 'Two'\n").expect("parse");
        assert_eq!(
            fields.get("aliases"),
            Some(&FieldValue::List(vec!["One".into(), "Two".into()]))
        );
    }

    #[test]
    fn title_falls_back_to_heading_then_stem() {
        let doc = SourceDocument::parse("notes/x.md", "intro\n# Heading One\nbody", &NodeKind::Note)
            .expect("parse");
        assert_eq!(doc.title, "Heading One");
        assert_eq!(doc.id, "notes-x");
        assert_eq!(doc.kind, NodeKind::Note);

        let doc = SourceDocument::parse("notes/plain-file.md", "no heading", &NodeKind::Note)
            .expect("parse");
        assert_eq!(doc.title, "plain-file");
    }

    #[test]
    fn malformed_frontmatter_is_a_parse_error() {
        let unterminated = SourceDocument::parse("a.md", "---\ntitle: x\nbody", &NodeKind::Document);
        assert!(matches!(unterminated, Err(WeftError::Parse(_))));

        let garbage = SourceDocument::parse("a.md", "---\nnot a field\n---\nbody", &NodeKind::Document);
        assert!(matches!(garbage, Err(WeftError::Parse(_))));
    }

    #[test]
    fn horizontal_rule_without_newline_is_body() {
        let (fm, body) = split_frontmatter("--- not frontmatter");
        assert!(fm.is_none());
        assert_eq!(body, "--- not frontmatter");
    }

    #[test]
    fn to_node_carries_source_and_hash() {
        let doc = SourceDocument::parse("d/2026-01-02-log.md", "---\ndate: 2026-01-02\ntype: debrief\n---\ntext", &NodeKind::Document)
            .expect("parse");
        let node = doc.to_node();
        assert_eq!(node.kind, NodeKind::Record);
        assert_eq!(node.meta.source.as_deref(), Some("d/2026-01-02-log.md"));
        assert_eq!(node.meta.date.as_deref(), Some("2026-01-02"));
        assert_eq!(node.hash.as_deref(), Some(doc.hash.as_str()));
    }
}
