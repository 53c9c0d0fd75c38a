//! # Identity and Substance
//!
//! Deterministic node ids and content-substance hashes.
//!
//! The same logical source always maps to the same id, and the substance hash
//! ignores volatile metadata (frontmatter and injected tag blocks), so a
//! metadata-only edit never looks like a content change.

use crate::source::split_frontmatter;

/// Extensions stripped from a path before deriving its id.
const STRIPPED_EXTENSIONS: [&str; 4] = [".md", ".ts", ".js", ".json"];

/// Derive a node id from a root-relative path.
///
/// `./docs/Guide/Intro.md` becomes `docs-guide-intro`.
#[must_use]
pub fn node_id(path: &str) -> String {
    let path = path.replace('\\', "/");
    let dots = path.len() - path.trim_start_matches('.').len();
    let path = match path[dots..].strip_prefix('/') {
        Some(rest) => rest,
        None => path.as_str(),
    };
    let path = STRIPPED_EXTENSIONS
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path);
    slugify(path)
}

/// Lowercase slug: every run of characters outside `[a-z0-9]` becomes one `-`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// BLAKE3 hex digest of a document's substance.
#[must_use]
pub fn substance_hash(content: &str) -> String {
    blake3::hash(substance(content).as_bytes())
        .to_hex()
        .to_string()
}

/// The hashed part of a document: body without frontmatter or tag blocks,
/// trailing whitespace removed per line, trimmed.
#[must_use]
pub fn substance(content: &str) -> String {
    let (_, body) = split_frontmatter(content);
    let body = strip_tag_blocks(body);
    let lines: Vec<&str> = body.lines().map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

fn strip_tag_blocks(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find("<!--") {
        let after = &rest[start + 4..];
        let is_tags = after.trim_start().to_lowercase().starts_with("tags:");
        match after.find("-->") {
            Some(end) if is_tags => {
                out.push_str(&rest[..start]);
                rest = &after[end + 3..];
            }
            _ => {
                out.push_str(&rest[..start + 4]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
