//! Permalink normalization.
//!
//! Permalinks are lowercase slugs in the `[a-z0-9/_-]` charset, one segment
//! per path component. They are derived from the file path relative to the
//! project root unless the frontmatter carries an explicit `permalink` key.

/// Slugify a single path segment: lowercase, alphanumerics kept, runs of
/// anything else collapsed into a single `-`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }

    out.trim_matches('-').to_string()
}

/// Derive a permalink from a path relative to the project root.
///
/// The `.md` extension is stripped and each segment slugified, so
/// `notes/Archive Alpha.md` becomes `notes/archive-alpha`.
pub fn permalink_from_path(rel_path: &str) -> String {
    let without_ext = rel_path
        .strip_suffix(".md")
        .or_else(|| rel_path.strip_suffix(".MD"))
        .unwrap_or(rel_path);

    without_ext
        .replace('\\', "/")
        .split('/')
        .map(slugify)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a user-supplied permalink (frontmatter `permalink` key) into the
/// canonical charset while preserving its segment structure.
pub fn normalize_permalink(raw: &str) -> String {
    permalink_from_path(raw.trim().trim_matches('/'))
}
