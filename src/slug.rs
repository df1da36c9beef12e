//! Deterministic, collision-free identifiers for documents, titles and operations.

use std::collections::BTreeSet;

/// How text is turned into a slug.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlugOptions {
    /// Characters replaced by a fixed string before anything else. Mapped output is kept as-is.
    pub char_map: &'static [(char, &'static str)],
    /// Characters kept besides alphanumerics.
    pub keep: &'static str,
    /// Whitespace and every other dropped separator become this.
    pub replacement: char,
    /// Runs of `replacement` collapse into one.
    pub collapse: bool,
    /// `replacement` is trimmed from both ends.
    pub trim: bool,
    /// The result is lower-cased.
    pub lowercase: bool,
    /// `{param}` path segments become `*` first.
    pub wildcard_params: bool,
}

const OPERATION_CHAR_MAP: &[(char, &str)] = &[
    ('/', "-"),
    ('{', "{"),
    ('}', "}"),
    ('[', "["),
    (']', "]"),
    ('*', "*"),
];

impl SlugOptions {
    /// Lower case, every separator collapses to `-`, trimmed.
    pub fn document_id() -> Self {
        Self {
            char_map: &[],
            keep: "",
            replacement: '-',
            collapse: true,
            trim: true,
            lowercase: true,
            wildcard_params: false,
        }
    }

    /// Case and literal spaces preserved, trimmed.
    pub fn title() -> Self {
        Self {
            char_map: &[],
            keep: "-_.",
            replacement: ' ',
            collapse: true,
            trim: true,
            lowercase: false,
            wildcard_params: false,
        }
    }

    /// Case preserved, no trim. Braces, brackets and wildcards survive so that
    /// `/pets/{id}` and `/pets/id` stay distinct.
    pub fn operation_id() -> Self {
        Self {
            char_map: OPERATION_CHAR_MAP,
            keep: "_.",
            replacement: '-',
            collapse: false,
            trim: false,
            lowercase: false,
            wildcard_params: false,
        }
    }

    /// [`SlugOptions::operation_id`] with every path parameter replaced by `*`,
    /// so operations group by path shape.
    pub fn normalized_operation_id() -> Self {
        Self {
            wildcard_params: true,
            ..Self::operation_id()
        }
    }
}

/// Slugs `text` and records the result in `used`.
///
/// A slug already in `used` gets the smallest positive integer suffix that makes it unique.
/// Empty input returns `""` and records nothing.
pub fn slugify(text: &str, options: &SlugOptions, used: &mut BTreeSet<String>) -> String {
    let slug = slug(text, options);
    if slug.is_empty() {
        return slug;
    }

    let unique = if used.contains(&slug) {
        (1..)
            .map(|suffix| format!("{slug}{suffix}"))
            .find(|candidate| !used.contains(candidate))
            .unwrap_or_default()
    } else {
        slug
    };
    used.insert(unique.clone());
    unique
}

/// Slugs `text` without any uniqueness bookkeeping.
pub fn slug(text: &str, options: &SlugOptions) -> String {
    if text.is_empty() {
        return String::new();
    }

    let source = if options.wildcard_params {
        wildcard_params(text)
    } else {
        text.to_owned()
    };

    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        if let Some((_, mapped)) = options.char_map.iter().find(|(from, _)| *from == c) {
            out.push_str(mapped);
        } else if c.is_alphanumeric() || options.keep.contains(c) {
            out.push(c);
        } else if options.collapse && out.ends_with(options.replacement) {
            continue;
        } else {
            out.push(options.replacement);
        }
    }

    if options.trim {
        out = out.trim_matches(options.replacement).to_owned();
    }
    if options.lowercase {
        out = out.to_lowercase();
    }
    out
}

fn wildcard_params(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => {
                if depth == 0 {
                    out.push('*');
                }
                depth += 1;
            }
            '}' if depth > 0 => depth -= 1,
            _ if depth > 0 => (),
            _ => out.push(c),
        }
    }
    out
}

/// Operation id of a REST operation: `{base_path}{path}-{method}` without the leading slash.
pub fn rest_operation_id(
    base_path: &str,
    path: &str,
    method: &str,
    used: &mut BTreeSet<String>,
) -> String {
    slugify(
        &rest_operation_key(base_path, path, method),
        &SlugOptions::operation_id(),
        used,
    )
}

/// Path shape of a REST operation, see [`SlugOptions::normalized_operation_id`].
pub fn normalized_rest_operation_id(base_path: &str, path: &str, method: &str) -> String {
    slug(
        &rest_operation_key(base_path, path, method),
        &SlugOptions::normalized_operation_id(),
    )
}

fn rest_operation_key(base_path: &str, path: &str, method: &str) -> String {
    let full = join_path(base_path, path);
    let trimmed = full.trim_matches('/');
    format!("{trimmed}-{}", method.to_lowercase())
}

/// Joins a server base path and an operation path with exactly one `/` between them.
pub fn join_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        format!("/{path}")
    } else if base.starts_with('/') {
        format!("{base}/{path}")
    } else {
        format!("/{base}/{path}")
    }
}
