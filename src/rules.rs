//! Declarative rule tables dispatched by JSON path.
//!
//! A table is a tree of [`RuleNode`]s. Child keys are path-segment patterns: an exact segment,
//! `*` for any single segment, or `**` for any number of segments (including none). Any node
//! may carry a rule, so `/paths/*` and `/paths/*/*/summary` live side by side.

use std::collections::BTreeMap;

/// A path-segment pattern.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pattern {
    /// Matches this segment only.
    Exact(String),
    /// `*`
    Any,
    /// `**`
    Recursive,
}

impl From<&str> for Pattern {
    fn from(segment: &str) -> Self {
        match segment {
            "*" => Self::Any,
            "**" => Self::Recursive,
            other => Self::Exact(other.to_owned()),
        }
    }
}

/// One node of a rule table: an optional rule for the path ending here, plus deeper patterns.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleNode<T> {
    /// The rule for a path that ends at this node.
    pub rule: Option<T>,
    /// Patterns for the next segment.
    pub children: BTreeMap<Pattern, RuleNode<T>>,
}

impl<T> Default for RuleNode<T> {
    fn default() -> Self {
        Self {
            rule: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> RuleNode<T> {
    /// Builds a table from `(pointer pattern, rule)` pairs such as `("/paths/*/*/summary", rule)`.
    pub fn from_paths<'a>(entries: impl IntoIterator<Item = (&'a str, T)>) -> Self {
        let mut root = Self::default();
        for (pointer, rule) in entries {
            root.insert(pointer, rule);
        }
        root
    }

    /// Adds one rule. A later rule replaces an earlier one at the same pattern and leaves
    /// rules above and below it alone.
    pub fn insert(&mut self, pointer: &str, rule: T) {
        let node = pointer
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self, |node, segment| {
                node.children.entry(Pattern::from(segment)).or_default()
            });
        node.rule = Some(rule);
    }

    /// The rule for `path`. Exact segments win over `*`, which wins over `**`.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&T> {
        let Some((head, rest)) = path.split_first() else {
            return self.rule.as_ref();
        };
        if let Some(child) = self.children.get(&Pattern::Exact(head.as_ref().to_owned())) {
            if let Some(rule) = child.lookup(rest) {
                return Some(rule);
            }
        }
        if let Some(child) = self.children.get(&Pattern::Any) {
            if let Some(rule) = child.lookup(rest) {
                return Some(rule);
            }
        }
        let child = self.children.get(&Pattern::Recursive)?;
        (0..=path.len()).find_map(|skip| child.lookup(&path[skip..]))
    }
}
